//! Recursive-descent parser with explicit precedence climbing.
//!
//! Production order, lowest to highest: `Expr → OrExpr → AndExpr →
//! EqualityExpr → RelationalExpr → RangeExpr → AdditiveExpr →
//! MultiplicativeExpr → UnaryExpr → UnionExpr → PathExpr → FilterExpr →
//! PrimaryExpr`. Errors accumulate as strings; the compile handle is valid
//! only when the list stays empty.

mod constructors;
mod paths;
mod prolog_decls;

use crate::ast::{AstKind, AstNode, BinaryOperator, OrderModifiers};
use crate::prolog::XQueryProlog;
use crate::tokenizer::{Token, TokenKind, tokenize};

pub(crate) struct Parser<'a> {
    source: &'a str,
    /// Absolute offset of `source` within the top-level query text. Token
    /// spans are absolute; subtracting `base` indexes `source`.
    base: usize,
    tokens: Vec<Token<'a>>,
    unterminated: Vec<usize>,
    pos: usize,
    errors: Vec<String>,
    pub(crate) prolog: XQueryProlog,
}

pub(crate) struct ParseOutput {
    pub ast: Option<AstNode>,
    pub prolog: XQueryProlog,
    pub errors: Vec<String>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::fragment(source, 0)
    }

    /// Parser over a slice of the main source, used for attribute value
    /// templates and enclosed expressions inside direct constructors.
    fn fragment(source: &'a str, base: usize) -> Self {
        let stream = tokenize(source, base);
        Self {
            source,
            base,
            tokens: stream.tokens,
            unterminated: stream.unterminated,
            pos: 0,
            errors: Vec::new(),
            prolog: XQueryProlog::new(),
        }
    }

    pub fn parse_query(mut self) -> ParseOutput {
        self.parse_prolog();
        let ast = if self.prolog.is_library_module && self.check(TokenKind::End) {
            // A library module has no query body.
            Some(AstNode::new(AstKind::Expression, ""))
        } else {
            let expr = self.parse_expr();
            if !self.check(TokenKind::End) {
                let token = self.current_text();
                self.error(format!("unexpected trailing input at '{token}'"));
            }
            Some(expr)
        };
        ParseOutput { ast, prolog: self.prolog, errors: self.errors }
    }

    // ===== token utilities =====

    fn current(&self) -> &Token<'a> {
        self.tokens.get(self.pos).unwrap_or_else(|| {
            self.tokens.last().expect("token stream always ends with End")
        })
    }

    fn current_kind(&self) -> TokenKind {
        self.current().kind
    }

    fn current_text(&self) -> String {
        let token = self.current();
        if token.kind == TokenKind::End { "end of input".to_string() } else { token.text().to_string() }
    }

    fn peek_kind(&self, offset: usize) -> TokenKind {
        self.tokens.get(self.pos + offset).map_or(TokenKind::End, |t| t.kind)
    }

    fn peek_text(&self, offset: usize) -> &str {
        self.tokens.get(self.pos + offset).map_or("", Token::text)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current_kind() == kind
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        self.check(TokenKind::Identifier) && self.current().text() == keyword
    }

    fn advance(&mut self) -> Token<'a> {
        let token = self.current().clone();
        if token.kind == TokenKind::String && self.unterminated.contains(&token.offset) {
            self.errors.push(format!("unterminated string literal at offset {}", token.offset));
        }
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_keyword(&mut self, keyword: &str) -> bool {
        if self.check_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> bool {
        if self.match_kind(kind) {
            return true;
        }
        let found = self.current_text();
        self.error(format!("expected {what}, found '{found}'"));
        false
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Re-tokenize from a `source`-relative offset; used after raw-scanned
    /// constructor content invalidates the original token stream.
    fn resync_to(&mut self, offset: usize) {
        let offset = offset.min(self.source.len());
        let stream = tokenize(&self.source[offset..], self.base + offset);
        self.tokens = stream.tokens;
        self.unterminated = stream.unterminated;
        self.pos = 0;
    }

    /// Qualified name from the token stream: `local` or `prefix:local`.
    /// Returns `None` (with an error) when no identifier is present.
    fn parse_qname_text(&mut self) -> Option<String> {
        if !self.check(TokenKind::Identifier) {
            let found = self.current_text();
            self.error(format!("expected a name, found '{found}'"));
            return None;
        }
        let mut name = self.advance().text().to_string();
        if self.check(TokenKind::Colon) && self.peek_kind(1) == TokenKind::Identifier {
            self.advance();
            name.push(':');
            name.push_str(self.advance().text());
        }
        Some(name)
    }

    // ===== expression productions =====

    /// `Expr ::= SingleExpr ("," SingleExpr)*`
    pub(crate) fn parse_expr(&mut self) -> AstNode {
        let mut left = self.parse_single_expr();
        while self.match_kind(TokenKind::Comma) {
            let right = self.parse_single_expr();
            left = AstNode::binary(BinaryOperator::Comma, left, right);
        }
        left
    }

    pub(crate) fn parse_single_expr(&mut self) -> AstNode {
        if self.check_keyword("if") && self.peek_kind(1) == TokenKind::LParen {
            return self.parse_conditional();
        }
        if (self.check_keyword("for") || self.check_keyword("let"))
            && self.peek_kind(1) == TokenKind::Dollar
        {
            return self.parse_flwor();
        }
        if (self.check_keyword("some") || self.check_keyword("every"))
            && self.peek_kind(1) == TokenKind::Dollar
        {
            return self.parse_quantified();
        }
        self.parse_or_expr()
    }

    fn parse_conditional(&mut self) -> AstNode {
        self.advance(); // if
        self.expect(TokenKind::LParen, "'(' after if");
        let condition = self.parse_expr();
        self.expect(TokenKind::RParen, "')' closing the condition");
        if !self.match_keyword("then") {
            let found = self.current_text();
            self.error(format!("expected 'then', found '{found}'"));
        }
        let then_branch = self.parse_single_expr();
        if !self.match_keyword("else") {
            let found = self.current_text();
            self.error(format!("expected 'else', found '{found}'"));
        }
        let else_branch = self.parse_single_expr();
        AstNode::with_children(AstKind::Conditional, "if", vec![condition, then_branch, else_branch])
    }

    fn parse_binding_name(&mut self) -> String {
        if !self.expect(TokenKind::Dollar, "'$' before a variable name") {
            return String::new();
        }
        self.parse_qname_text().unwrap_or_default()
    }

    fn parse_flwor(&mut self) -> AstNode {
        let mut bindings: Vec<AstNode> = Vec::new();
        let mut has_for = false;
        let mut has_let = false;

        loop {
            if self.check_keyword("for") && self.peek_kind(1) == TokenKind::Dollar {
                self.advance();
                has_for = true;
                loop {
                    let name = self.parse_binding_name();
                    if !self.match_keyword("in") {
                        let found = self.current_text();
                        self.error(format!("expected 'in' in for binding, found '{found}'"));
                    }
                    let sequence = self.parse_single_expr();
                    bindings.push(AstNode::with_children(AstKind::ForBinding, name, vec![sequence]));
                    if !self.match_kind(TokenKind::Comma) {
                        break;
                    }
                }
            } else if self.check_keyword("let") && self.peek_kind(1) == TokenKind::Dollar {
                self.advance();
                has_let = true;
                loop {
                    let name = self.parse_binding_name();
                    if !self.expect(TokenKind::Assign, "':=' in let binding") {
                        break;
                    }
                    let value = self.parse_single_expr();
                    bindings.push(AstNode::with_children(AstKind::LetBinding, name, vec![value]));
                    if !self.match_kind(TokenKind::Comma) {
                        break;
                    }
                }
            } else {
                break;
            }
        }

        let mut clauses: Vec<AstNode> = bindings;
        let mut has_where = false;
        let mut has_order = false;

        if self.match_keyword("where") {
            has_where = true;
            let condition = self.parse_single_expr();
            clauses.push(AstNode::with_children(AstKind::WhereClause, "where", vec![condition]));
        }

        if self.check_keyword("stable") && self.peek_text(1) == "order" {
            self.advance();
        }
        if self.check_keyword("order") && self.peek_text(1) == "by" {
            self.advance();
            self.advance();
            has_order = true;
            let mut order_node = AstNode::new(AstKind::OrderByClause, "order by");
            loop {
                let key = self.parse_single_expr();
                let mut modifiers = OrderModifiers::default();
                if self.match_keyword("ascending") {
                    // default direction
                } else if self.match_keyword("descending") {
                    modifiers.descending = true;
                }
                if self.match_keyword("empty") {
                    if self.match_keyword("greatest") {
                        modifiers.empty_least = Some(false);
                    } else if self.match_keyword("least") {
                        modifiers.empty_least = Some(true);
                    } else {
                        let found = self.current_text();
                        self.error(format!("expected 'greatest' or 'least', found '{found}'"));
                    }
                }
                if self.match_keyword("collation") {
                    if self.check(TokenKind::String) {
                        let uri = self.advance().text().to_string();
                        if !XQueryProlog::is_known_collation(&uri) {
                            self.error(format!("unknown collation '{uri}'"));
                        }
                        modifiers.collation = Some(uri);
                    } else {
                        self.error("expected a collation URI string".to_string());
                    }
                }
                let mut spec = AstNode::with_children(AstKind::OrderSpec, "", vec![key]);
                spec.order = Some(modifiers);
                order_node.add_child(spec);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
            clauses.push(order_node);
        }

        if !self.match_keyword("return") {
            let found = self.current_text();
            self.error(format!("expected 'return', found '{found}'"));
        }
        let body = self.parse_single_expr();
        clauses.push(body);

        let kind = if has_where || has_order || (has_for && has_let) {
            AstKind::FlworExpression
        } else if has_let {
            AstKind::LetExpression
        } else {
            AstKind::ForExpression
        };
        AstNode::with_children(kind, "", clauses)
    }

    fn parse_quantified(&mut self) -> AstNode {
        let quantifier = self.advance().text().to_string(); // some | every
        let mut children: Vec<AstNode> = Vec::new();
        loop {
            let name = self.parse_binding_name();
            if !self.match_keyword("in") {
                let found = self.current_text();
                self.error(format!("expected 'in' in quantified binding, found '{found}'"));
            }
            let sequence = self.parse_single_expr();
            children.push(AstNode::with_children(AstKind::QuantifiedBinding, name, vec![sequence]));
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        if !self.match_keyword("satisfies") {
            let found = self.current_text();
            self.error(format!("expected 'satisfies', found '{found}'"));
        }
        children.push(self.parse_single_expr());
        AstNode::with_children(AstKind::QuantifiedExpression, quantifier, children)
    }

    fn parse_or_expr(&mut self) -> AstNode {
        let mut left = self.parse_and_expr();
        while self.match_kind(TokenKind::Or) {
            let right = self.parse_and_expr();
            left = AstNode::binary(BinaryOperator::Or, left, right);
        }
        left
    }

    fn parse_and_expr(&mut self) -> AstNode {
        let mut left = self.parse_equality_expr();
        while self.match_kind(TokenKind::And) {
            let right = self.parse_equality_expr();
            left = AstNode::binary(BinaryOperator::And, left, right);
        }
        left
    }

    fn parse_equality_expr(&mut self) -> AstNode {
        let mut left = self.parse_relational_expr();
        loop {
            let op = match self.current_kind() {
                TokenKind::Equals => BinaryOperator::Equals,
                TokenKind::NotEquals => BinaryOperator::NotEquals,
                TokenKind::ValueEq => BinaryOperator::ValueEq,
                TokenKind::ValueNe => BinaryOperator::ValueNe,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational_expr();
            left = AstNode::binary(op, left, right);
        }
        left
    }

    fn parse_relational_expr(&mut self) -> AstNode {
        let mut left = self.parse_range_expr();
        loop {
            let op = match self.current_kind() {
                TokenKind::LessThan => BinaryOperator::LessThan,
                TokenKind::LessEqual => BinaryOperator::LessEqual,
                TokenKind::GreaterThan => BinaryOperator::GreaterThan,
                TokenKind::GreaterEqual => BinaryOperator::GreaterEqual,
                TokenKind::ValueLt => BinaryOperator::ValueLt,
                TokenKind::ValueLe => BinaryOperator::ValueLe,
                TokenKind::ValueGt => BinaryOperator::ValueGt,
                TokenKind::ValueGe => BinaryOperator::ValueGe,
                _ => break,
            };
            self.advance();
            let right = self.parse_range_expr();
            left = AstNode::binary(op, left, right);
        }
        left
    }

    fn parse_range_expr(&mut self) -> AstNode {
        let left = self.parse_additive_expr();
        if self.check_keyword("to") {
            self.advance();
            let right = self.parse_additive_expr();
            return AstNode::binary(BinaryOperator::Range, left, right);
        }
        left
    }

    fn parse_additive_expr(&mut self) -> AstNode {
        let mut left = self.parse_multiplicative_expr();
        loop {
            let op = match self.current_kind() {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Subtract,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative_expr();
            left = AstNode::binary(op, left, right);
        }
        left
    }

    fn parse_multiplicative_expr(&mut self) -> AstNode {
        let mut left = self.parse_unary_expr();
        loop {
            let op = match self.current_kind() {
                TokenKind::Multiply => BinaryOperator::Multiply,
                TokenKind::Divide => BinaryOperator::Divide,
                TokenKind::Modulo => BinaryOperator::Modulo,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary_expr();
            left = AstNode::binary(op, left, right);
        }
        left
    }

    fn parse_unary_expr(&mut self) -> AstNode {
        if self.check(TokenKind::Minus) {
            self.advance();
            let operand = self.parse_unary_expr();
            return AstNode::with_children(AstKind::UnaryOp, "-", vec![operand]);
        }
        if self.check(TokenKind::Plus) {
            self.advance();
            let operand = self.parse_unary_expr();
            return AstNode::with_children(AstKind::UnaryOp, "+", vec![operand]);
        }
        self.parse_union_expr()
    }

    fn parse_union_expr(&mut self) -> AstNode {
        let mut left = self.parse_path_expr();
        loop {
            let op = if self.check(TokenKind::Pipe) || self.check_keyword("union") {
                BinaryOperator::Union
            } else if self.check_keyword("intersect") {
                BinaryOperator::Intersect
            } else if self.check_keyword("except") {
                BinaryOperator::Except
            } else {
                break;
            };
            self.advance();
            let right = self.parse_path_expr();
            if op == BinaryOperator::Union {
                // Chained unions flatten into a single node.
                if left.kind == AstKind::Union {
                    left.add_child(right);
                } else {
                    left = AstNode::with_children(AstKind::Union, "|", vec![left, right]);
                }
            } else {
                left = AstNode::binary(op, left, right);
            }
        }
        left
    }

    /// Primary expression minus the name-driven forms the path parser owns.
    fn parse_primary_expr(&mut self) -> AstNode {
        match self.current_kind() {
            TokenKind::Number => {
                let token = self.advance();
                AstNode::new(AstKind::Number, token.text())
            }
            TokenKind::String => {
                let token = self.advance();
                AstNode::new(AstKind::String, token.text())
            }
            TokenKind::Dollar => {
                self.advance();
                let name = self.parse_qname_text().unwrap_or_default();
                AstNode::new(AstKind::VariableReference, name)
            }
            TokenKind::LParen => {
                self.advance();
                if self.match_kind(TokenKind::RParen) {
                    return AstNode::new(AstKind::Expression, "");
                }
                let inner = self.parse_expr();
                self.expect(TokenKind::RParen, "')'");
                inner
            }
            TokenKind::Not => {
                // `not` is an ordinary function call.
                self.advance();
                let mut call = AstNode::new(AstKind::FunctionCall, "not");
                self.expect(TokenKind::LParen, "'(' after not");
                if !self.check(TokenKind::RParen) {
                    loop {
                        call.add_child(self.parse_single_expr());
                        if !self.match_kind(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen, "')' closing the argument list");
                call
            }
            TokenKind::LessThan => self.parse_direct_constructor(),
            TokenKind::Identifier => {
                if self.is_computed_constructor() {
                    return self.parse_computed_constructor();
                }
                if self.function_call_ahead() {
                    return self.parse_function_call();
                }
                let found = self.current_text();
                self.error(format!("unexpected token '{found}' in expression"));
                self.advance();
                AstNode::new(AstKind::Expression, "")
            }
            _ => {
                let found = self.current_text();
                self.error(format!("unexpected token '{found}' in expression"));
                if !self.check(TokenKind::End) {
                    self.advance();
                }
                AstNode::new(AstKind::Expression, "")
            }
        }
    }

    pub(crate) fn parse_function_call(&mut self) -> AstNode {
        let name = self.parse_qname_text().unwrap_or_default();
        let mut call = AstNode::new(AstKind::FunctionCall, name);
        self.expect(TokenKind::LParen, "'(' after function name");
        if !self.check(TokenKind::RParen) {
            loop {
                call.add_child(self.parse_single_expr());
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' closing the argument list");
        call
    }
}
