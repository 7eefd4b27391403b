//! Location paths, steps, node tests and predicates.

use super::Parser;
use crate::ast::{AstKind, AstNode, BinaryOperator};
use crate::tokenizer::TokenKind;

const AXIS_NAMES: &[&str] = &[
    "child",
    "descendant",
    "parent",
    "ancestor",
    "following-sibling",
    "preceding-sibling",
    "following",
    "preceding",
    "attribute",
    "namespace",
    "self",
    "descendant-or-self",
    "ancestor-or-self",
];

const NODE_TYPE_NAMES: &[&str] = &["node", "text", "comment", "processing-instruction"];

fn synthetic_descendant_step() -> AstNode {
    AstNode::with_children(
        AstKind::Step,
        "",
        vec![
            AstNode::new(AstKind::AxisSpecifier, "descendant-or-self"),
            AstNode::new(AstKind::NodeTypeTest, "node"),
        ],
    )
}

fn explicit_step(axis: &str, test: AstNode) -> AstNode {
    AstNode::with_children(
        AstKind::Step,
        "",
        vec![AstNode::new(AstKind::AxisSpecifier, axis), test],
    )
}

impl<'a> Parser<'a> {
    /// True when the current token can begin a location step.
    fn starts_step(&self) -> bool {
        matches!(
            self.current_kind(),
            TokenKind::Dot
                | TokenKind::DoubleDot
                | TokenKind::At
                | TokenKind::Wildcard
                | TokenKind::Identifier
        )
    }

    /// Identifier followed by an argument list, allowing a `prefix:` part.
    pub(super) fn function_call_ahead(&self) -> bool {
        if !self.check(TokenKind::Identifier) {
            return false;
        }
        if self.peek_kind(1) == TokenKind::LParen {
            return true;
        }
        self.peek_kind(1) == TokenKind::Colon
            && self.peek_kind(2) == TokenKind::Identifier
            && self.peek_kind(3) == TokenKind::LParen
    }

    pub(super) fn is_computed_constructor(&self) -> bool {
        if !self.check(TokenKind::Identifier) {
            return false;
        }
        let keyword = self.current().text();
        let named = matches!(keyword, "element" | "attribute" | "processing-instruction");
        let unnamed = matches!(keyword, "text" | "comment" | "document") || named;
        if !unnamed {
            return false;
        }
        if self.peek_kind(1) == TokenKind::LBrace {
            return true;
        }
        if !named {
            return false;
        }
        // `element qname {` / `attribute p:local {`
        if self.peek_kind(1) == TokenKind::Identifier {
            if self.peek_kind(2) == TokenKind::LBrace {
                return true;
            }
            return self.peek_kind(2) == TokenKind::Colon
                && self.peek_kind(3) == TokenKind::Identifier
                && self.peek_kind(4) == TokenKind::LBrace;
        }
        false
    }

    /// `PathExpr` chooses between a location path and a filter expression
    /// that may be continued with further steps.
    pub(crate) fn parse_path_expr(&mut self) -> AstNode {
        match self.current_kind() {
            TokenKind::Slash | TokenKind::DoubleSlash => self.parse_location_path(),
            TokenKind::Dot | TokenKind::DoubleDot | TokenKind::At | TokenKind::Wildcard => {
                self.parse_location_path()
            }
            TokenKind::Identifier => {
                if self.is_computed_constructor() {
                    return self.parse_filter_chain();
                }
                if self.peek_kind(1) == TokenKind::AxisSeparator {
                    return self.parse_location_path();
                }
                if self.function_call_ahead() {
                    if NODE_TYPE_NAMES.contains(&self.current().text()) {
                        return self.parse_location_path();
                    }
                    return self.parse_filter_chain();
                }
                self.parse_location_path()
            }
            _ => self.parse_filter_chain(),
        }
    }

    fn parse_location_path(&mut self) -> AstNode {
        let mut path = AstNode::new(AstKind::LocationPath, "");
        if self.match_kind(TokenKind::Slash) {
            path.add_child(AstNode::new(AstKind::Root, "/"));
            if !self.starts_step() {
                return path;
            }
        } else if self.match_kind(TokenKind::DoubleSlash) {
            path.add_child(AstNode::new(AstKind::Root, "//"));
            path.add_child(synthetic_descendant_step());
            if !self.starts_step() {
                let found = self.current_text();
                self.error(format!("expected a step after '//', found '{found}'"));
                return path;
            }
        }

        loop {
            path.add_child(self.parse_step());
            if self.match_kind(TokenKind::Slash) {
                if !self.starts_step() {
                    let found = self.current_text();
                    self.error(format!("expected a step after '/', found '{found}'"));
                    break;
                }
            } else if self.match_kind(TokenKind::DoubleSlash) {
                path.add_child(synthetic_descendant_step());
                if !self.starts_step() {
                    let found = self.current_text();
                    self.error(format!("expected a step after '//', found '{found}'"));
                    break;
                }
            } else {
                break;
            }
        }
        path
    }

    pub(super) fn parse_step(&mut self) -> AstNode {
        let mut step = match self.current_kind() {
            TokenKind::Dot => {
                self.advance();
                explicit_step("self", AstNode::new(AstKind::NodeTypeTest, "node"))
            }
            TokenKind::DoubleDot => {
                self.advance();
                explicit_step("parent", AstNode::new(AstKind::NodeTypeTest, "node"))
            }
            TokenKind::At => {
                self.advance();
                let test = self.parse_node_test();
                explicit_step("attribute", test)
            }
            TokenKind::Identifier if self.peek_kind(1) == TokenKind::AxisSeparator => {
                let axis = self.advance().text().to_string();
                self.advance(); // ::
                if !AXIS_NAMES.contains(&axis.as_str()) {
                    self.error(format!("unknown axis '{axis}'"));
                }
                let test = self.parse_node_test();
                explicit_step(&axis, test)
            }
            TokenKind::Identifier
                if self.function_call_ahead() && !NODE_TYPE_NAMES.contains(&self.current().text()) =>
            {
                // Step-position function call, e.g. `title/string()`.
                let call = self.parse_function_call();
                AstNode::with_children(AstKind::Step, "", vec![call])
            }
            _ => {
                let test = self.parse_node_test();
                explicit_step("child", test)
            }
        };
        while self.check(TokenKind::LBracket) {
            let predicate = self.parse_predicate();
            step.add_child(predicate);
        }
        step
    }

    fn parse_node_test(&mut self) -> AstNode {
        match self.current_kind() {
            TokenKind::Wildcard => {
                self.advance();
                if self.check(TokenKind::Colon) && self.peek_kind(1) == TokenKind::Identifier {
                    self.advance();
                    let local = self.advance().text().to_string();
                    return AstNode::new(AstKind::NameTest, format!("*:{local}"));
                }
                AstNode::new(AstKind::Wildcard, "*")
            }
            TokenKind::Identifier => {
                let name = self.advance().text().to_string();
                if self.check(TokenKind::LParen) && NODE_TYPE_NAMES.contains(&name.as_str()) {
                    self.advance();
                    if name == "processing-instruction" {
                        let target = if self.check(TokenKind::String) {
                            self.advance().text().to_string()
                        } else {
                            String::new()
                        };
                        self.expect(TokenKind::RParen, "')' closing processing-instruction()");
                        return AstNode::new(AstKind::ProcessingInstructionTest, target);
                    }
                    self.expect(TokenKind::RParen, "')' closing the node type test");
                    return AstNode::new(AstKind::NodeTypeTest, name);
                }
                if self.check(TokenKind::Colon) {
                    match self.peek_kind(1) {
                        TokenKind::Identifier => {
                            self.advance();
                            let local = self.advance().text().to_string();
                            return AstNode::new(AstKind::NameTest, format!("{name}:{local}"));
                        }
                        TokenKind::Wildcard => {
                            self.advance();
                            self.advance();
                            return AstNode::new(AstKind::NameTest, format!("{name}:*"));
                        }
                        _ => {}
                    }
                }
                AstNode::new(AstKind::NameTest, name)
            }
            _ => {
                let found = self.current_text();
                self.error(format!("expected a node test, found '{found}'"));
                if !self.check(TokenKind::End) {
                    self.advance();
                }
                AstNode::new(AstKind::Wildcard, "*")
            }
        }
    }

    pub(super) fn parse_predicate(&mut self) -> AstNode {
        self.expect(TokenKind::LBracket, "'['");

        // `[=literal]` content-equals shorthand.
        if self.check(TokenKind::Equals)
            && matches!(self.peek_kind(1), TokenKind::String | TokenKind::Number)
            && self.peek_kind(2) == TokenKind::RBracket
        {
            self.advance();
            let literal = self.advance().text().to_string();
            self.advance(); // ]
            let comparison = AstNode::with_children(
                AstKind::BinaryOp,
                BinaryOperator::ContentEquals.lexeme(),
                vec![AstNode::new(AstKind::String, literal)],
            );
            return self.finish_shorthand(comparison, BinaryOperator::ContentEquals);
        }

        // `[@name]` / `[@name=literal]` attribute shorthands.
        if self.check(TokenKind::At) {
            if let Some(node) = self.try_attribute_shorthand() {
                return node;
            }
        }

        let expr = self.parse_expr();
        self.expect(TokenKind::RBracket, "']' closing the predicate");
        AstNode::with_children(AstKind::Predicate, "", vec![expr])
    }

    fn finish_shorthand(&mut self, mut comparison: AstNode, op: BinaryOperator) -> AstNode {
        comparison.op = Some(op);
        AstNode::with_children(AstKind::Predicate, "", vec![comparison])
    }

    /// Attempts the fast attribute predicate forms. Restores the cursor and
    /// returns `None` when the content is a general expression.
    fn try_attribute_shorthand(&mut self) -> Option<AstNode> {
        let saved = self.pos;
        self.advance(); // @
        if !self.check(TokenKind::Identifier) {
            self.pos = saved;
            return None;
        }
        let mut name = self.advance().text().to_string();
        if self.check(TokenKind::Colon) && self.peek_kind(1) == TokenKind::Identifier {
            self.advance();
            name.push(':');
            name.push_str(self.advance().text());
        }
        if self.check(TokenKind::RBracket) {
            self.advance();
            let comparison = AstNode::with_children(
                AstKind::BinaryOp,
                BinaryOperator::AttributeExists.lexeme(),
                vec![AstNode::new(AstKind::NameTest, name)],
            );
            return Some(self.finish_shorthand(comparison, BinaryOperator::AttributeExists));
        }
        if self.check(TokenKind::Equals)
            && matches!(self.peek_kind(1), TokenKind::String | TokenKind::Number)
            && self.peek_kind(2) == TokenKind::RBracket
        {
            self.advance();
            let literal = self.advance().text().to_string();
            self.advance(); // ]
            let comparison = AstNode::with_children(
                AstKind::BinaryOp,
                BinaryOperator::AttributeEquals.lexeme(),
                vec![AstNode::new(AstKind::NameTest, name), AstNode::new(AstKind::String, literal)],
            );
            return Some(self.finish_shorthand(comparison, BinaryOperator::AttributeEquals));
        }
        self.pos = saved;
        None
    }

    /// `FilterExpr (("/" | "//") RelativePath)?`
    pub(super) fn parse_filter_chain(&mut self) -> AstNode {
        let mut expr = self.parse_primary_expr();

        if self.check(TokenKind::LBracket) {
            let mut filter = AstNode::with_children(AstKind::Filter, "", vec![expr]);
            while self.check(TokenKind::LBracket) {
                let predicate = self.parse_predicate();
                filter.add_child(predicate);
            }
            expr = filter;
        }

        if !self.check(TokenKind::Slash) && !self.check(TokenKind::DoubleSlash) {
            return expr;
        }

        let mut path = AstNode::with_children(AstKind::Path, "", vec![expr]);
        loop {
            if self.match_kind(TokenKind::Slash) {
                // fallthrough to step
            } else if self.match_kind(TokenKind::DoubleSlash) {
                path.add_child(synthetic_descendant_step());
            } else {
                break;
            }
            if !self.starts_step() {
                let found = self.current_text();
                self.error(format!("expected a step, found '{found}'"));
                break;
            }
            path.add_child(self.parse_step());
        }
        path
    }
}
