//! Compiled-query tree. Immutable after compilation.

/// Binary operators, classified at parse time so the evaluator can match on
/// an enum instead of re-reading operator lexemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Or,
    And,
    Equals,
    NotEquals,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    ValueEq,
    ValueNe,
    ValueLt,
    ValueLe,
    ValueGt,
    ValueGe,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Union,
    Intersect,
    Except,
    Range,
    Comma,
    // Host-compatibility predicate shorthands
    ContentEquals,
    AttributeExists,
    AttributeEquals,
}

impl BinaryOperator {
    #[must_use]
    pub fn lexeme(&self) -> &'static str {
        match self {
            BinaryOperator::Or => "or",
            BinaryOperator::And => "and",
            BinaryOperator::Equals => "=",
            BinaryOperator::NotEquals => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::ValueEq => "eq",
            BinaryOperator::ValueNe => "ne",
            BinaryOperator::ValueLt => "lt",
            BinaryOperator::ValueLe => "le",
            BinaryOperator::ValueGt => "gt",
            BinaryOperator::ValueGe => "ge",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "div",
            BinaryOperator::Modulo => "mod",
            BinaryOperator::Union => "union",
            BinaryOperator::Intersect => "intersect",
            BinaryOperator::Except => "except",
            BinaryOperator::Range => "to",
            BinaryOperator::Comma => ",",
            BinaryOperator::ContentEquals => "content-equals",
            BinaryOperator::AttributeExists => "attribute-exists",
            BinaryOperator::AttributeEquals => "attribute-equals",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AstKind {
    // Path shape
    LocationPath,
    Step,
    Root,
    AxisSpecifier,
    NameTest,
    Wildcard,
    NodeTypeTest,
    ProcessingInstructionTest,
    Predicate,
    Path,
    Filter,

    // Expressions
    Expression,
    BinaryOp,
    UnaryOp,
    FunctionCall,
    Literal,
    Number,
    String,
    VariableReference,
    Union,
    Conditional,
    ForExpression,
    LetExpression,
    FlworExpression,
    QuantifiedExpression,
    ForBinding,
    LetBinding,
    QuantifiedBinding,
    WhereClause,
    OrderByClause,
    OrderSpec,

    // Constructors
    DirectElementConstructor,
    ComputedElementConstructor,
    ComputedAttributeConstructor,
    TextConstructor,
    CommentConstructor,
    PiConstructor,
    DocumentConstructor,
    ConstructorContent,
}

/// One part of an attribute value template: literal text or an enclosed
/// expression evaluated at constructor time.
#[derive(Debug, Clone)]
pub enum AvtPart {
    Literal(String),
    Expr(AstNode),
}

#[derive(Debug, Clone)]
pub struct ConstructorAttribute {
    pub prefix: String,
    pub local: String,
    pub is_namespace_decl: bool,
    pub value: Vec<AvtPart>,
}

/// Side structure for constructor nodes: parsed attributes and, for computed
/// constructors, whether the first child is a name expression.
#[derive(Debug, Clone, Default)]
pub struct ConstructorInfo {
    pub attributes: Vec<ConstructorAttribute>,
    pub has_name_expression: bool,
}

/// Sort modifiers attached to an `OrderSpec` node.
#[derive(Debug, Clone, Default)]
pub struct OrderModifiers {
    pub descending: bool,
    /// `None` defers to the prolog's empty-order default.
    pub empty_least: Option<bool>,
    pub collation: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AstNode {
    pub kind: AstKind,
    /// Name literal, operator lexeme, function name or literal text,
    /// depending on `kind`.
    pub value: String,
    pub op: Option<BinaryOperator>,
    pub children: Vec<AstNode>,
    pub constructor: Option<Box<ConstructorInfo>>,
    pub order: Option<OrderModifiers>,
}

impl AstNode {
    #[must_use]
    pub fn new(kind: AstKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            op: None,
            children: Vec::new(),
            constructor: None,
            order: None,
        }
    }

    #[must_use]
    pub fn with_children(kind: AstKind, value: impl Into<String>, children: Vec<AstNode>) -> Self {
        let mut node = Self::new(kind, value);
        node.children = children;
        node
    }

    #[must_use]
    pub fn binary(op: BinaryOperator, left: AstNode, right: AstNode) -> Self {
        let mut node = Self::new(AstKind::BinaryOp, op.lexeme());
        node.op = Some(op);
        node.children = vec![left, right];
        node
    }

    pub fn add_child(&mut self, child: AstNode) {
        self.children.push(child);
    }

    /// Structural signature used to compare AST shapes in diagnostics and
    /// determinism tests.
    #[must_use]
    pub fn signature(&self) -> String {
        let mut out = String::new();
        self.append_signature(&mut out);
        out
    }

    fn append_signature(&self, out: &mut String) {
        out.push_str(&format!("{:?}", self.kind));
        if !self.value.is_empty() {
            out.push('=');
            out.push_str(&self.value);
        }
        if self.children.is_empty() {
            return;
        }
        out.push('(');
        for (index, child) in self.children.iter().enumerate() {
            if index > 0 {
                out.push(',');
            }
            child.append_signature(out);
        }
        out.push(')');
    }
}
