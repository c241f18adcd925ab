//! Syntax tree produced by the parser and walked by the interpreter.

use std::rc::Rc;

/// A parsed script: its top-level statements.
#[derive(Debug, Clone)]
pub struct Program {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

/// Binding target of a declaration, parameter, or `catch` clause.
#[derive(Debug, Clone)]
pub enum Pattern {
    Ident(Rc<str>),
    Array {
        elements: Vec<Option<PatternElement>>,
        rest: Option<Box<Pattern>>,
    },
    Object {
        properties: Vec<(PropertyKey, PatternElement)>,
        rest: Option<Rc<str>>,
    },
}

/// One destructuring slot with its optional default.
#[derive(Debug, Clone)]
pub struct PatternElement {
    pub target: Pattern,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct Declarator {
    pub target: Pattern,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: Option<Rc<str>>,
    pub params: Vec<PatternElement>,
    pub rest: Option<Pattern>,
    pub body: FunctionBody,
    pub is_arrow: bool,
}

#[derive(Debug, Clone)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum ForInit {
    Decl(DeclKind, Vec<Declarator>),
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationKind {
    Of,
    In,
}

/// Left side of `for (... of/in ...)`.
#[derive(Debug, Clone)]
pub enum ForBinding {
    Decl(DeclKind, Pattern),
    Target(AssignTarget),
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    /// `None` for `default:`.
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Empty,
    Expr(Expr),
    Decl(DeclKind, Vec<Declarator>),
    Function(Rc<FunctionDef>),
    Return(Option<Expr>),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    Block(Vec<Stmt>),
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    For {
        init: Option<ForInit>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForEach {
        kind: IterationKind,
        binding: ForBinding,
        iterable: Expr,
        body: Box<Stmt>,
    },
    Break,
    Continue,
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        param: Option<Pattern>,
        handler: Option<Vec<Stmt>>,
        finalizer: Option<Vec<Stmt>>,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    BitNot,
    Typeof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone)]
pub enum PropertyKey {
    Static(Rc<str>),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum ObjectMember {
    Property(PropertyKey, Expr),
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub enum ArrayElement {
    Item(Expr),
    Spread(Expr),
    Hole,
}

#[derive(Debug, Clone)]
pub enum Argument {
    Item(Expr),
    Spread(Expr),
}

/// Something an assignment or update expression can write to.
#[derive(Debug, Clone)]
pub enum AssignTarget {
    Ident(Rc<str>),
    Member {
        object: Box<Expr>,
        property: PropertyKey,
    },
    Pattern(Pattern),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Number(f64),
    Str(Rc<str>),
    Bool(bool),
    Null,
    Ident(Rc<str>),
    This,
    Array(Vec<ArrayElement>),
    Object(Vec<ObjectMember>),
    Function(Rc<FunctionDef>),
    Unary(UnaryOp, Box<Expr>),
    Update {
        increment: bool,
        prefix: bool,
        target: AssignTarget,
    },
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Assign {
        op: Option<BinaryOp>,
        target: AssignTarget,
        value: Box<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: PropertyKey,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Argument>,
        optional: bool,
    },
    /// `new` applied to a built-in constructor.
    New {
        callee: Box<Expr>,
        args: Vec<Argument>,
    },
    Sequence(Vec<Expr>),
    /// Root of a member/call chain containing `?.`; a nullish optional
    /// base short-circuits the whole chain to `undefined`.
    OptionalChain(Box<Expr>),
}
