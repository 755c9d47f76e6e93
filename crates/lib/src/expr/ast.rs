use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
  Not,
  Neg,
  Plus,
  TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Pow,
  Mul,
  Div,
  Rem,
  Add,
  Sub,
  Lt,
  Le,
  Gt,
  Ge,
  Eq,
  NotEq,
  StrictEq,
  StrictNotEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
  And,
  Or,
  Nullish,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
  Undefined,
  Null,
  Bool(bool),
  Number(f64),
  String(Rc<str>),
}

/// An element of an array literal or call argument list.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
  Single(Expr),
  Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropKey {
  Static(String),
  Computed(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Property {
  KeyValue(PropKey, Expr),
  Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Member {
  Name(String),
  Computed(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
  Text(String),
  Code(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arrow {
  pub params: Vec<String>,
  pub body: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  Literal(Literal),
  Template(Vec<TemplatePart>),
  Ident(String),
  Array(Vec<Item>),
  Object(Vec<Property>),
  Member {
    object: Box<Expr>,
    member: Member,
    optional: bool,
  },
  Call {
    callee: Box<Expr>,
    args: Vec<Item>,
    optional: bool,
  },
  New {
    callee: Box<Expr>,
    args: Vec<Item>,
  },
  Unary {
    op: UnaryOp,
    operand: Box<Expr>,
  },
  Binary {
    op: BinaryOp,
    left: Box<Expr>,
    right: Box<Expr>,
  },
  Logical {
    op: LogicalOp,
    left: Box<Expr>,
    right: Box<Expr>,
  },
  Conditional {
    test: Box<Expr>,
    consequent: Box<Expr>,
    alternate: Box<Expr>,
  },
  Arrow(Rc<Arrow>),
  Assign {
    target: Box<Expr>,
    value: Box<Expr>,
  },
  Delete(Box<Expr>),
}

/// A parsed snippet: optional `let`/`const` bindings followed by one expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
  pub bindings: Vec<(String, Expr)>,
  pub body: Expr,
}
