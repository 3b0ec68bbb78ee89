//! Syntax tree produced by the parser.
//!
//! Every node that can be the subject of a diagnostic carries the
//! [`Location`] of its first token.

use std::fmt;
use std::sync::Arc;

use crate::token::Location;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub file: Arc<str>,
    pub decls: Vec<Decl>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Function(FunctionDef),
    Var(VarDef),
    Const(ConstDef),
    Class(ClassDef),
    Interface(InterfaceDef),
    Include(Include),
}

impl Decl {
    pub fn location(&self) -> &Location {
        match self {
            Decl::Function(f) => &f.location,
            Decl::Var(v) => &v.location,
            Decl::Const(c) => &c.location,
            Decl::Class(c) => &c.location,
            Decl::Interface(i) => &i.location,
            Decl::Include(i) => &i.location,
        }
    }
}

/// A syntactic type reference: `name<args...>` followed by `ptr_depth` stars.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    pub name: String,
    pub args: Vec<TypeRef>,
    pub ptr_depth: usize,
    pub location: Location,
}

impl TypeRef {
    pub fn named(name: impl Into<String>, location: Location) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            ptr_depth: 0,
            location,
        }
    }

    /// The same reference with one less level of indirection.
    pub fn without_pointer(&self) -> Self {
        Self {
            ptr_depth: 0,
            ..self.clone()
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.args.is_empty() {
            write!(f, "<")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{arg}")?;
            }
            write!(f, ">")?;
        }
        for _ in 0..self.ptr_depth {
            write!(f, "*")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
    pub location: Location,
}

/// Function definition, or a prototype when `body` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    /// `None` means `void`.
    pub ret: Option<TypeRef>,
    pub body: Option<Block>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDef {
    pub name: String,
    pub ty: TypeRef,
    pub init: Option<Expr>,
    pub location: Location,
}

/// `let NAME :: value;`
#[derive(Debug, Clone, PartialEq)]
pub struct ConstDef {
    pub name: String,
    pub value: Expr,
    pub location: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

/// One `@template:` element: a placeholder name and its optional interface.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateParam {
    pub name: String,
    pub interface: Option<String>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberDef {
    pub visibility: Visibility,
    pub var: VarDef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    pub visibility: Visibility,
    pub is_constructor: bool,
    pub def: FunctionDef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub template: Vec<TemplateParam>,
    pub members: Vec<MemberDef>,
    pub methods: Vec<MethodDef>,
    pub location: Location,
}

impl ClassDef {
    pub fn is_generic(&self) -> bool {
        !self.template.is_empty()
    }

    pub fn constructors(&self) -> impl Iterator<Item = &MethodDef> {
        self.methods.iter().filter(|m| m.is_constructor)
    }

    pub fn plain_methods(&self) -> impl Iterator<Item = &MethodDef> {
        self.methods.iter().filter(|m| !m.is_constructor)
    }
}

/// `interface Name<T> => { let proto(...): R; ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDef {
    pub name: String,
    pub type_param: String,
    pub prototypes: Vec<FunctionDef>,
    pub location: Location,
}

/// `@include a::b::c;`
#[derive(Debug, Clone, PartialEq)]
pub struct Include {
    pub path: Vec<String>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Var(VarDef),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        location: Location,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
        location: Location,
    },
    Return {
        value: Option<Expr>,
        location: Location,
    },
    Assign {
        target: Expr,
        value: Expr,
        location: Location,
    },
    Block(Block),
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinaryOp {
    /// Comparison and logical operators always produce `bool`.
    pub fn yields_bool(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
                | BinaryOp::And
                | BinaryOp::Or
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    Deref,
    AddrOf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub location: Location,
}

impl Expr {
    pub fn new(kind: ExprKind, location: Location) -> Self {
        Self { kind, location }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Char(u8),
    /// Unescaped bytes, without the trailing NUL.
    Str(Vec<u8>),
    Bool(bool),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `object.field`
    Member {
        object: Box<Expr>,
        field: String,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    /// `@as(T, e)`
    As {
        ty: TypeRef,
        expr: Box<Expr>,
    },
    /// `@new(T, e)`
    New {
        ty: TypeRef,
        expr: Box<Expr>,
    },
    /// `@sizeof(T)`
    SizeOf(TypeRef),
}
