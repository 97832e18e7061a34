//! Typed declaration and expression trees.
//!
//! Produced by body checking and consumed (then rewritten) by the
//! monomorphizer. Every expression and pattern carries its type. After
//! checking, no `TypeVariable` remains in a typed tree; generic templates
//! keep `GenericParameter`s until they are instantiated.

use std::fmt;

use koral_common::Span;

use crate::ast::{BinaryOp, ComparisonOp};
use crate::def_id::{DefId, StructMember, UnionCase};
use crate::ty::Type;

#[derive(Clone, Debug, PartialEq)]
pub struct TypedExpr {
    pub kind: TypedExprKind,
    pub ty: Type,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypedParam {
    pub name: String,
    pub ty: Type,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypedArm {
    pub pattern: TypedPattern,
    pub body: TypedExpr,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypedExprKind {
    IntLiteral(i64),
    FloatLiteral(f64),
    BoolLiteral(bool),
    /// A local binding (`def` is `None`) or a global function/variable.
    Variable { name: String, def: Option<DefId> },
    Binary {
        op: BinaryOp,
        lhs: Box<TypedExpr>,
        rhs: Box<TypedExpr>,
    },
    Not(Box<TypedExpr>),
    If {
        cond: Box<TypedExpr>,
        then_branch: Box<TypedExpr>,
        else_branch: Option<Box<TypedExpr>>,
    },
    Block {
        statements: Vec<TypedStmt>,
        tail: Option<Box<TypedExpr>>,
    },
    Lambda {
        params: Vec<TypedParam>,
        body: Box<TypedExpr>,
    },
    Call {
        callee: Box<TypedExpr>,
        args: Vec<TypedExpr>,
    },
    /// A call of a generic function template, resolved during instantiation.
    GenericCall {
        template: DefId,
        type_args: Vec<Type>,
        args: Vec<TypedExpr>,
    },
    /// A call of a function the backend implements.
    IntrinsicCall {
        name: String,
        type_args: Vec<Type>,
        args: Vec<TypedExpr>,
    },
    /// Struct construction; the struct is the expression's type.
    Construct { args: Vec<TypedExpr> },
    UnionConstruct {
        case: String,
        tag: usize,
        args: Vec<TypedExpr>,
    },
    /// A method call whose target depends on type arguments: a trait
    /// method on a generic parameter or an extension method of a generic
    /// type. Concrete method calls are checked into plain `Call`s.
    MethodCall {
        receiver: Box<TypedExpr>,
        method: String,
        method_type_args: Vec<Type>,
        args: Vec<TypedExpr>,
    },
    FieldAccess {
        base: Box<TypedExpr>,
        field: String,
        index: usize,
    },
    Match {
        subject: Box<TypedExpr>,
        arms: Vec<TypedArm>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypedStmt {
    Let {
        name: String,
        mutable: bool,
        value: TypedExpr,
    },
    Expr(TypedExpr),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypedPattern {
    pub kind: TypedPatternKind,
    pub ty: Type,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypedPatternKind {
    Wildcard,
    Variable(String),
    Bool(bool),
    Int(i64),
    Case {
        name: String,
        tag: usize,
        args: Vec<TypedPattern>,
    },
    Or(Box<TypedPattern>, Box<TypedPattern>),
    And(Box<TypedPattern>, Box<TypedPattern>),
    Not(Box<TypedPattern>),
    Comparison { op: ComparisonOp, value: i64 },
}

impl TypedExpr {
    pub fn new(kind: TypedExprKind, ty: Type, span: Span) -> Self {
        TypedExpr { kind, ty, span }
    }

    pub fn int(value: i64, ty: Type, span: Span) -> Self {
        TypedExpr::new(TypedExprKind::IntLiteral(value), ty, span)
    }

    pub fn variable(name: impl Into<String>, def: Option<DefId>, ty: Type, span: Span) -> Self {
        TypedExpr::new(
            TypedExprKind::Variable {
                name: name.into(),
                def,
            },
            ty,
            span,
        )
    }

    pub fn binary(op: BinaryOp, lhs: TypedExpr, rhs: TypedExpr, ty: Type, span: Span) -> Self {
        TypedExpr::new(
            TypedExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ty,
            span,
        )
    }
}

// ── Globals ────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum TypedGlobal {
    Function {
        def: DefId,
        identifier: String,
        params: Vec<TypedParam>,
        returns: Type,
        body: TypedExpr,
    },
    Variable {
        def: DefId,
        identifier: String,
        ty: Type,
        mutable: bool,
        value: TypedExpr,
    },
    StructDeclaration {
        def: DefId,
        identifier: String,
        members: Vec<StructMember>,
    },
    UnionDeclaration {
        def: DefId,
        identifier: String,
        cases: Vec<UnionCase>,
    },
}

impl TypedGlobal {
    pub fn def(&self) -> DefId {
        match self {
            TypedGlobal::Function { def, .. }
            | TypedGlobal::Variable { def, .. }
            | TypedGlobal::StructDeclaration { def, .. }
            | TypedGlobal::UnionDeclaration { def, .. } => *def,
        }
    }

    pub fn identifier(&self) -> &str {
        match self {
            TypedGlobal::Function { identifier, .. }
            | TypedGlobal::Variable { identifier, .. }
            | TypedGlobal::StructDeclaration { identifier, .. }
            | TypedGlobal::UnionDeclaration { identifier, .. } => identifier,
        }
    }

    pub fn is_type_declaration(&self) -> bool {
        matches!(
            self,
            TypedGlobal::StructDeclaration { .. } | TypedGlobal::UnionDeclaration { .. }
        )
    }
}

/// One-line summary: `struct Pair_I_B { first: Int, second: Bool }`,
/// `fn main() -> Void`.
impl fmt::Display for TypedGlobal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedGlobal::Function {
                identifier,
                params,
                returns,
                ..
            } => {
                let params: Vec<String> = params
                    .iter()
                    .map(|p| format!("{}: {}", p.name, p.ty))
                    .collect();
                write!(f, "fn {}({}) -> {}", identifier, params.join(", "), returns)
            }
            TypedGlobal::Variable {
                identifier, ty, mutable, ..
            } => {
                let kw = if *mutable { "let mut" } else { "let" };
                write!(f, "{} {}: {}", kw, identifier, ty)
            }
            TypedGlobal::StructDeclaration {
                identifier,
                members,
                ..
            } => {
                let members: Vec<String> = members
                    .iter()
                    .map(|m| format!("{}: {}", m.name, m.ty))
                    .collect();
                write!(f, "struct {} {{ {} }}", identifier, members.join(", "))
            }
            TypedGlobal::UnionDeclaration {
                identifier, cases, ..
            } => {
                let cases: Vec<String> = cases
                    .iter()
                    .map(|c| {
                        if c.params.is_empty() {
                            c.name.clone()
                        } else {
                            let params: Vec<String> =
                                c.params.iter().map(|p| p.ty.to_string()).collect();
                            format!("{}({})", c.name, params.join(", "))
                        }
                    })
                    .collect();
                write!(f, "union {} {{ {} }}", identifier, cases.join(" | "))
            }
        }
    }
}
