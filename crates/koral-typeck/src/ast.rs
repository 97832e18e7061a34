//! Untyped declaration and expression trees.
//!
//! This is the input of the semantic passes. Parsing happens elsewhere;
//! every global declaration arrives with a [`SourceRecord`] naming the file
//! and module it was declared in.

use koral_common::Span;

use crate::def_id::AccessModifier;
use crate::ty::Type;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    pub declarations: Vec<Declaration>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceRecord {
    pub file: String,
    pub module_path: Vec<String>,
}

impl SourceRecord {
    pub fn new(file: &str, module_path: &[&str]) -> Self {
        SourceRecord {
            file: file.to_string(),
            module_path: module_path.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Declaration {
    pub source: SourceRecord,
    pub node: GlobalNode,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GlobalNode {
    Struct(StructDecl),
    Union(UnionDecl),
    Opaque(OpaqueDecl),
    Trait(TraitDecl),
    Function(FunctionDecl),
    /// `given Type [Trait] { methods }`
    Given(GivenDecl),
    Let(GlobalLet),
}

/// `T Comparable Add` in a generic parameter list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeParam {
    pub name: String,
    pub bounds: Vec<String>,
}

impl TypeParam {
    pub fn new(name: &str) -> Self {
        TypeParam {
            name: name.to_string(),
            bounds: Vec::new(),
        }
    }

    pub fn bounded(name: &str, bounds: &[&str]) -> Self {
        TypeParam {
            name: name.to_string(),
            bounds: bounds.iter().map(|b| b.to_string()).collect(),
        }
    }
}

/// A type as written in source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeNode {
    /// `Int`, `T`, `vector.Vec2`, `[Int, Bool]Pair`.
    Named {
        module: Vec<String>,
        name: String,
        args: Vec<TypeNode>,
        span: Span,
    },
    Function {
        params: Vec<TypeNode>,
        returns: Box<TypeNode>,
        span: Span,
    },
    Reference(Box<TypeNode>),
    Pointer(Box<TypeNode>),
    WeakReference(Box<TypeNode>),
}

impl TypeNode {
    pub fn named(name: &str) -> Self {
        TypeNode::Named {
            module: Vec::new(),
            name: name.to_string(),
            args: Vec::new(),
            span: Span::DUMMY,
        }
    }

    pub fn applied(name: &str, args: Vec<TypeNode>) -> Self {
        TypeNode::Named {
            module: Vec::new(),
            name: name.to_string(),
            args,
            span: Span::DUMMY,
        }
    }

    pub fn qualified(module: &[&str], name: &str) -> Self {
        TypeNode::Named {
            module: module.iter().map(|s| s.to_string()).collect(),
            name: name.to_string(),
            args: Vec::new(),
            span: Span::DUMMY,
        }
    }

    pub fn function(params: Vec<TypeNode>, returns: TypeNode) -> Self {
        TypeNode::Function {
            params,
            returns: Box::new(returns),
            span: Span::DUMMY,
        }
    }

    pub fn reference(inner: TypeNode) -> Self {
        TypeNode::Reference(Box::new(inner))
    }

    pub fn pointer(inner: TypeNode) -> Self {
        TypeNode::Pointer(Box::new(inner))
    }

    pub fn span(&self) -> Span {
        match self {
            TypeNode::Named { span, .. } | TypeNode::Function { span, .. } => *span,
            TypeNode::Reference(inner) | TypeNode::Pointer(inner) | TypeNode::WeakReference(inner) => {
                inner.span()
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeNode,
    pub mutable: bool,
    pub access: AccessModifier,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructDecl {
    pub name: String,
    pub access: AccessModifier,
    pub type_params: Vec<TypeParam>,
    pub fields: Vec<FieldDecl>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CaseDecl {
    pub name: String,
    pub params: Vec<(String, TypeNode)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnionDecl {
    pub name: String,
    pub access: AccessModifier,
    pub type_params: Vec<TypeParam>,
    pub cases: Vec<CaseDecl>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OpaqueDecl {
    pub name: String,
    pub access: AccessModifier,
    pub span: Span,
}

/// A trait method signature. The receiver is implicit and has type `Self`.
#[derive(Clone, Debug, PartialEq)]
pub struct TraitMethodSig {
    pub name: String,
    pub params: Vec<Param>,
    pub returns: Option<TypeNode>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TraitDecl {
    pub name: String,
    pub access: AccessModifier,
    pub methods: Vec<TraitMethodSig>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeNode,
}

impl Param {
    pub fn new(name: &str, ty: TypeNode) -> Self {
        Param {
            name: name.to_string(),
            ty,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub access: AccessModifier,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<Param>,
    /// `None` means `Void`.
    pub returns: Option<TypeNode>,
    /// `None` declares an intrinsic implemented by the backend.
    pub body: Option<Expr>,
    pub span: Span,
}

/// An extension block. Every method receives the target as `self`.
#[derive(Clone, Debug, PartialEq)]
pub struct GivenDecl {
    pub type_params: Vec<TypeParam>,
    pub target: String,
    pub trait_name: Option<String>,
    pub methods: Vec<FunctionDecl>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GlobalLet {
    pub name: String,
    pub access: AccessModifier,
    pub mutable: bool,
    pub ty: Option<TypeNode>,
    pub value: Expr,
    pub span: Span,
}

// ── Expressions ────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    /// The builtin trait an operand must implement when it is not a primitive.
    pub fn required_trait(self) -> Option<&'static str> {
        match self {
            BinaryOp::Add => Some("Add"),
            BinaryOp::Sub => Some("Sub"),
            BinaryOp::Mul => Some("Mul"),
            BinaryOp::Div => Some("Div"),
            BinaryOp::Rem => Some("Rem"),
            BinaryOp::Eq | BinaryOp::NotEq => Some("Equatable"),
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => Some("Comparable"),
            BinaryOp::And | BinaryOp::Or => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LambdaParam {
    pub name: String,
    pub ty: Option<TypeNode>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    /// `suffix` pins the literal to a numeric type (`1i8`, `2.0f32`).
    IntLiteral { value: i64, suffix: Option<Type> },
    FloatLiteral { value: f64, suffix: Option<Type> },
    BoolLiteral(bool),
    Identifier(String),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },
    Block {
        statements: Vec<Stmt>,
        tail: Option<Box<Expr>>,
    },
    Lambda {
        params: Vec<LambdaParam>,
        returns: Option<TypeNode>,
        body: Box<Expr>,
    },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    /// `[Int]identity`, `[Int, Bool]Pair`
    GenericInstantiation { name: String, type_args: Vec<TypeNode> },
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        type_args: Vec<TypeNode>,
        args: Vec<Expr>,
    },
    FieldAccess { base: Box<Expr>, field: String },
    /// `Shape.Circle(1.0)`, or `.Circle(1.0)` when the union is known
    /// from the expected type.
    UnionCase {
        union: Option<String>,
        type_args: Vec<TypeNode>,
        case: String,
        args: Vec<Expr>,
    },
    Match { subject: Box<Expr>, arms: Vec<MatchArm> },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Let {
        name: String,
        mutable: bool,
        ty: Option<TypeNode>,
        value: Expr,
        span: Span,
    },
    Expr(Expr),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pattern {
    pub kind: PatternKind,
    pub span: Span,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub enum ComparisonOp {
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PatternKind {
    Wildcard,
    Variable(String),
    Bool(bool),
    Int(i64),
    /// `.Case(a, _)`
    Case { name: String, args: Vec<Pattern> },
    Or(Box<Pattern>, Box<Pattern>),
    And(Box<Pattern>, Box<Pattern>),
    Not(Box<Pattern>),
    /// `> 3`
    Comparison { op: ComparisonOp, value: i64 },
}

// ── Builders ───────────────────────────────────────────────────────────

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr { kind, span }
    }

    fn synthetic(kind: ExprKind) -> Self {
        Expr::new(kind, Span::DUMMY)
    }

    pub fn int(value: i64) -> Self {
        Expr::synthetic(ExprKind::IntLiteral { value, suffix: None })
    }

    pub fn float(value: f64) -> Self {
        Expr::synthetic(ExprKind::FloatLiteral { value, suffix: None })
    }

    pub fn bool(value: bool) -> Self {
        Expr::synthetic(ExprKind::BoolLiteral(value))
    }

    pub fn ident(name: &str) -> Self {
        Expr::synthetic(ExprKind::Identifier(name.to_string()))
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::synthetic(ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::synthetic(ExprKind::Call {
            callee: Box::new(callee),
            args,
        })
    }

    pub fn method(receiver: Expr, method: &str, args: Vec<Expr>) -> Self {
        Expr::synthetic(ExprKind::MethodCall {
            receiver: Box::new(receiver),
            method: method.to_string(),
            type_args: Vec::new(),
            args,
        })
    }

    pub fn field(base: Expr, field: &str) -> Self {
        Expr::synthetic(ExprKind::FieldAccess {
            base: Box::new(base),
            field: field.to_string(),
        })
    }

    pub fn block(statements: Vec<Stmt>, tail: Option<Expr>) -> Self {
        Expr::synthetic(ExprKind::Block {
            statements,
            tail: tail.map(Box::new),
        })
    }

    pub fn if_else(cond: Expr, then_branch: Expr, else_branch: Option<Expr>) -> Self {
        Expr::synthetic(ExprKind::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
        })
    }

    pub fn case(union: Option<&str>, case: &str, args: Vec<Expr>) -> Self {
        Expr::synthetic(ExprKind::UnionCase {
            union: union.map(str::to_string),
            type_args: Vec::new(),
            case: case.to_string(),
            args,
        })
    }

    pub fn match_on(subject: Expr, arms: Vec<(Pattern, Expr)>) -> Self {
        Expr::synthetic(ExprKind::Match {
            subject: Box::new(subject),
            arms: arms
                .into_iter()
                .map(|(pattern, body)| MatchArm { pattern, body })
                .collect(),
        })
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

impl Stmt {
    pub fn let_(name: &str, value: Expr) -> Self {
        Stmt::Let {
            name: name.to_string(),
            mutable: false,
            ty: None,
            value,
            span: Span::DUMMY,
        }
    }

    pub fn let_typed(name: &str, ty: TypeNode, value: Expr) -> Self {
        Stmt::Let {
            name: name.to_string(),
            mutable: false,
            ty: Some(ty),
            value,
            span: Span::DUMMY,
        }
    }
}

impl Pattern {
    pub fn new(kind: PatternKind, span: Span) -> Self {
        Pattern { kind, span }
    }

    pub fn wildcard() -> Self {
        Pattern::new(PatternKind::Wildcard, Span::DUMMY)
    }

    pub fn var(name: &str) -> Self {
        Pattern::new(PatternKind::Variable(name.to_string()), Span::DUMMY)
    }

    pub fn bool(value: bool) -> Self {
        Pattern::new(PatternKind::Bool(value), Span::DUMMY)
    }

    pub fn int(value: i64) -> Self {
        Pattern::new(PatternKind::Int(value), Span::DUMMY)
    }

    pub fn case(name: &str, args: Vec<Pattern>) -> Self {
        Pattern::new(
            PatternKind::Case {
                name: name.to_string(),
                args,
            },
            Span::DUMMY,
        )
    }

    pub fn or(lhs: Pattern, rhs: Pattern) -> Self {
        Pattern::new(PatternKind::Or(Box::new(lhs), Box::new(rhs)), Span::DUMMY)
    }
}

impl Declaration {
    pub fn new(source: SourceRecord, node: GlobalNode) -> Self {
        Declaration { source, node }
    }
}

impl FieldDecl {
    pub fn new(name: &str, ty: TypeNode) -> Self {
        FieldDecl {
            name: name.to_string(),
            ty,
            mutable: false,
            access: AccessModifier::Default,
        }
    }
}

impl StructDecl {
    pub fn new(name: &str, type_params: Vec<TypeParam>, fields: Vec<FieldDecl>) -> Self {
        StructDecl {
            name: name.to_string(),
            access: AccessModifier::Default,
            type_params,
            fields,
            span: Span::DUMMY,
        }
    }
}

impl UnionDecl {
    pub fn new(name: &str, type_params: Vec<TypeParam>, cases: Vec<CaseDecl>) -> Self {
        UnionDecl {
            name: name.to_string(),
            access: AccessModifier::Default,
            type_params,
            cases,
            span: Span::DUMMY,
        }
    }
}

impl CaseDecl {
    pub fn new(name: &str, params: Vec<(&str, TypeNode)>) -> Self {
        CaseDecl {
            name: name.to_string(),
            params: params
                .into_iter()
                .map(|(n, ty)| (n.to_string(), ty))
                .collect(),
        }
    }
}

impl FunctionDecl {
    pub fn new(name: &str, params: Vec<Param>, returns: Option<TypeNode>, body: Option<Expr>) -> Self {
        FunctionDecl {
            name: name.to_string(),
            access: AccessModifier::Default,
            type_params: Vec::new(),
            params,
            returns,
            body,
            span: Span::DUMMY,
        }
    }

    pub fn generic(mut self, type_params: Vec<TypeParam>) -> Self {
        self.type_params = type_params;
        self
    }

    pub fn with_access(mut self, access: AccessModifier) -> Self {
        self.access = access;
        self
    }
}

impl GlobalLet {
    pub fn new(name: &str, ty: Option<TypeNode>, value: Expr) -> Self {
        GlobalLet {
            name: name.to_string(),
            access: AccessModifier::Default,
            mutable: false,
            ty,
            value,
            span: Span::DUMMY,
        }
    }
}
