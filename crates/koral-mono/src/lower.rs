//! Lowering of compiler-recognized methods into native operations.
//!
//! Primitive receivers never reach the backend as method calls:
//! `equals` becomes `==`, `compare` a pair of nested comparisons,
//! `add`/`sub`/`mul`/`div`/`rem` the matching arithmetic operator and
//! `to_bits` on floats a bit-cast intrinsic. Operators whose operands are
//! nominal go the other way and become calls of the conformance method.

use koral_common::Span;
use koral_typeck::ast::BinaryOp;
use koral_typeck::typed::{TypedExpr, TypedExprKind, TypedStmt};
use koral_typeck::Type;

use crate::error::{MonoError, MonoErrorKind};

fn missing(receiver: &Type, method: &str, span: Span) -> MonoError {
    MonoError::new(
        MonoErrorKind::MissingMethod {
            ty: receiver.to_string(),
            method: method.to_string(),
        },
        span,
    )
}

fn if_else(cond: TypedExpr, then_branch: TypedExpr, else_branch: TypedExpr, ty: Type, span: Span) -> TypedExpr {
    TypedExpr::new(
        TypedExprKind::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Some(Box::new(else_branch)),
        },
        ty,
        span,
    )
}

/// `expr` if reading it twice is harmless, otherwise a local bound to it
/// once in `statements`.
fn evaluate_once(expr: TypedExpr, temp: &str, statements: &mut Vec<TypedStmt>) -> TypedExpr {
    match expr.kind {
        TypedExprKind::Variable { .. }
        | TypedExprKind::IntLiteral(_)
        | TypedExprKind::FloatLiteral(_)
        | TypedExprKind::BoolLiteral(_) => expr,
        _ => {
            let read = TypedExpr::variable(temp, None, expr.ty.clone(), expr.span);
            statements.push(TypedStmt::Let {
                name: temp.to_string(),
                mutable: false,
                value: expr,
            });
            read
        }
    }
}

/// `a.compare(b)` as `if a < b { -1 } else if a > b { 1 } else { 0 }`,
/// with each operand evaluated once, left to right.
fn lower_compare(lhs: TypedExpr, rhs: TypedExpr, span: Span) -> TypedExpr {
    let mut statements = Vec::new();
    let lhs = evaluate_once(lhs, "__compare_lhs", &mut statements);
    let rhs = evaluate_once(rhs, "__compare_rhs", &mut statements);

    let less = TypedExpr::binary(BinaryOp::Lt, lhs.clone(), rhs.clone(), Type::Bool, span);
    let greater = TypedExpr::binary(BinaryOp::Gt, lhs, rhs, Type::Bool, span);
    let inner = if_else(
        greater,
        TypedExpr::int(1, Type::Int, span),
        TypedExpr::int(0, Type::Int, span),
        Type::Int,
        span,
    );
    let ordering = if_else(less, TypedExpr::int(-1, Type::Int, span), inner, Type::Int, span);
    if statements.is_empty() {
        return ordering;
    }
    TypedExpr::new(
        TypedExprKind::Block {
            statements,
            tail: Some(Box::new(ordering)),
        },
        Type::Int,
        span,
    )
}

/// Rewrite a method call on a primitive receiver in place.
pub fn primitive_method(
    receiver: TypedExpr,
    method: &str,
    args: Vec<TypedExpr>,
    ty: Type,
    span: Span,
) -> Result<TypedExpr, MonoError> {
    let receiver_ty = receiver.ty.clone();
    let mut args = args.into_iter();
    let binary = |op: BinaryOp, lhs: TypedExpr, rhs: Option<TypedExpr>, ty: Type| {
        rhs.map(|rhs| TypedExpr::binary(op, lhs, rhs, ty, span))
            .ok_or_else(|| missing(&receiver_ty, method, span))
    };

    let lowered = match method {
        "equals" => binary(BinaryOp::Eq, receiver, args.next(), Type::Bool)?,
        "compare" => {
            let rhs = args.next().ok_or_else(|| missing(&receiver_ty, method, span))?;
            lower_compare(receiver, rhs, span)
        }
        "add" => binary(BinaryOp::Add, receiver, args.next(), ty)?,
        "sub" => binary(BinaryOp::Sub, receiver, args.next(), ty)?,
        "mul" => binary(BinaryOp::Mul, receiver, args.next(), ty)?,
        "div" => binary(BinaryOp::Div, receiver, args.next(), ty)?,
        "rem" if !receiver_ty.is_float() => binary(BinaryOp::Rem, receiver, args.next(), ty)?,
        "to_bits" => {
            let name = match receiver_ty {
                Type::Float32 => "float32_bits",
                Type::Float64 => "float64_bits",
                _ => return Err(missing(&receiver_ty, method, span)),
            };
            TypedExpr::new(
                TypedExprKind::IntrinsicCall {
                    name: name.to_string(),
                    type_args: Vec::new(),
                    args: vec![receiver],
                },
                ty,
                span,
            )
        }
        _ => return Err(missing(&receiver_ty, method, span)),
    };
    tracing::trace!(method, receiver = %receiver_ty, "lowered primitive method");
    Ok(lowered)
}

/// The conformance method implementing `op` for nominal operands.
pub fn operator_method(op: BinaryOp) -> Option<&'static str> {
    match op {
        BinaryOp::Add => Some("add"),
        BinaryOp::Sub => Some("sub"),
        BinaryOp::Mul => Some("mul"),
        BinaryOp::Div => Some("div"),
        BinaryOp::Rem => Some("rem"),
        BinaryOp::Eq | BinaryOp::NotEq => Some("equals"),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => Some("compare"),
        BinaryOp::And | BinaryOp::Or => None,
    }
}

/// What the conformance method returns for `op`, given the operand type.
pub fn operator_method_returns(op: BinaryOp, operand: &Type) -> Type {
    if op.is_arithmetic() {
        operand.clone()
    } else if matches!(op, BinaryOp::Eq | BinaryOp::NotEq) {
        Type::Bool
    } else {
        Type::Int
    }
}

/// Turn the result of the conformance call back into the operator's value:
/// `<>` negates `equals`, orderings compare `compare`'s result with zero.
pub fn operator_result(op: BinaryOp, call: TypedExpr, span: Span) -> TypedExpr {
    match op {
        BinaryOp::NotEq => TypedExpr::new(TypedExprKind::Not(Box::new(call)), Type::Bool, span),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => TypedExpr::binary(
            op,
            call,
            TypedExpr::int(0, Type::Int, span),
            Type::Bool,
            span,
        ),
        _ => call,
    }
}
