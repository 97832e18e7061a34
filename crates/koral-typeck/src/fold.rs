//! Structural rewriting of typed trees.
//!
//! Every rewrite of a typed tree (applying a solved substitution after
//! inference, substituting concrete type arguments during
//! monomorphization, the final closure check) is a [`TypedFolder`]. A
//! folder overrides the hooks it cares about; the `walk_*` functions
//! rebuild every other node, folding children first and the node's own
//! type afterwards.

use crate::typed::{
    TypedArm, TypedExpr, TypedExprKind, TypedGlobal, TypedParam, TypedPattern,
    TypedPatternKind, TypedStmt,
};
use crate::ty::Type;

pub trait TypedFolder {
    type Error;

    fn fold_type(&mut self, ty: Type) -> Result<Type, Self::Error> {
        Ok(ty)
    }

    fn fold_expr(&mut self, expr: TypedExpr) -> Result<TypedExpr, Self::Error> {
        walk_expr(self, expr)
    }

    fn fold_stmt(&mut self, stmt: TypedStmt) -> Result<TypedStmt, Self::Error> {
        walk_stmt(self, stmt)
    }

    fn fold_pattern(&mut self, pattern: TypedPattern) -> Result<TypedPattern, Self::Error> {
        walk_pattern(self, pattern)
    }

    fn fold_global(&mut self, global: TypedGlobal) -> Result<TypedGlobal, Self::Error> {
        walk_global(self, global)
    }
}

fn fold_boxed<F: TypedFolder + ?Sized>(
    folder: &mut F,
    expr: Box<TypedExpr>,
) -> Result<Box<TypedExpr>, F::Error> {
    Ok(Box::new(folder.fold_expr(*expr)?))
}

fn fold_all<F: TypedFolder + ?Sized>(
    folder: &mut F,
    exprs: Vec<TypedExpr>,
) -> Result<Vec<TypedExpr>, F::Error> {
    exprs.into_iter().map(|e| folder.fold_expr(e)).collect()
}

fn fold_types<F: TypedFolder + ?Sized>(
    folder: &mut F,
    types: Vec<Type>,
) -> Result<Vec<Type>, F::Error> {
    types.into_iter().map(|t| folder.fold_type(t)).collect()
}

fn fold_params<F: TypedFolder + ?Sized>(
    folder: &mut F,
    params: Vec<TypedParam>,
) -> Result<Vec<TypedParam>, F::Error> {
    params
        .into_iter()
        .map(|p| {
            Ok(TypedParam {
                name: p.name,
                ty: folder.fold_type(p.ty)?,
            })
        })
        .collect()
}

pub fn walk_expr<F: TypedFolder + ?Sized>(
    folder: &mut F,
    expr: TypedExpr,
) -> Result<TypedExpr, F::Error> {
    let TypedExpr { kind, ty, span } = expr;
    let kind = match kind {
        kind @ (TypedExprKind::IntLiteral(_)
        | TypedExprKind::FloatLiteral(_)
        | TypedExprKind::BoolLiteral(_)
        | TypedExprKind::Variable { .. }) => kind,
        TypedExprKind::Binary { op, lhs, rhs } => TypedExprKind::Binary {
            op,
            lhs: fold_boxed(folder, lhs)?,
            rhs: fold_boxed(folder, rhs)?,
        },
        TypedExprKind::Not(inner) => TypedExprKind::Not(fold_boxed(folder, inner)?),
        TypedExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => TypedExprKind::If {
            cond: fold_boxed(folder, cond)?,
            then_branch: fold_boxed(folder, then_branch)?,
            else_branch: else_branch.map(|e| fold_boxed(folder, e)).transpose()?,
        },
        TypedExprKind::Block { statements, tail } => TypedExprKind::Block {
            statements: statements
                .into_iter()
                .map(|s| folder.fold_stmt(s))
                .collect::<Result<_, _>>()?,
            tail: tail.map(|e| fold_boxed(folder, e)).transpose()?,
        },
        TypedExprKind::Lambda { params, body } => TypedExprKind::Lambda {
            params: fold_params(folder, params)?,
            body: fold_boxed(folder, body)?,
        },
        TypedExprKind::Call { callee, args } => TypedExprKind::Call {
            callee: fold_boxed(folder, callee)?,
            args: fold_all(folder, args)?,
        },
        TypedExprKind::GenericCall {
            template,
            type_args,
            args,
        } => TypedExprKind::GenericCall {
            template,
            type_args: fold_types(folder, type_args)?,
            args: fold_all(folder, args)?,
        },
        TypedExprKind::IntrinsicCall {
            name,
            type_args,
            args,
        } => TypedExprKind::IntrinsicCall {
            name,
            type_args: fold_types(folder, type_args)?,
            args: fold_all(folder, args)?,
        },
        TypedExprKind::Construct { args } => TypedExprKind::Construct {
            args: fold_all(folder, args)?,
        },
        TypedExprKind::UnionConstruct { case, tag, args } => TypedExprKind::UnionConstruct {
            case,
            tag,
            args: fold_all(folder, args)?,
        },
        TypedExprKind::MethodCall {
            receiver,
            method,
            method_type_args,
            args,
        } => TypedExprKind::MethodCall {
            receiver: fold_boxed(folder, receiver)?,
            method,
            method_type_args: fold_types(folder, method_type_args)?,
            args: fold_all(folder, args)?,
        },
        TypedExprKind::FieldAccess { base, field, index } => TypedExprKind::FieldAccess {
            base: fold_boxed(folder, base)?,
            field,
            index,
        },
        TypedExprKind::Match { subject, arms } => TypedExprKind::Match {
            subject: fold_boxed(folder, subject)?,
            arms: arms
                .into_iter()
                .map(|arm| {
                    Ok(TypedArm {
                        pattern: folder.fold_pattern(arm.pattern)?,
                        body: folder.fold_expr(arm.body)?,
                    })
                })
                .collect::<Result<_, _>>()?,
        },
    };
    Ok(TypedExpr {
        kind,
        ty: folder.fold_type(ty)?,
        span,
    })
}

pub fn walk_stmt<F: TypedFolder + ?Sized>(
    folder: &mut F,
    stmt: TypedStmt,
) -> Result<TypedStmt, F::Error> {
    Ok(match stmt {
        TypedStmt::Let {
            name,
            mutable,
            value,
        } => TypedStmt::Let {
            name,
            mutable,
            value: folder.fold_expr(value)?,
        },
        TypedStmt::Expr(expr) => TypedStmt::Expr(folder.fold_expr(expr)?),
    })
}

pub fn walk_pattern<F: TypedFolder + ?Sized>(
    folder: &mut F,
    pattern: TypedPattern,
) -> Result<TypedPattern, F::Error> {
    let TypedPattern { kind, ty, span } = pattern;
    let kind = match kind {
        TypedPatternKind::Case { name, tag, args } => TypedPatternKind::Case {
            name,
            tag,
            args: args
                .into_iter()
                .map(|p| folder.fold_pattern(p))
                .collect::<Result<_, _>>()?,
        },
        TypedPatternKind::Or(lhs, rhs) => TypedPatternKind::Or(
            Box::new(folder.fold_pattern(*lhs)?),
            Box::new(folder.fold_pattern(*rhs)?),
        ),
        TypedPatternKind::And(lhs, rhs) => TypedPatternKind::And(
            Box::new(folder.fold_pattern(*lhs)?),
            Box::new(folder.fold_pattern(*rhs)?),
        ),
        TypedPatternKind::Not(inner) => {
            TypedPatternKind::Not(Box::new(folder.fold_pattern(*inner)?))
        }
        leaf => leaf,
    };
    Ok(TypedPattern {
        kind,
        ty: folder.fold_type(ty)?,
        span,
    })
}

pub fn walk_global<F: TypedFolder + ?Sized>(
    folder: &mut F,
    global: TypedGlobal,
) -> Result<TypedGlobal, F::Error> {
    Ok(match global {
        TypedGlobal::Function {
            def,
            identifier,
            params,
            returns,
            body,
        } => TypedGlobal::Function {
            def,
            identifier,
            params: fold_params(folder, params)?,
            returns: folder.fold_type(returns)?,
            body: folder.fold_expr(body)?,
        },
        TypedGlobal::Variable {
            def,
            identifier,
            ty,
            mutable,
            value,
        } => TypedGlobal::Variable {
            def,
            identifier,
            ty: folder.fold_type(ty)?,
            mutable,
            value: folder.fold_expr(value)?,
        },
        TypedGlobal::StructDeclaration {
            def,
            identifier,
            mut members,
        } => {
            for member in &mut members {
                let ty = std::mem::replace(&mut member.ty, Type::Void);
                member.ty = folder.fold_type(ty)?;
            }
            TypedGlobal::StructDeclaration {
                def,
                identifier,
                members,
            }
        }
        TypedGlobal::UnionDeclaration {
            def,
            identifier,
            mut cases,
        } => {
            for case in &mut cases {
                for param in &mut case.params {
                    let ty = std::mem::replace(&mut param.ty, Type::Void);
                    param.ty = folder.fold_type(ty)?;
                }
            }
            TypedGlobal::UnionDeclaration {
                def,
                identifier,
                cases,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;
    use koral_common::Span;

    /// Replaces every `T` with `Int` and counts visited types.
    struct ReplaceT {
        visited: usize,
    }

    impl TypedFolder for ReplaceT {
        type Error = String;

        fn fold_type(&mut self, ty: Type) -> Result<Type, String> {
            self.visited += 1;
            let mut map = rustc_hash::FxHashMap::default();
            map.insert("T".to_string(), Type::Int);
            Ok(ty.substitute(&map))
        }
    }

    struct RejectParams;

    impl TypedFolder for RejectParams {
        type Error = String;

        fn fold_type(&mut self, ty: Type) -> Result<Type, String> {
            if ty.any(&|t| matches!(t, Type::GenericParameter(_))) {
                Err(format!("unresolved `{}`", ty))
            } else {
                Ok(ty)
            }
        }
    }

    fn sample() -> TypedExpr {
        let x = TypedExpr::variable("x", None, Type::param("T"), Span::DUMMY);
        let y = TypedExpr::variable("y", None, Type::param("T"), Span::DUMMY);
        TypedExpr::new(
            TypedExprKind::Block {
                statements: vec![TypedStmt::Let {
                    name: "z".into(),
                    mutable: false,
                    value: TypedExpr::binary(BinaryOp::Add, x, y, Type::param("T"), Span::DUMMY),
                }],
                tail: Some(Box::new(TypedExpr::variable(
                    "z",
                    None,
                    Type::param("T"),
                    Span::DUMMY,
                ))),
            },
            Type::param("T"),
            Span::DUMMY,
        )
    }

    #[test]
    fn folder_reaches_every_type() {
        let mut folder = ReplaceT { visited: 0 };
        let folded = folder.fold_expr(sample()).unwrap();
        assert_eq!(folded.ty, Type::Int);
        assert_eq!(folder.visited, 5);
        let TypedExprKind::Block { statements, .. } = folded.kind else {
            panic!("expected block");
        };
        let TypedStmt::Let { value, .. } = &statements[0] else {
            panic!("expected let");
        };
        assert_eq!(value.ty, Type::Int);
    }

    #[test]
    fn folder_errors_propagate() {
        let err = RejectParams.fold_expr(sample()).unwrap_err();
        assert_eq!(err, "unresolved `T`");
    }

    #[test]
    fn folds_struct_members() {
        use crate::def_id::{AccessModifier, DefId, StructMember};
        let global = TypedGlobal::StructDeclaration {
            def: DefId(0),
            identifier: "Box_I".into(),
            members: vec![StructMember {
                name: "value".into(),
                ty: Type::param("T"),
                mutable: false,
                access: AccessModifier::Default,
            }],
        };
        let folded = ReplaceT { visited: 0 }.fold_global(global).unwrap();
        assert_eq!(folded.to_string(), "struct Box_I { value: Int }");
    }
}
