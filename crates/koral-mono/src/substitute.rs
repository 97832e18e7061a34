//! Substitution of concrete type arguments into checked bodies.
//!
//! Besides replacing generic parameters, the folder resolves every call
//! whose target depends on types: generic calls become direct calls of
//! their instantiation, method calls dispatch to the receiver's concrete
//! method, extension instantiation or primitive lowering, and operators on
//! nominal operands call the conformance method.

use koral_common::Span;
use koral_typeck::ast::BinaryOp;
use koral_typeck::fold::{walk_expr, TypedFolder};
use koral_typeck::typed::{TypedExpr, TypedExprKind};
use koral_typeck::{DefId, InstantiationKind, Type};
use rustc_hash::FxHashMap;

use crate::error::{MonoError, MonoErrorKind};
use crate::functions::FunctionEntry;
use crate::lower;
use crate::mono::Monomorphizer;

pub(crate) struct Substituter<'m> {
    mono: &'m mut Monomorphizer,
    map: FxHashMap<String, Type>,
    /// Depth of the body being folded; what it requests is one deeper.
    depth: usize,
    span: Span,
}

fn direct_call(entry: FunctionEntry, args: Vec<TypedExpr>, ty: Type, span: Span) -> TypedExpr {
    let callee = TypedExpr::variable(entry.identifier, Some(entry.def), entry.ty, span);
    TypedExpr::new(
        TypedExprKind::Call {
            callee: Box::new(callee),
            args,
        },
        ty,
        span,
    )
}

fn intrinsic(name: String, type_args: Vec<Type>, args: Vec<TypedExpr>, ty: Type, span: Span) -> TypedExpr {
    TypedExpr::new(TypedExprKind::IntrinsicCall { name, type_args, args }, ty, span)
}

impl<'m> Substituter<'m> {
    pub fn new(mono: &'m mut Monomorphizer, map: FxHashMap<String, Type>, depth: usize) -> Self {
        Substituter {
            mono,
            map,
            depth,
            span: Span::DUMMY,
        }
    }

    fn generic_call(
        &mut self,
        template: DefId,
        type_args: Vec<Type>,
        args: Vec<TypedExpr>,
        ty: Type,
        span: Span,
    ) -> Result<TypedExpr, MonoError> {
        let intrinsic_name = self
            .mono
            .templates
            .functions
            .get(&template)
            .filter(|t| t.intrinsic)
            .map(|t| t.name.clone());
        if let Some(name) = intrinsic_name {
            return Ok(intrinsic(name, type_args, args, ty, span));
        }

        let depth = self.depth + 1;
        let (entry, fresh) = self.mono.function_entry(template, &type_args, depth, span)?;
        if fresh {
            self.mono.enqueue(
                InstantiationKind::Function {
                    template,
                    args: type_args,
                },
                span,
                depth,
            );
        }
        Ok(direct_call(entry, args, ty, span))
    }

    fn method_call(
        &mut self,
        receiver: TypedExpr,
        method: &str,
        method_args: Vec<Type>,
        args: Vec<TypedExpr>,
        ty: Type,
        span: Span,
    ) -> Result<TypedExpr, MonoError> {
        let shape = match &receiver.ty {
            Type::Reference(inner) | Type::Pointer(inner) => inner.as_ref().clone(),
            other => other.clone(),
        };
        if shape.is_primitive() {
            return lower::primitive_method(receiver, method, args, ty, span);
        }
        let missing = |mono: &Monomorphizer| {
            MonoError::new(
                MonoErrorKind::MissingMethod {
                    ty: mono.ctx.debug_name(&shape),
                    method: method.to_string(),
                },
                span,
            )
        };
        let Some(nominal) = shape.nominal() else {
            return Err(missing(&*self.mono));
        };
        let def = nominal.def;

        let mut all_args = Vec::with_capacity(args.len() + 1);
        all_args.push(receiver);
        all_args.extend(args);

        // Instantiated generic types dispatch to their extension methods.
        let extension = self.mono.ctx.defs().template_of(def).and_then(|base| {
            let ext = self.mono.templates.extension(base, method)?;
            Some((base, ext.intrinsic))
        });
        if let Some((base, is_intrinsic)) = extension {
            let base_args = self.mono.ctx.defs().type_arguments(def).unwrap_or_default().to_vec();
            if is_intrinsic {
                let name = format!("{}_{}", self.mono.ctx.name_of(base), method);
                let mut type_args = base_args;
                type_args.extend(method_args);
                return Ok(intrinsic(name, type_args, all_args, ty, span));
            }
            let depth = self.depth + 1;
            let (entry, fresh) =
                self.mono
                    .extension_entry(base, &base_args, method, &method_args, depth, span)?;
            if fresh {
                self.mono.enqueue(
                    InstantiationKind::ExtensionMethod {
                        base,
                        base_args,
                        method: method.to_string(),
                        method_args,
                    },
                    span,
                    depth,
                );
            }
            return Ok(direct_call(entry, all_args, ty, span));
        }

        let concrete = self
            .mono
            .templates
            .concrete_method(def, method)
            .cloned()
            .ok_or_else(|| missing(&*self.mono))?;
        if self.mono.templates.intrinsics.contains(&concrete.def) {
            return Ok(intrinsic(concrete.identifier, Vec::new(), all_args, ty, span));
        }
        let entry = FunctionEntry {
            def: concrete.def,
            identifier: concrete.identifier,
            ty: Type::function(concrete.params, concrete.returns),
        };
        Ok(direct_call(entry, all_args, ty, span))
    }

    /// `a op b` on nominal operands, through the conformance method.
    fn operator(
        &mut self,
        op: BinaryOp,
        lhs: TypedExpr,
        rhs: TypedExpr,
        ty: Type,
        span: Span,
    ) -> Result<TypedExpr, MonoError> {
        let operand = lhs.ty.clone();
        let (Some(method), Some(trait_name)) = (lower::operator_method(op), op.required_trait()) else {
            return Ok(TypedExpr::binary(op, lhs, rhs, ty, span));
        };
        if self.mono.traits.find_impl(trait_name, &operand, &self.mono.ctx).is_none() {
            return Err(MonoError::new(
                MonoErrorKind::MissingMethod {
                    ty: self.mono.ctx.debug_name(&operand),
                    method: method.to_string(),
                },
                span,
            ));
        }
        let returns = lower::operator_method_returns(op, &operand);
        let call = self.method_call(lhs, method, Vec::new(), vec![rhs], returns, span)?;
        Ok(lower::operator_result(op, call, span))
    }

    fn rewrite(&mut self, expr: TypedExpr) -> Result<TypedExpr, MonoError> {
        let TypedExpr { kind, ty, span } = expr;
        match kind {
            TypedExprKind::GenericCall {
                template,
                type_args,
                args,
            } => self.generic_call(template, type_args, args, ty, span),
            TypedExprKind::MethodCall {
                receiver,
                method,
                method_type_args,
                args,
            } => self.method_call(*receiver, &method, method_type_args, args, ty, span),
            TypedExprKind::Binary { op, lhs, rhs }
                if matches!(lhs.ty, Type::Structure(_) | Type::Union(_) | Type::Opaque(_)) =>
            {
                self.operator(op, *lhs, *rhs, ty, span)
            }
            kind => Ok(TypedExpr { kind, ty, span }),
        }
    }
}

impl TypedFolder for Substituter<'_> {
    type Error = MonoError;

    fn fold_type(&mut self, ty: Type) -> Result<Type, MonoError> {
        let ty = ty.substitute(&self.map);
        self.mono.resolve_type(&ty, self.depth, self.span)
    }

    fn fold_expr(&mut self, expr: TypedExpr) -> Result<TypedExpr, MonoError> {
        let span = expr.span;
        self.span = span;
        let folded = walk_expr(self, expr)?;
        self.span = span;
        self.rewrite(folded)
    }
}
