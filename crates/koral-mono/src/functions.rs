//! Instantiation of generic functions and extension methods.
//!
//! Declaring an instantiation (definition, identifier, signature) is
//! separate from emitting its body: call sites only need the former, and
//! the entry is cached before the body is folded so a recursive call finds
//! it.

use koral_common::Span;
use koral_typeck::def_id::DefKind;
use koral_typeck::fold::TypedFolder;
use koral_typeck::templates::substitution_map;
use koral_typeck::typed::{TypedGlobal, TypedParam};
use koral_typeck::{DefId, Type};
use rustc_hash::FxHashMap;

use crate::error::{MonoError, MonoErrorKind};
use crate::mono::Monomorphizer;
use crate::substitute::Substituter;

/// A declared instantiation: what a call site needs.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionEntry {
    pub def: DefId,
    pub identifier: String,
    /// The function type, receiver first for methods.
    pub ty: Type,
}

/// Everything needed to emit one instantiated body.
struct Instance {
    entry: FunctionEntry,
    map: FxHashMap<String, Type>,
    params: Vec<TypedParam>,
    returns: Type,
    body: Option<koral_typeck::typed::TypedExpr>,
    intrinsic: bool,
}

fn arity(name: &str, expected: usize, found: usize, span: Span) -> Result<(), MonoError> {
    if expected == found {
        return Ok(());
    }
    Err(MonoError::new(
        MonoErrorKind::ArgumentCount {
            name: name.to_string(),
            expected,
            found,
        },
        span,
    ))
}

impl Monomorphizer {
    fn missing_template(&self, def: DefId, span: Span) -> MonoError {
        MonoError::new(
            MonoErrorKind::MissingTemplate {
                name: self.ctx.name_of(def).to_string(),
            },
            span,
        )
    }

    /// A definition for an instantiation, placed where `origin` is declared.
    fn allocate_instance(&mut self, origin: DefId, local_name: &str, span: Span) -> Result<DefId, MonoError> {
        let meta = self
            .ctx
            .defs()
            .metadata(origin)
            .cloned()
            .ok_or_else(|| self.missing_template(origin, span))?;
        let local_name = self.instance_name(&meta, local_name.to_string());
        Ok(self.ctx.defs_mut().allocate(
            &meta.module_path,
            &local_name,
            DefKind::Function,
            &meta.source_file,
            meta.access,
            meta.span,
        ))
    }

    fn declare_instance(
        &mut self,
        cache_key: String,
        origin: DefId,
        local_name: String,
        instance_of: (DefId, Vec<Type>),
        signature: Type,
        depth: usize,
        span: Span,
    ) -> Result<(FunctionEntry, bool), MonoError> {
        let ty = self.resolve_type(&signature, depth, span)?;
        let def = self.allocate_instance(origin, &local_name, span)?;
        let (template, args) = instance_of;
        self.ctx.defs_mut().set_instantiation(def, template, args);
        self.ctx.defs_mut().set_signature(def, ty.clone());
        let identifier = self
            .ctx
            .defs()
            .unique_identifier(def)
            .unwrap_or(local_name);
        let entry = FunctionEntry { def, identifier, ty };
        tracing::debug!(identifier = %entry.identifier, "declared instantiation");
        self.functions.insert(cache_key, entry.clone());
        Ok((entry, true))
    }

    /// The instantiation of function `template` at `args`, declared on
    /// first use. The flag is `true` when this call declared it.
    pub(crate) fn function_entry(
        &mut self,
        template: DefId,
        args: &[Type],
        depth: usize,
        span: Span,
    ) -> Result<(FunctionEntry, bool), MonoError> {
        let cache_key = self.ctx.application_key(template, args);
        if let Some(entry) = self.functions.get(&cache_key) {
            return Ok((entry.clone(), false));
        }
        let t = self
            .templates
            .functions
            .get(&template)
            .ok_or_else(|| self.missing_template(template, span))?;
        arity(&t.name, t.type_params.len(), args.len(), span)?;
        let map = substitution_map(&t.type_params, args);
        let signature = Type::function(
            t.params.iter().map(|p| p.ty.substitute(&map)).collect(),
            t.returns.substitute(&map),
        );
        let local_name = format!("{}_{}", t.name, self.ctx.args_key(args));
        self.declare_instance(
            cache_key,
            template,
            local_name,
            (template, args.to_vec()),
            signature,
            depth,
            span,
        )
    }

    fn extension_map(
        &mut self,
        base: DefId,
        base_args: &[Type],
        method: &str,
        method_args: &[Type],
        depth: usize,
        span: Span,
    ) -> Result<FxHashMap<String, Type>, MonoError> {
        let ext = self.templates.extension(base, method).ok_or_else(|| {
            MonoError::new(
                MonoErrorKind::MissingMethod {
                    ty: self.ctx.name_of(base).to_string(),
                    method: method.to_string(),
                },
                span,
            )
        })?;
        arity(self.ctx.name_of(base), ext.owner_params.len(), base_args.len(), span)?;
        arity(method, ext.method_params.len(), method_args.len(), span)?;
        let mut map = substitution_map(&ext.owner_params, base_args);
        map.extend(substitution_map(&ext.method_params, method_args));
        let self_ty = self.instantiate_type(base, base_args.to_vec(), depth, span)?;
        map.insert("Self".to_string(), self_ty);
        Ok(map)
    }

    /// The instantiation of extension `method` of `base[base_args]`.
    pub(crate) fn extension_entry(
        &mut self,
        base: DefId,
        base_args: &[Type],
        method: &str,
        method_args: &[Type],
        depth: usize,
        span: Span,
    ) -> Result<(FunctionEntry, bool), MonoError> {
        let mut cache_key = format!("{}.{}", self.ctx.application_key(base, base_args), method);
        let mut local_name = format!(
            "{}_{}_{}",
            self.ctx.name_of(base),
            self.ctx.args_key(base_args),
            method
        );
        if !method_args.is_empty() {
            let suffix = self.ctx.args_key(method_args);
            cache_key.push('.');
            cache_key.push_str(&suffix);
            local_name.push('_');
            local_name.push_str(&suffix);
        }
        if let Some(entry) = self.functions.get(&cache_key) {
            return Ok((entry.clone(), false));
        }

        let map = self.extension_map(base, base_args, method, method_args, depth, span)?;
        let ext = self
            .templates
            .extension(base, method)
            .ok_or_else(|| self.missing_template(base, span))?;
        let signature = Type::function(
            ext.params.iter().map(|p| p.ty.substitute(&map)).collect(),
            ext.returns.substitute(&map),
        );
        let method_def = ext.def;
        let mut all_args = base_args.to_vec();
        all_args.extend_from_slice(method_args);
        self.declare_instance(
            cache_key,
            base,
            local_name,
            (method_def, all_args),
            signature,
            depth,
            span,
        )
    }

    fn emit(&mut self, instance: Instance, depth: usize, span: Span) -> Result<(), MonoError> {
        if instance.intrinsic {
            return Ok(());
        }
        let body = instance
            .body
            .ok_or_else(|| self.missing_template(instance.entry.def, span))?;
        let mut folder = Substituter::new(self, instance.map, depth);
        let params = instance
            .params
            .into_iter()
            .map(|p| {
                Ok(TypedParam {
                    name: p.name,
                    ty: folder.fold_type(p.ty)?,
                })
            })
            .collect::<Result<Vec<_>, MonoError>>()?;
        let returns = folder.fold_type(instance.returns)?;
        let body = folder.fold_expr(body)?;

        tracing::debug!(identifier = %instance.entry.identifier, "emitted instantiation");
        self.function_decls.push(TypedGlobal::Function {
            def: instance.entry.def,
            identifier: instance.entry.identifier,
            params,
            returns,
            body,
        });
        Ok(())
    }

    /// Declare (if needed) and emit the body of `template[args]`.
    pub(crate) fn emit_function(
        &mut self,
        template: DefId,
        args: &[Type],
        depth: usize,
        span: Span,
    ) -> Result<(), MonoError> {
        let t = self
            .templates
            .functions
            .get(&template)
            .cloned()
            .ok_or_else(|| self.missing_template(template, span))?;
        if t.intrinsic {
            return Ok(());
        }
        let (entry, _) = self.function_entry(template, args, depth, span)?;
        let instance = Instance {
            entry,
            map: substitution_map(&t.type_params, args),
            params: t.params,
            returns: t.returns,
            body: t.body,
            intrinsic: t.intrinsic,
        };
        self.emit(instance, depth, span)
    }

    /// Declare (if needed) and emit the body of an extension method.
    pub(crate) fn emit_extension(
        &mut self,
        base: DefId,
        base_args: &[Type],
        method: &str,
        method_args: &[Type],
        depth: usize,
        span: Span,
    ) -> Result<(), MonoError> {
        let (entry, _) = self.extension_entry(base, base_args, method, method_args, depth, span)?;
        let map = self.extension_map(base, base_args, method, method_args, depth, span)?;
        let ext = self
            .templates
            .extension(base, method)
            .cloned()
            .ok_or_else(|| self.missing_template(base, span))?;
        let instance = Instance {
            entry,
            map,
            params: ext.params,
            returns: ext.returns,
            body: ext.body,
            intrinsic: ext.intrinsic,
        };
        self.emit(instance, depth, span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use koral_typeck::ast::TypeParam;
    use koral_typeck::context::CompilerContext;
    use koral_typeck::def_id::{AccessModifier, TemplateKind};
    use koral_typeck::templates::{FunctionTemplate, GenericTemplates};
    use koral_typeck::traits::TraitRegistry;
    use koral_typeck::typed::{TypedExpr, TypedExprKind};

    fn identity(body: Option<TypedExpr>) -> (Monomorphizer, DefId) {
        let mut ctx = CompilerContext::new();
        let def = ctx.defs_mut().allocate(
            &["util".to_string()],
            "identity",
            DefKind::GenericTemplate(TemplateKind::Function),
            "util.koral",
            AccessModifier::Default,
            Span::DUMMY,
        );
        let mut templates = GenericTemplates::new();
        templates.functions.insert(
            def,
            FunctionTemplate {
                def,
                name: "identity".into(),
                type_params: vec![TypeParam::new("T")],
                params: vec![TypedParam {
                    name: "x".into(),
                    ty: Type::param("T"),
                }],
                returns: Type::param("T"),
                body,
                intrinsic: false,
                span: Span::DUMMY,
            },
        );
        (Monomorphizer::new(ctx, templates, TraitRegistry::with_builtins(), 8), def)
    }

    fn x() -> TypedExpr {
        TypedExpr::variable("x", None, Type::param("T"), Span::DUMMY)
    }

    #[test]
    fn entry_is_declared_once() {
        let (mut mono, def) = identity(Some(x()));
        let (first, fresh) = mono.function_entry(def, &[Type::Int8], 0, Span::DUMMY).unwrap();
        assert!(fresh);
        assert_eq!(first.identifier, "util_identity_I8");
        assert_eq!(first.ty, Type::function(vec![Type::Int8], Type::Int8));
        let (second, fresh) = mono.function_entry(def, &[Type::Int8], 0, Span::DUMMY).unwrap();
        assert!(!fresh);
        assert_eq!(second, first);
    }

    #[test]
    fn emitted_body_is_substituted() {
        let (mut mono, def) = identity(Some(x()));
        mono.emit_function(def, &[Type::Bool], 0, Span::DUMMY).unwrap();
        let TypedGlobal::Function { params, returns, body, .. } = &mono.function_decls[0] else {
            panic!("expected a function");
        };
        assert_eq!(params[0].ty, Type::Bool);
        assert_eq!(returns, &Type::Bool);
        assert_eq!(body.ty, Type::Bool);
        assert!(matches!(&body.kind, TypedExprKind::Variable { name, .. } if name == "x"));
    }

    #[test]
    fn wrong_argument_count_is_reported() {
        let (mut mono, def) = identity(Some(x()));
        let err = mono
            .function_entry(def, &[Type::Int, Type::Bool], 0, Span::DUMMY)
            .unwrap_err();
        assert_eq!(
            err.kind,
            MonoErrorKind::ArgumentCount {
                name: "identity".into(),
                expected: 1,
                found: 2,
            }
        );
    }

    #[test]
    fn unchecked_body_is_missing() {
        let (mut mono, def) = identity(None);
        let err = mono.emit_function(def, &[Type::Int], 0, Span::DUMMY).unwrap_err();
        assert!(matches!(err.kind, MonoErrorKind::MissingTemplate { .. }));
    }
}
