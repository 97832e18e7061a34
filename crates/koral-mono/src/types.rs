//! Instantiation of generic structs and unions.
//!
//! An instantiation gets its own definition, named after the template and
//! the argument layout keys (`Pair_I_B`). The instantiated type is cached
//! before its members are resolved, so a member that mentions the same
//! application through a `ref` finds the placeholder instead of recursing.
//! A member that holds the instantiation by value is an error.

use koral_common::Span;
use koral_typeck::def_id::{CaseParam, DefKind, StructMember, TypeDefKind, UnionCase};
use koral_typeck::templates::substitution_map;
use koral_typeck::ty::Nominal;
use koral_typeck::typed::TypedGlobal;
use koral_typeck::{DefId, InstantiationKind, Type};
use rustc_hash::FxHashSet;

use crate::error::{MonoError, MonoErrorKind};
use crate::mono::Monomorphizer;

/// Name of the extension method run when a value is destroyed.
pub const DROP_METHOD: &str = "__drop";

enum Shape {
    Struct(Vec<StructMember>),
    Union(Vec<UnionCase>),
}

impl Monomorphizer {
    /// Replace every generic application in `ty` by its instantiation.
    pub(crate) fn resolve_type(&mut self, ty: &Type, depth: usize, span: Span) -> Result<Type, MonoError> {
        match ty {
            Type::GenericStruct { template, args } | Type::GenericUnion { template, args } => {
                let args = self.resolve_types(args, depth, span)?;
                self.instantiate_type(template.def, args, depth, span)
            }
            other => other.try_map_children(&mut |child| self.resolve_type(child, depth, span)),
        }
    }

    pub(crate) fn resolve_types(&mut self, types: &[Type], depth: usize, span: Span) -> Result<Vec<Type>, MonoError> {
        types.iter().map(|t| self.resolve_type(t, depth, span)).collect()
    }

    /// The concrete type for `template[args]`, declaring it on first use.
    /// `args` must already be resolved.
    pub(crate) fn instantiate_type(
        &mut self,
        template: DefId,
        args: Vec<Type>,
        depth: usize,
        span: Span,
    ) -> Result<Type, MonoError> {
        let key = self.ctx.application_key(template, &args);
        if let Some(ty) = self.types.get(&key) {
            return Ok(ty.clone());
        }
        if depth > self.max_depth {
            let name = format!(
                "{}[{}]",
                self.ctx.name_of(template),
                args.iter().map(|a| self.ctx.debug_name(a)).collect::<Vec<_>>().join(", ")
            );
            return Err(self.depth_exceeded(name, span));
        }

        let missing = || {
            MonoError::new(
                MonoErrorKind::MissingTemplate {
                    name: self.ctx.name_of(template).to_string(),
                },
                span,
            )
        };
        let (type_params, shape) = if let Some(t) = self.templates.structs.get(&template) {
            (t.type_params.clone(), Shape::Struct(t.members.clone()))
        } else if let Some(t) = self.templates.unions.get(&template) {
            (t.type_params.clone(), Shape::Union(t.cases.clone()))
        } else {
            return Err(missing());
        };
        if type_params.len() != args.len() {
            return Err(MonoError::new(
                MonoErrorKind::ArgumentCount {
                    name: self.ctx.name_of(template).to_string(),
                    expected: type_params.len(),
                    found: args.len(),
                },
                span,
            ));
        }
        let meta = self.ctx.defs().metadata(template).cloned().ok_or_else(missing)?;

        let kind = match shape {
            Shape::Struct(_) => TypeDefKind::Struct,
            Shape::Union(_) => TypeDefKind::Union,
        };
        let local_name = self.instance_name(&meta, format!("{}_{}", meta.name, self.ctx.args_key(&args)));
        let def = self.ctx.defs_mut().allocate(
            &meta.module_path,
            &local_name,
            DefKind::Type(kind),
            &meta.source_file,
            meta.access,
            meta.span,
        );
        self.ctx.defs_mut().set_instantiation(def, template, args.clone());
        let layout = self.ctx.nominal_key(def);
        let nominal = Nominal::new(def, layout.clone());
        let ty = match kind {
            TypeDefKind::Union => Type::Union(nominal),
            _ => Type::Structure(nominal),
        };
        self.types.insert(key, ty.clone());

        let map = substitution_map(&type_params, &args);
        let identifier = |ctx: &koral_typeck::CompilerContext| {
            ctx.defs().unique_identifier(def).unwrap_or_else(|| layout.clone())
        };
        let declaration = match shape {
            Shape::Struct(members) => {
                let mut resolved = Vec::with_capacity(members.len());
                for member in members {
                    let ty = self.resolve_type(&member.ty.substitute(&map), depth + 1, span)?;
                    resolved.push(StructMember { ty, ..member });
                }
                self.ctx.defs_mut().set_struct_members(def, resolved.clone());
                self.reject_by_value_self(def, &layout, resolved.iter().map(|m| (&m.name, &m.ty)), span)?;
                TypedGlobal::StructDeclaration {
                    def,
                    identifier: identifier(&self.ctx),
                    members: resolved,
                }
            }
            Shape::Union(cases) => {
                let mut resolved = Vec::with_capacity(cases.len());
                for case in cases {
                    let mut params = Vec::with_capacity(case.params.len());
                    for param in case.params {
                        let ty = self.resolve_type(&param.ty.substitute(&map), depth + 1, span)?;
                        params.push(CaseParam { name: param.name, ty });
                    }
                    resolved.push(UnionCase {
                        name: case.name,
                        params,
                    });
                }
                self.ctx.defs_mut().set_union_cases(def, resolved.clone());
                let members = resolved
                    .iter()
                    .flat_map(|c| c.params.iter().map(move |p| (&c.name, &p.ty)));
                self.reject_by_value_self(def, &layout, members, span)?;
                TypedGlobal::UnionDeclaration {
                    def,
                    identifier: identifier(&self.ctx),
                    cases: resolved,
                }
            }
        };
        tracing::debug!(layout = %layout, "instantiated type");
        self.type_decls.push(declaration);

        if self.templates.extension(template, DROP_METHOD).is_some() {
            self.enqueue(
                InstantiationKind::ExtensionMethod {
                    base: template,
                    base_args: args,
                    method: DROP_METHOD.to_string(),
                    method_args: Vec::new(),
                },
                span,
                depth + 1,
            );
        }
        Ok(ty)
    }

    fn reject_by_value_self<'a>(
        &self,
        def: DefId,
        layout: &str,
        members: impl Iterator<Item = (&'a String, &'a Type)>,
        span: Span,
    ) -> Result<(), MonoError> {
        for (name, ty) in members {
            let mut visited = FxHashSet::default();
            if self.holds_by_value(def, ty, &mut visited) {
                return Err(MonoError::new(
                    MonoErrorKind::DirectRecursion {
                        layout: layout.to_string(),
                        member: name.clone(),
                    },
                    span,
                ));
            }
        }
        Ok(())
    }

    /// Whether a value of `ty` stores a `target` inline, directly or
    /// through the members of other value types.
    fn holds_by_value(&self, target: DefId, ty: &Type, visited: &mut FxHashSet<DefId>) -> bool {
        match ty {
            Type::Structure(n) | Type::Union(n) => {
                if n.def == target {
                    return true;
                }
                if !visited.insert(n.def) {
                    return false;
                }
                self.ctx
                    .member_types(n.def)
                    .iter()
                    .any(|member| self.holds_by_value(target, member, visited))
            }
            _ => false,
        }
    }
}
