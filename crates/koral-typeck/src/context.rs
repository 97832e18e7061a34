//! Query façade over the definition registry.
//!
//! `CompilerContext` is the handle passed explicitly through every pass.
//! Besides giving access to the [`DefIdMap`], it answers type-shape
//! questions that need to look inside nominal declarations. Those walks
//! carry a visited-`DefId` set, since legal recursive types exist (a node
//! type referring to itself through a `ref`).

use indexmap::IndexSet;
use rustc_hash::FxHashSet;

use crate::def_id::{file_tag, AccessModifier, DefId, DefIdMap, StructMember, UnionCase};
use crate::ty::{Type, TypeVar};

#[derive(Debug, Default)]
pub struct CompilerContext {
    defs: DefIdMap,
}

impl CompilerContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defs(&self) -> &DefIdMap {
        &self.defs
    }

    pub fn defs_mut(&mut self) -> &mut DefIdMap {
        &mut self.defs
    }

    pub fn name_of(&self, def: DefId) -> &str {
        self.defs.name(def).unwrap_or("<unknown>")
    }

    pub fn struct_member(&self, def: DefId, name: &str) -> Option<(usize, &StructMember)> {
        self.defs
            .struct_members(def)?
            .iter()
            .enumerate()
            .find(|(_, m)| m.name == name)
    }

    pub fn union_case(&self, def: DefId, name: &str) -> Option<(usize, &UnionCase)> {
        self.defs
            .union_cases(def)?
            .iter()
            .enumerate()
            .find(|(_, c)| c.name == name)
    }

    /// Every type stored inside a nominal declaration: struct member types
    /// and union case parameter types. Empty when the shape is not known yet.
    pub fn member_types(&self, def: DefId) -> Vec<Type> {
        let mut types = Vec::new();
        if let Some(members) = self.defs.struct_members(def) {
            types.extend(members.iter().map(|m| m.ty.clone()));
        }
        if let Some(cases) = self.defs.union_cases(def) {
            for case in cases {
                types.extend(case.params.iter().map(|p| p.ty.clone()));
            }
        }
        types
    }

    // ── Names ──────────────────────────────────────────────────────────

    /// Layout key of a nominal declaration: module path, file tag for
    /// private declarations, name, then argument keys for declarations
    /// that carry type arguments without being generic instantiations.
    pub fn nominal_key(&self, def: DefId) -> String {
        let Some(meta) = self.defs.metadata(def) else {
            return format!("D{}", def.0);
        };
        let mut parts: Vec<String> = meta.module_path.clone();
        if meta.access == AccessModifier::Private && !meta.source_file.is_empty() {
            parts.push(file_tag(&meta.source_file));
        }
        parts.push(meta.name.clone());
        if self.defs.is_generic_instantiation(def) != Some(true) {
            if let Some(args) = self.defs.type_arguments(def) {
                parts.extend(args.iter().map(|a| self.layout_key(a)));
            }
        }
        parts.join("_")
    }

    /// Deterministic key naming a type. Used as a cache key and as the
    /// emitted symbol name of instantiations.
    pub fn layout_key(&self, ty: &Type) -> String {
        if let Some(key) = ty.primitive_layout_key() {
            return key.to_string();
        }
        match ty {
            Type::Function { params, returns } => {
                let mut parts = vec!["Fn".to_string()];
                parts.extend(params.iter().map(|p| self.layout_key(p)));
                parts.push("R".to_string());
                parts.push(self.layout_key(returns));
                parts.join("_")
            }
            Type::Reference(inner) => format!("R_{}", self.layout_key(inner)),
            Type::Pointer(inner) => format!("P_{}", self.layout_key(inner)),
            Type::WeakReference(inner) => format!("W_{}", self.layout_key(inner)),
            Type::Structure(n) | Type::Union(n) | Type::Opaque(n) => self.nominal_key(n.def),
            Type::GenericStruct { template, args } | Type::GenericUnion { template, args } => {
                self.application_key(template.def, args)
            }
            Type::GenericParameter(name) => format!("Param_{}", name),
            Type::TypeVariable(var) => format!("TV_{}", var.0),
            Type::Module(n) => format!("M_{}", n.name.replace('.', "_")),
            Type::TraitObject(name) => format!("TO_{}", name),
            _ => String::new(),
        }
    }

    /// `Template_ArgKey1_ArgKey2...`
    pub fn application_key(&self, template: DefId, args: &[Type]) -> String {
        let mut key = self.nominal_key(template);
        for arg in args {
            key.push('_');
            key.push_str(&self.layout_key(arg));
        }
        key
    }

    /// Argument keys joined with `_`, as used in instantiated names.
    pub fn args_key(&self, args: &[Type]) -> String {
        args.iter()
            .map(|a| self.layout_key(a))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Readable name for logs and diagnostics: `Pair[Int, Bool]`.
    pub fn debug_name(&self, ty: &Type) -> String {
        match ty {
            Type::GenericStruct { template, args } | Type::GenericUnion { template, args } => {
                let args: Vec<String> = args.iter().map(|a| self.debug_name(a)).collect();
                format!("{}[{}]", self.name_of(template.def), args.join(", "))
            }
            Type::Structure(n) | Type::Union(n) | Type::Opaque(n) => {
                match (self.defs.template_of(n.def), self.defs.type_arguments(n.def)) {
                    (Some(template), Some(args)) => {
                        let args: Vec<String> = args.iter().map(|a| self.debug_name(a)).collect();
                        format!("{}[{}]", self.name_of(template), args.join(", "))
                    }
                    _ => self.name_of(n.def).to_string(),
                }
            }
            Type::Reference(inner) => format!("{} ref", self.debug_name(inner)),
            Type::Pointer(inner) => format!("{} ptr", self.debug_name(inner)),
            Type::WeakReference(inner) => format!("{} weakref", self.debug_name(inner)),
            Type::Function { params, returns } => {
                let params: Vec<String> = params.iter().map(|p| self.debug_name(p)).collect();
                format!("({}) -> {}", params.join(", "), self.debug_name(returns))
            }
            other => other.to_string(),
        }
    }

    // ── Shape queries ──────────────────────────────────────────────────

    /// Whether `pred` holds anywhere in `ty`, looking through nominal
    /// declarations into their members.
    fn deep_any(
        &self,
        ty: &Type,
        pred: &impl Fn(&Type) -> bool,
        visited: &mut FxHashSet<DefId>,
    ) -> bool {
        if ty.any(pred) {
            return true;
        }
        let mut nominals = Vec::new();
        collect_nominals(ty, &mut nominals);
        for def in nominals {
            if !visited.insert(def) {
                continue;
            }
            if let Some(args) = self.defs.type_arguments(def) {
                if args.iter().any(|a| self.deep_any(a, pred, visited)) {
                    return true;
                }
            }
            if self
                .member_types(def)
                .iter()
                .any(|m| self.deep_any(m, pred, visited))
            {
                return true;
            }
        }
        false
    }

    pub fn contains_generic_parameter(&self, ty: &Type) -> bool {
        let mut visited = FxHashSet::default();
        self.deep_any(ty, &|t| matches!(t, Type::GenericParameter(_)), &mut visited)
    }

    pub fn contains_type_variable(&self, ty: &Type) -> bool {
        let mut visited = FxHashSet::default();
        self.deep_any(ty, &Type::is_type_variable, &mut visited)
    }

    /// Whether an unresolved generic application, parameter or variable
    /// survives anywhere in `ty`.
    pub fn is_unresolved(&self, ty: &Type) -> bool {
        let mut visited = FxHashSet::default();
        self.deep_any(
            ty,
            &|t| {
                matches!(
                    t,
                    Type::GenericStruct { .. }
                        | Type::GenericUnion { .. }
                        | Type::GenericParameter(_)
                        | Type::TypeVariable(_)
                )
            },
            &mut visited,
        )
    }

    /// Type variables in `ty`, in first-occurrence order.
    pub fn free_type_variables(&self, ty: &Type) -> Vec<TypeVar> {
        let mut vars = IndexSet::new();
        let mut visited = FxHashSet::default();
        self.collect_vars(ty, &mut vars, &mut visited);
        vars.into_iter().collect()
    }

    fn collect_vars(
        &self,
        ty: &Type,
        vars: &mut IndexSet<TypeVar>,
        visited: &mut FxHashSet<DefId>,
    ) {
        match ty {
            Type::TypeVariable(var) => {
                vars.insert(*var);
            }
            Type::Structure(n) | Type::Union(n) => {
                if visited.insert(n.def) {
                    for member in self.member_types(n.def) {
                        self.collect_vars(&member, vars, visited);
                    }
                }
            }
            _ => {
                for child in ty.children() {
                    self.collect_vars(child, vars, visited);
                }
            }
        }
    }
}

/// Nominal declarations mentioned directly in `ty` (not inside members).
fn collect_nominals(ty: &Type, out: &mut Vec<DefId>) {
    match ty {
        Type::Structure(n) | Type::Union(n) | Type::Opaque(n) => out.push(n.def),
        _ => {
            for child in ty.children() {
                collect_nominals(child, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::def_id::{CaseParam, DefKind, TypeDefKind};
    use crate::ty::Nominal;
    use koral_common::Span;

    fn declare(ctx: &mut CompilerContext, path: &[&str], name: &str, file: &str, access: AccessModifier) -> DefId {
        let path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        ctx.defs_mut().allocate(
            &path,
            name,
            DefKind::Type(TypeDefKind::Struct),
            file,
            access,
            Span::DUMMY,
        )
    }

    // ── Layout keys ──

    #[test]
    fn primitive_and_wrapper_keys() {
        let ctx = CompilerContext::new();
        assert_eq!(ctx.layout_key(&Type::Int), "I");
        assert_eq!(ctx.layout_key(&Type::reference(Type::Float64)), "R_F64");
        assert_eq!(
            ctx.layout_key(&Type::function(vec![Type::Int, Type::Bool], Type::Void)),
            "Fn_I_B_R_V"
        );
        assert_eq!(ctx.layout_key(&Type::param("T")), "Param_T");
        assert_eq!(ctx.layout_key(&Type::TypeVariable(TypeVar(2))), "TV_2");
    }

    #[test]
    fn nominal_keys_include_module_and_file_tag() {
        let mut ctx = CompilerContext::new();
        let public = declare(&mut ctx, &["app", "geo"], "Point", "geo.koral", AccessModifier::Default);
        let private = declare(&mut ctx, &["app"], "Node", "a.koral", AccessModifier::Private);
        assert_eq!(ctx.nominal_key(public), "app_geo_Point");
        assert_eq!(
            ctx.nominal_key(private),
            format!("app_{}_Node", file_tag("a.koral"))
        );
    }

    #[test]
    fn private_same_name_keys_differ() {
        let mut ctx = CompilerContext::new();
        let a = declare(&mut ctx, &[], "Node", "a.koral", AccessModifier::Private);
        let b = declare(&mut ctx, &[], "Node", "b.koral", AccessModifier::Private);
        assert_ne!(ctx.nominal_key(a), ctx.nominal_key(b));
    }

    #[test]
    fn application_key_matches_instantiated_name() {
        let mut ctx = CompilerContext::new();
        let pair = declare(&mut ctx, &[], "Pair", "main.koral", AccessModifier::Default);
        let generic = Type::GenericStruct {
            template: Nominal::new(pair, "Pair"),
            args: vec![Type::Int, Type::Bool],
        };
        assert_eq!(ctx.layout_key(&generic), "Pair_I_B");
        assert_eq!(ctx.debug_name(&generic), "Pair[Int, Bool]");

        let inst = declare(&mut ctx, &[], "Pair_I_B", "main.koral", AccessModifier::Default);
        ctx.defs_mut().set_instantiation(inst, pair, vec![Type::Int, Type::Bool]);
        assert_eq!(ctx.layout_key(&Type::Structure(Nominal::new(inst, "Pair_I_B"))), "Pair_I_B");
        assert_eq!(ctx.debug_name(&Type::Structure(Nominal::new(inst, "Pair_I_B"))), "Pair[Int, Bool]");
    }

    // ── Shape queries ──

    #[test]
    fn recursive_nominal_walk_terminates() {
        let mut ctx = CompilerContext::new();
        let list = declare(&mut ctx, &[], "List", "main.koral", AccessModifier::Default);
        let list_ty = Type::Union(Nominal::new(list, "List"));
        ctx.defs_mut().set_union_cases(
            list,
            vec![
                UnionCase {
                    name: "Nil".into(),
                    params: vec![],
                },
                UnionCase {
                    name: "Cons".into(),
                    params: vec![
                        CaseParam {
                            name: "head".into(),
                            ty: Type::Int,
                        },
                        CaseParam {
                            name: "tail".into(),
                            ty: Type::reference(list_ty.clone()),
                        },
                    ],
                },
            ],
        );
        assert!(!ctx.contains_generic_parameter(&list_ty));
        assert!(!ctx.contains_type_variable(&list_ty));
        assert!(ctx.free_type_variables(&list_ty).is_empty());
    }

    #[test]
    fn free_variables_in_order() {
        let ctx = CompilerContext::new();
        let ty = Type::function(
            vec![Type::TypeVariable(TypeVar(3)), Type::TypeVariable(TypeVar(1))],
            Type::TypeVariable(TypeVar(3)),
        );
        assert_eq!(ctx.free_type_variables(&ty), vec![TypeVar(3), TypeVar(1)]);
    }

    #[test]
    fn members_are_searched_for_parameters() {
        let mut ctx = CompilerContext::new();
        let cell = declare(&mut ctx, &[], "Cell", "main.koral", AccessModifier::Default);
        ctx.defs_mut().set_struct_members(
            cell,
            vec![StructMember {
                name: "value".into(),
                ty: Type::param("T"),
                mutable: true,
                access: AccessModifier::Default,
            }],
        );
        assert!(ctx.contains_generic_parameter(&Type::Structure(Nominal::new(cell, "Cell"))));
        assert!(ctx.is_unresolved(&Type::pointer(Type::Structure(Nominal::new(cell, "Cell")))));
    }
}
