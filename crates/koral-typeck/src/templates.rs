//! Generic templates and method tables.
//!
//! Type resolution records every generic struct, union and function here,
//! together with extension methods declared on generic types and methods
//! declared on concrete types. Body checking later fills in the checked
//! (still generic) bodies that monomorphization substitutes.

use indexmap::IndexMap;
use koral_common::Span;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast::TypeParam;
use crate::def_id::{DefId, StructMember, UnionCase};
use crate::ty::Type;
use crate::typed::{TypedExpr, TypedParam};

#[derive(Clone, Debug)]
pub struct StructTemplate {
    pub def: DefId,
    pub name: String,
    pub type_params: Vec<TypeParam>,
    /// Member types mention the template's `GenericParameter`s.
    pub members: Vec<StructMember>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct UnionTemplate {
    pub def: DefId,
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub cases: Vec<UnionCase>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct FunctionTemplate {
    pub def: DefId,
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<TypedParam>,
    pub returns: Type,
    /// `None` until body checking, and forever for intrinsics.
    pub body: Option<TypedExpr>,
    pub intrinsic: bool,
    pub span: Span,
}

/// A method of a `given [T]Target { .. }` block.
#[derive(Clone, Debug)]
pub struct MethodTemplate {
    pub def: DefId,
    pub name: String,
    /// The block's parameters, matched positionally against the target's.
    pub owner_params: Vec<TypeParam>,
    pub method_params: Vec<TypeParam>,
    /// Includes `self` first.
    pub params: Vec<TypedParam>,
    pub returns: Type,
    pub body: Option<TypedExpr>,
    pub intrinsic: bool,
    pub span: Span,
}

impl MethodTemplate {
    pub fn type_params(&self) -> impl Iterator<Item = &TypeParam> {
        self.owner_params.iter().chain(&self.method_params)
    }
}

/// A method declared on a concrete type; called directly.
#[derive(Clone, Debug)]
pub struct ConcreteMethod {
    pub def: DefId,
    pub identifier: String,
    /// Includes `self` first.
    pub params: Vec<Type>,
    pub returns: Type,
}

#[derive(Debug, Default)]
pub struct GenericTemplates {
    pub structs: IndexMap<DefId, StructTemplate>,
    pub unions: IndexMap<DefId, UnionTemplate>,
    pub functions: IndexMap<DefId, FunctionTemplate>,
    /// Extension methods keyed by the generic type's template.
    pub extensions: IndexMap<DefId, Vec<MethodTemplate>>,
    /// Methods of concrete types keyed by the type's declaration.
    pub methods: FxHashMap<DefId, IndexMap<String, ConcreteMethod>>,
    /// Non-generic functions declared without a body.
    pub intrinsics: FxHashSet<DefId>,
}

impl GenericTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_template(&self, def: DefId) -> bool {
        self.structs.contains_key(&def)
            || self.unions.contains_key(&def)
            || self.functions.contains_key(&def)
    }

    pub fn type_params_of(&self, def: DefId) -> Option<&[TypeParam]> {
        if let Some(t) = self.structs.get(&def) {
            return Some(&t.type_params);
        }
        if let Some(t) = self.unions.get(&def) {
            return Some(&t.type_params);
        }
        self.functions.get(&def).map(|t| t.type_params.as_slice())
    }

    pub fn extension(&self, template: DefId, method: &str) -> Option<&MethodTemplate> {
        self.extensions.get(&template)?.iter().find(|m| m.name == method)
    }

    pub fn extension_mut(&mut self, template: DefId, method: &str) -> Option<&mut MethodTemplate> {
        self.extensions
            .get_mut(&template)?
            .iter_mut()
            .find(|m| m.name == method)
    }

    pub fn concrete_method(&self, owner: DefId, method: &str) -> Option<&ConcreteMethod> {
        self.methods.get(&owner)?.get(method)
    }

    /// Find a method by its definition, wherever it was declared.
    pub fn method_by_def(&self, def: DefId) -> Option<&MethodTemplate> {
        self.extensions.values().flatten().find(|m| m.def == def)
    }

    pub fn add_extension(&mut self, template: DefId, method: MethodTemplate) {
        self.extensions.entry(template).or_default().push(method);
    }

    pub fn add_method(&mut self, owner: DefId, name: String, method: ConcreteMethod) {
        self.methods.entry(owner).or_default().insert(name, method);
    }
}

/// Map each type parameter name to its argument. Extra or missing
/// arguments are the caller's concern.
pub fn substitution_map(params: &[TypeParam], args: &[Type]) -> FxHashMap<String, Type> {
    params
        .iter()
        .zip(args)
        .map(|(p, a)| (p.name.clone(), a.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitution_map_pairs_positionally() {
        let params = vec![TypeParam::new("T"), TypeParam::new("U")];
        let map = substitution_map(&params, &[Type::Int, Type::Bool]);
        assert_eq!(map["T"], Type::Int);
        assert_eq!(map["U"], Type::Bool);
    }

    #[test]
    fn extension_lookup_by_template() {
        let mut templates = GenericTemplates::new();
        templates.add_extension(
            DefId(3),
            MethodTemplate {
                def: DefId(9),
                name: "get".into(),
                owner_params: vec![TypeParam::new("T")],
                method_params: vec![],
                params: vec![],
                returns: Type::param("T"),
                body: None,
                intrinsic: false,
                span: Span::DUMMY,
            },
        );
        assert!(templates.extension(DefId(3), "get").is_some());
        assert!(templates.extension(DefId(3), "set").is_none());
        assert_eq!(templates.method_by_def(DefId(9)).map(|m| m.name.as_str()), Some("get"));
    }
}
