//! Trait registry, conformance lookup and trait-bound satisfaction.
//!
//! Holds trait definitions and `given Type Trait { .. }` conformances. Also
//! knows the compiler-recognized traits used for operator dispatch
//! (`Equatable`, `Comparable`, `Add`, `Sub`, `Mul`, `Div`, `Rem`), which
//! every primitive numeric type satisfies without a conformance.

use indexmap::IndexMap;
use koral_common::Span;
use rustc_hash::FxHashMap;

use crate::context::CompilerContext;
use crate::def_id::DefId;
use crate::error::{SemanticError, SemanticErrorKind};
use crate::ty::Type;

/// The receiver is implicit; `Self` appears as `GenericParameter("Self")`.
#[derive(Clone, Debug, PartialEq)]
pub struct TraitMethodSig {
    pub name: String,
    pub params: Vec<Type>,
    pub returns: Type,
}

impl TraitMethodSig {
    /// The signature with `Self` replaced, receiver excluded.
    pub fn for_self(&self, self_ty: &Type) -> (Vec<Type>, Type) {
        let mut map = FxHashMap::default();
        map.insert("Self".to_string(), self_ty.clone());
        (
            self.params.iter().map(|p| p.substitute(&map)).collect(),
            self.returns.substitute(&map),
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TraitDef {
    pub name: String,
    pub methods: Vec<TraitMethodSig>,
    pub builtin: bool,
}

impl TraitDef {
    pub fn method(&self, name: &str) -> Option<&TraitMethodSig> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// What a conformance is declared on.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ImplTarget {
    /// A concrete nominal type.
    Type(Type),
    /// Every instantiation of a generic struct or union template.
    Template(DefId),
}

#[derive(Clone, Debug)]
pub struct ImplDef {
    pub trait_name: String,
    pub target: ImplTarget,
    /// Human-readable target name for error messages.
    pub target_name: String,
    /// Method name to the method's definition.
    pub methods: IndexMap<String, DefId>,
    pub span: Span,
}

#[derive(Default, Debug)]
pub struct TraitRegistry {
    traits: FxHashMap<String, TraitDef>,
    impls: FxHashMap<(String, ImplTarget), ImplDef>,
}

fn self_ty() -> Type {
    Type::param("Self")
}

fn binary_trait(name: &str, method: &str, returns: Type) -> TraitDef {
    TraitDef {
        name: name.to_string(),
        methods: vec![TraitMethodSig {
            name: method.to_string(),
            params: vec![self_ty()],
            returns,
        }],
        builtin: true,
    }
}

impl TraitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that already knows the operator traits.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_trait(binary_trait("Equatable", "equals", Type::Bool));
        registry.register_trait(binary_trait("Comparable", "compare", Type::Int));
        for (name, method) in [
            ("Add", "add"),
            ("Sub", "sub"),
            ("Mul", "mul"),
            ("Div", "div"),
            ("Rem", "rem"),
        ] {
            registry.register_trait(binary_trait(name, method, self_ty()));
        }
        registry
    }

    pub fn register_trait(&mut self, def: TraitDef) {
        self.traits.insert(def.name.clone(), def);
    }

    pub fn get_trait(&self, name: &str) -> Option<&TraitDef> {
        self.traits.get(name)
    }

    /// Register a conformance. Returns an error per trait method the
    /// conformance does not provide; the conformance is stored either way.
    pub fn register_impl(&mut self, impl_def: ImplDef) -> Vec<SemanticError> {
        let mut errors = Vec::new();
        if let Some(trait_def) = self.traits.get(&impl_def.trait_name) {
            for method in &trait_def.methods {
                if !impl_def.methods.contains_key(&method.name) {
                    errors.push(SemanticError::new(
                        SemanticErrorKind::MissingTraitMethod {
                            trait_name: impl_def.trait_name.clone(),
                            method: method.name.clone(),
                            ty: impl_def.target_name.clone(),
                        },
                        impl_def.span,
                    ));
                }
            }
        }
        tracing::debug!(
            trait_name = %impl_def.trait_name,
            target = %impl_def.target_name,
            "registered conformance"
        );
        self.impls
            .insert((impl_def.trait_name.clone(), impl_def.target.clone()), impl_def);
        errors
    }

    /// The conformance of `ty` to `trait_name`. Instantiated types and
    /// generic applications find the conformance of their template.
    pub fn find_impl(&self, trait_name: &str, ty: &Type, ctx: &CompilerContext) -> Option<&ImplDef> {
        let key = |target: ImplTarget| (trait_name.to_string(), target);
        match ty {
            Type::Structure(n) | Type::Union(n) | Type::Opaque(n) => self
                .impls
                .get(&key(ImplTarget::Type(ty.clone())))
                .or_else(|| {
                    let template = ctx.defs().template_of(n.def)?;
                    self.impls.get(&key(ImplTarget::Template(template)))
                }),
            Type::GenericStruct { template, .. } | Type::GenericUnion { template, .. } => {
                self.impls.get(&key(ImplTarget::Template(template.def)))
            }
            _ => None,
        }
    }

    /// Whether `ty` satisfies `trait_name`. Generic parameters satisfy the
    /// traits they are bounded by in `param_bounds`.
    pub fn satisfies(
        &self,
        trait_name: &str,
        ty: &Type,
        ctx: &CompilerContext,
        param_bounds: &FxHashMap<String, Vec<String>>,
    ) -> bool {
        if let Some(result) = builtin_satisfies(trait_name, ty) {
            return result;
        }
        match ty {
            Type::Never => true,
            Type::GenericParameter(name) => param_bounds
                .get(name)
                .is_some_and(|bounds| bounds.iter().any(|b| b == trait_name)),
            _ => self.find_impl(trait_name, ty, ctx).is_some(),
        }
    }

    /// The first trait among `bounds` that declares `method`.
    pub fn method_in_bounds(&self, bounds: &[String], method: &str) -> Option<(&TraitDef, &TraitMethodSig)> {
        bounds.iter().find_map(|bound| {
            let def = self.traits.get(bound)?;
            def.method(method).map(|sig| (def, sig))
        })
    }
}

/// Builtin answer for primitives; `None` when the conformance table decides.
fn builtin_satisfies(trait_name: &str, ty: &Type) -> Option<bool> {
    if !ty.is_primitive() || matches!(ty, Type::Never) {
        return None;
    }
    Some(match trait_name {
        "Equatable" => ty.is_numeric() || *ty == Type::Bool,
        "Comparable" | "Add" | "Sub" | "Mul" | "Div" => ty.is_numeric(),
        "Rem" => ty.is_integer(),
        _ => false,
    })
}

/// Compiler-recognized methods on primitive receivers: parameter types
/// (receiver excluded) and return type.
pub fn primitive_method(receiver: &Type, method: &str) -> Option<(Vec<Type>, Type)> {
    if !receiver.is_primitive() {
        return None;
    }
    let this = receiver.clone();
    match method {
        "equals" if builtin_satisfies("Equatable", receiver) == Some(true) => {
            Some((vec![this], Type::Bool))
        }
        "compare" if receiver.is_numeric() => Some((vec![this], Type::Int)),
        "add" | "sub" | "mul" | "div" if receiver.is_numeric() => {
            Some((vec![this.clone()], this))
        }
        "rem" if receiver.is_integer() => Some((vec![this.clone()], this)),
        "to_bits" => match receiver {
            Type::Float32 => Some((Vec::new(), Type::UInt32)),
            Type::Float64 => Some((Vec::new(), Type::UInt64)),
            _ => None,
        },
        _ => None,
    }
}

/// Everything trait-bound checks need in one place.
pub struct TraitScope<'a> {
    pub registry: &'a TraitRegistry,
    pub ctx: &'a CompilerContext,
    pub param_bounds: &'a FxHashMap<String, Vec<String>>,
}

impl TraitScope<'_> {
    pub fn satisfies(&self, trait_name: &str, ty: &Type) -> bool {
        self.registry
            .satisfies(trait_name, ty, self.ctx, self.param_bounds)
    }
}
