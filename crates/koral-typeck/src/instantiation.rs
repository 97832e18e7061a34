//! Instantiation requests and their deduplicating key.
//!
//! A request names one generic entity plus concrete type arguments at a
//! use site. Requests for the same entity and arguments from different
//! sites collapse to one: the key is built from the template identity and
//! the arguments' layout keys, never from the span.

use indexmap::IndexMap;
use koral_common::Span;

use crate::context::CompilerContext;
use crate::def_id::DefId;
use crate::ty::Type;

#[derive(Clone, Debug, PartialEq)]
pub enum InstantiationKind {
    Struct { template: DefId, args: Vec<Type> },
    Union { template: DefId, args: Vec<Type> },
    Function { template: DefId, args: Vec<Type> },
    /// A method of `given [..]Base { .. }` applied to `base_args`, plus the
    /// method's own type arguments.
    ExtensionMethod {
        base: DefId,
        base_args: Vec<Type>,
        method: String,
        method_args: Vec<Type>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KindTag {
    Struct,
    Union,
    Function,
    ExtensionMethod,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstantiationKey {
    pub tag: KindTag,
    pub template: DefId,
    pub args: Vec<String>,
    pub method: Option<String>,
    pub method_args: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InstantiationRequest {
    pub kind: InstantiationKind,
    pub span: Span,
}

impl InstantiationRequest {
    pub fn new(kind: InstantiationKind, span: Span) -> Self {
        InstantiationRequest { kind, span }
    }

    pub fn key(&self, ctx: &CompilerContext) -> InstantiationKey {
        let keys = |args: &[Type]| -> Vec<String> {
            args.iter().map(|a| ctx.layout_key(a)).collect()
        };
        match &self.kind {
            InstantiationKind::Struct { template, args } => InstantiationKey {
                tag: KindTag::Struct,
                template: *template,
                args: keys(args),
                method: None,
                method_args: Vec::new(),
            },
            InstantiationKind::Union { template, args } => InstantiationKey {
                tag: KindTag::Union,
                template: *template,
                args: keys(args),
                method: None,
                method_args: Vec::new(),
            },
            InstantiationKind::Function { template, args } => InstantiationKey {
                tag: KindTag::Function,
                template: *template,
                args: keys(args),
                method: None,
                method_args: Vec::new(),
            },
            InstantiationKind::ExtensionMethod {
                base,
                base_args,
                method,
                method_args,
            } => InstantiationKey {
                tag: KindTag::ExtensionMethod,
                template: *base,
                args: keys(base_args),
                method: Some(method.clone()),
                method_args: keys(method_args),
            },
        }
    }

    /// Every type argument of the request.
    pub fn type_args(&self) -> Vec<&Type> {
        match &self.kind {
            InstantiationKind::Struct { args, .. }
            | InstantiationKind::Union { args, .. }
            | InstantiationKind::Function { args, .. } => args.iter().collect(),
            InstantiationKind::ExtensionMethod {
                base_args,
                method_args,
                ..
            } => base_args.iter().chain(method_args).collect(),
        }
    }

    /// The same request with `f` applied to every type argument.
    pub fn map_types(&self, f: impl Fn(&Type) -> Type) -> InstantiationRequest {
        let map = |args: &[Type]| -> Vec<Type> { args.iter().map(&f).collect() };
        let kind = match &self.kind {
            InstantiationKind::Struct { template, args } => InstantiationKind::Struct {
                template: *template,
                args: map(args),
            },
            InstantiationKind::Union { template, args } => InstantiationKind::Union {
                template: *template,
                args: map(args),
            },
            InstantiationKind::Function { template, args } => InstantiationKind::Function {
                template: *template,
                args: map(args),
            },
            InstantiationKind::ExtensionMethod {
                base,
                base_args,
                method,
                method_args,
            } => InstantiationKind::ExtensionMethod {
                base: *base,
                base_args: map(base_args),
                method: method.clone(),
                method_args: map(method_args),
            },
        };
        InstantiationRequest::new(kind, self.span)
    }

    /// Whether every argument is concrete enough to instantiate now.
    pub fn is_concrete(&self, ctx: &CompilerContext) -> bool {
        self.type_args().into_iter().all(|a| {
            !ctx.contains_generic_parameter(a) && !ctx.contains_type_variable(a)
        })
    }
}

/// Requests in first-seen order, deduplicated by key.
#[derive(Clone, Debug, Default)]
pub struct RequestSet {
    requests: IndexMap<InstantiationKey, InstantiationRequest>,
}

impl RequestSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when an equal request was already present.
    pub fn insert(&mut self, ctx: &CompilerContext, request: InstantiationRequest) -> bool {
        let key = request.key(ctx);
        if self.requests.contains_key(&key) {
            return false;
        }
        self.requests.insert(key, request);
        true
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InstantiationKey, &InstantiationRequest)> {
        self.requests.iter()
    }

    pub fn requests(&self) -> impl Iterator<Item = &InstantiationRequest> {
        self.requests.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::def_id::{AccessModifier, DefKind, TemplateKind};

    fn pair(ctx: &mut CompilerContext) -> DefId {
        ctx.defs_mut().allocate(
            &[],
            "Pair",
            DefKind::GenericTemplate(TemplateKind::Struct),
            "main.koral",
            AccessModifier::Default,
            Span::DUMMY,
        )
    }

    #[test]
    fn same_arguments_from_different_sites_collapse() {
        let mut ctx = CompilerContext::new();
        let template = pair(&mut ctx);
        let mut set = RequestSet::new();
        let kind = InstantiationKind::Struct {
            template,
            args: vec![Type::Int, Type::Bool],
        };
        assert!(set.insert(&ctx, InstantiationRequest::new(kind.clone(), Span::new(0, 4))));
        assert!(!set.insert(&ctx, InstantiationRequest::new(kind, Span::new(20, 24))));
        assert_eq!(set.len(), 1);
        let (key, _) = set.iter().next().unwrap();
        assert_eq!(key.args, vec!["I".to_string(), "B".to_string()]);
    }

    #[test]
    fn different_arguments_are_distinct() {
        let mut ctx = CompilerContext::new();
        let template = pair(&mut ctx);
        let mut set = RequestSet::new();
        for args in [vec![Type::Int, Type::Bool], vec![Type::Bool, Type::Int]] {
            set.insert(
                &ctx,
                InstantiationRequest::new(InstantiationKind::Struct { template, args }, Span::DUMMY),
            );
        }
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn kind_is_part_of_the_key() {
        let mut ctx = CompilerContext::new();
        let template = pair(&mut ctx);
        let as_struct = InstantiationRequest::new(
            InstantiationKind::Struct {
                template,
                args: vec![Type::Int],
            },
            Span::DUMMY,
        );
        let as_function = InstantiationRequest::new(
            InstantiationKind::Function {
                template,
                args: vec![Type::Int],
            },
            Span::DUMMY,
        );
        assert_ne!(as_struct.key(&ctx), as_function.key(&ctx));
    }

    #[test]
    fn parameters_are_not_concrete() {
        let mut ctx = CompilerContext::new();
        let template = pair(&mut ctx);
        let request = InstantiationRequest::new(
            InstantiationKind::Function {
                template,
                args: vec![Type::pointer(Type::param("T"))],
            },
            Span::DUMMY,
        );
        assert!(!request.is_concrete(&ctx));
    }
}
