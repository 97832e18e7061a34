//! The instantiation driver.
//!
//! A worklist of pending requests, seeded from the checker's request set.
//! Processing a function or extension request substitutes its template
//! body, and the body can ask for further instantiations; those are pushed
//! back one level deeper. A processed-key set makes every request run at
//! most once, and the depth limit stops instantiation chains that would
//! never close (`f[T]` calling `f[Box[T]]`).

use std::collections::VecDeque;

use indexmap::IndexMap;
use koral_common::{CompilerConfig, Span};
use koral_typeck::context::CompilerContext;
use koral_typeck::def_id::{AccessModifier, DefMetadata};
use koral_typeck::fold::{walk_expr, walk_global, TypedFolder};
use koral_typeck::instantiation::InstantiationKey;
use koral_typeck::templates::GenericTemplates;
use koral_typeck::traits::TraitRegistry;
use koral_typeck::typed::{TypedExpr, TypedExprKind, TypedGlobal};
use koral_typeck::{CheckedProgram, DefId, InstantiationKind, InstantiationRequest, Type};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{MonoError, MonoErrorKind};
use crate::functions::FunctionEntry;
use crate::substitute::Substituter;

/// A generics-free program.
#[derive(Debug)]
pub struct MonomorphizedProgram {
    pub context: CompilerContext,
    /// Type declarations (each after the types it holds by value), then
    /// instantiated functions in completion order, then the program's own
    /// variables and functions.
    pub globals: Vec<TypedGlobal>,
}

impl MonomorphizedProgram {
    /// The global with the given emitted identifier.
    pub fn global(&self, identifier: &str) -> Option<&TypedGlobal> {
        self.globals.iter().find(|g| g.identifier() == identifier)
    }
}

#[derive(Debug)]
pub(crate) struct Pending {
    pub request: InstantiationRequest,
    pub depth: usize,
}

pub(crate) struct Monomorphizer {
    pub ctx: CompilerContext,
    pub templates: GenericTemplates,
    pub traits: TraitRegistry,
    pub max_depth: usize,
    queue: VecDeque<Pending>,
    processed: FxHashSet<InstantiationKey>,
    /// Application key to the instantiated type, in instantiation order.
    /// Holds the placeholder while the instantiation's own members are
    /// being resolved.
    pub types: IndexMap<String, Type>,
    /// Declared function and extension instantiations, in declaration order.
    pub functions: IndexMap<String, FunctionEntry>,
    pub type_decls: Vec<TypedGlobal>,
    pub function_decls: Vec<TypedGlobal>,
}

impl Monomorphizer {
    pub fn new(context: CompilerContext, templates: GenericTemplates, traits: TraitRegistry, max_depth: usize) -> Self {
        Monomorphizer {
            ctx: context,
            templates,
            traits,
            max_depth,
            queue: VecDeque::new(),
            processed: FxHashSet::default(),
            types: IndexMap::new(),
            functions: IndexMap::new(),
            type_decls: Vec::new(),
            function_decls: Vec::new(),
        }
    }

    pub fn enqueue(&mut self, kind: InstantiationKind, span: Span, depth: usize) {
        self.queue.push_back(Pending {
            request: InstantiationRequest::new(kind, span),
            depth,
        });
    }

    pub fn depth_exceeded(&self, name: String, span: Span) -> MonoError {
        MonoError::new(
            MonoErrorKind::DepthExceeded {
                limit: self.max_depth,
                name,
            },
            span,
        )
    }

    fn request_name(&self, request: &InstantiationRequest) -> String {
        let show = |types: &[Type]| -> String {
            types.iter()
                .map(|a| self.ctx.debug_name(a))
                .collect::<Vec<_>>()
                .join(", ")
        };
        match &request.kind {
            InstantiationKind::Struct { template, args }
            | InstantiationKind::Union { template, args }
            | InstantiationKind::Function { template, args } => {
                format!("{}[{}]", self.ctx.name_of(*template), show(args))
            }
            InstantiationKind::ExtensionMethod {
                base,
                base_args,
                method,
                ..
            } => format!("{}[{}].{}", self.ctx.name_of(*base), show(base_args), method),
        }
    }

    /// Run pending requests until the queue is empty.
    pub fn drain(&mut self) -> Result<(), MonoError> {
        while let Some(pending) = self.queue.pop_front() {
            self.process(pending)?;
        }
        Ok(())
    }

    /// The request with every argument replaced by its instantiation, so
    /// its key tells apart types whose unresolved keys coincide.
    fn resolve_request(&mut self, request: InstantiationRequest, depth: usize) -> Result<InstantiationRequest, MonoError> {
        let span = request.span;
        let kind = match request.kind {
            InstantiationKind::Struct { template, args } => InstantiationKind::Struct {
                template,
                args: self.resolve_types(&args, depth, span)?,
            },
            InstantiationKind::Union { template, args } => InstantiationKind::Union {
                template,
                args: self.resolve_types(&args, depth, span)?,
            },
            InstantiationKind::Function { template, args } => InstantiationKind::Function {
                template,
                args: self.resolve_types(&args, depth, span)?,
            },
            InstantiationKind::ExtensionMethod {
                base,
                base_args,
                method,
                method_args,
            } => InstantiationKind::ExtensionMethod {
                base,
                base_args: self.resolve_types(&base_args, depth, span)?,
                method,
                method_args: self.resolve_types(&method_args, depth, span)?,
            },
        };
        Ok(InstantiationRequest::new(kind, span))
    }

    fn process(&mut self, pending: Pending) -> Result<(), MonoError> {
        let Pending { request, depth } = pending;
        if depth > self.max_depth {
            let key = request.key(&self.ctx);
            if self.processed.contains(&key) {
                return Ok(());
            }
            return Err(self.depth_exceeded(self.request_name(&request), request.span));
        }
        let request = self.resolve_request(request, depth)?;
        if !self.processed.insert(request.key(&self.ctx)) {
            return Ok(());
        }
        tracing::trace!(request = %self.request_name(&request), depth, "instantiating");

        let span = request.span;
        match request.kind {
            InstantiationKind::Struct { template, args } | InstantiationKind::Union { template, args } => {
                self.instantiate_type(template, args, depth, span)?;
            }
            InstantiationKind::Function { template, args } => {
                self.emit_function(template, &args, depth, span)?;
            }
            InstantiationKind::ExtensionMethod {
                base,
                base_args,
                method,
                method_args,
            } => {
                self.emit_extension(base, &base_args, &method, &method_args, depth, span)?;
            }
        }
        Ok(())
    }

    /// `name` for a new instantiation declared next to `origin`, or
    /// `name_N` for the first `N` free if a declaration already has that
    /// name where the instantiation would be visible.
    pub fn instance_name(&self, origin: &DefMetadata, name: String) -> String {
        let defs = self.ctx.defs();
        let taken = |candidate: &str| {
            defs.lookup_exact(&origin.module_path, candidate, Some(&origin.source_file))
                .is_some()
                || (origin.access != AccessModifier::Private
                    && defs.lookup_exact(&origin.module_path, candidate, None).is_some())
        };
        if !taken(&name) {
            return name;
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}_{}", name, n);
            if !taken(&candidate) {
                tracing::debug!(%name, %candidate, "instantiation renamed to avoid a declared name");
                return candidate;
            }
            n += 1;
        }
    }

    /// Rewrite one of the program's own globals: resolve generic
    /// applications in its types and lower what the backend cannot call.
    fn rewrite_global(&mut self, global: TypedGlobal) -> Result<TypedGlobal, MonoError> {
        let global = {
            let mut folder = Substituter::new(self, FxHashMap::default(), 0);
            folder.fold_global(global)?
        };
        match &global {
            TypedGlobal::StructDeclaration { def, members, .. } => {
                self.ctx.defs_mut().set_struct_members(*def, members.clone());
            }
            TypedGlobal::UnionDeclaration { def, cases, .. } => {
                self.ctx.defs_mut().set_union_cases(*def, cases.clone());
            }
            _ => {}
        }
        Ok(global)
    }
}

/// Instantiate every generic entity `checked` needs and return the
/// generics-free program.
#[tracing::instrument(level = "debug", skip_all)]
pub fn monomorphize(checked: CheckedProgram, config: &CompilerConfig) -> Result<MonomorphizedProgram, MonoError> {
    let CheckedProgram {
        context,
        templates,
        traits,
        globals,
        requests,
    } = checked;
    let mut mono = Monomorphizer::new(
        context,
        templates,
        traits,
        config.monomorphization.max_recursion_depth,
    );
    for request in requests.requests() {
        mono.enqueue(request.kind.clone(), request.span, 0);
    }
    mono.drain()?;

    let mut own_types = Vec::new();
    let mut own_values = Vec::new();
    for global in globals {
        let rewritten = mono.rewrite_global(global)?;
        if rewritten.is_type_declaration() {
            own_types.push(rewritten);
        } else {
            own_values.push(rewritten);
        }
    }
    mono.drain()?;

    let Monomorphizer {
        ctx,
        type_decls,
        function_decls,
        ..
    } = mono;

    let mut types = own_types;
    types.extend(type_decls);
    let mut output = order_type_declarations(types);
    output.extend(function_decls);
    output.extend(own_values);

    check_closed(&ctx, &output)?;
    tracing::debug!(globals = output.len(), "monomorphization finished");
    Ok(MonomorphizedProgram {
        context: ctx,
        globals: output,
    })
}

// ── Output ─────────────────────────────────────────────────────────────

/// Nominal declarations `ty` stores inline. References and pointers do
/// not count; they do not need the pointee's layout.
fn by_value_nominals(ty: &Type, out: &mut Vec<DefId>) {
    match ty {
        Type::Structure(n) | Type::Union(n) => out.push(n.def),
        Type::GenericStruct { args, .. } | Type::GenericUnion { args, .. } => {
            for arg in args {
                by_value_nominals(arg, out);
            }
        }
        _ => {}
    }
}

fn declaration_dependencies(global: &TypedGlobal) -> Vec<DefId> {
    let mut deps = Vec::new();
    match global {
        TypedGlobal::StructDeclaration { members, .. } => {
            for member in members {
                by_value_nominals(&member.ty, &mut deps);
            }
        }
        TypedGlobal::UnionDeclaration { cases, .. } => {
            for param in cases.iter().flat_map(|c| &c.params) {
                by_value_nominals(&param.ty, &mut deps);
            }
        }
        _ => {}
    }
    deps
}

/// Stable depth-first order: each declaration after the declarations it
/// holds by value, otherwise in input order.
fn order_type_declarations(decls: Vec<TypedGlobal>) -> Vec<TypedGlobal> {
    let index: IndexMap<DefId, usize> = decls.iter().enumerate().map(|(i, g)| (g.def(), i)).collect();
    let deps: Vec<Vec<usize>> = decls
        .iter()
        .map(|g| {
            declaration_dependencies(g)
                .into_iter()
                .filter_map(|d| index.get(&d).copied())
                .collect()
        })
        .collect();

    fn visit(at: usize, deps: &[Vec<usize>], seen: &mut [bool], order: &mut Vec<usize>) {
        if seen[at] {
            return;
        }
        seen[at] = true;
        for &dep in &deps[at] {
            visit(dep, deps, seen, order);
        }
        order.push(at);
    }

    let mut seen = vec![false; decls.len()];
    let mut order = Vec::with_capacity(decls.len());
    for at in 0..decls.len() {
        visit(at, &deps, &mut seen, &mut order);
    }

    let mut slots: Vec<Option<TypedGlobal>> = decls.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}

/// Rejects any generic type or dispatch that survived instantiation.
struct ClosureCheck<'c> {
    ctx: &'c CompilerContext,
    site: String,
    span: Span,
}

impl ClosureCheck<'_> {
    fn unresolved(&self, ty: String) -> MonoError {
        MonoError::new(
            MonoErrorKind::Unresolved {
                ty,
                site: self.site.clone(),
            },
            self.span,
        )
    }
}

impl TypedFolder for ClosureCheck<'_> {
    type Error = MonoError;

    fn fold_type(&mut self, ty: Type) -> Result<Type, MonoError> {
        if self.ctx.is_unresolved(&ty) {
            return Err(self.unresolved(self.ctx.debug_name(&ty)));
        }
        Ok(ty)
    }

    fn fold_expr(&mut self, expr: TypedExpr) -> Result<TypedExpr, MonoError> {
        self.span = expr.span;
        match &expr.kind {
            TypedExprKind::GenericCall { template, .. } => {
                return Err(self.unresolved(format!("call of `{}`", self.ctx.name_of(*template))));
            }
            TypedExprKind::MethodCall { method, .. } => {
                return Err(self.unresolved(format!("method `{}`", method)));
            }
            _ => {}
        }
        walk_expr(self, expr)
    }
}

fn check_closed(ctx: &CompilerContext, globals: &[TypedGlobal]) -> Result<(), MonoError> {
    for global in globals {
        let mut check = ClosureCheck {
            ctx,
            site: global.identifier().to_string(),
            span: Span::DUMMY,
        };
        walk_global(&mut check, global.clone())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use koral_typeck::def_id::{DefKind, StructMember, TypeDefKind};
    use koral_typeck::ty::Nominal;

    fn declare(ctx: &mut CompilerContext, name: &str) -> DefId {
        ctx.defs_mut().allocate(
            &[],
            name,
            DefKind::Type(TypeDefKind::Struct),
            "main.koral",
            AccessModifier::Default,
            Span::DUMMY,
        )
    }

    fn member(name: &str, ty: Type) -> StructMember {
        StructMember {
            name: name.into(),
            ty,
            mutable: false,
            access: AccessModifier::Default,
        }
    }

    fn structure(def: DefId, identifier: &str, members: Vec<StructMember>) -> TypedGlobal {
        TypedGlobal::StructDeclaration {
            def,
            identifier: identifier.into(),
            members,
        }
    }

    // ── Ordering ───────────────────────────────────────────────────────

    #[test]
    fn value_members_come_first() {
        let mut ctx = CompilerContext::new();
        let outer = declare(&mut ctx, "Outer");
        let inner = declare(&mut ctx, "Inner");
        let decls = vec![
            structure(outer, "Outer", vec![member("inner", Type::Structure(Nominal::new(inner, "Inner")))]),
            structure(inner, "Inner", vec![member("x", Type::Int)]),
        ];
        let ordered = order_type_declarations(decls);
        let names: Vec<&str> = ordered.iter().map(|g| g.identifier()).collect();
        assert_eq!(names, vec!["Inner", "Outer"]);
    }

    #[test]
    fn references_do_not_reorder() {
        let mut ctx = CompilerContext::new();
        let a = declare(&mut ctx, "A");
        let b = declare(&mut ctx, "B");
        let decls = vec![
            structure(a, "A", vec![member("b", Type::reference(Type::Structure(Nominal::new(b, "B"))))]),
            structure(b, "B", vec![member("a", Type::reference(Type::Structure(Nominal::new(a, "A"))))]),
        ];
        let ordered = order_type_declarations(decls);
        let names: Vec<&str> = ordered.iter().map(|g| g.identifier()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    // ── Requests ───────────────────────────────────────────────────────

    #[test]
    fn requests_are_named_with_their_arguments() {
        let mut ctx = CompilerContext::new();
        let boxed = declare(&mut ctx, "Box");
        let mono = Monomorphizer::new(ctx, GenericTemplates::new(), TraitRegistry::with_builtins(), 4);
        let function = InstantiationRequest::new(
            InstantiationKind::Function {
                template: boxed,
                args: vec![Type::Int, Type::Bool],
            },
            Span::DUMMY,
        );
        assert_eq!(mono.request_name(&function), "Box[Int, Bool]");
        let extension = InstantiationRequest::new(
            InstantiationKind::ExtensionMethod {
                base: boxed,
                base_args: vec![Type::Int],
                method: "get".into(),
                method_args: vec![],
            },
            Span::DUMMY,
        );
        assert_eq!(mono.request_name(&extension), "Box[Int].get");
    }

    #[test]
    fn queued_request_past_the_limit_is_rejected() {
        let mut ctx = CompilerContext::new();
        let boxed = declare(&mut ctx, "Box");
        let mut mono = Monomorphizer::new(ctx, GenericTemplates::new(), TraitRegistry::with_builtins(), 2);
        mono.enqueue(
            InstantiationKind::Struct {
                template: boxed,
                args: vec![Type::Int],
            },
            Span::new(1, 2),
            3,
        );
        let err = mono.drain().unwrap_err();
        assert_eq!(
            err.kind,
            MonoErrorKind::DepthExceeded {
                limit: 2,
                name: "Box[Int]".into(),
            }
        );
    }

    // ── Closure ────────────────────────────────────────────────────────

    #[test]
    fn surviving_parameter_is_reported() {
        let ctx = CompilerContext::new();
        let global = TypedGlobal::Variable {
            def: DefId(0),
            identifier: "leak".into(),
            ty: Type::Int,
            mutable: false,
            value: TypedExpr::variable("x", None, Type::param("T"), Span::new(4, 5)),
        };
        let err = check_closed(&ctx, &[global]).unwrap_err();
        assert!(matches!(
            &err.kind,
            MonoErrorKind::Unresolved { site, .. } if site == "leak"
        ));
        assert_eq!(err.span, Span::new(4, 5));
    }
}
