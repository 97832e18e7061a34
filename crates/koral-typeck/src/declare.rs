//! Declaration passes: everything known about a program before any body
//! is checked.
//!
//! In order:
//!
//! 1. an identity for every module of the import graph;
//! 2. name collection with duplicate detection, including the methods of
//!    `given` blocks (registered under `module_path + [target]`);
//! 3. template shells for generic declarations, so written applications
//!    like `[Int]Box` can be arity-checked before members are known;
//! 4. traits and bounds, then struct members, union cases, function
//!    signatures and annotated globals;
//! 5. `given` blocks: extension methods on generic types, direct methods
//!    on concrete types, trait conformances;
//! 6. value-type recursion among concrete structs and unions.

use indexmap::IndexMap;
use koral_common::{ModuleGraph, Span};
use rustc_hash::FxHashSet;

use crate::ast::{Declaration, FunctionDecl, GivenDecl, GlobalNode, Program, SourceRecord, TypeParam};
use crate::context::CompilerContext;
use crate::def_id::{
    AccessModifier, CaseParam, DefId, DefKind, StructMember, TemplateKind, TypeDefKind, UnionCase,
};
use crate::error::{SemanticError, SemanticErrorKind};
use crate::resolve::Resolver;
use crate::templates::{
    ConcreteMethod, FunctionTemplate, GenericTemplates, MethodTemplate, StructTemplate, UnionTemplate,
};
use crate::traits::{ImplDef, ImplTarget, TraitDef, TraitMethodSig, TraitRegistry};
use crate::ty::{Nominal, Type};
use crate::typed::TypedParam;

/// Identities assigned to one top-level declaration.
#[derive(Clone, Debug, PartialEq)]
pub enum Declared {
    Item(DefId),
    /// The block's methods, in declaration order.
    Given { methods: Vec<DefId> },
}

/// Mutable tables the declaration passes fill in.
pub struct Tables<'t> {
    pub ctx: &'t mut CompilerContext,
    pub templates: &'t mut GenericTemplates,
    pub traits: &'t mut TraitRegistry,
}

fn error(kind: SemanticErrorKind, span: Span) -> SemanticError {
    SemanticError::new(kind, span)
}

fn resolver<'r>(
    ctx: &'r CompilerContext,
    graph: &'r ModuleGraph,
    templates: &'r GenericTemplates,
    source: &'r SourceRecord,
) -> Resolver<'r> {
    Resolver {
        ctx,
        graph,
        templates,
        module: &source.module_path,
        file: &source.file,
    }
}

fn param_names<'p>(lists: impl IntoIterator<Item = &'p [TypeParam]>) -> Vec<String> {
    lists
        .into_iter()
        .flatten()
        .map(|p| p.name.clone())
        .collect()
}

/// Run every declaration pass. The result is aligned with
/// `program.declarations`.
#[tracing::instrument(level = "debug", skip_all, fields(declarations = program.declarations.len()))]
pub fn declare_program(
    program: &Program,
    graph: &ModuleGraph,
    tables: Tables<'_>,
) -> Result<Vec<Declared>, SemanticError> {
    let Tables {
        ctx,
        templates,
        traits,
    } = tables;

    declare_modules(graph, ctx);
    let declared = program
        .declarations
        .iter()
        .map(|decl| collect_name(ctx, decl))
        .collect::<Result<Vec<_>, _>>()?;

    register_shells(program, &declared, templates);
    declare_traits(program, graph, ctx, templates, traits)?;
    check_bounds(program, traits)?;

    for (decl, entry) in program.declarations.iter().zip(&declared) {
        match (entry, &decl.node) {
            (Declared::Item(def), _) => resolve_item(*def, decl, graph, ctx, templates)?,
            (Declared::Given { methods }, GlobalNode::Given(given)) => {
                declare_given(given, methods, &decl.source, graph, ctx, templates, traits)?
            }
            _ => {}
        }
    }

    check_recursion(program, &declared, ctx)?;
    Ok(declared)
}

// ── Names ──────────────────────────────────────────────────────────────

fn declare_modules(graph: &ModuleGraph, ctx: &mut CompilerContext) {
    for module in graph.modules() {
        let Some((last, parent)) = module.path.split_last() else {
            continue;
        };
        let defs = ctx.defs_mut();
        let exists = defs
            .lookup_exact(parent, last, None)
            .is_some_and(|def| defs.kind(def) == Some(DefKind::Module));
        if !exists {
            defs.allocate(parent, last, DefKind::Module, "", AccessModifier::Default, Span::DUMMY);
        }
    }
}

/// A private declaration clashes only with its own file; anything else
/// also clashes with the module's public names.
fn allocate_unique(
    ctx: &mut CompilerContext,
    scope: &[String],
    name: &str,
    kind: DefKind,
    file: &str,
    access: AccessModifier,
    span: Span,
) -> Result<DefId, SemanticError> {
    let defs = ctx.defs();
    let mut existing = defs.lookup_exact(scope, name, Some(file));
    if access != AccessModifier::Private {
        existing = existing.or_else(|| defs.lookup_exact(scope, name, None));
    }
    if existing.is_some_and(|def| defs.kind(def) != Some(DefKind::Module)) {
        return Err(error(
            SemanticErrorKind::DuplicateDefinition {
                name: name.to_string(),
            },
            span,
        ));
    }
    Ok(ctx.defs_mut().allocate(scope, name, kind, file, access, span))
}

fn template_or(params: &[TypeParam], template: TemplateKind, concrete: DefKind) -> DefKind {
    if params.is_empty() {
        concrete
    } else {
        DefKind::GenericTemplate(template)
    }
}

fn collect_name(ctx: &mut CompilerContext, decl: &Declaration) -> Result<Declared, SemanticError> {
    let source = &decl.source;
    let (name, kind, access, span) = match &decl.node {
        GlobalNode::Struct(s) => (
            &s.name,
            template_or(&s.type_params, TemplateKind::Struct, DefKind::Type(TypeDefKind::Struct)),
            s.access,
            s.span,
        ),
        GlobalNode::Union(u) => (
            &u.name,
            template_or(&u.type_params, TemplateKind::Union, DefKind::Type(TypeDefKind::Union)),
            u.access,
            u.span,
        ),
        GlobalNode::Opaque(o) => (&o.name, DefKind::Type(TypeDefKind::Opaque), o.access, o.span),
        GlobalNode::Trait(t) => (&t.name, DefKind::Type(TypeDefKind::Trait), t.access, t.span),
        GlobalNode::Function(f) => (
            &f.name,
            template_or(&f.type_params, TemplateKind::Function, DefKind::Function),
            f.access,
            f.span,
        ),
        GlobalNode::Let(l) => (&l.name, DefKind::Variable, l.access, l.span),
        GlobalNode::Given(given) => {
            let mut scope = source.module_path.clone();
            scope.push(given.target.clone());
            let methods = given
                .methods
                .iter()
                .map(|m| {
                    allocate_unique(ctx, &scope, &m.name, DefKind::Function, &source.file, m.access, m.span)
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Declared::Given { methods });
        }
    };
    let def = allocate_unique(ctx, &source.module_path, name, kind, &source.file, access, span)?;
    Ok(Declared::Item(def))
}

fn register_shells(program: &Program, declared: &[Declared], templates: &mut GenericTemplates) {
    for (decl, entry) in program.declarations.iter().zip(declared) {
        let Declared::Item(def) = *entry else {
            continue;
        };
        match &decl.node {
            GlobalNode::Struct(s) if !s.type_params.is_empty() => {
                templates.structs.insert(
                    def,
                    StructTemplate {
                        def,
                        name: s.name.clone(),
                        type_params: s.type_params.clone(),
                        members: Vec::new(),
                        span: s.span,
                    },
                );
            }
            GlobalNode::Union(u) if !u.type_params.is_empty() => {
                templates.unions.insert(
                    def,
                    UnionTemplate {
                        def,
                        name: u.name.clone(),
                        type_params: u.type_params.clone(),
                        cases: Vec::new(),
                        span: u.span,
                    },
                );
            }
            GlobalNode::Function(f) if !f.type_params.is_empty() => {
                templates.functions.insert(
                    def,
                    FunctionTemplate {
                        def,
                        name: f.name.clone(),
                        type_params: f.type_params.clone(),
                        params: Vec::new(),
                        returns: Type::Void,
                        body: None,
                        intrinsic: f.body.is_none(),
                        span: f.span,
                    },
                );
            }
            _ => {}
        }
    }
}

// ── Traits ─────────────────────────────────────────────────────────────

fn declare_traits(
    program: &Program,
    graph: &ModuleGraph,
    ctx: &CompilerContext,
    templates: &GenericTemplates,
    traits: &mut TraitRegistry,
) -> Result<(), SemanticError> {
    let self_param = ["Self".to_string()];
    for decl in &program.declarations {
        let GlobalNode::Trait(t) = &decl.node else {
            continue;
        };
        let r = resolver(ctx, graph, templates, &decl.source);
        let mut methods = Vec::with_capacity(t.methods.len());
        for m in &t.methods {
            let params = m
                .params
                .iter()
                .map(|p| r.resolve_type(&p.ty, &self_param))
                .collect::<Result<Vec<_>, _>>()?;
            let returns = match &m.returns {
                Some(node) => r.resolve_type(node, &self_param)?,
                None => Type::Void,
            };
            methods.push(TraitMethodSig {
                name: m.name.clone(),
                params,
                returns,
            });
        }
        traits.register_trait(TraitDef {
            name: t.name.clone(),
            methods,
            builtin: false,
        });
    }
    Ok(())
}

fn check_bounds(program: &Program, traits: &TraitRegistry) -> Result<(), SemanticError> {
    let check = |params: &[TypeParam], span: Span| -> Result<(), SemanticError> {
        for bound in params.iter().flat_map(|p| &p.bounds) {
            if traits.get_trait(bound).is_none() {
                return Err(error(
                    SemanticErrorKind::UnknownTrait {
                        name: bound.clone(),
                    },
                    span,
                ));
            }
        }
        Ok(())
    };
    for decl in &program.declarations {
        match &decl.node {
            GlobalNode::Struct(s) => check(&s.type_params, s.span)?,
            GlobalNode::Union(u) => check(&u.type_params, u.span)?,
            GlobalNode::Function(f) => check(&f.type_params, f.span)?,
            GlobalNode::Given(g) => {
                check(&g.type_params, g.span)?;
                for m in &g.methods {
                    check(&m.type_params, m.span)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

// ── Members and signatures ─────────────────────────────────────────────

fn signature(
    r: &Resolver<'_>,
    f: &FunctionDecl,
    params: &[String],
) -> Result<(Vec<TypedParam>, Type), SemanticError> {
    let typed = f
        .params
        .iter()
        .map(|p| {
            Ok(TypedParam {
                name: p.name.clone(),
                ty: r.resolve_type(&p.ty, params)?,
            })
        })
        .collect::<Result<Vec<_>, SemanticError>>()?;
    let returns = match &f.returns {
        Some(node) => r.resolve_type(node, params)?,
        None => Type::Void,
    };
    Ok((typed, returns))
}

fn resolve_item(
    def: DefId,
    decl: &Declaration,
    graph: &ModuleGraph,
    ctx: &mut CompilerContext,
    templates: &mut GenericTemplates,
) -> Result<(), SemanticError> {
    match &decl.node {
        GlobalNode::Struct(s) => {
            let params = param_names([s.type_params.as_slice()]);
            let members = {
                let r = resolver(ctx, graph, templates, &decl.source);
                s.fields
                    .iter()
                    .map(|f| {
                        Ok(StructMember {
                            name: f.name.clone(),
                            ty: r.resolve_type(&f.ty, &params)?,
                            mutable: f.mutable,
                            access: f.access,
                        })
                    })
                    .collect::<Result<Vec<_>, SemanticError>>()?
            };
            match templates.structs.get_mut(&def) {
                Some(template) => template.members = members,
                None => ctx.defs_mut().set_struct_members(def, members),
            }
        }
        GlobalNode::Union(u) => {
            let params = param_names([u.type_params.as_slice()]);
            let cases = {
                let r = resolver(ctx, graph, templates, &decl.source);
                let mut cases = Vec::with_capacity(u.cases.len());
                for case in &u.cases {
                    let params = case
                        .params
                        .iter()
                        .map(|(name, ty)| {
                            Ok(CaseParam {
                                name: name.clone(),
                                ty: r.resolve_type(ty, &params)?,
                            })
                        })
                        .collect::<Result<Vec<_>, SemanticError>>()?;
                    cases.push(UnionCase {
                        name: case.name.clone(),
                        params,
                    });
                }
                cases
            };
            match templates.unions.get_mut(&def) {
                Some(template) => template.cases = cases,
                None => ctx.defs_mut().set_union_cases(def, cases),
            }
        }
        GlobalNode::Function(f) => {
            let params = param_names([f.type_params.as_slice()]);
            let (typed, returns) = {
                let r = resolver(ctx, graph, templates, &decl.source);
                signature(&r, f, &params)?
            };
            match templates.functions.get_mut(&def) {
                Some(template) => {
                    template.params = typed;
                    template.returns = returns;
                }
                None => {
                    let ty = Type::function(typed.into_iter().map(|p| p.ty).collect(), returns);
                    ctx.defs_mut().set_signature(def, ty);
                    if f.body.is_none() {
                        templates.intrinsics.insert(def);
                    }
                }
            }
        }
        GlobalNode::Let(l) => {
            if let Some(node) = &l.ty {
                let ty = resolver(ctx, graph, templates, &decl.source).resolve_type(node, &[])?;
                ctx.defs_mut().set_signature(def, ty);
            }
        }
        GlobalNode::Opaque(_) | GlobalNode::Trait(_) | GlobalNode::Given(_) => {}
    }
    Ok(())
}

// ── Given blocks ───────────────────────────────────────────────────────

fn declare_given(
    given: &GivenDecl,
    methods: &[DefId],
    source: &SourceRecord,
    graph: &ModuleGraph,
    ctx: &mut CompilerContext,
    templates: &mut GenericTemplates,
    traits: &mut TraitRegistry,
) -> Result<(), SemanticError> {
    let undefined = || {
        error(
            SemanticErrorKind::UndefinedType {
                name: given.target.clone(),
            },
            given.span,
        )
    };
    let target = resolver(ctx, graph, templates, source)
        .resolve_name(&given.target, given.span)?
        .ok_or_else(undefined)?;

    let impl_target = match ctx.defs().kind(target) {
        Some(DefKind::GenericTemplate(kind @ (TemplateKind::Struct | TemplateKind::Union))) => {
            let expected = templates.type_params_of(target).map_or(0, <[_]>::len);
            if given.type_params.len() != expected {
                return Err(error(
                    SemanticErrorKind::InvalidArgumentCount {
                        name: given.target.clone(),
                        expected,
                        found: given.type_params.len(),
                    },
                    given.span,
                ));
            }
            let template = Nominal::new(target, ctx.name_of(target));
            let args = given.type_params.iter().map(|p| Type::param(&p.name)).collect();
            let self_ty = match kind {
                TemplateKind::Union => Type::GenericUnion { template, args },
                _ => Type::GenericStruct { template, args },
            };
            let extensions = {
                let r = resolver(ctx, graph, templates, source);
                given
                    .methods
                    .iter()
                    .zip(methods)
                    .map(|(m, def)| extension_method(&r, given, m, *def, &self_ty))
                    .collect::<Result<Vec<_>, _>>()?
            };
            for method in extensions {
                tracing::trace!(target = %given.target, method = %method.name, "extension method");
                templates.add_extension(target, method);
            }
            ImplTarget::Template(target)
        }
        Some(DefKind::Type(TypeDefKind::Struct | TypeDefKind::Union | TypeDefKind::Opaque)) => {
            if !given.type_params.is_empty() {
                return Err(error(
                    SemanticErrorKind::InvalidArgumentCount {
                        name: given.target.clone(),
                        expected: 0,
                        found: given.type_params.len(),
                    },
                    given.span,
                ));
            }
            let r = resolver(ctx, graph, templates, source);
            let self_ty = r.nominal_type(target).ok_or_else(undefined)?;
            let concrete = given
                .methods
                .iter()
                .zip(methods)
                .map(|(m, def)| concrete_method(&r, given, m, *def, &self_ty))
                .collect::<Result<Vec<_>, _>>()?;
            for (method, intrinsic) in concrete {
                ctx.defs_mut().set_signature(
                    method.def,
                    Type::function(method.params.clone(), method.returns.clone()),
                );
                if intrinsic {
                    templates.intrinsics.insert(method.def);
                }
                let name = ctx.name_of(method.def).to_string();
                templates.add_method(target, name, method);
            }
            ImplTarget::Type(self_ty)
        }
        _ => return Err(undefined()),
    };

    if let Some(trait_name) = &given.trait_name {
        if traits.get_trait(trait_name).is_none() {
            return Err(error(
                SemanticErrorKind::UnknownTrait {
                    name: trait_name.clone(),
                },
                given.span,
            ));
        }
        let table: IndexMap<String, DefId> = given
            .methods
            .iter()
            .zip(methods)
            .map(|(m, def)| (m.name.clone(), *def))
            .collect();
        let errors = traits.register_impl(ImplDef {
            trait_name: trait_name.clone(),
            target: impl_target,
            target_name: given.target.clone(),
            methods: table,
            span: given.span,
        });
        if let Some(first) = errors.into_iter().next() {
            return Err(first);
        }
    }
    Ok(())
}

/// Methods receive an implicit `self` of the target type.
fn with_self(self_ty: &Type, params: Vec<TypedParam>) -> Vec<TypedParam> {
    let mut all = Vec::with_capacity(params.len() + 1);
    all.push(TypedParam {
        name: "self".into(),
        ty: self_ty.clone(),
    });
    all.extend(params);
    all
}

fn extension_method(
    r: &Resolver<'_>,
    given: &GivenDecl,
    method: &FunctionDecl,
    def: DefId,
    self_ty: &Type,
) -> Result<MethodTemplate, SemanticError> {
    let names = param_names([given.type_params.as_slice(), method.type_params.as_slice()]);
    let (params, returns) = signature(r, method, &names)?;
    Ok(MethodTemplate {
        def,
        name: method.name.clone(),
        owner_params: given.type_params.clone(),
        method_params: method.type_params.clone(),
        params: with_self(self_ty, params),
        returns,
        body: None,
        intrinsic: method.body.is_none(),
        span: method.span,
    })
}

fn concrete_method(
    r: &Resolver<'_>,
    given: &GivenDecl,
    method: &FunctionDecl,
    def: DefId,
    self_ty: &Type,
) -> Result<(ConcreteMethod, bool), SemanticError> {
    if !method.type_params.is_empty() {
        return Err(error(
            SemanticErrorKind::InvalidOperation {
                op: format!("generic method `{}`", method.name),
                ty: given.target.clone(),
            },
            method.span,
        ));
    }
    let (params, returns) = signature(r, method, &[])?;
    let method_def = ConcreteMethod {
        def,
        identifier: format!("{}_{}", r.ctx.layout_key(self_ty), method.name),
        params: with_self(self_ty, params).into_iter().map(|p| p.ty).collect(),
        returns,
    };
    Ok((method_def, method.body.is_none()))
}

// ── Recursion ──────────────────────────────────────────────────────────

/// Nominal types stored by value inside `ty`. References, pointers and
/// functions break a cycle; generic applications are checked when they
/// are instantiated.
fn by_value(ty: &Type) -> Option<DefId> {
    match ty {
        Type::Structure(n) | Type::Union(n) => Some(n.def),
        _ => None,
    }
}

fn value_cycle(ctx: &CompilerContext, start: DefId) -> Option<Vec<String>> {
    fn walk(
        ctx: &CompilerContext,
        start: DefId,
        current: DefId,
        path: &mut Vec<DefId>,
        visited: &mut FxHashSet<DefId>,
    ) -> bool {
        let next: Vec<DefId> = ctx.member_types(current).iter().filter_map(by_value).collect();
        for def in next {
            if def == start {
                return true;
            }
            if visited.insert(def) {
                path.push(def);
                if walk(ctx, start, def, path, visited) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }

    let mut path = vec![start];
    let mut visited = FxHashSet::default();
    visited.insert(start);
    if walk(ctx, start, start, &mut path, &mut visited) {
        path.push(start);
        Some(path.iter().map(|d| ctx.name_of(*d).to_string()).collect())
    } else {
        None
    }
}

fn check_recursion(
    program: &Program,
    declared: &[Declared],
    ctx: &CompilerContext,
) -> Result<(), SemanticError> {
    for (decl, entry) in program.declarations.iter().zip(declared) {
        let Declared::Item(def) = *entry else {
            continue;
        };
        let span = match &decl.node {
            GlobalNode::Struct(s) if s.type_params.is_empty() => s.span,
            GlobalNode::Union(u) if u.type_params.is_empty() => u.span,
            _ => continue,
        };
        if let Some(cycle) = value_cycle(ctx, def) {
            return Err(error(SemanticErrorKind::RecursiveType { cycle }, span));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CaseDecl, FieldDecl, GlobalLet, Param, StructDecl, TraitDecl, TypeNode, UnionDecl};
    use crate::ast::Expr;

    fn decl(node: GlobalNode) -> Declaration {
        Declaration {
            source: SourceRecord::new("main.koral", &[]),
            node,
        }
    }

    fn field(name: &str, ty: TypeNode) -> FieldDecl {
        FieldDecl {
            name: name.into(),
            ty,
            mutable: false,
            access: AccessModifier::Default,
        }
    }

    fn structure(name: &str, type_params: Vec<TypeParam>, fields: Vec<FieldDecl>) -> GlobalNode {
        GlobalNode::Struct(StructDecl {
            name: name.into(),
            access: AccessModifier::Default,
            type_params,
            fields,
            span: Span::DUMMY,
        })
    }

    fn function(name: &str, params: Vec<Param>, returns: Option<TypeNode>, body: Option<Expr>) -> FunctionDecl {
        FunctionDecl {
            name: name.into(),
            access: AccessModifier::Default,
            type_params: vec![],
            params,
            returns,
            body,
            span: Span::DUMMY,
        }
    }

    struct Outcome {
        ctx: CompilerContext,
        templates: GenericTemplates,
        traits: TraitRegistry,
        result: Result<Vec<Declared>, SemanticError>,
    }

    fn run(nodes: Vec<Declaration>) -> Outcome {
        let program = Program {
            declarations: nodes,
        };
        let graph = ModuleGraph::new();
        let mut ctx = CompilerContext::new();
        let mut templates = GenericTemplates::new();
        let mut traits = TraitRegistry::with_builtins();
        let result = declare_program(
            &program,
            &graph,
            Tables {
                ctx: &mut ctx,
                templates: &mut templates,
                traits: &mut traits,
            },
        );
        Outcome {
            ctx,
            templates,
            traits,
            result,
        }
    }

    fn code(out: &Outcome) -> &'static str {
        out.result.as_ref().map(|_| "ok").unwrap_or_else(|e| e.code())
    }

    // ── Names ────────────────────────────────────────────────────────

    #[test]
    fn duplicate_public_names_are_rejected() {
        let out = run(vec![
            decl(structure("Point", vec![], vec![])),
            decl(structure("Point", vec![], vec![])),
        ]);
        assert_eq!(code(&out), "E0001");
    }

    #[test]
    fn private_names_in_different_files_coexist() {
        let private = |file: &str| Declaration {
            source: SourceRecord::new(file, &[]),
            node: GlobalNode::Struct(StructDecl {
                name: "Cache".into(),
                access: AccessModifier::Private,
                type_params: vec![],
                fields: vec![],
                span: Span::DUMMY,
            }),
        };
        let out = run(vec![private("a.koral"), private("b.koral")]);
        let ids = out.result.unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn generic_declarations_become_templates() {
        let out = run(vec![decl(structure(
            "Box",
            vec![TypeParam::new("T")],
            vec![field("value", TypeNode::named("T"))],
        ))]);
        let ids = out.result.unwrap();
        let Declared::Item(def) = ids[0] else {
            panic!("expected an item");
        };
        assert_eq!(
            out.ctx.defs().kind(def),
            Some(DefKind::GenericTemplate(TemplateKind::Struct))
        );
        let template = &out.templates.structs[&def];
        assert_eq!(template.members[0].ty, Type::param("T"));
    }

    // ── Signatures ───────────────────────────────────────────────────

    #[test]
    fn bodiless_functions_are_intrinsics() {
        let f = function(
            "sqrt",
            vec![Param::new("x", TypeNode::named("Float64"))],
            Some(TypeNode::named("Float64")),
            None,
        );
        let out = run(vec![decl(GlobalNode::Function(f))]);
        let ids = out.result.unwrap();
        let Declared::Item(def) = ids[0] else {
            panic!("expected an item");
        };
        assert!(out.templates.intrinsics.contains(&def));
        assert_eq!(
            out.ctx.defs().signature(def),
            Some(&Type::function(vec![Type::Float64], Type::Float64))
        );
    }

    #[test]
    fn annotated_global_has_signature() {
        let out = run(vec![decl(GlobalNode::Let(GlobalLet {
            name: "limit".into(),
            access: AccessModifier::Default,
            mutable: false,
            ty: Some(TypeNode::named("Int32")),
            value: Expr::int(10),
            span: Span::DUMMY,
        }))]);
        let ids = out.result.unwrap();
        let Declared::Item(def) = ids[0] else {
            panic!("expected an item");
        };
        assert_eq!(out.ctx.defs().signature(def), Some(&Type::Int32));
    }

    #[test]
    fn unknown_bound_is_rejected() {
        let mut f = function("show", vec![], None, Some(Expr::block(vec![], None)));
        f.type_params = vec![TypeParam::bounded("T", &["Printable"])];
        let out = run(vec![decl(GlobalNode::Function(f))]);
        assert_eq!(code(&out), "E0007");
    }

    // ── Given blocks ─────────────────────────────────────────────────

    #[test]
    fn concrete_method_takes_self_first() {
        let point = structure("Point", vec![], vec![field("x", TypeNode::named("Int"))]);
        let given = GlobalNode::Given(GivenDecl {
            type_params: vec![],
            target: "Point".into(),
            trait_name: None,
            methods: vec![function(
                "norm",
                vec![],
                Some(TypeNode::named("Int")),
                Some(Expr::int(0)),
            )],
            span: Span::DUMMY,
        });
        let out = run(vec![decl(point), decl(given)]);
        let ids = out.result.unwrap();
        let Declared::Item(owner) = ids[0] else {
            panic!("expected an item");
        };
        let method = out.templates.concrete_method(owner, "norm").unwrap();
        assert_eq!(method.identifier, "Point_norm");
        assert_eq!(method.params.len(), 1);
        assert_eq!(method.returns, Type::Int);
    }

    #[test]
    fn conformance_requires_every_method() {
        let show = GlobalNode::Trait(TraitDecl {
            name: "Show".into(),
            access: AccessModifier::Default,
            methods: vec![crate::ast::TraitMethodSig {
                name: "show".into(),
                params: vec![],
                returns: Some(TypeNode::named("Int")),
            }],
            span: Span::DUMMY,
        });
        let given = GlobalNode::Given(GivenDecl {
            type_params: vec![],
            target: "Point".into(),
            trait_name: Some("Show".into()),
            methods: vec![],
            span: Span::DUMMY,
        });
        let out = run(vec![
            decl(structure("Point", vec![], vec![])),
            decl(show),
            decl(given),
        ]);
        assert_eq!(code(&out), "E0013");
        assert!(out.traits.get_trait("Show").is_some());
    }

    #[test]
    fn generic_method_on_concrete_type_is_rejected() {
        let mut method = function("map", vec![], None, Some(Expr::int(0)));
        method.type_params = vec![TypeParam::new("U")];
        let given = GlobalNode::Given(GivenDecl {
            type_params: vec![],
            target: "Point".into(),
            trait_name: None,
            methods: vec![method],
            span: Span::DUMMY,
        });
        let out = run(vec![decl(structure("Point", vec![], vec![])), decl(given)]);
        assert_eq!(code(&out), "E0010");
    }

    // ── Recursion ────────────────────────────────────────────────────

    #[test]
    fn value_cycle_is_reported_with_path() {
        let a = structure("A", vec![], vec![field("b", TypeNode::named("B"))]);
        let b = structure("B", vec![], vec![field("a", TypeNode::named("A"))]);
        let out = run(vec![decl(a), decl(b)]);
        match out.result {
            Err(SemanticError {
                kind: SemanticErrorKind::RecursiveType { cycle },
                ..
            }) => assert_eq!(cycle, vec!["A", "B", "A"]),
            other => panic!("expected a recursive type error, got {:?}", other),
        }
    }

    #[test]
    fn reference_breaks_the_cycle() {
        let node = structure(
            "Node",
            vec![],
            vec![field("next", TypeNode::reference(TypeNode::named("Node")))],
        );
        let union = GlobalNode::Union(UnionDecl {
            name: "List".into(),
            access: AccessModifier::Default,
            type_params: vec![],
            cases: vec![CaseDecl {
                name: "Cons".into(),
                params: vec![("head".into(), TypeNode::named("Node"))],
            }],
            span: Span::DUMMY,
        });
        let out = run(vec![decl(node), decl(union)]);
        assert_eq!(code(&out), "ok");
    }
}
