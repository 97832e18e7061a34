//! Whole-program checking: declaration passes, then every body.
//!
//! Bodies are checked in a fixed order: global variables (declaration
//! order), functions, methods of concrete types, generic function
//! templates, then extension methods. Template bodies stay generic and are
//! stored back into [`GenericTemplates`] for the monomorphizer; only
//! instantiation requests whose arguments are already concrete are kept.

use koral_common::{CompilerConfig, ModuleGraph};

use crate::ast::{Expr, FunctionDecl, GlobalNode, Program, SourceRecord, TypeParam};
use crate::context::CompilerContext;
use crate::declare::{declare_program, Declared, Tables};
use crate::def_id::DefId;
use crate::error::{SemanticError, SemanticErrorKind};
use crate::infer::{Finished, InferenceEngine};
use crate::instantiation::RequestSet;
use crate::resolve::Resolver;
use crate::templates::{ConcreteMethod, GenericTemplates};
use crate::traits::TraitRegistry;
use crate::ty::Type;
use crate::typed::{TypedGlobal, TypedParam};

/// Everything the monomorphizer needs.
#[derive(Debug)]
pub struct CheckedProgram {
    pub context: CompilerContext,
    pub templates: GenericTemplates,
    pub traits: TraitRegistry,
    /// Concrete type declarations first, then variables and functions.
    pub globals: Vec<TypedGlobal>,
    /// Deduplicated, concrete instantiation requests in first-use order.
    pub requests: RequestSet,
}

struct Checker<'p> {
    graph: &'p ModuleGraph,
    config: &'p CompilerConfig,
    ctx: CompilerContext,
    templates: GenericTemplates,
    traits: TraitRegistry,
    globals: Vec<TypedGlobal>,
    requests: RequestSet,
}

/// One body to check.
struct Body<'b> {
    source: &'b SourceRecord,
    type_params: Vec<TypeParam>,
    params: &'b [TypedParam],
    returns: Option<&'b Type>,
    expr: &'b Expr,
}

/// Check a whole program.
#[tracing::instrument(level = "debug", skip_all)]
pub fn check_program(
    program: &Program,
    graph: &ModuleGraph,
    config: &CompilerConfig,
) -> Result<CheckedProgram, SemanticError> {
    let mut checker = Checker {
        graph,
        config,
        ctx: CompilerContext::new(),
        templates: GenericTemplates::new(),
        traits: TraitRegistry::with_builtins(),
        globals: Vec::new(),
        requests: RequestSet::new(),
    };
    let declared = declare_program(
        program,
        graph,
        Tables {
            ctx: &mut checker.ctx,
            templates: &mut checker.templates,
            traits: &mut checker.traits,
        },
    )?;
    let items: Vec<_> = program.declarations.iter().zip(&declared).collect();

    checker.type_declarations(&items);
    for (decl, entry) in &items {
        if let (GlobalNode::Let(l), Declared::Item(def)) = (&decl.node, entry) {
            checker.check_global(*def, &decl.source, l.mutable, l.ty.is_some(), &l.value)?;
        }
    }
    for (decl, entry) in &items {
        if let (GlobalNode::Function(f), Declared::Item(def)) = (&decl.node, entry) {
            if f.type_params.is_empty() {
                checker.check_function(*def, &decl.source, f)?;
            }
        }
    }
    for (decl, entry) in &items {
        if let (GlobalNode::Given(given), Declared::Given { methods }) = (&decl.node, entry) {
            for (method, def) in given.methods.iter().zip(methods) {
                if let Some(concrete) = checker.concrete_method(*def) {
                    checker.check_method(&concrete, &decl.source, method)?;
                }
            }
        }
    }
    for (decl, entry) in &items {
        if let (GlobalNode::Function(f), Declared::Item(def)) = (&decl.node, entry) {
            if !f.type_params.is_empty() {
                checker.check_template(*def, &decl.source, f)?;
            }
        }
    }
    for (decl, entry) in &items {
        if let (GlobalNode::Given(given), Declared::Given { methods }) = (&decl.node, entry) {
            for (method, def) in given.methods.iter().zip(methods) {
                checker.check_extension(*def, &decl.source, method)?;
            }
        }
    }

    tracing::debug!(
        globals = checker.globals.len(),
        requests = checker.requests.len(),
        "checked program"
    );
    Ok(CheckedProgram {
        context: checker.ctx,
        templates: checker.templates,
        traits: checker.traits,
        globals: checker.globals,
        requests: checker.requests,
    })
}

impl Checker<'_> {
    fn identifier(&self, def: DefId) -> String {
        self.ctx
            .defs()
            .unique_identifier(def)
            .unwrap_or_else(|| self.ctx.name_of(def).to_string())
    }

    fn concrete_method(&self, def: DefId) -> Option<ConcreteMethod> {
        self.templates
            .methods
            .values()
            .flat_map(|table| table.values())
            .find(|m| m.def == def)
            .cloned()
    }

    /// Run inference over one body and keep its concrete requests.
    fn infer(&mut self, body: Body<'_>) -> Result<Finished, SemanticError> {
        let finished = {
            let resolver = Resolver {
                ctx: &self.ctx,
                graph: self.graph,
                templates: &self.templates,
                module: &body.source.module_path,
                file: &body.source.file,
            };
            let mut engine =
                InferenceEngine::new(resolver, &self.traits, &body.type_params, self.config);
            for param in body.params {
                engine.bind(&param.name, param.ty.clone(), false);
            }
            let typed = match body.returns {
                Some(returns) => engine.check(body.expr, returns)?,
                None => engine.synthesize(body.expr)?,
            };
            engine.finish(typed)?
        };
        for request in &finished.requests {
            if request.is_concrete(&self.ctx) {
                self.requests.insert(&self.ctx, request.clone());
            }
        }
        Ok(finished)
    }

    fn type_declarations(&mut self, items: &[(&crate::ast::Declaration, &Declared)]) {
        for (decl, entry) in items {
            let Declared::Item(def) = **entry else {
                continue;
            };
            let identifier = self.identifier(def);
            let global = match &decl.node {
                GlobalNode::Struct(s) if s.type_params.is_empty() => TypedGlobal::StructDeclaration {
                    def,
                    identifier,
                    members: self.ctx.defs().struct_members(def).unwrap_or_default().to_vec(),
                },
                GlobalNode::Union(u) if u.type_params.is_empty() => TypedGlobal::UnionDeclaration {
                    def,
                    identifier,
                    cases: self.ctx.defs().union_cases(def).unwrap_or_default().to_vec(),
                },
                _ => continue,
            };
            self.globals.push(global);
        }
    }

    fn check_global(
        &mut self,
        def: DefId,
        source: &SourceRecord,
        mutable: bool,
        annotated: bool,
        value: &Expr,
    ) -> Result<(), SemanticError> {
        let declared = if annotated {
            self.ctx.defs().signature(def).cloned()
        } else {
            None
        };
        let finished = self.infer(Body {
            source,
            type_params: Vec::new(),
            params: &[],
            returns: declared.as_ref(),
            expr: value,
        })?;
        let ty = declared.unwrap_or_else(|| finished.expr.ty.clone());
        self.ctx.defs_mut().set_signature(def, ty.clone());
        tracing::debug!(name = self.ctx.name_of(def), %ty, "checked global");
        self.globals.push(TypedGlobal::Variable {
            def,
            identifier: self.identifier(def),
            ty,
            mutable,
            value: finished.expr,
        });
        Ok(())
    }

    fn function_params(&self, def: DefId, f: &FunctionDecl) -> Result<(Vec<TypedParam>, Type), SemanticError> {
        match self.ctx.defs().signature(def) {
            Some(Type::Function { params, returns }) => Ok((
                f.params
                    .iter()
                    .zip(params)
                    .map(|(p, ty)| TypedParam {
                        name: p.name.clone(),
                        ty: ty.clone(),
                    })
                    .collect(),
                (**returns).clone(),
            )),
            _ => Err(SemanticError::new(
                SemanticErrorKind::NotAFunction {
                    ty: f.name.clone(),
                },
                f.span,
            )),
        }
    }

    fn check_function(&mut self, def: DefId, source: &SourceRecord, f: &FunctionDecl) -> Result<(), SemanticError> {
        let Some(body) = &f.body else {
            return Ok(());
        };
        let (params, returns) = self.function_params(def, f)?;
        let finished = self.infer(Body {
            source,
            type_params: Vec::new(),
            params: &params,
            returns: Some(&returns),
            expr: body,
        })?;
        tracing::debug!(name = %f.name, "checked function");
        self.globals.push(TypedGlobal::Function {
            def,
            identifier: self.identifier(def),
            params,
            returns,
            body: finished.expr,
        });
        Ok(())
    }

    fn check_method(
        &mut self,
        method: &ConcreteMethod,
        source: &SourceRecord,
        f: &FunctionDecl,
    ) -> Result<(), SemanticError> {
        let Some(body) = &f.body else {
            return Ok(());
        };
        let names = std::iter::once("self").chain(f.params.iter().map(|p| p.name.as_str()));
        let params: Vec<TypedParam> = names
            .zip(&method.params)
            .map(|(name, ty)| TypedParam {
                name: name.to_string(),
                ty: ty.clone(),
            })
            .collect();
        let finished = self.infer(Body {
            source,
            type_params: Vec::new(),
            params: &params,
            returns: Some(&method.returns),
            expr: body,
        })?;
        tracing::debug!(identifier = %method.identifier, "checked method");
        self.globals.push(TypedGlobal::Function {
            def: method.def,
            identifier: method.identifier.clone(),
            params,
            returns: method.returns.clone(),
            body: finished.expr,
        });
        Ok(())
    }

    fn check_template(&mut self, def: DefId, source: &SourceRecord, f: &FunctionDecl) -> Result<(), SemanticError> {
        let Some(body) = &f.body else {
            return Ok(());
        };
        let Some(template) = self.templates.functions.get(&def).cloned() else {
            return Ok(());
        };
        let finished = self.infer(Body {
            source,
            type_params: template.type_params.clone(),
            params: &template.params,
            returns: Some(&template.returns),
            expr: body,
        })?;
        if let Some(slot) = self.templates.functions.get_mut(&def) {
            slot.body = Some(finished.expr);
        }
        Ok(())
    }

    fn check_extension(&mut self, def: DefId, source: &SourceRecord, f: &FunctionDecl) -> Result<(), SemanticError> {
        let Some(body) = &f.body else {
            return Ok(());
        };
        let Some(method) = self.templates.method_by_def(def).cloned() else {
            return Ok(());
        };
        let finished = self.infer(Body {
            source,
            type_params: method.type_params().cloned().collect(),
            params: &method.params,
            returns: Some(&method.returns),
            expr: body,
        })?;
        let slot = self
            .templates
            .extensions
            .values_mut()
            .flatten()
            .find(|m| m.def == def);
        if let Some(slot) = slot {
            slot.body = Some(finished.expr);
        }
        Ok(())
    }
}
