//! Name and type resolution from one declaration's point of view.
//!
//! A [`Resolver`] answers "what does this name mean here" for code in a
//! given module and file. Lookup order: the current module (private
//! declarations of the current file first), the root module, then every
//! module imported by member or batch import. A name that only a plain
//! module import could reach is an error that asks for the module prefix.

use koral_common::module_graph::DisplayPath;
use koral_common::{ModuleGraph, Reach, Span};

use crate::ast::TypeNode;
use crate::context::CompilerContext;
use crate::def_id::{AccessModifier, DefId, DefKind, TemplateKind, TypeDefKind};
use crate::error::{SemanticError, SemanticErrorKind, VisibilityError};
use crate::templates::GenericTemplates;
use crate::ty::{Nominal, Type};

#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    pub ctx: &'a CompilerContext,
    pub graph: &'a ModuleGraph,
    pub templates: &'a GenericTemplates,
    pub module: &'a [String],
    pub file: &'a str,
}

fn visibility(err: VisibilityError, span: Span) -> SemanticError {
    SemanticError::new(SemanticErrorKind::Visibility(err), span)
}

impl<'a> Resolver<'a> {
    /// A declaration (never a module) registered under `name` in `scope`.
    fn find(&self, scope: &[String], name: &str, file: Option<&str>) -> Option<DefId> {
        self.ctx
            .defs()
            .lookup(scope, name, file)
            .filter(|def| self.ctx.defs().kind(*def) != Some(DefKind::Module))
    }

    /// Private declarations of another file, for the error path.
    fn hidden(&self, scope: &[String], name: &str) -> Option<DefId> {
        self.ctx.defs().candidates(scope, name).find(|def| {
            self.ctx.defs().metadata(*def).is_some_and(|m| {
                m.access == AccessModifier::Private
                    && m.source_file != self.file
                    && m.kind != DefKind::Module
            })
        })
    }

    fn check_access(&self, def: DefId, name: &str, span: Span) -> Result<(), SemanticError> {
        let Some(meta) = self.ctx.defs().metadata(def) else {
            return Ok(());
        };
        let accessible = match meta.access {
            AccessModifier::Default => true,
            AccessModifier::Private => meta.source_file == self.file,
            AccessModifier::Protected => {
                self.module.starts_with(&meta.module_path)
                    || meta.module_path.starts_with(self.module)
            }
        };
        if accessible {
            Ok(())
        } else {
            Err(visibility(
                VisibilityError::NotAccessible {
                    name: name.to_string(),
                    access: meta.access,
                },
                span,
            ))
        }
    }

    /// Resolve an unqualified name. `Ok(None)` when nothing by that name
    /// is declared anywhere the current module can see.
    pub fn resolve_name(&self, name: &str, span: Span) -> Result<Option<DefId>, SemanticError> {
        let root: &[String] = &[];
        let mut scopes = vec![self.module];
        if !self.module.is_empty() {
            scopes.push(root);
        }
        for scope in &scopes {
            if let Some(def) = self.find(scope, name, Some(self.file)) {
                self.check_access(def, name, span)?;
                return Ok(Some(def));
            }
        }

        let sources = self.graph.unqualified_sources(self.module, name);
        for source in &sources {
            if let Some(def) = self.find(source, name, None) {
                self.check_access(def, name, span)?;
                return Ok(Some(def));
            }
        }

        for imported in self.graph.imported_modules(self.module) {
            if self.graph.reach(self.module, imported, name) == Some(Reach::RequiresPrefix)
                && self.find(imported, name, None).is_some()
            {
                return Err(visibility(
                    VisibilityError::RequiresModulePrefix {
                        name: name.to_string(),
                        module: DisplayPath(imported).to_string(),
                    },
                    span,
                ));
            }
        }

        for scope in scopes.iter().chain(&sources) {
            if self.hidden(scope, name).is_some() {
                return Err(visibility(
                    VisibilityError::NotAccessible {
                        name: name.to_string(),
                        access: AccessModifier::Private,
                    },
                    span,
                ));
            }
        }
        Ok(None)
    }

    /// Resolve `module.name`.
    pub fn resolve_in_module(
        &self,
        module: &[String],
        name: &str,
        span: Span,
    ) -> Result<Option<DefId>, SemanticError> {
        if let Some(def) = self.find(module, name, Some(self.file)) {
            self.check_access(def, name, span)?;
            return Ok(Some(def));
        }
        if self.hidden(module, name).is_some() {
            return Err(visibility(
                VisibilityError::NotAccessible {
                    name: name.to_string(),
                    access: AccessModifier::Private,
                },
                span,
            ));
        }
        Ok(None)
    }

    /// The module an imported alias (`vector` for `using math.vector`) names.
    pub fn module_alias(&self, alias: &str) -> Option<Vec<String>> {
        self.graph
            .module_alias(self.module, alias)
            .map(<[String]>::to_vec)
    }

    /// `Type::Module` for a module path, if the module was registered.
    pub fn module_type(&self, path: &[String]) -> Option<Type> {
        let (last, parent) = path.split_last()?;
        let def = self
            .ctx
            .defs()
            .lookup(parent, last, None)
            .filter(|def| self.ctx.defs().kind(*def) == Some(DefKind::Module))?;
        Some(Type::Module(Nominal::new(def, path.join("."))))
    }

    /// The type naming a concrete type declaration.
    pub fn nominal_type(&self, def: DefId) -> Option<Type> {
        let name = self.ctx.name_of(def).to_string();
        match self.ctx.defs().kind(def)? {
            DefKind::Type(TypeDefKind::Struct) => Some(Type::Structure(Nominal::new(def, name))),
            DefKind::Type(TypeDefKind::Union) => Some(Type::Union(Nominal::new(def, name))),
            DefKind::Type(TypeDefKind::Opaque) => Some(Type::Opaque(Nominal::new(def, name))),
            DefKind::Type(TypeDefKind::Trait) => Some(Type::TraitObject(name)),
            _ => None,
        }
    }

    /// Resolve a written type. `params` are the generic parameters in scope.
    pub fn resolve_type(&self, node: &TypeNode, params: &[String]) -> Result<Type, SemanticError> {
        match node {
            TypeNode::Named {
                module,
                name,
                args,
                span,
            } => {
                let arity = |expected: usize| {
                    if args.len() == expected {
                        Ok(())
                    } else {
                        Err(SemanticError::new(
                            SemanticErrorKind::InvalidArgumentCount {
                                name: name.clone(),
                                expected,
                                found: args.len(),
                            },
                            *span,
                        ))
                    }
                };
                if module.is_empty() {
                    if params.iter().any(|p| p == name) {
                        arity(0)?;
                        return Ok(Type::GenericParameter(name.clone()));
                    }
                    if let Some(primitive) = Type::primitive(name) {
                        arity(0)?;
                        return Ok(primitive);
                    }
                }

                let def = if module.is_empty() {
                    self.resolve_name(name, *span)?
                } else {
                    let path = self.qualified_path(module);
                    self.resolve_in_module(&path, name, *span)?
                };
                let undefined = || {
                    SemanticError::new(
                        SemanticErrorKind::UndefinedType { name: name.clone() },
                        *span,
                    )
                };
                let def = def.ok_or_else(undefined)?;

                match self.ctx.defs().kind(def) {
                    Some(DefKind::GenericTemplate(kind @ (TemplateKind::Struct | TemplateKind::Union))) => {
                        arity(self.templates.type_params_of(def).map_or(0, <[_]>::len))?;
                        let args = args
                            .iter()
                            .map(|a| self.resolve_type(a, params))
                            .collect::<Result<Vec<_>, _>>()?;
                        let template = Nominal::new(def, self.ctx.name_of(def));
                        Ok(match kind {
                            TemplateKind::Union => Type::GenericUnion { template, args },
                            _ => Type::GenericStruct { template, args },
                        })
                    }
                    Some(DefKind::Type(_)) => {
                        arity(0)?;
                        self.nominal_type(def).ok_or_else(undefined)
                    }
                    _ => Err(undefined()),
                }
            }
            TypeNode::Function {
                params: ps,
                returns,
                ..
            } => {
                let ps = ps
                    .iter()
                    .map(|p| self.resolve_type(p, params))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Type::function(ps, self.resolve_type(returns, params)?))
            }
            TypeNode::Reference(inner) => Ok(Type::reference(self.resolve_type(inner, params)?)),
            TypeNode::Pointer(inner) => Ok(Type::pointer(self.resolve_type(inner, params)?)),
            TypeNode::WeakReference(inner) => Ok(Type::WeakReference(Box::new(
                self.resolve_type(inner, params)?,
            ))),
        }
    }

    /// A written module qualifier: an imported alias, or an absolute path.
    fn qualified_path(&self, module: &[String]) -> Vec<String> {
        if let [alias] = module {
            if let Some(path) = self.module_alias(alias) {
                return path;
            }
        }
        module.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use koral_common::{ImportKind, ModuleGraph};

    fn path(p: &str) -> Vec<String> {
        p.split('.').map(str::to_string).collect()
    }

    struct World {
        ctx: CompilerContext,
        graph: ModuleGraph,
        templates: GenericTemplates,
    }

    /// `geo` declares `Point` (public), `Secret` (private to geo.koral) and
    /// `Inner` (protected); `app` imports `geo` as a module, `cli` imports
    /// `geo.Point` by member.
    fn world() -> World {
        let mut graph = ModuleGraph::new();
        let geo = graph.add_module(path("geo"));
        let app = graph.add_module(path("app"));
        let cli = graph.add_module(path("cli"));
        graph.add_import(app, geo, ImportKind::Module);
        graph.add_import(cli, geo, ImportKind::Member("Point".into()));

        let mut ctx = CompilerContext::new();
        let defs = ctx.defs_mut();
        defs.allocate(&[], "geo", DefKind::Module, "", AccessModifier::Default, Span::DUMMY);
        for (name, access) in [
            ("Point", AccessModifier::Default),
            ("Secret", AccessModifier::Private),
            ("Inner", AccessModifier::Protected),
        ] {
            defs.allocate(
                &path("geo"),
                name,
                DefKind::Type(TypeDefKind::Struct),
                "geo.koral",
                access,
                Span::DUMMY,
            );
        }
        World {
            ctx,
            graph,
            templates: GenericTemplates::new(),
        }
    }

    fn resolver<'a>(world: &'a World, module: &'a [String], file: &'a str) -> Resolver<'a> {
        Resolver {
            ctx: &world.ctx,
            graph: &world.graph,
            templates: &world.templates,
            module,
            file,
        }
    }

    #[test]
    fn member_import_reaches_unqualified() {
        let world = world();
        let cli = path("cli");
        let r = resolver(&world, &cli, "cli.koral");
        assert!(r.resolve_name("Point", Span::DUMMY).unwrap().is_some());
    }

    #[test]
    fn module_import_requires_prefix() {
        let world = world();
        let app = path("app");
        let r = resolver(&world, &app, "app.koral");
        let err = r.resolve_name("Point", Span::DUMMY).unwrap_err();
        assert_eq!(err.code(), "E0030");
        assert_eq!(err.help().as_deref(), Some("write `geo.Point`"));
        let ty = r
            .resolve_type(&TypeNode::qualified(&["geo"], "Point"), &[])
            .unwrap();
        assert_eq!(ty.to_string(), "Point");
    }

    #[test]
    fn private_symbol_of_other_file_is_not_accessible() {
        let world = world();
        let geo = path("geo");
        let r = resolver(&world, &geo, "other.koral");
        let err = r.resolve_name("Secret", Span::DUMMY).unwrap_err();
        assert!(matches!(
            err.kind,
            SemanticErrorKind::Visibility(VisibilityError::NotAccessible { .. })
        ));
        let own = resolver(&world, &geo, "geo.koral");
        assert!(own.resolve_name("Secret", Span::DUMMY).unwrap().is_some());
    }

    #[test]
    fn protected_symbol_outside_module_tree() {
        let world = world();
        let app = path("app");
        let r = resolver(&world, &app, "app.koral");
        let err = r.resolve_in_module(&path("geo"), "Inner", Span::DUMMY).unwrap_err();
        assert_eq!(err.code(), "E0031");
    }

    #[test]
    fn generic_parameters_and_primitives() {
        let world = world();
        let root: Vec<String> = Vec::new();
        let r = resolver(&world, &root, "main.koral");
        let node = TypeNode::function(
            vec![TypeNode::named("T")],
            TypeNode::reference(TypeNode::named("Int")),
        );
        let ty = r.resolve_type(&node, &["T".to_string()]).unwrap();
        assert_eq!(ty.to_string(), "(T) -> Int ref");
        let err = r.resolve_type(&TypeNode::named("Nope"), &[]).unwrap_err();
        assert_eq!(err.to_string(), "undefined type `Nope`");
    }

    #[test]
    fn module_alias_gives_module_type() {
        let world = world();
        let app = path("app");
        let r = resolver(&world, &app, "app.koral");
        let module = r.module_alias("geo").unwrap();
        assert_eq!(r.module_type(&module).unwrap().to_string(), "module(geo)");
    }
}
