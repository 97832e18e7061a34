//! Module import graph for the Koral compiler.
//!
//! Module resolution itself happens before semantic analysis. This graph is
//! the record it leaves behind: every module known to the compilation unit
//! and the imports each one declares. The semantic passes only ask it one
//! kind of question, namely whether a name declared in module A may be
//! written unqualified inside module B.

use std::fmt;

use rustc_hash::FxHashMap;

/// A unique identifier for a module within a compilation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

/// How an `import` statement exposes the target module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportKind {
    /// `using a.b` -- members are reachable only as `b.name`.
    Module,
    /// `using a.b.name` -- one member becomes visible unqualified.
    Member(String),
    /// `using a.b.*` -- every member becomes visible unqualified.
    Batch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub target: ModuleId,
    pub kind: ImportKind,
}

/// Metadata about a single module in the graph.
#[derive(Debug)]
pub struct ModuleInfo {
    pub id: ModuleId,
    /// Dotted module path split into segments, e.g. `["std", "collections"]`.
    /// The root module has an empty path.
    pub path: Vec<String>,
    /// Imports in declaration order.
    pub imports: Vec<Import>,
}

/// How a name declared in another module can be reached from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reach {
    /// The name may be written unqualified.
    Unqualified,
    /// The module is imported, but only as a module: callers must write
    /// `module.name`.
    RequiresPrefix,
}

/// A directed graph of modules and their imports.
///
/// Modules are stored in insertion order and identified by [`ModuleId`].
#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: Vec<ModuleInfo>,
    path_to_id: FxHashMap<Vec<String>, ModuleId>,
}

impl ModuleGraph {
    /// Create a graph that already contains the root module.
    pub fn new() -> Self {
        let mut graph = Self::default();
        graph.add_module(Vec::new());
        graph
    }

    /// Add a module, returning the existing id if the path is already known.
    pub fn add_module(&mut self, path: Vec<String>) -> ModuleId {
        if let Some(id) = self.path_to_id.get(&path) {
            return *id;
        }
        let id = ModuleId(self.modules.len() as u32);
        self.path_to_id.insert(path.clone(), id);
        self.modules.push(ModuleInfo {
            id,
            path,
            imports: Vec::new(),
        });
        id
    }

    pub fn resolve(&self, path: &[String]) -> Option<ModuleId> {
        self.path_to_id.get(path).copied()
    }

    /// Record an import of `target` inside `from`.
    /// Duplicate imports and self-imports are ignored.
    pub fn add_import(&mut self, from: ModuleId, target: ModuleId, kind: ImportKind) {
        if from == target {
            return;
        }
        let import = Import { target, kind };
        let imports = &mut self.modules[from.0 as usize].imports;
        if !imports.contains(&import) {
            imports.push(import);
        }
    }

    pub fn get(&self, id: ModuleId) -> &ModuleInfo {
        &self.modules[id.0 as usize]
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleInfo> {
        self.modules.iter()
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Decide how `name`, declared in `owner`, is reachable from `from`.
    ///
    /// Names in the same module and in the root module are always reachable
    /// unqualified. Otherwise the imports of `from` decide; an unqualified
    /// import wins over a module import of the same target.
    pub fn reach(&self, from: &[String], owner: &[String], name: &str) -> Option<Reach> {
        if from == owner || owner.is_empty() {
            return Some(Reach::Unqualified);
        }
        let from_id = self.resolve(from)?;
        let owner_id = self.resolve(owner)?;
        let mut best = None;
        for import in &self.get(from_id).imports {
            if import.target != owner_id {
                continue;
            }
            match &import.kind {
                ImportKind::Batch => return Some(Reach::Unqualified),
                ImportKind::Member(member) if member == name => {
                    return Some(Reach::Unqualified)
                }
                ImportKind::Member(_) => {}
                ImportKind::Module => best = Some(Reach::RequiresPrefix),
            }
        }
        best
    }

    /// Modules whose members may appear unqualified in `from` under `name`,
    /// in import order. Used as the fallback search path for identifiers.
    pub fn unqualified_sources(&self, from: &[String], name: &str) -> Vec<&[String]> {
        let Some(from_id) = self.resolve(from) else {
            return Vec::new();
        };
        self.get(from_id)
            .imports
            .iter()
            .filter(|import| match &import.kind {
                ImportKind::Batch => true,
                ImportKind::Member(member) => member == name,
                ImportKind::Module => false,
            })
            .map(|import| self.get(import.target).path.as_slice())
            .collect()
    }

    /// Modules imported by `from` (with any import kind), in import order.
    pub fn imported_modules(&self, from: &[String]) -> Vec<&[String]> {
        let Some(from_id) = self.resolve(from) else {
            return Vec::new();
        };
        self.get(from_id)
            .imports
            .iter()
            .map(|import| self.get(import.target).path.as_slice())
            .collect()
    }

    /// Find a module imported by `from` whose last path segment is `alias`.
    /// This is what makes `vector.add(..)` work after `using math.vector`.
    pub fn module_alias(&self, from: &[String], alias: &str) -> Option<&[String]> {
        let from_id = self.resolve(from)?;
        self.get(from_id)
            .imports
            .iter()
            .map(|import| self.get(import.target).path.as_slice())
            .find(|path| path.last().map(String::as_str) == Some(alias))
    }
}

/// Dotted display form of a module path (`std.collections`, or `<root>`).
pub struct DisplayPath<'a>(pub &'a [String]);

impl fmt::Display for DisplayPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.0.join("."))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> Vec<String> {
        s.split('.').map(str::to_string).collect()
    }

    #[test]
    fn root_module_exists() {
        let graph = ModuleGraph::new();
        assert_eq!(graph.resolve(&[]), Some(ModuleId(0)));
        assert_eq!(graph.module_count(), 1);
    }

    #[test]
    fn add_module_is_idempotent() {
        let mut graph = ModuleGraph::new();
        let a = graph.add_module(path("math.vector"));
        let b = graph.add_module(path("math.vector"));
        assert_eq!(a, b);
        assert_eq!(graph.module_count(), 2);
    }

    #[test]
    fn same_module_and_root_are_unqualified() {
        let mut graph = ModuleGraph::new();
        graph.add_module(path("app"));
        assert_eq!(graph.reach(&path("app"), &path("app"), "x"), Some(Reach::Unqualified));
        assert_eq!(graph.reach(&path("app"), &[], "x"), Some(Reach::Unqualified));
    }

    #[test]
    fn module_import_requires_prefix() {
        let mut graph = ModuleGraph::new();
        let app = graph.add_module(path("app"));
        let vector = graph.add_module(path("math.vector"));
        graph.add_import(app, vector, ImportKind::Module);

        assert_eq!(
            graph.reach(&path("app"), &path("math.vector"), "add"),
            Some(Reach::RequiresPrefix)
        );
        assert_eq!(
            graph.module_alias(&path("app"), "vector"),
            Some(path("math.vector").as_slice())
        );
    }

    #[test]
    fn member_import_exposes_one_name() {
        let mut graph = ModuleGraph::new();
        let app = graph.add_module(path("app"));
        let vector = graph.add_module(path("math.vector"));
        graph.add_import(app, vector, ImportKind::Member("add".into()));

        assert_eq!(
            graph.reach(&path("app"), &path("math.vector"), "add"),
            Some(Reach::Unqualified)
        );
        assert_eq!(graph.reach(&path("app"), &path("math.vector"), "sub"), None);
        assert_eq!(graph.unqualified_sources(&path("app"), "add").len(), 1);
        assert!(graph.unqualified_sources(&path("app"), "sub").is_empty());
    }

    #[test]
    fn batch_import_wins_over_module_import() {
        let mut graph = ModuleGraph::new();
        let app = graph.add_module(path("app"));
        let util = graph.add_module(path("util"));
        graph.add_import(app, util, ImportKind::Module);
        graph.add_import(app, util, ImportKind::Batch);

        assert_eq!(graph.reach(&path("app"), &path("util"), "id"), Some(Reach::Unqualified));
    }

    #[test]
    fn self_and_duplicate_imports_ignored() {
        let mut graph = ModuleGraph::new();
        let app = graph.add_module(path("app"));
        let util = graph.add_module(path("util"));
        graph.add_import(app, app, ImportKind::Batch);
        graph.add_import(app, util, ImportKind::Batch);
        graph.add_import(app, util, ImportKind::Batch);
        assert_eq!(graph.get(app).imports.len(), 1);
    }

    #[test]
    fn display_path_formats_root() {
        assert_eq!(DisplayPath(&[]).to_string(), "<root>");
        assert_eq!(DisplayPath(&path("a.b")).to_string(), "a.b");
    }
}
