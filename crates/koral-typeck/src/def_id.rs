//! Definition identity registry.
//!
//! Every declaration gets a dense, monotonically assigned [`DefId`]. All
//! metadata (name, module path, kind, access, structural shape) is stored
//! out-of-line in [`DefIdMap`], keyed by identity, and is filled in
//! progressively: name collection only knows names and kinds, type
//! resolution adds members and cases, monomorphization adds instantiations.

use std::fmt;

use koral_common::Span;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::ty::Type;

/// The integer naming exactly one declaration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DefId(pub u32);

impl fmt::Display for DefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum TypeDefKind {
    Struct,
    Union,
    Trait,
    Opaque,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum TemplateKind {
    Struct,
    Union,
    Function,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum DefKind {
    Type(TypeDefKind),
    Function,
    Variable,
    Module,
    GenericTemplate(TemplateKind),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum AccessModifier {
    /// Visible only inside the declaring file.
    Private,
    /// Visible inside the declaring module and its submodules.
    Protected,
    #[default]
    Default,
}

impl fmt::Display for AccessModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessModifier::Private => write!(f, "private"),
            AccessModifier::Protected => write!(f, "protected"),
            AccessModifier::Default => write!(f, "public"),
        }
    }
}

/// Identity-level facts about a declaration, known from name collection on.
#[derive(Clone, Debug, Serialize)]
pub struct DefMetadata {
    pub module_path: Vec<String>,
    pub name: String,
    pub kind: DefKind,
    pub source_file: String,
    pub access: AccessModifier,
    pub span: Span,
}

impl DefMetadata {
    /// `a.b.Name`
    pub fn qualified_name(&self) -> String {
        let mut parts = self.module_path.clone();
        parts.push(self.name.clone());
        parts.join(".")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StructMember {
    pub name: String,
    pub ty: Type,
    pub mutable: bool,
    pub access: AccessModifier,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CaseParam {
    pub name: String,
    pub ty: Type,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UnionCase {
    pub name: String,
    pub params: Vec<CaseParam>,
}

/// Short tag isolating private symbols of one file: `f{hash % 10000}`.
pub fn file_tag(source_file: &str) -> String {
    let mut hash: u32 = 0;
    for byte in source_file.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(byte as u32);
    }
    format!("f{}", hash % 10000)
}

/// Replace every character that cannot appear in a C identifier.
pub fn sanitize_identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// The registry itself.
#[derive(Debug, Default)]
pub struct DefIdMap {
    defs: Vec<DefMetadata>,
    keys: FxHashMap<String, DefId>,
    struct_members: FxHashMap<DefId, Vec<StructMember>>,
    union_cases: FxHashMap<DefId, Vec<UnionCase>>,
    type_arguments: FxHashMap<DefId, Vec<Type>>,
    template_names: FxHashMap<DefId, String>,
    templates: FxHashMap<DefId, DefId>,
    generic_instantiation: FxHashMap<DefId, bool>,
    signatures: FxHashMap<DefId, Type>,
    /// Per identity, how many earlier identities share its C identifier.
    identifier_ordinals: Vec<u32>,
    identifier_counts: FxHashMap<String, u32>,
}

fn make_key(module_path: &[String], name: &str, source_file: Option<&str>) -> String {
    let mut parts: Vec<&str> = module_path.iter().map(String::as_str).collect();
    parts.push(name);
    let mut key = parts.join(".");
    if let Some(file) = source_file {
        key.push_str(".@");
        key.push_str(file);
    }
    key
}

impl DefIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new identity.
    ///
    /// A private declaration whose file-qualified key and kind match an
    /// existing one gets that identity back instead of a new one. Private
    /// declarations are only reachable through their file-qualified key;
    /// everything else is also registered under the file-less key.
    pub fn allocate(
        &mut self,
        module_path: &[String],
        name: &str,
        kind: DefKind,
        source_file: &str,
        access: AccessModifier,
        span: Span,
    ) -> DefId {
        let file_key = make_key(module_path, name, Some(source_file));
        if access == AccessModifier::Private {
            if let Some(&existing) = self.keys.get(&file_key) {
                let meta = &self.defs[existing.0 as usize];
                if meta.kind == kind && meta.access == AccessModifier::Private {
                    tracing::trace!(def = %existing, name, "reusing private identity");
                    return existing;
                }
            }
        }

        let id = DefId(self.defs.len() as u32);
        self.defs.push(DefMetadata {
            module_path: module_path.to_vec(),
            name: name.to_string(),
            kind,
            source_file: source_file.to_string(),
            access,
            span,
        });
        self.keys.insert(file_key, id);
        if access != AccessModifier::Private {
            self.keys.insert(make_key(module_path, name, None), id);
        }
        let identifier = self.c_identifier(id).unwrap_or_default();
        let count = self.identifier_counts.entry(identifier).or_insert(0);
        self.identifier_ordinals.push(*count);
        *count += 1;
        tracing::trace!(def = %id, name, ?kind, "allocated identity");
        id
    }

    /// Find a declaration: the file-qualified key first, then the file-less key.
    pub fn lookup(
        &self,
        module_path: &[String],
        name: &str,
        source_file: Option<&str>,
    ) -> Option<DefId> {
        if let Some(file) = source_file {
            if let Some(id) = self.keys.get(&make_key(module_path, name, Some(file))) {
                return Some(*id);
            }
        }
        self.keys.get(&make_key(module_path, name, None)).copied()
    }

    /// Exact key match: the file-qualified key when `source_file` is given,
    /// the file-less key otherwise. No fallback.
    pub fn lookup_exact(
        &self,
        module_path: &[String],
        name: &str,
        source_file: Option<&str>,
    ) -> Option<DefId> {
        self.keys.get(&make_key(module_path, name, source_file)).copied()
    }

    /// Every declaration of `name` in `module_path`, private ones from any
    /// file included.
    pub fn candidates<'a>(
        &'a self,
        module_path: &'a [String],
        name: &'a str,
    ) -> impl Iterator<Item = DefId> + 'a {
        self.ids().filter(move |id| {
            self.metadata(*id)
                .is_some_and(|m| m.name == name && m.module_path == module_path)
        })
    }

    pub fn metadata(&self, id: DefId) -> Option<&DefMetadata> {
        self.defs.get(id.0 as usize)
    }

    pub fn name(&self, id: DefId) -> Option<&str> {
        self.metadata(id).map(|m| m.name.as_str())
    }

    pub fn kind(&self, id: DefId) -> Option<DefKind> {
        self.metadata(id).map(|m| m.kind)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// All identities in allocation order.
    pub fn ids(&self) -> impl Iterator<Item = DefId> + '_ {
        (0..self.defs.len() as u32).map(DefId)
    }

    // ── Structural metadata ─────────────────────────────────────────────

    pub fn struct_members(&self, id: DefId) -> Option<&[StructMember]> {
        self.struct_members.get(&id).map(Vec::as_slice)
    }

    pub fn union_cases(&self, id: DefId) -> Option<&[UnionCase]> {
        self.union_cases.get(&id).map(Vec::as_slice)
    }

    pub fn type_arguments(&self, id: DefId) -> Option<&[Type]> {
        self.type_arguments.get(&id).map(Vec::as_slice)
    }

    pub fn template_name(&self, id: DefId) -> Option<&str> {
        self.template_names.get(&id).map(String::as_str)
    }

    /// The template a generic instantiation was produced from.
    pub fn template_of(&self, id: DefId) -> Option<DefId> {
        self.templates.get(&id).copied()
    }

    pub fn is_generic_instantiation(&self, id: DefId) -> Option<bool> {
        self.generic_instantiation.get(&id).copied()
    }

    pub fn signature(&self, id: DefId) -> Option<&Type> {
        self.signatures.get(&id)
    }

    pub fn set_struct_members(&mut self, id: DefId, members: Vec<StructMember>) {
        self.struct_members.insert(id, members);
    }

    pub fn set_union_cases(&mut self, id: DefId, cases: Vec<UnionCase>) {
        self.union_cases.insert(id, cases);
    }

    pub fn set_signature(&mut self, id: DefId, ty: Type) {
        self.signatures.insert(id, ty);
    }

    /// Record that `id` is the instantiation of `template` with `args`.
    pub fn set_instantiation(&mut self, id: DefId, template: DefId, args: Vec<Type>) {
        if let Some(name) = self.name(template).map(str::to_string) {
            self.template_names.insert(id, name);
        }
        self.templates.insert(id, template);
        self.type_arguments.insert(id, args);
        self.generic_instantiation.insert(id, true);
    }

    // ── Emitted identifiers ─────────────────────────────────────────────

    /// Identifier-safe name: module path, file tag for private symbols, name.
    pub fn c_identifier(&self, id: DefId) -> Option<String> {
        let meta = self.metadata(id)?;
        let mut parts = Vec::new();
        if !meta.module_path.is_empty() {
            parts.push(meta.module_path.join("_"));
        }
        if meta.access == AccessModifier::Private && !meta.source_file.is_empty() {
            parts.push(file_tag(&meta.source_file));
        }
        parts.push(meta.name.clone());
        Some(sanitize_identifier(&parts.join("_")))
    }

    /// Like [`c_identifier`](Self::c_identifier), with remaining collisions
    /// broken by ascending identity: the first keeps the bare identifier,
    /// later ones get `_1`, `_2`, ...
    pub fn unique_identifier(&self, id: DefId) -> Option<String> {
        let base = self.c_identifier(id)?;
        match self.identifier_ordinals.get(id.0 as usize).copied().unwrap_or(0) {
            0 => Some(base),
            earlier => Some(format!("{}_{}", base, earlier)),
        }
    }

    /// Pairs of identities that share an identifier, in identity order.
    pub fn identifier_conflicts(&self) -> Vec<(DefId, DefId)> {
        let mut by_ident: FxHashMap<String, Vec<DefId>> = FxHashMap::default();
        let mut order = Vec::new();
        for id in self.ids() {
            if let Some(ident) = self.c_identifier(id) {
                let entry = by_ident.entry(ident.clone()).or_default();
                if entry.is_empty() {
                    order.push(ident);
                }
                entry.push(id);
            }
        }
        let mut conflicts = Vec::new();
        for ident in order {
            let ids = &by_ident[&ident];
            for i in 0..ids.len() {
                for j in (i + 1)..ids.len() {
                    conflicts.push((ids[i], ids[j]));
                }
            }
        }
        conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(path: &str) -> Vec<String> {
        if path.is_empty() {
            Vec::new()
        } else {
            path.split('.').map(str::to_string).collect()
        }
    }

    fn alloc(map: &mut DefIdMap, path: &str, name: &str, file: &str, access: AccessModifier) -> DefId {
        map.allocate(
            &module(path),
            name,
            DefKind::Type(TypeDefKind::Struct),
            file,
            access,
            Span::DUMMY,
        )
    }

    #[test]
    fn ids_are_dense_and_monotonic() {
        let mut map = DefIdMap::new();
        let a = alloc(&mut map, "app", "A", "a.koral", AccessModifier::Default);
        let b = alloc(&mut map, "app", "B", "a.koral", AccessModifier::Default);
        assert_eq!((a, b), (DefId(0), DefId(1)));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn allocate_then_lookup_is_stable() {
        let mut map = DefIdMap::new();
        let id = alloc(&mut map, "app.geo", "Point", "geo.koral", AccessModifier::Default);
        assert_eq!(map.lookup(&module("app.geo"), "Point", Some("geo.koral")), Some(id));
        assert_eq!(map.lookup(&module("app.geo"), "Point", None), Some(id));
        assert_eq!(map.lookup(&module("app.geo"), "Point", Some("other.koral")), Some(id));
    }

    #[test]
    fn private_symbol_does_not_leak_into_other_files() {
        let mut map = DefIdMap::new();
        let id = alloc(&mut map, "app", "Helper", "a.koral", AccessModifier::Private);
        assert_eq!(map.lookup(&module("app"), "Helper", Some("a.koral")), Some(id));
        assert_eq!(map.lookup(&module("app"), "Helper", Some("b.koral")), None);
        assert_eq!(map.lookup(&module("app"), "Helper", None), None);
    }

    #[test]
    fn private_shadows_public() {
        let mut map = DefIdMap::new();
        let public = alloc(&mut map, "app", "Node", "a.koral", AccessModifier::Default);
        let private = alloc(&mut map, "app", "Node", "b.koral", AccessModifier::Private);
        assert_eq!(map.lookup(&module("app"), "Node", Some("b.koral")), Some(private));
        assert_eq!(map.lookup(&module("app"), "Node", Some("c.koral")), Some(public));
    }

    #[test]
    fn private_redeclaration_is_reused() {
        let mut map = DefIdMap::new();
        let first = alloc(&mut map, "app", "Cache", "a.koral", AccessModifier::Private);
        let again = alloc(&mut map, "app", "Cache", "a.koral", AccessModifier::Private);
        assert_eq!(first, again);
        assert_eq!(map.len(), 1);

        let other_kind = map.allocate(
            &module("app"),
            "Cache",
            DefKind::Function,
            "a.koral",
            AccessModifier::Private,
            Span::DUMMY,
        );
        assert_ne!(first, other_kind);
    }

    #[test]
    fn structural_queries_start_unknown() {
        let mut map = DefIdMap::new();
        let id = alloc(&mut map, "", "Point", "main.koral", AccessModifier::Default);
        assert!(map.struct_members(id).is_none());
        assert!(map.type_arguments(id).is_none());
        assert!(map.is_generic_instantiation(id).is_none());

        map.set_struct_members(
            id,
            vec![StructMember {
                name: "x".into(),
                ty: Type::Int,
                mutable: false,
                access: AccessModifier::Default,
            }],
        );
        assert_eq!(map.struct_members(id).map(<[_]>::len), Some(1));
    }

    #[test]
    fn file_tag_is_stable() {
        assert_eq!(file_tag("a.koral"), file_tag("a.koral"));
        assert_ne!(file_tag("a.koral"), file_tag("b.koral"));
        assert!(file_tag("src/main.koral").starts_with('f'));
    }

    #[test]
    fn private_identifiers_include_file_tag() {
        let mut map = DefIdMap::new();
        let a = alloc(&mut map, "app", "Node", "a.koral", AccessModifier::Private);
        let b = alloc(&mut map, "app", "Node", "b.koral", AccessModifier::Private);
        assert_eq!(
            map.c_identifier(a).unwrap(),
            format!("app_{}_Node", file_tag("a.koral"))
        );
        assert_ne!(map.c_identifier(a), map.c_identifier(b));
    }

    #[test]
    fn unique_identifier_breaks_ties_by_identity() {
        let mut map = DefIdMap::new();
        let a = alloc(&mut map, "a", "b_c", "x.koral", AccessModifier::Default);
        let b = alloc(&mut map, "a_b", "c", "y.koral", AccessModifier::Default);
        let c = alloc(&mut map, "", "a_b_c", "z.koral", AccessModifier::Default);
        assert_eq!(map.unique_identifier(a).unwrap(), "a_b_c");
        assert_eq!(map.unique_identifier(b).unwrap(), "a_b_c_1");
        assert_eq!(map.unique_identifier(c).unwrap(), "a_b_c_2");
        assert_eq!(map.identifier_conflicts(), vec![(a, b), (a, c), (b, c)]);
    }

    #[test]
    fn unrelated_allocations_do_not_shift_suffixes() {
        let mut map = DefIdMap::new();
        let first = alloc(&mut map, "", "Node", "a.koral", AccessModifier::Default);
        for i in 0..50 {
            alloc(&mut map, "", &format!("Other{}", i), "a.koral", AccessModifier::Default);
        }
        let second = alloc(&mut map, "", "Node", "b.koral", AccessModifier::Default);
        let reused = alloc(&mut map, "", "Leaf", "a.koral", AccessModifier::Private);
        let again = alloc(&mut map, "", "Leaf", "a.koral", AccessModifier::Private);
        assert_eq!(map.unique_identifier(first).unwrap(), "Node");
        assert_eq!(map.unique_identifier(second).unwrap(), "Node_1");
        assert_eq!(reused, again);
        assert!(!map.unique_identifier(again).unwrap().ends_with("_1"));
    }

    #[test]
    fn sanitize_replaces_invalid_characters() {
        assert_eq!(sanitize_identifier("a.b-c"), "a_b_c");
        assert_eq!(sanitize_identifier("9lives"), "_9lives");
    }

    #[test]
    fn exact_lookup_has_no_fallback() {
        let mut map = DefIdMap::new();
        let public = alloc(&mut map, "app", "Node", "a.koral", AccessModifier::Default);
        let private = alloc(&mut map, "app", "Node", "b.koral", AccessModifier::Private);
        assert_eq!(map.lookup_exact(&module("app"), "Node", None), Some(public));
        assert_eq!(map.lookup_exact(&module("app"), "Node", Some("b.koral")), Some(private));
        assert_eq!(map.lookup_exact(&module("app"), "Node", Some("c.koral")), None);
        let all: Vec<DefId> = map.candidates(&module("app"), "Node").collect();
        assert_eq!(all, vec![public, private]);
    }
}
