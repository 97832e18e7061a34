//! Koral semantic analysis: definitions, type inference and exhaustiveness.
//!
//! This crate takes a parsed, module-annotated program and produces a fully
//! typed program plus the set of generic instantiations it needs. It covers:
//!
//! - Stable definition identities shared by every later phase
//! - Bidirectional inference with deferred constraints and literal defaulting
//! - Trait bounds on generic parameters and trait conformance checks
//! - Visibility (private, protected, public) across files and modules
//! - Pattern exhaustiveness and reachability for `match`
//!
//! # Architecture
//!
//! - [`def_id`]: Definition registry (DefId, metadata, C identifiers)
//! - [`context`]: CompilerContext facade and layout keys
//! - [`ty`]: Core type representation
//! - [`ast`] / [`typed`]: Input and output trees; [`fold`] walks typed trees
//! - [`resolve`]: Name and type resolution with visibility checks
//! - [`declare`]: Declaration passes (collection, shells, traits, recursion)
//! - [`unify`], [`constraint`], [`solver`]: The ena-backed constraint solver
//! - [`env`]: Lexical scopes
//! - [`traits`]: Trait registry and builtin traits
//! - [`templates`], [`instantiation`]: Generic templates and requests
//! - [`infer`]: The inference engine for one body
//! - [`exhaustiveness`]: Match coverage
//! - [`check`]: Whole-program checking entry point
//! - [`error`], [`diagnostics`]: Errors and their ariadne/JSON rendering

pub mod ast;
pub mod check;
pub mod constraint;
pub mod context;
pub mod declare;
pub mod def_id;
pub mod diagnostics;
pub mod env;
pub mod error;
pub mod exhaustiveness;
pub mod fold;
pub mod infer;
pub mod instantiation;
pub mod resolve;
pub mod solver;
pub mod templates;
pub mod traits;
pub mod ty;
pub mod typed;
pub mod unify;

pub use check::{check_program, CheckedProgram};
pub use context::CompilerContext;
pub use def_id::{DefId, DefIdMap, DefKind};
pub use error::{SemanticError, SemanticErrorKind};
pub use instantiation::{InstantiationKind, InstantiationRequest, RequestSet};
pub use ty::Type;
