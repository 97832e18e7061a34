//! Shared infrastructure for the Koral compiler crates.
//!
//! - [`span`]: byte-offset spans and line lookup
//! - [`module_graph`]: the module/import graph answering visibility queries
//! - [`config`]: compiler settings loaded from `koral.toml`

pub mod config;
pub mod module_graph;
pub mod span;

pub use config::CompilerConfig;
pub use module_graph::{ImportKind, ModuleGraph, ModuleId, Reach};
pub use span::Span;
