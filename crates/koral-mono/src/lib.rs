//! Koral monomorphization: from a checked program with generic templates
//! to a program in which every type and call is concrete.
//!
//! - [`mono`]: The request worklist, output ordering and closure check
//! - `types`: Struct and union instantiation
//! - `functions`: Function and extension method instantiation
//! - `substitute`: Type substitution and call resolution in bodies
//! - [`lower`]: Primitive methods and operators on nominal types
//! - [`error`]: Monomorphization errors

pub mod error;
mod functions;
pub mod lower;
pub mod mono;
mod substitute;
mod types;

pub use error::{MonoError, MonoErrorKind};
pub use mono::{monomorphize, MonomorphizedProgram};
pub use types::DROP_METHOD;
