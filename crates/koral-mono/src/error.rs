//! Monomorphization errors.
//!
//! Any of these aborts the whole run; there is no partial output.

use std::fmt;

use koral_common::Span;

#[derive(Clone, Debug, PartialEq)]
pub enum MonoErrorKind {
    /// A request names a template that was never registered, or one whose
    /// body was never checked.
    MissingTemplate { name: String },
    /// No method (or trait conformance providing it) for a concrete receiver.
    MissingMethod { ty: String, method: String },
    /// A generic struct or union that contains itself by value.
    DirectRecursion { layout: String, member: String },
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },
    /// Instantiation kept producing new instantiations past the limit.
    DepthExceeded { limit: usize, name: String },
    /// A generic or inference type survived into the output.
    Unresolved { ty: String, site: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct MonoError {
    pub kind: MonoErrorKind,
    pub span: Span,
}

impl MonoError {
    pub fn new(kind: MonoErrorKind, span: Span) -> Self {
        MonoError { kind, span }
    }
}

impl fmt::Display for MonoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            MonoErrorKind::MissingTemplate { name } => {
                write!(f, "no checked template for `{}`", name)
            }
            MonoErrorKind::MissingMethod { ty, method } => {
                write!(f, "`{}` has no method `{}`", ty, method)
            }
            MonoErrorKind::DirectRecursion { layout, member } => write!(
                f,
                "`{}` contains itself through `{}`; use `ref` to break the cycle",
                layout, member
            ),
            MonoErrorKind::ArgumentCount {
                name,
                expected,
                found,
            } => write!(
                f,
                "`{}` expects {} type argument(s), found {}",
                name, expected, found
            ),
            MonoErrorKind::DepthExceeded { limit, name } => write!(
                f,
                "instantiating `{}` exceeded the maximum depth of {} (infinite generic recursion?)",
                name, limit
            ),
            MonoErrorKind::Unresolved { ty, site } => {
                write!(f, "unresolved type `{}` in `{}`", ty, site)
            }
        }
    }
}

impl std::error::Error for MonoError {}
