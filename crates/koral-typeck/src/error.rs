//! Error taxonomy for the semantic passes.
//!
//! Three layers: [`UnificationError`] is produced by the unifier,
//! [`SolverError`] by the constraint solver (wrapping unification failures
//! with the span of the constraint that triggered them), and
//! [`SemanticError`] is what the declaration passes return. Every
//! semantic error carries the span it is anchored to.

use std::fmt;

use koral_common::Span;
use serde::Serialize;

use crate::def_id::AccessModifier;
use crate::ty::{Type, TypeVar};

/// A failure to make two types equal.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum UnificationError {
    TypeMismatch { expected: Type, found: Type },
    ArityMismatch { expected: usize, found: usize },
    /// A variable would have to contain itself.
    OccursCheck { var: TypeVar, ty: Type },
    /// Two applications of different generic templates.
    TemplateMismatch { expected: String, found: String },
}

impl fmt::Display for UnificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnificationError::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected `{}`, found `{}`", expected, found)
            }
            UnificationError::ArityMismatch { expected, found } => {
                write!(
                    f,
                    "arity mismatch: expected {} arguments, found {}",
                    expected, found
                )
            }
            UnificationError::OccursCheck { var, ty } => {
                write!(f, "infinite type: `{}` occurs in `{}`", var, ty)
            }
            UnificationError::TemplateMismatch { expected, found } => {
                write!(
                    f,
                    "template mismatch: expected `{}`, found `{}`",
                    expected, found
                )
            }
        }
    }
}

impl std::error::Error for UnificationError {}

/// Which kind of literal a defaulting constraint came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum LiteralKind {
    Integer,
    Float,
}

impl fmt::Display for LiteralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralKind::Integer => write!(f, "integer"),
            LiteralKind::Float => write!(f, "float"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum SolverError {
    Unification { error: UnificationError, span: Span },
    UnsolvedVariable { var: TypeVar, span: Span },
    /// A literal's variable was pinned to a type the literal cannot have.
    ConflictingConstraints {
        literal: LiteralKind,
        found: Type,
        span: Span,
    },
    UnsatisfiedTraitBound {
        ty: Type,
        trait_name: String,
        span: Span,
    },
}

impl SolverError {
    pub fn span(&self) -> Span {
        match self {
            SolverError::Unification { span, .. }
            | SolverError::UnsolvedVariable { span, .. }
            | SolverError::ConflictingConstraints { span, .. }
            | SolverError::UnsatisfiedTraitBound { span, .. } => *span,
        }
    }
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::Unification { error, .. } => write!(f, "{}", error),
            SolverError::UnsolvedVariable { var, .. } => {
                write!(f, "cannot infer a type for `{}`", var)
            }
            SolverError::ConflictingConstraints { literal, found, .. } => {
                write!(
                    f,
                    "conflicting constraints: {} literal cannot have type `{}`",
                    literal, found
                )
            }
            SolverError::UnsatisfiedTraitBound { ty, trait_name, .. } => {
                write!(f, "type `{}` does not satisfy trait `{}`", ty, trait_name)
            }
        }
    }
}

impl std::error::Error for SolverError {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum VisibilityError {
    /// The name's module is imported, but only as a module.
    RequiresModulePrefix { name: String, module: String },
    NotAccessible {
        name: String,
        access: AccessModifier,
    },
}

impl fmt::Display for VisibilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisibilityError::RequiresModulePrefix { name, module } => {
                let alias = module.rsplit('.').next().unwrap_or(module);
                write!(
                    f,
                    "`{}` is declared in module `{}`; write `{}.{}`",
                    name, module, alias, name
                )
            }
            VisibilityError::NotAccessible { name, access } => {
                write!(f, "`{}` is {} and not accessible here", name, access)
            }
        }
    }
}

impl std::error::Error for VisibilityError {}

/// The error returned by the checking passes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SemanticError {
    pub kind: SemanticErrorKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum SemanticErrorKind {
    DuplicateDefinition { name: String },
    UndefinedType { name: String },
    UndefinedVariable { name: String },
    UndefinedMember { ty: String, member: String },
    UndefinedMethod { ty: String, method: String },
    UnknownCase { union: String, case: String },
    UnknownTrait { name: String },
    TypeMismatch { expected: String, found: String },
    InvalidArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },
    InvalidOperation { op: String, ty: String },
    NotAFunction { ty: String },
    /// Value types that contain themselves without indirection.
    RecursiveType { cycle: Vec<String> },
    MissingTraitMethod {
        trait_name: String,
        method: String,
        ty: String,
    },
    NonExhaustiveMatch { missing: Vec<String> },
    UnreachablePattern { index: usize },
    MissingCatchAll { ty: String },
    Solver(SolverError),
    Visibility(VisibilityError),
}

impl SemanticError {
    pub fn new(kind: SemanticErrorKind, span: Span) -> Self {
        SemanticError { kind, span }
    }

    /// Short, stable code used by diagnostics.
    pub fn code(&self) -> &'static str {
        match &self.kind {
            SemanticErrorKind::DuplicateDefinition { .. } => "E0001",
            SemanticErrorKind::UndefinedType { .. } => "E0002",
            SemanticErrorKind::UndefinedVariable { .. } => "E0003",
            SemanticErrorKind::UndefinedMember { .. } => "E0004",
            SemanticErrorKind::UndefinedMethod { .. } => "E0005",
            SemanticErrorKind::UnknownCase { .. } => "E0006",
            SemanticErrorKind::UnknownTrait { .. } => "E0007",
            SemanticErrorKind::TypeMismatch { .. } => "E0008",
            SemanticErrorKind::InvalidArgumentCount { .. } => "E0009",
            SemanticErrorKind::InvalidOperation { .. } => "E0010",
            SemanticErrorKind::NotAFunction { .. } => "E0011",
            SemanticErrorKind::RecursiveType { .. } => "E0012",
            SemanticErrorKind::MissingTraitMethod { .. } => "E0013",
            SemanticErrorKind::NonExhaustiveMatch { .. } => "E0014",
            SemanticErrorKind::UnreachablePattern { .. } => "E0015",
            SemanticErrorKind::MissingCatchAll { .. } => "E0016",
            SemanticErrorKind::Solver(SolverError::Unification { .. }) => "E0020",
            SemanticErrorKind::Solver(SolverError::UnsolvedVariable { .. }) => "E0021",
            SemanticErrorKind::Solver(SolverError::ConflictingConstraints { .. }) => "E0022",
            SemanticErrorKind::Solver(SolverError::UnsatisfiedTraitBound { .. }) => "E0023",
            SemanticErrorKind::Visibility(VisibilityError::RequiresModulePrefix { .. }) => {
                "E0030"
            }
            SemanticErrorKind::Visibility(VisibilityError::NotAccessible { .. }) => "E0031",
        }
    }

    /// A fix suggestion, when a plausible one exists.
    pub fn help(&self) -> Option<String> {
        match &self.kind {
            SemanticErrorKind::NonExhaustiveMatch { missing } => {
                Some(format!("add patterns for {}", missing.join(", ")))
            }
            SemanticErrorKind::MissingCatchAll { .. } => {
                Some("add a `_` pattern at the end of the match".to_string())
            }
            SemanticErrorKind::RecursiveType { .. } => {
                Some("break the cycle with a `ref` or `ptr` field".to_string())
            }
            SemanticErrorKind::Visibility(VisibilityError::RequiresModulePrefix {
                name,
                module,
            }) => {
                let alias = module.rsplit('.').next().unwrap_or(module);
                Some(format!("write `{}.{}`", alias, name))
            }
            _ => None,
        }
    }
}

impl From<SolverError> for SemanticError {
    fn from(err: SolverError) -> Self {
        let span = err.span();
        SemanticError::new(SemanticErrorKind::Solver(err), span)
    }
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SemanticErrorKind::DuplicateDefinition { name } => {
                write!(f, "duplicate definition of `{}`", name)
            }
            SemanticErrorKind::UndefinedType { name } => write!(f, "undefined type `{}`", name),
            SemanticErrorKind::UndefinedVariable { name } => {
                write!(f, "undefined variable `{}`", name)
            }
            SemanticErrorKind::UndefinedMember { ty, member } => {
                write!(f, "type `{}` has no member `{}`", ty, member)
            }
            SemanticErrorKind::UndefinedMethod { ty, method } => {
                write!(f, "no method `{}` on type `{}`", method, ty)
            }
            SemanticErrorKind::UnknownCase { union, case } => {
                write!(f, "union `{}` has no case `{}`", union, case)
            }
            SemanticErrorKind::UnknownTrait { name } => write!(f, "unknown trait `{}`", name),
            SemanticErrorKind::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected `{}`, found `{}`", expected, found)
            }
            SemanticErrorKind::InvalidArgumentCount {
                name,
                expected,
                found,
            } => write!(
                f,
                "`{}` expects {} arguments, found {}",
                name, expected, found
            ),
            SemanticErrorKind::InvalidOperation { op, ty } => {
                write!(f, "invalid operation `{}` on type `{}`", op, ty)
            }
            SemanticErrorKind::NotAFunction { ty } => write!(f, "`{}` is not a function", ty),
            SemanticErrorKind::RecursiveType { cycle } => {
                write!(f, "recursive value type: {}", cycle.join(" -> "))
            }
            SemanticErrorKind::MissingTraitMethod {
                trait_name,
                method,
                ty,
            } => write!(
                f,
                "`{}` for `{}` is missing method `{}`",
                trait_name, ty, method
            ),
            SemanticErrorKind::NonExhaustiveMatch { missing } => {
                write!(f, "non-exhaustive match: missing {}", missing.join(", "))
            }
            SemanticErrorKind::UnreachablePattern { index } => {
                write!(f, "pattern {} is unreachable", index + 1)
            }
            SemanticErrorKind::MissingCatchAll { ty } => write!(
                f,
                "match on `{}` requires a catch-all pattern",
                ty
            ),
            SemanticErrorKind::Solver(err) => write!(f, "{}", err),
            SemanticErrorKind::Visibility(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for SemanticError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solver_error_keeps_span() {
        let err = SolverError::UnsolvedVariable {
            var: TypeVar(4),
            span: Span::new(3, 9),
        };
        let semantic: SemanticError = err.into();
        assert_eq!(semantic.span, Span::new(3, 9));
        assert_eq!(semantic.code(), "E0021");
        assert_eq!(semantic.to_string(), "cannot infer a type for `?4`");
    }

    #[test]
    fn visibility_messages_name_the_alias() {
        let err = VisibilityError::RequiresModulePrefix {
            name: "add".into(),
            module: "math.vector".into(),
        };
        assert_eq!(
            err.to_string(),
            "`add` is declared in module `math.vector`; write `vector.add`"
        );
    }

    #[test]
    fn non_exhaustive_lists_missing_cases() {
        let err = SemanticError::new(
            SemanticErrorKind::NonExhaustiveMatch {
                missing: vec![".Blue".into(), ".Green".into()],
            },
            Span::DUMMY,
        );
        assert_eq!(err.to_string(), "non-exhaustive match: missing .Blue, .Green");
        assert_eq!(err.help().as_deref(), Some("add patterns for .Blue, .Green"));
    }
}
