//! Deferred typing constraints.
//!
//! Synthesis and checking emit constraints instead of deciding eagerly.
//! They are appended in generation order and consumed once by the
//! [`ConstraintSolver`](crate::solver::ConstraintSolver).

use std::fmt;

use koral_common::Span;

use crate::def_id::TemplateKind;
use crate::ty::{Nominal, Type, TypeVar};

#[derive(Clone, Debug, PartialEq)]
pub enum Constraint {
    Equal {
        expected: Type,
        found: Type,
        span: Span,
    },
    /// Bind `var` to the application of a generic struct or union template.
    Instantiate {
        var: TypeVar,
        template: Nominal,
        kind: TemplateKind,
        args: Vec<Type>,
        span: Span,
    },
    TraitBound {
        ty: Type,
        trait_name: String,
        span: Span,
    },
    /// `bits` is the unsigned type as wide as the float type `float`.
    /// Checked once `float` is known, which may be after defaulting.
    FloatBits { float: Type, bits: Type, span: Span },
    /// An unsuffixed integer literal: `Int` unless something pins it first.
    DefaultInt { var: TypeVar, span: Span },
    /// An unsuffixed float literal: `Float64` unless something pins it first.
    DefaultFloat { var: TypeVar, span: Span },
}

impl Constraint {
    /// Processing order; lower runs first. Defaults are never queued with
    /// the rest, they run after the main queue drains.
    pub fn priority(&self) -> u8 {
        match self {
            Constraint::Equal { .. } => 0,
            Constraint::Instantiate { .. } => 1,
            Constraint::TraitBound { .. } => 2,
            Constraint::FloatBits { .. } => 3,
            Constraint::DefaultInt { .. } | Constraint::DefaultFloat { .. } => 10,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(
            self,
            Constraint::DefaultInt { .. } | Constraint::DefaultFloat { .. }
        )
    }

    pub fn span(&self) -> Span {
        match self {
            Constraint::Equal { span, .. }
            | Constraint::Instantiate { span, .. }
            | Constraint::TraitBound { span, .. }
            | Constraint::FloatBits { span, .. }
            | Constraint::DefaultInt { span, .. }
            | Constraint::DefaultFloat { span, .. } => *span,
        }
    }

    /// Types the constraint talks about, for unsolved-variable reporting.
    pub fn types(&self) -> Vec<Type> {
        match self {
            Constraint::Equal {
                expected, found, ..
            } => vec![expected.clone(), found.clone()],
            Constraint::Instantiate { var, args, .. } => {
                let mut types = vec![Type::TypeVariable(*var)];
                types.extend(args.iter().cloned());
                types
            }
            Constraint::TraitBound { ty, .. } => vec![ty.clone()],
            Constraint::FloatBits { float, bits, .. } => vec![float.clone(), bits.clone()],
            Constraint::DefaultInt { var, .. } | Constraint::DefaultFloat { var, .. } => {
                vec![Type::TypeVariable(*var)]
            }
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Equal {
                expected, found, ..
            } => write!(f, "{} == {}", expected, found),
            Constraint::Instantiate {
                var,
                template,
                args,
                ..
            } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{} := [{}]{}", var, args.join(", "), template.name)
            }
            Constraint::TraitBound { ty, trait_name, .. } => write!(f, "{}: {}", ty, trait_name),
            Constraint::FloatBits { float, bits, .. } => write!(f, "bits({}) == {}", float, bits),
            Constraint::DefaultInt { var, .. } => write!(f, "default({}) = Int", var),
            Constraint::DefaultFloat { var, .. } => write!(f, "default({}) = Float64", var),
        }
    }
}
