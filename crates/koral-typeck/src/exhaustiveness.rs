//! Match coverage: unreachable patterns first, then exhaustiveness.
//!
//! Works on typed patterns against a [`SubjectShape`], the part of the
//! subject type that coverage depends on. Union subjects are covered by
//! naming every case, `Bool` by both values; every other subject type has
//! an unbounded domain and needs a catch-all arm.
//!
//! A case pattern covers its case only when all of its argument patterns
//! are catch-alls: `.Some(_)` covers `Some`, `.Some(1)` does not.

use std::collections::BTreeSet;

use koral_common::Span;

use crate::context::CompilerContext;
use crate::error::{SemanticError, SemanticErrorKind};
use crate::templates::GenericTemplates;
use crate::ty::Type;
use crate::typed::{TypedPattern, TypedPatternKind};

/// What coverage of a subject type means.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubjectShape {
    /// A union with its case names in declaration order.
    Union { name: String, cases: Vec<String> },
    Bool,
    /// Integers, floats, structs, generic unions whose cases are unknown.
    Unbounded { ty: String },
}

impl SubjectShape {
    /// The shape of `ty`. Generic unions take their case list from the
    /// template; case names do not depend on the type arguments.
    pub fn of(ty: &Type, ctx: &CompilerContext, templates: &GenericTemplates) -> SubjectShape {
        match ty {
            Type::Bool => SubjectShape::Bool,
            Type::Union(n) => match ctx.defs().union_cases(n.def) {
                Some(cases) => SubjectShape::Union {
                    name: ctx.debug_name(ty),
                    cases: cases.iter().map(|c| c.name.clone()).collect(),
                },
                None => SubjectShape::Unbounded {
                    ty: ctx.debug_name(ty),
                },
            },
            Type::GenericUnion { template, .. } => match templates.unions.get(&template.def) {
                Some(union) => SubjectShape::Union {
                    name: ctx.debug_name(ty),
                    cases: union.cases.iter().map(|c| c.name.clone()).collect(),
                },
                None => SubjectShape::Unbounded {
                    ty: ctx.debug_name(ty),
                },
            },
            _ => SubjectShape::Unbounded {
                ty: ctx.debug_name(ty),
            },
        }
    }
}

// ── Pattern classification ─────────────────────────────────────────────

/// Matches every value: `_`, a binding, or an or/and combination of those.
pub fn is_catch_all(pattern: &TypedPattern) -> bool {
    match &pattern.kind {
        TypedPatternKind::Wildcard | TypedPatternKind::Variable(_) => true,
        TypedPatternKind::Or(a, b) => is_catch_all(a) || is_catch_all(b),
        TypedPatternKind::And(a, b) => is_catch_all(a) && is_catch_all(b),
        _ => false,
    }
}

/// Union cases this pattern matches completely.
fn covered_cases(pattern: &TypedPattern) -> BTreeSet<String> {
    match &pattern.kind {
        TypedPatternKind::Case { name, args, .. } if args.iter().all(is_catch_all) => {
            BTreeSet::from([name.clone()])
        }
        TypedPatternKind::Or(a, b) => {
            let mut cases = covered_cases(a);
            cases.extend(covered_cases(b));
            cases
        }
        TypedPatternKind::And(a, b) => {
            if is_catch_all(a) {
                covered_cases(b)
            } else if is_catch_all(b) {
                covered_cases(a)
            } else {
                covered_cases(a)
                    .intersection(&covered_cases(b))
                    .cloned()
                    .collect()
            }
        }
        _ => BTreeSet::new(),
    }
}

/// Bool values this pattern matches.
fn covered_bools(pattern: &TypedPattern) -> BTreeSet<bool> {
    match &pattern.kind {
        TypedPatternKind::Bool(value) => BTreeSet::from([*value]),
        TypedPatternKind::Or(a, b) => {
            let mut values = covered_bools(a);
            values.extend(covered_bools(b));
            values
        }
        TypedPatternKind::Not(inner) => {
            let inner = covered_bools(inner);
            [true, false].into_iter().filter(|v| !inner.contains(v)).collect()
        }
        _ => BTreeSet::new(),
    }
}

// ── Checking ───────────────────────────────────────────────────────────

/// Check the arms of one match, in order. Unreachable patterns are
/// reported at the pattern; missing coverage at `match_span`.
pub fn check_match(
    patterns: &[&TypedPattern],
    shape: &SubjectShape,
    match_span: Span,
) -> Result<(), SemanticError> {
    let mut catch_all = false;
    let mut cases: BTreeSet<String> = BTreeSet::new();
    let mut bools: BTreeSet<bool> = BTreeSet::new();

    for (index, pattern) in patterns.iter().enumerate() {
        let complete = match shape {
            SubjectShape::Union { cases: all, .. } => all.iter().all(|c| cases.contains(c)),
            SubjectShape::Bool => bools.len() == 2,
            SubjectShape::Unbounded { .. } => false,
        };
        let this_cases = covered_cases(pattern);
        let repeats_covered_case = matches!(shape, SubjectShape::Union { .. })
            && !this_cases.is_empty()
            && this_cases.is_subset(&cases);
        if catch_all || complete || repeats_covered_case {
            return Err(SemanticError::new(
                SemanticErrorKind::UnreachablePattern { index },
                pattern.span,
            ));
        }

        catch_all = is_catch_all(pattern);
        cases.extend(this_cases);
        bools.extend(covered_bools(pattern));
    }

    if catch_all {
        return Ok(());
    }
    match shape {
        SubjectShape::Union { cases: all, .. } => {
            let mut missing: Vec<String> = all
                .iter()
                .filter(|c| !cases.contains(*c))
                .map(|c| format!(".{}", c))
                .collect();
            missing.sort();
            if missing.is_empty() {
                Ok(())
            } else {
                Err(SemanticError::new(
                    SemanticErrorKind::NonExhaustiveMatch { missing },
                    match_span,
                ))
            }
        }
        SubjectShape::Bool => {
            let missing: Vec<String> = [false, true]
                .into_iter()
                .filter(|v| !bools.contains(v))
                .map(|v| v.to_string())
                .collect();
            if missing.is_empty() {
                Ok(())
            } else {
                Err(SemanticError::new(
                    SemanticErrorKind::NonExhaustiveMatch { missing },
                    match_span,
                ))
            }
        }
        SubjectShape::Unbounded { ty } => Err(SemanticError::new(
            SemanticErrorKind::MissingCatchAll { ty: ty.clone() },
            match_span,
        )),
    }
}
