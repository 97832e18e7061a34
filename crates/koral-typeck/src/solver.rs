//! Constraint solving.
//!
//! Immediate constraints are sorted by priority (stable, so generation
//! order breaks ties) and processed FIFO. Defaulting runs afterwards as a
//! separate phase: every `DefaultFloat` first, then every `DefaultInt`.
//!
//! A trait bound whose subject still contains variables goes back to the
//! end of the queue, at most `trait_bound_requeues` times. Bounds that are
//! still open when the queue drains are checked once more after
//! defaulting, and dropped if they are open even then: their subject was
//! never pinned by anything, so nothing in the program depends on the
//! conformance.
//!
//! `FloatBits` (the result of `to_bits` on a literal) waits the same way,
//! but a float that is still open after defaulting cannot happen: the
//! literal behind it has been settled.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use crate::constraint::Constraint;
use crate::def_id::TemplateKind;
use crate::error::{LiteralKind, SolverError, UnificationError};
use crate::traits::TraitScope;
use crate::ty::{Type, TypeVar};
use crate::unify::Unifier;

/// The solved value of every variable of one inference run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Substitution {
    map: FxHashMap<TypeVar, Type>,
}

impl Substitution {
    pub fn get(&self, var: TypeVar) -> Option<&Type> {
        self.map.get(&var)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Replace every solved variable in `ty`.
    pub fn apply(&self, ty: &Type) -> Type {
        match ty {
            Type::TypeVariable(var) => self.map.get(var).cloned().unwrap_or_else(|| ty.clone()),
            _ => {
                let applied: Result<Type, std::convert::Infallible> =
                    ty.try_map_children(&mut |child| Ok(self.apply(child)));
                match applied {
                    Ok(ty) => ty,
                    Err(never) => match never {},
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct ConstraintSolver {
    constraints: Vec<Constraint>,
    requeue_limit: u32,
    errors: Vec<SolverError>,
}

impl ConstraintSolver {
    pub fn new(requeue_limit: u32) -> Self {
        ConstraintSolver {
            constraints: Vec::new(),
            requeue_limit,
            errors: Vec::new(),
        }
    }

    pub fn add(&mut self, constraint: Constraint) {
        tracing::trace!(%constraint, "constraint");
        self.constraints.push(constraint);
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Every error found by the last `solve`, in detection order.
    pub fn errors(&self) -> &[SolverError] {
        &self.errors
    }

    /// Solve every constraint added so far.
    ///
    /// Errors are accumulated over the whole run; the first one is
    /// returned. Solving the same constraints again over the same unifier
    /// changes nothing.
    #[tracing::instrument(level = "debug", skip_all, fields(constraints = self.constraints.len()))]
    pub fn solve(
        &mut self,
        unifier: &mut Unifier,
        scope: &TraitScope<'_>,
    ) -> Result<Substitution, SolverError> {
        self.errors.clear();

        let (defaults, mut immediate): (Vec<Constraint>, Vec<Constraint>) = self
            .constraints
            .iter()
            .cloned()
            .partition(Constraint::is_default);
        immediate.sort_by_key(Constraint::priority);

        let mut queue: VecDeque<(Constraint, u32)> =
            immediate.into_iter().map(|c| (c, 0)).collect();
        let mut open_bounds = Vec::new();
        let mut open_bits = Vec::new();

        while let Some((constraint, requeues)) = queue.pop_front() {
            match &constraint {
                Constraint::Equal {
                    expected,
                    found,
                    span,
                } => {
                    if let Err(error) = unifier.unify(scope.ctx, expected, found) {
                        self.errors.push(SolverError::Unification { error, span: *span });
                    }
                }
                Constraint::Instantiate {
                    var,
                    template,
                    kind,
                    args,
                    span,
                } => {
                    let generic = match kind {
                        TemplateKind::Union => Type::GenericUnion {
                            template: template.clone(),
                            args: args.clone(),
                        },
                        _ => Type::GenericStruct {
                            template: template.clone(),
                            args: args.clone(),
                        },
                    };
                    if let Err(error) =
                        unifier.unify(scope.ctx, &Type::TypeVariable(*var), &generic)
                    {
                        self.errors.push(SolverError::Unification { error, span: *span });
                    }
                }
                Constraint::TraitBound {
                    ty,
                    trait_name,
                    span,
                } => {
                    let resolved = unifier.resolve(ty);
                    if resolved.any(&Type::is_type_variable) {
                        if requeues < self.requeue_limit {
                            tracing::trace!(ty = %resolved, %trait_name, requeues, "requeue trait bound");
                            queue.push_back((constraint.clone(), requeues + 1));
                        } else {
                            open_bounds.push(constraint.clone());
                        }
                    } else if !scope.satisfies(trait_name, &resolved) {
                        self.errors.push(SolverError::UnsatisfiedTraitBound {
                            ty: resolved,
                            trait_name: trait_name.clone(),
                            span: *span,
                        });
                    }
                }
                Constraint::FloatBits { float, .. } => {
                    if unifier.resolve(float).is_type_variable() {
                        open_bits.push(constraint.clone());
                    } else {
                        self.float_bits(unifier, scope, &constraint);
                    }
                }
                Constraint::DefaultInt { .. } | Constraint::DefaultFloat { .. } => {}
            }
        }

        self.apply_defaults(unifier, scope, &defaults);

        for constraint in &open_bits {
            self.float_bits(unifier, scope, constraint);
        }

        for constraint in open_bounds {
            if let Constraint::TraitBound {
                ty,
                trait_name,
                span,
            } = constraint
            {
                let resolved = unifier.resolve(&ty);
                if resolved.any(&Type::is_type_variable) {
                    tracing::debug!(ty = %resolved, %trait_name, "dropping unresolved trait bound");
                } else if !scope.satisfies(&trait_name, &resolved) {
                    self.errors.push(SolverError::UnsatisfiedTraitBound {
                        ty: resolved,
                        trait_name,
                        span,
                    });
                }
            }
        }

        self.check_solved(unifier);

        match self.errors.first() {
            Some(first) => Err(first.clone()),
            None => Ok(self.substitution(unifier)),
        }
    }

    fn float_bits(&mut self, unifier: &mut Unifier, scope: &TraitScope<'_>, constraint: &Constraint) {
        let Constraint::FloatBits { float, bits, span } = constraint else {
            return;
        };
        let width = match unifier.resolve(float) {
            Type::Float32 => Type::UInt32,
            Type::Float64 => Type::UInt64,
            Type::TypeVariable(_) => return,
            found => {
                self.errors.push(SolverError::Unification {
                    error: UnificationError::TypeMismatch {
                        expected: Type::Float64,
                        found,
                    },
                    span: *span,
                });
                return;
            }
        };
        if let Err(error) = unifier.unify(scope.ctx, bits, &width) {
            self.errors.push(SolverError::Unification { error, span: *span });
        }
    }

    fn apply_defaults(
        &mut self,
        unifier: &mut Unifier,
        scope: &TraitScope<'_>,
        defaults: &[Constraint],
    ) {
        let floats = defaults
            .iter()
            .filter(|c| matches!(c, Constraint::DefaultFloat { .. }));
        let ints = defaults
            .iter()
            .filter(|c| matches!(c, Constraint::DefaultInt { .. }));

        for constraint in floats.chain(ints) {
            let (var, span, literal, fallback) = match constraint {
                Constraint::DefaultFloat { var, span } => {
                    (*var, *span, LiteralKind::Float, Type::Float64)
                }
                Constraint::DefaultInt { var, span } => (*var, *span, LiteralKind::Integer, Type::Int),
                _ => continue,
            };
            let current = unifier.resolve(&Type::TypeVariable(var));
            match current {
                Type::TypeVariable(_) => {
                    tracing::trace!(%var, ty = %fallback, "default literal");
                    if let Err(error) = unifier.unify(scope.ctx, &current, &fallback) {
                        self.errors.push(SolverError::Unification { error, span });
                    }
                }
                pinned => {
                    let compatible = match literal {
                        LiteralKind::Integer => pinned.is_numeric(),
                        LiteralKind::Float => pinned.is_float(),
                    } || pinned == Type::Never;
                    if !compatible {
                        self.errors.push(SolverError::ConflictingConstraints {
                            literal,
                            found: pinned,
                            span,
                        });
                    }
                }
            }
        }
    }

    /// Report the first variable, per constraint, that nothing pinned.
    fn check_solved(&mut self, unifier: &mut Unifier) {
        let mut reported = Vec::new();
        for constraint in &self.constraints {
            for ty in constraint.types() {
                let resolved = unifier.resolve(&ty);
                if let Some(var) = first_var(&resolved) {
                    if !reported.contains(&var) {
                        reported.push(var);
                        self.errors.push(SolverError::UnsolvedVariable {
                            var,
                            span: constraint.span(),
                        });
                    }
                }
            }
        }
    }

    fn substitution(&self, unifier: &mut Unifier) -> Substitution {
        let mut map = FxHashMap::default();
        for index in 0..unifier.var_count() as u32 {
            let var = TypeVar(index);
            let resolved = unifier.resolve(&Type::TypeVariable(var));
            if resolved != Type::TypeVariable(var) {
                map.insert(var, resolved);
            }
        }
        Substitution { map }
    }
}

fn first_var(ty: &Type) -> Option<TypeVar> {
    match ty {
        Type::TypeVariable(var) => Some(*var),
        _ => ty.children().into_iter().find_map(first_var),
    }
}
