//! Unification over `ena`'s union-find table.
//!
//! A `Unifier` lives for one inference run. It mints type variables,
//! binds them, and resolves types through the current bindings. Failures
//! are returned, never recorded here; the solver decides what to keep.

use ena::unify::InPlaceUnificationTable;
use rustc_hash::FxHashSet;

use crate::context::CompilerContext;
use crate::def_id::DefId;
use crate::error::UnificationError;
use crate::ty::{Type, TypeVar};

pub struct Unifier {
    table: InPlaceUnificationTable<TypeVar>,
}

impl Default for Unifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Unifier {
    pub fn new() -> Self {
        Unifier {
            table: InPlaceUnificationTable::new(),
        }
    }

    // ── Type Variable Creation ──────────────────────────────────────────

    pub fn new_var(&mut self) -> TypeVar {
        self.table.new_key(None)
    }

    pub fn fresh(&mut self) -> Type {
        Type::TypeVariable(self.new_var())
    }

    pub fn var_count(&self) -> usize {
        self.table.len()
    }

    /// The binding of `var`'s class, if any.
    pub fn binding(&mut self, var: TypeVar) -> Option<Type> {
        self.table.probe_value(var)
    }

    pub fn is_bound(&mut self, var: TypeVar) -> bool {
        self.binding(var).is_some()
    }

    // ── Resolution ──────────────────────────────────────────────────────

    /// Substitute bound variables recursively. An unbound variable resolves
    /// to the representative of its class, never to a made-up type.
    pub fn resolve(&mut self, ty: &Type) -> Type {
        match ty {
            Type::TypeVariable(var) => match self.table.probe_value(*var) {
                Some(bound) => self.resolve(&bound),
                None => Type::TypeVariable(self.table.find(*var)),
            },
            _ => {
                let resolved: Result<Type, std::convert::Infallible> =
                    ty.try_map_children(&mut |child| Ok(self.resolve(child)));
                match resolved {
                    Ok(ty) => ty,
                    Err(never) => match never {},
                }
            }
        }
    }

    // ── Occurs Check ────────────────────────────────────────────────────

    /// Whether `var` occurs in `ty`, following bindings and looking through
    /// nominal declarations into their members.
    pub fn occurs_in(&mut self, ctx: &CompilerContext, var: TypeVar, ty: &Type) -> bool {
        let mut visited = FxHashSet::default();
        self.occurs_in_inner(ctx, var, ty, &mut visited)
    }

    fn occurs_in_inner(
        &mut self,
        ctx: &CompilerContext,
        var: TypeVar,
        ty: &Type,
        visited: &mut FxHashSet<DefId>,
    ) -> bool {
        match ty {
            Type::TypeVariable(v) => {
                if self.table.unioned(*v, var) {
                    return true;
                }
                match self.table.probe_value(*v) {
                    Some(bound) => self.occurs_in_inner(ctx, var, &bound, visited),
                    None => false,
                }
            }
            Type::Structure(n) | Type::Union(n) => {
                if !visited.insert(n.def) {
                    return false;
                }
                ctx.member_types(n.def)
                    .iter()
                    .any(|member| self.occurs_in_inner(ctx, var, member, visited))
            }
            _ => ty
                .children()
                .into_iter()
                .any(|child| self.occurs_in_inner(ctx, var, child, visited)),
        }
    }

    // ── Unification ─────────────────────────────────────────────────────

    /// Make `a` and `b` equal.
    ///
    /// Both sides are resolved first, so unifying a type with itself never
    /// creates a binding.
    pub fn unify(
        &mut self,
        ctx: &CompilerContext,
        a: &Type,
        b: &Type,
    ) -> Result<(), UnificationError> {
        let a = self.resolve(a);
        let b = self.resolve(b);
        if a == b {
            return Ok(());
        }

        match (a, b) {
            (Type::TypeVariable(v1), Type::TypeVariable(v2)) => self
                .table
                .unify_var_var(v1, v2)
                .map_err(|(expected, found)| UnificationError::TypeMismatch { expected, found }),

            (Type::TypeVariable(v), ty) | (ty, Type::TypeVariable(v)) => {
                if self.occurs_in(ctx, v, &ty) {
                    return Err(UnificationError::OccursCheck { var: v, ty });
                }
                tracing::trace!(var = %v, ty = %ty, "bind");
                self.table
                    .unify_var_value(v, Some(ty))
                    .map_err(|(expected, found)| UnificationError::TypeMismatch {
                        expected,
                        found,
                    })
            }

            // Never unifies with anything (bottom type).
            (Type::Never, _) | (_, Type::Never) => Ok(()),

            (
                Type::Function {
                    params: p1,
                    returns: r1,
                },
                Type::Function {
                    params: p2,
                    returns: r2,
                },
            ) => {
                self.unify_all(ctx, &p1, &p2)?;
                self.unify(ctx, &r1, &r2)
            }

            (
                Type::GenericStruct {
                    template: t1,
                    args: a1,
                },
                Type::GenericStruct {
                    template: t2,
                    args: a2,
                },
            )
            | (
                Type::GenericUnion {
                    template: t1,
                    args: a1,
                },
                Type::GenericUnion {
                    template: t2,
                    args: a2,
                },
            ) => {
                if t1 != t2 {
                    return Err(UnificationError::TemplateMismatch {
                        expected: t1.name,
                        found: t2.name,
                    });
                }
                self.unify_all(ctx, &a1, &a2)
            }

            (Type::Reference(i1), Type::Reference(i2))
            | (Type::Pointer(i1), Type::Pointer(i2))
            | (Type::WeakReference(i1), Type::WeakReference(i2)) => self.unify(ctx, &i1, &i2),

            (expected, found) => Err(UnificationError::TypeMismatch { expected, found }),
        }
    }

    fn unify_all(
        &mut self,
        ctx: &CompilerContext,
        expected: &[Type],
        found: &[Type],
    ) -> Result<(), UnificationError> {
        if expected.len() != found.len() {
            return Err(UnificationError::ArityMismatch {
                expected: expected.len(),
                found: found.len(),
            });
        }
        for (a, b) in expected.iter().zip(found) {
            self.unify(ctx, a, b)?;
        }
        Ok(())
    }
}
