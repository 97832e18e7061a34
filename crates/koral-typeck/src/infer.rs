//! Bidirectional inference for one body.
//!
//! An [`InferenceEngine`] checks a single function, method or global
//! initializer. It runs in two modes:
//!
//! - `synthesize` computes a type bottom-up, minting fresh type variables
//!   for whatever is not known yet (unsuffixed literals, unannotated lambda
//!   parameters, type arguments of generic calls);
//! - `check` pushes an expected type down, so literals, lambdas, implicit
//!   union cases and branch tails pick it up directly.
//!
//! Neither mode unifies eagerly: both append [`Constraint`]s, and
//! [`InferenceEngine::finish`] solves them once, applies the substitution
//! to the typed tree, and runs exhaustiveness on every `match`.
//!
//! Uses of generic templates with (eventually) concrete arguments are
//! collected as [`InstantiationRequest`]s for the monomorphizer.

use koral_common::{CompilerConfig, Span};
use rustc_hash::FxHashMap;

use crate::ast::{BinaryOp, Expr, ExprKind, LambdaParam, MatchArm, Pattern, PatternKind, Stmt, TypeNode, TypeParam};
use crate::constraint::Constraint;
use crate::context::CompilerContext;
use crate::def_id::{DefId, DefKind, TemplateKind, TypeDefKind};
use crate::env::TypeEnv;
use crate::error::{LiteralKind, SemanticError, SemanticErrorKind, SolverError};
use crate::exhaustiveness::{check_match, SubjectShape};
use crate::fold::{walk_expr, TypedFolder};
use crate::instantiation::{InstantiationKind, InstantiationRequest};
use crate::resolve::Resolver;
use crate::solver::{ConstraintSolver, Substitution};
use crate::templates::{substitution_map, GenericTemplates};
use crate::traits::{primitive_method, TraitRegistry, TraitScope};
use crate::ty::{Nominal, Type, TypeVar};
use crate::typed::{
    TypedArm, TypedExpr, TypedExprKind, TypedParam, TypedPattern, TypedPatternKind, TypedStmt,
};
use crate::unify::Unifier;

fn error(kind: SemanticErrorKind, span: Span) -> SemanticError {
    SemanticError::new(kind, span)
}

/// A callee that names a declaration directly.
struct Callee<'e> {
    def: DefId,
    name: String,
    type_args: Option<&'e [TypeNode]>,
    span: Span,
}

/// A checked body plus the instantiations it asks for.
#[derive(Debug)]
pub struct Finished {
    pub expr: TypedExpr,
    /// Type arguments are fully substituted; they may still mention the
    /// enclosing template's generic parameters.
    pub requests: Vec<InstantiationRequest>,
}

pub struct InferenceEngine<'a> {
    resolver: Resolver<'a>,
    traits: &'a TraitRegistry,
    /// Generic parameters in scope and the traits bounding them.
    param_bounds: FxHashMap<String, Vec<String>>,
    params: Vec<String>,
    unifier: Unifier,
    solver: ConstraintSolver,
    env: TypeEnv,
    pending: Vec<InstantiationRequest>,
    unknown: Vec<(String, Span)>,
    /// Result variables of generic constructions and the generic type each
    /// one is instantiated to, for member lookups before solving.
    shapes: Vec<(TypeVar, Type)>,
}

impl<'a> InferenceEngine<'a> {
    pub fn new(
        resolver: Resolver<'a>,
        traits: &'a TraitRegistry,
        type_params: &[TypeParam],
        config: &CompilerConfig,
    ) -> Self {
        InferenceEngine {
            resolver,
            traits,
            param_bounds: type_params
                .iter()
                .map(|p| (p.name.clone(), p.bounds.clone()))
                .collect(),
            params: type_params.iter().map(|p| p.name.clone()).collect(),
            unifier: Unifier::new(),
            solver: ConstraintSolver::new(config.inference.trait_bound_requeues),
            env: TypeEnv::new(),
            pending: Vec::new(),
            unknown: Vec::new(),
            shapes: Vec::new(),
        }
    }

    fn ctx(&self) -> &'a CompilerContext {
        self.resolver.ctx
    }

    fn templates(&self) -> &'a GenericTemplates {
        self.resolver.templates
    }

    /// Bind a parameter (or `self`) in the function-level scope.
    pub fn bind(&mut self, name: &str, ty: Type, mutable: bool) {
        self.env.insert(name, ty, mutable);
    }

    pub fn constraints(&self) -> &[Constraint] {
        self.solver.constraints()
    }

    fn equal(&mut self, expected: Type, found: Type, span: Span) {
        self.solver.add(Constraint::Equal {
            expected,
            found,
            span,
        });
    }

    fn annotation(&self, node: &TypeNode) -> Result<Type, SemanticError> {
        self.resolver.resolve_type(node, &self.params)
    }

    fn in_scope<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.env.push_scope();
        let result = f(self);
        self.env.pop_scope();
        result
    }

    fn arity(&self, name: &str, expected: usize, found: usize, span: Span) -> Result<(), SemanticError> {
        if expected == found {
            Ok(())
        } else {
            Err(error(
                SemanticErrorKind::InvalidArgumentCount {
                    name: name.to_string(),
                    expected,
                    found,
                },
                span,
            ))
        }
    }

    fn check_args(&mut self, args: &[Expr], params: &[Type]) -> Result<Vec<TypedExpr>, SemanticError> {
        args.iter().zip(params).map(|(a, p)| self.check(a, p)).collect()
    }

    /// Explicit type arguments, or one fresh variable per parameter.
    fn type_arguments(
        &mut self,
        name: &str,
        params: &[TypeParam],
        explicit: Option<&[TypeNode]>,
        span: Span,
    ) -> Result<Vec<Type>, SemanticError> {
        match explicit {
            Some(nodes) => {
                self.arity(name, params.len(), nodes.len(), span)?;
                nodes.iter().map(|n| self.annotation(n)).collect()
            }
            None => Ok(params.iter().map(|_| self.unifier.fresh()).collect()),
        }
    }

    fn bound_params(&mut self, params: &[TypeParam], args: &[Type], span: Span) {
        for (param, arg) in params.iter().zip(args) {
            for bound in &param.bounds {
                self.solver.add(Constraint::TraitBound {
                    ty: arg.clone(),
                    trait_name: bound.clone(),
                    span,
                });
            }
        }
    }

    /// What is known about `ty` right now: bindings made so far, or the
    /// generic type behind a construction's result variable.
    fn shape_of(&mut self, ty: &Type) -> Type {
        let resolved = self.unifier.resolve(ty);
        if !resolved.is_type_variable() {
            return resolved;
        }
        for index in 0..self.shapes.len() {
            let (var, shape) = self.shapes[index].clone();
            if self.unifier.resolve(&Type::TypeVariable(var)) == resolved {
                return self.unifier.resolve(&shape);
            }
        }
        resolved
    }

    /// Which kind of unsuffixed literal `shape` stands for, if any. A
    /// variable shared by integer and float literals is a float.
    fn literal_kind(&mut self, shape: &Type) -> Option<LiteralKind> {
        let literals: Vec<(TypeVar, LiteralKind)> = self
            .solver
            .constraints()
            .iter()
            .filter_map(|c| match c {
                Constraint::DefaultInt { var, .. } => Some((*var, LiteralKind::Integer)),
                Constraint::DefaultFloat { var, .. } => Some((*var, LiteralKind::Float)),
                _ => None,
            })
            .collect();
        let mut found = None;
        for (var, kind) in literals {
            if self.unifier.resolve(&Type::TypeVariable(var)) == *shape {
                if kind == LiteralKind::Float {
                    return Some(kind);
                }
                found = Some(kind);
            }
        }
        found
    }

    /// A primitive method on a literal whose type is not pinned yet. The
    /// call is typed against the literal's variable and validated by the
    /// solver once equalities and defaults have settled it.
    fn literal_method(
        &mut self,
        receiver: TypedExpr,
        method: &str,
        args: &[Expr],
        span: Span,
    ) -> Result<TypedExpr, SemanticError> {
        let this = receiver.ty.clone();
        let (trait_name, params, returns) = match method {
            "equals" => (Some("Equatable"), vec![this.clone()], Type::Bool),
            "compare" => (Some("Comparable"), vec![this.clone()], Type::Int),
            "add" => (Some("Add"), vec![this.clone()], this.clone()),
            "sub" => (Some("Sub"), vec![this.clone()], this.clone()),
            "mul" => (Some("Mul"), vec![this.clone()], this.clone()),
            "div" => (Some("Div"), vec![this.clone()], this.clone()),
            "rem" => (Some("Rem"), vec![this.clone()], this.clone()),
            "to_bits" => (None, Vec::new(), self.unifier.fresh()),
            _ => {
                return Err(error(
                    SemanticErrorKind::UndefinedMethod {
                        ty: "a number literal".into(),
                        method: method.to_string(),
                    },
                    span,
                ))
            }
        };
        self.arity(method, params.len(), args.len(), span)?;
        let args = self.check_args(args, &params)?;
        match trait_name {
            Some(trait_name) => self.solver.add(Constraint::TraitBound {
                ty: this,
                trait_name: trait_name.to_string(),
                span,
            }),
            None => self.solver.add(Constraint::FloatBits {
                float: this,
                bits: returns.clone(),
                span,
            }),
        }
        Ok(TypedExpr::new(
            TypedExprKind::MethodCall {
                receiver: Box::new(receiver),
                method: method.to_string(),
                method_type_args: Vec::new(),
                args,
            },
            returns,
            span,
        ))
    }

    // ── Synthesis ──────────────────────────────────────────────────────

    /// Compute the type of `expr` bottom-up.
    pub fn synthesize(&mut self, expr: &Expr) -> Result<TypedExpr, SemanticError> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::IntLiteral { value, suffix } => {
                let ty = match suffix {
                    Some(ty) if ty.is_numeric() => ty.clone(),
                    Some(ty) => {
                        return Err(error(
                            SemanticErrorKind::InvalidOperation {
                                op: "integer literal suffix".into(),
                                ty: ty.to_string(),
                            },
                            span,
                        ))
                    }
                    None => {
                        let var = self.unifier.new_var();
                        self.solver.add(Constraint::DefaultInt { var, span });
                        Type::TypeVariable(var)
                    }
                };
                Ok(TypedExpr::int(*value, ty, span))
            }
            ExprKind::FloatLiteral { value, suffix } => {
                let ty = match suffix {
                    Some(ty) if ty.is_float() => ty.clone(),
                    Some(ty) => {
                        return Err(error(
                            SemanticErrorKind::InvalidOperation {
                                op: "float literal suffix".into(),
                                ty: ty.to_string(),
                            },
                            span,
                        ))
                    }
                    None => {
                        let var = self.unifier.new_var();
                        self.solver.add(Constraint::DefaultFloat { var, span });
                        Type::TypeVariable(var)
                    }
                };
                Ok(TypedExpr::new(TypedExprKind::FloatLiteral(*value), ty, span))
            }
            ExprKind::BoolLiteral(value) => Ok(TypedExpr::new(
                TypedExprKind::BoolLiteral(*value),
                Type::Bool,
                span,
            )),
            ExprKind::Identifier(name) => self.infer_identifier(name, span),
            ExprKind::Binary { op, lhs, rhs } => self.infer_binary(*op, lhs, rhs, span),
            ExprKind::Not(inner) => {
                let inner = self.check(inner, &Type::Bool)?;
                Ok(TypedExpr::new(
                    TypedExprKind::Not(Box::new(inner)),
                    Type::Bool,
                    span,
                ))
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.infer_if(cond, then_branch, else_branch.as_deref(), None, span),
            ExprKind::Block { statements, tail } => {
                self.infer_block(statements, tail.as_deref(), None, span)
            }
            ExprKind::Lambda {
                params,
                returns,
                body,
            } => self.infer_lambda(params, returns.as_ref(), body, None, span),
            ExprKind::Call { callee, args } => self.infer_call(callee, args, span),
            ExprKind::GenericInstantiation { name, .. } => Err(error(
                SemanticErrorKind::InvalidOperation {
                    op: "instantiation without a call".into(),
                    ty: name.clone(),
                },
                span,
            )),
            ExprKind::MethodCall {
                receiver,
                method,
                type_args,
                args,
            } => self.infer_method_call(receiver, method, type_args, args, span),
            ExprKind::FieldAccess { base, field } => self.infer_field_access(base, field, span),
            ExprKind::UnionCase {
                union,
                type_args,
                case,
                args,
            } => self.infer_union_case(union.as_deref(), type_args, case, args, None, span),
            ExprKind::Match { subject, arms } => self.infer_match(subject, arms, None, span),
        }
    }

    // ── Checking ───────────────────────────────────────────────────────

    /// Check `expr` against `expected`.
    pub fn check(&mut self, expr: &Expr, expected: &Type) -> Result<TypedExpr, SemanticError> {
        let span = expr.span;
        let shape = self.shape_of(expected);
        match &expr.kind {
            ExprKind::IntLiteral {
                value,
                suffix: None,
            } if shape.is_numeric() => Ok(TypedExpr::int(*value, shape, span)),
            ExprKind::FloatLiteral {
                value,
                suffix: None,
            } if shape.is_float() => Ok(TypedExpr::new(
                TypedExprKind::FloatLiteral(*value),
                shape,
                span,
            )),
            ExprKind::If {
                cond,
                then_branch,
                else_branch: Some(else_branch),
            } => self.infer_if(cond, then_branch, Some(&**else_branch), Some(expected), span),
            ExprKind::Block { statements, tail } => {
                self.infer_block(statements, tail.as_deref(), Some(expected), span)
            }
            ExprKind::Match { subject, arms } => {
                self.infer_match(subject, arms, Some(expected), span)
            }
            ExprKind::Lambda {
                params,
                returns,
                body,
            } => {
                let typed = self.infer_lambda(params, returns.as_ref(), body, Some(&shape), span)?;
                self.equal(expected.clone(), typed.ty.clone(), span);
                Ok(typed)
            }
            ExprKind::UnionCase {
                union,
                type_args,
                case,
                args,
            } => {
                let typed =
                    self.infer_union_case(union.as_deref(), type_args, case, args, Some(&shape), span)?;
                self.equal(expected.clone(), typed.ty.clone(), span);
                Ok(typed)
            }
            _ => {
                let typed = self.synthesize(expr)?;
                self.equal(expected.clone(), typed.ty.clone(), span);
                Ok(typed)
            }
        }
    }

    // ── Names ──────────────────────────────────────────────────────────

    fn infer_identifier(&mut self, name: &str, span: Span) -> Result<TypedExpr, SemanticError> {
        if let Some(binding) = self.env.lookup(name) {
            return Ok(TypedExpr::variable(name, None, binding.ty.clone(), span));
        }
        if let Some(def) = self.resolver.resolve_name(name, span)? {
            return self.global_value(def, name, span);
        }
        if let Some(path) = self.resolver.module_alias(name) {
            if let Some(ty) = self.resolver.module_type(&path) {
                let def = ty.nominal().map(|n| n.def);
                return Ok(TypedExpr::variable(name, def, ty, span));
            }
        }
        tracing::trace!(name, "unknown identifier");
        self.unknown.push((name.to_string(), span));
        let ty = self.unifier.fresh();
        Ok(TypedExpr::variable(name, None, ty, span))
    }

    /// A global function or variable used as a value.
    fn global_value(&mut self, def: DefId, name: &str, span: Span) -> Result<TypedExpr, SemanticError> {
        let defs = self.ctx().defs();
        match defs.kind(def) {
            Some(DefKind::Function | DefKind::Variable) => {
                let ty = defs.signature(def).cloned().ok_or_else(|| {
                    error(
                        SemanticErrorKind::UndefinedVariable {
                            name: name.to_string(),
                        },
                        span,
                    )
                })?;
                let identifier = defs
                    .unique_identifier(def)
                    .unwrap_or_else(|| name.to_string());
                Ok(TypedExpr::variable(identifier, Some(def), ty, span))
            }
            Some(DefKind::GenericTemplate(TemplateKind::Function)) => Err(error(
                SemanticErrorKind::InvalidOperation {
                    op: "generic function used as a value".into(),
                    ty: name.to_string(),
                },
                span,
            )),
            _ => Err(error(
                SemanticErrorKind::UndefinedVariable {
                    name: name.to_string(),
                },
                span,
            )),
        }
    }

    /// `module.name` where `module` is an imported module alias and not a
    /// local binding.
    fn module_member(&self, base: &Expr, member: &str) -> Result<Option<DefId>, SemanticError> {
        let ExprKind::Identifier(alias) = &base.kind else {
            return Ok(None);
        };
        if self.env.lookup(alias).is_some() {
            return Ok(None);
        }
        if !matches!(self.resolver.resolve_name(alias, base.span), Ok(None)) {
            return Ok(None);
        }
        let Some(path) = self.resolver.module_alias(alias) else {
            return Ok(None);
        };
        match self.resolver.resolve_in_module(&path, member, base.span)? {
            Some(def) => Ok(Some(def)),
            None => Err(error(
                SemanticErrorKind::UndefinedMember {
                    ty: format!("module({})", path.join(".")),
                    member: member.to_string(),
                },
                base.span,
            )),
        }
    }

    // ── Operators and control flow ─────────────────────────────────────

    fn infer_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        span: Span,
    ) -> Result<TypedExpr, SemanticError> {
        if op.is_logical() {
            let lhs = self.check(lhs, &Type::Bool)?;
            let rhs = self.check(rhs, &Type::Bool)?;
            return Ok(TypedExpr::binary(op, lhs, rhs, Type::Bool, span));
        }
        let lhs = self.synthesize(lhs)?;
        let rhs = self.synthesize(rhs)?;
        self.equal(lhs.ty.clone(), rhs.ty.clone(), span);
        if let Some(trait_name) = op.required_trait() {
            self.solver.add(Constraint::TraitBound {
                ty: lhs.ty.clone(),
                trait_name: trait_name.to_string(),
                span,
            });
        }
        let ty = if op.is_comparison() {
            Type::Bool
        } else {
            lhs.ty.clone()
        };
        Ok(TypedExpr::binary(op, lhs, rhs, ty, span))
    }

    fn infer_if(
        &mut self,
        cond: &Expr,
        then_branch: &Expr,
        else_branch: Option<&Expr>,
        expected: Option<&Type>,
        span: Span,
    ) -> Result<TypedExpr, SemanticError> {
        let cond = self.check(cond, &Type::Bool)?;
        let (then_branch, else_branch, ty) = match (else_branch, expected) {
            (Some(else_expr), Some(expected)) => {
                let then_branch = self.check(then_branch, expected)?;
                let else_branch = self.check(else_expr, expected)?;
                (then_branch, Some(else_branch), expected.clone())
            }
            (Some(else_expr), None) => {
                let then_branch = self.synthesize(then_branch)?;
                let else_branch = self.check(else_expr, &then_branch.ty)?;
                let ty = then_branch.ty.clone();
                (then_branch, Some(else_branch), ty)
            }
            (None, _) => (self.synthesize(then_branch)?, None, Type::Void),
        };
        Ok(TypedExpr::new(
            TypedExprKind::If {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: else_branch.map(Box::new),
            },
            ty,
            span,
        ))
    }

    fn infer_block(
        &mut self,
        statements: &[Stmt],
        tail: Option<&Expr>,
        expected: Option<&Type>,
        span: Span,
    ) -> Result<TypedExpr, SemanticError> {
        self.in_scope(|this| -> Result<TypedExpr, SemanticError> {
            let mut typed = Vec::with_capacity(statements.len());
            for stmt in statements {
                typed.push(this.infer_stmt(stmt)?);
            }
            let (tail, ty) = match (tail, expected) {
                (Some(tail), Some(expected)) => {
                    (Some(Box::new(this.check(tail, expected)?)), expected.clone())
                }
                (Some(tail), None) => {
                    let tail = this.synthesize(tail)?;
                    let ty = tail.ty.clone();
                    (Some(Box::new(tail)), ty)
                }
                (None, Some(expected)) => {
                    this.equal(expected.clone(), Type::Void, span);
                    (None, Type::Void)
                }
                (None, None) => (None, Type::Void),
            };
            Ok(TypedExpr::new(
                TypedExprKind::Block {
                    statements: typed,
                    tail,
                },
                ty,
                span,
            ))
        })
    }

    fn infer_stmt(&mut self, stmt: &Stmt) -> Result<TypedStmt, SemanticError> {
        match stmt {
            Stmt::Let {
                name,
                mutable,
                ty,
                value,
                ..
            } => {
                let (value, bound) = match ty {
                    Some(node) => {
                        let annotated = self.annotation(node)?;
                        (self.check(value, &annotated)?, annotated)
                    }
                    None => {
                        let value = self.synthesize(value)?;
                        let ty = value.ty.clone();
                        (value, ty)
                    }
                };
                self.env.insert(name.clone(), bound, *mutable);
                Ok(TypedStmt::Let {
                    name: name.clone(),
                    mutable: *mutable,
                    value,
                })
            }
            Stmt::Expr(expr) => Ok(TypedStmt::Expr(self.synthesize(expr)?)),
        }
    }

    fn infer_lambda(
        &mut self,
        params: &[LambdaParam],
        returns: Option<&TypeNode>,
        body: &Expr,
        expected: Option<&Type>,
        span: Span,
    ) -> Result<TypedExpr, SemanticError> {
        let expected_fn = match expected {
            Some(Type::Function {
                params: expected_params,
                returns,
            }) if expected_params.len() == params.len() => {
                Some((expected_params.clone(), (**returns).clone()))
            }
            _ => None,
        };

        let mut typed_params = Vec::with_capacity(params.len());
        for (index, param) in params.iter().enumerate() {
            let inherited = expected_fn.as_ref().map(|(ps, _)| ps[index].clone());
            let ty = match (&param.ty, inherited) {
                (Some(node), Some(inherited)) => {
                    let ty = self.annotation(node)?;
                    self.equal(inherited, ty.clone(), span);
                    ty
                }
                (Some(node), None) => self.annotation(node)?,
                (None, Some(inherited)) => inherited,
                (None, None) => self.unifier.fresh(),
            };
            typed_params.push(TypedParam {
                name: param.name.clone(),
                ty,
            });
        }

        let declared = returns.map(|r| self.annotation(r)).transpose()?;
        if let (Some(declared), Some((_, inherited))) = (&declared, &expected_fn) {
            self.equal(inherited.clone(), declared.clone(), span);
        }
        let target = declared.or(expected_fn.map(|(_, r)| r));

        let body = self.in_scope(|this| {
            for param in &typed_params {
                this.env.insert(param.name.clone(), param.ty.clone(), false);
            }
            match &target {
                Some(ret) => this.check(body, ret),
                None => this.synthesize(body),
            }
        })?;
        let returns = target.unwrap_or_else(|| body.ty.clone());
        let ty = Type::function(typed_params.iter().map(|p| p.ty.clone()).collect(), returns);
        Ok(TypedExpr::new(
            TypedExprKind::Lambda {
                params: typed_params,
                body: Box::new(body),
            },
            ty,
            span,
        ))
    }

    // ── Calls ──────────────────────────────────────────────────────────

    fn callee_definition<'e>(&self, callee: &'e Expr) -> Result<Option<Callee<'e>>, SemanticError> {
        let span = callee.span;
        match &callee.kind {
            ExprKind::Identifier(name) if self.env.lookup(name).is_none() => Ok(self
                .resolver
                .resolve_name(name, span)?
                .map(|def| Callee {
                    def,
                    name: name.clone(),
                    type_args: None,
                    span,
                })),
            ExprKind::GenericInstantiation { name, type_args } => {
                let def = self.resolver.resolve_name(name, span)?.ok_or_else(|| {
                    error(
                        SemanticErrorKind::UndefinedVariable { name: name.clone() },
                        span,
                    )
                })?;
                Ok(Some(Callee {
                    def,
                    name: name.clone(),
                    type_args: Some(type_args.as_slice()),
                    span,
                }))
            }
            ExprKind::FieldAccess { base, field } => Ok(self.module_member(base, field)?.map(|def| {
                Callee {
                    def,
                    name: field.clone(),
                    type_args: None,
                    span,
                }
            })),
            _ => Ok(None),
        }
    }

    fn infer_call(&mut self, callee: &Expr, args: &[Expr], span: Span) -> Result<TypedExpr, SemanticError> {
        if let Some(target) = self.callee_definition(callee)? {
            return self.call_definition(target, args, span);
        }
        let label = match &callee.kind {
            ExprKind::Identifier(name) => name.clone(),
            _ => "function".to_string(),
        };
        let callee = self.synthesize(callee)?;
        self.apply(callee, &label, args, span)
    }

    fn call_definition(&mut self, target: Callee<'_>, args: &[Expr], span: Span) -> Result<TypedExpr, SemanticError> {
        match self.ctx().defs().kind(target.def) {
            Some(DefKind::GenericTemplate(TemplateKind::Function)) => {
                self.infer_generic_call(target.def, &target.name, target.type_args, args, span)
            }
            Some(DefKind::GenericTemplate(TemplateKind::Struct)) => {
                self.infer_generic_construct(target.def, &target.name, target.type_args, args, span)
            }
            Some(DefKind::Type(TypeDefKind::Struct)) => {
                if let Some(explicit) = target.type_args {
                    self.arity(&target.name, 0, explicit.len(), span)?;
                }
                self.infer_construct(target.def, &target.name, args, span)
            }
            Some(DefKind::Function) if self.templates().intrinsics.contains(&target.def) => {
                self.infer_intrinsic_call(target.def, &target.name, args, span)
            }
            _ => {
                let callee = self.global_value(target.def, &target.name, target.span)?;
                self.apply(callee, &target.name, args, span)
            }
        }
    }

    /// Call a value of function type.
    fn apply(&mut self, callee: TypedExpr, label: &str, args: &[Expr], span: Span) -> Result<TypedExpr, SemanticError> {
        match self.unifier.resolve(&callee.ty) {
            Type::Function { params, returns } => {
                self.arity(label, params.len(), args.len(), span)?;
                let args = self.check_args(args, &params)?;
                Ok(TypedExpr::new(
                    TypedExprKind::Call {
                        callee: Box::new(callee),
                        args,
                    },
                    *returns,
                    span,
                ))
            }
            Type::TypeVariable(_) => {
                let args = args
                    .iter()
                    .map(|a| self.synthesize(a))
                    .collect::<Result<Vec<_>, _>>()?;
                let returns = self.unifier.fresh();
                let shape = Type::function(args.iter().map(|a| a.ty.clone()).collect(), returns.clone());
                self.equal(callee.ty.clone(), shape, span);
                Ok(TypedExpr::new(
                    TypedExprKind::Call {
                        callee: Box::new(callee),
                        args,
                    },
                    returns,
                    span,
                ))
            }
            other => Err(error(
                SemanticErrorKind::NotAFunction {
                    ty: self.ctx().debug_name(&other),
                },
                span,
            )),
        }
    }

    fn infer_generic_call(
        &mut self,
        def: DefId,
        name: &str,
        explicit: Option<&[TypeNode]>,
        args: &[Expr],
        span: Span,
    ) -> Result<TypedExpr, SemanticError> {
        let templates = self.templates();
        let template = templates.functions.get(&def).ok_or_else(|| {
            error(
                SemanticErrorKind::UndefinedVariable {
                    name: name.to_string(),
                },
                span,
            )
        })?;
        let type_args = self.type_arguments(name, &template.type_params, explicit, span)?;
        let map = substitution_map(&template.type_params, &type_args);
        let params: Vec<Type> = template.params.iter().map(|p| p.ty.substitute(&map)).collect();
        let returns = template.returns.substitute(&map);

        self.arity(name, params.len(), args.len(), span)?;
        let args = self.check_args(args, &params)?;
        self.bound_params(&template.type_params, &type_args, span);

        let kind = if template.intrinsic {
            TypedExprKind::IntrinsicCall {
                name: template.name.clone(),
                type_args,
                args,
            }
        } else {
            self.pending.push(InstantiationRequest::new(
                InstantiationKind::Function {
                    template: def,
                    args: type_args.clone(),
                },
                span,
            ));
            TypedExprKind::GenericCall {
                template: def,
                type_args,
                args,
            }
        };
        Ok(TypedExpr::new(kind, returns, span))
    }

    fn infer_intrinsic_call(
        &mut self,
        def: DefId,
        name: &str,
        args: &[Expr],
        span: Span,
    ) -> Result<TypedExpr, SemanticError> {
        let Some(Type::Function { params, returns }) = self.ctx().defs().signature(def).cloned() else {
            return Err(error(
                SemanticErrorKind::NotAFunction {
                    ty: name.to_string(),
                },
                span,
            ));
        };
        self.arity(name, params.len(), args.len(), span)?;
        let args = self.check_args(args, &params)?;
        Ok(TypedExpr::new(
            TypedExprKind::IntrinsicCall {
                name: self.ctx().name_of(def).to_string(),
                type_args: Vec::new(),
                args,
            },
            *returns,
            span,
        ))
    }

    fn infer_construct(
        &mut self,
        def: DefId,
        name: &str,
        args: &[Expr],
        span: Span,
    ) -> Result<TypedExpr, SemanticError> {
        let members: Vec<Type> = self
            .ctx()
            .defs()
            .struct_members(def)
            .unwrap_or_default()
            .iter()
            .map(|m| m.ty.clone())
            .collect();
        self.arity(name, members.len(), args.len(), span)?;
        let args = self.check_args(args, &members)?;
        let ty = self.resolver.nominal_type(def).ok_or_else(|| {
            error(
                SemanticErrorKind::UndefinedType {
                    name: name.to_string(),
                },
                span,
            )
        })?;
        Ok(TypedExpr::new(TypedExprKind::Construct { args }, ty, span))
    }

    /// Bind a fresh result variable to `generic` through an `Instantiate`
    /// constraint and ask for the instantiation.
    fn instantiate(&mut self, generic: Type, span: Span) -> Type {
        let var = self.unifier.new_var();
        let (template, kind, args, request) = match &generic {
            Type::GenericUnion { template, args } => (
                template.clone(),
                TemplateKind::Union,
                args.clone(),
                InstantiationKind::Union {
                    template: template.def,
                    args: args.clone(),
                },
            ),
            Type::GenericStruct { template, args } => (
                template.clone(),
                TemplateKind::Struct,
                args.clone(),
                InstantiationKind::Struct {
                    template: template.def,
                    args: args.clone(),
                },
            ),
            _ => return generic,
        };
        self.solver.add(Constraint::Instantiate {
            var,
            template,
            kind,
            args,
            span,
        });
        self.shapes.push((var, generic));
        self.pending.push(InstantiationRequest::new(request, span));
        Type::TypeVariable(var)
    }

    fn infer_generic_construct(
        &mut self,
        def: DefId,
        name: &str,
        explicit: Option<&[TypeNode]>,
        args: &[Expr],
        span: Span,
    ) -> Result<TypedExpr, SemanticError> {
        let templates = self.templates();
        let template = templates.structs.get(&def).ok_or_else(|| {
            error(
                SemanticErrorKind::UndefinedType {
                    name: name.to_string(),
                },
                span,
            )
        })?;
        let type_args = self.type_arguments(name, &template.type_params, explicit, span)?;
        let map = substitution_map(&template.type_params, &type_args);
        let members: Vec<Type> = template.members.iter().map(|m| m.ty.substitute(&map)).collect();

        self.arity(name, members.len(), args.len(), span)?;
        let args = self.check_args(args, &members)?;
        self.bound_params(&template.type_params, &type_args, span);

        let generic = Type::GenericStruct {
            template: Nominal::new(def, template.name.clone()),
            args: type_args,
        };
        let ty = self.instantiate(generic, span);
        Ok(TypedExpr::new(TypedExprKind::Construct { args }, ty, span))
    }

    // ── Methods and members ────────────────────────────────────────────

    fn infer_method_call(
        &mut self,
        receiver: &Expr,
        method: &str,
        type_args: &[TypeNode],
        args: &[Expr],
        span: Span,
    ) -> Result<TypedExpr, SemanticError> {
        let explicit = if type_args.is_empty() {
            None
        } else {
            Some(type_args)
        };
        if let Some(def) = self.module_member(receiver, method)? {
            let target = Callee {
                def,
                name: method.to_string(),
                type_args: explicit,
                span: receiver.span,
            };
            return self.call_definition(target, args, span);
        }

        let receiver = self.synthesize(receiver)?;
        let shape = self.shape_of(&receiver.ty);
        if shape.is_type_variable() && self.literal_kind(&shape).is_some() {
            return self.literal_method(receiver, method, args, span);
        }
        let undefined = |ctx: &CompilerContext| {
            error(
                SemanticErrorKind::UndefinedMethod {
                    ty: ctx.debug_name(&shape),
                    method: method.to_string(),
                },
                span,
            )
        };

        let method_call = |receiver: TypedExpr, method_type_args: Vec<Type>, args: Vec<TypedExpr>, ty: Type| {
            TypedExpr::new(
                TypedExprKind::MethodCall {
                    receiver: Box::new(receiver),
                    method: method.to_string(),
                    method_type_args,
                    args,
                },
                ty,
                span,
            )
        };

        match &shape {
            Type::TypeVariable(_) => Err(error(
                SemanticErrorKind::InvalidOperation {
                    op: format!(".{}()", method),
                    ty: "a value of unknown type".into(),
                },
                span,
            )),
            ty if ty.is_primitive() => {
                let (params, returns) =
                    primitive_method(ty, method).ok_or_else(|| undefined(self.ctx()))?;
                self.arity(method, params.len(), args.len(), span)?;
                let args = self.check_args(args, &params)?;
                Ok(method_call(receiver, Vec::new(), args, returns))
            }
            Type::GenericParameter(param) => {
                let bounds = self.param_bounds.get(param).cloned().unwrap_or_default();
                let (_, sig) = self
                    .traits
                    .method_in_bounds(&bounds, method)
                    .ok_or_else(|| undefined(self.ctx()))?;
                let (params, returns) = sig.for_self(&shape);
                self.arity(method, params.len(), args.len(), span)?;
                let args = self.check_args(args, &params)?;
                Ok(method_call(receiver, Vec::new(), args, returns))
            }
            Type::GenericStruct {
                template,
                args: base_args,
            }
            | Type::GenericUnion {
                template,
                args: base_args,
            } => {
                let templates = self.templates();
                let extension = templates
                    .extension(template.def, method)
                    .ok_or_else(|| undefined(self.ctx()))?;
                let method_args =
                    self.type_arguments(method, &extension.method_params, explicit, span)?;
                let mut map = substitution_map(&extension.owner_params, base_args);
                map.extend(substitution_map(&extension.method_params, &method_args));
                let params: Vec<Type> = extension
                    .params
                    .iter()
                    .skip(1)
                    .map(|p| p.ty.substitute(&map))
                    .collect();
                let returns = extension.returns.substitute(&map);

                self.arity(method, params.len(), args.len(), span)?;
                let args = self.check_args(args, &params)?;
                self.bound_params(&extension.method_params, &method_args, span);
                self.pending.push(InstantiationRequest::new(
                    InstantiationKind::ExtensionMethod {
                        base: template.def,
                        base_args: base_args.clone(),
                        method: method.to_string(),
                        method_args: method_args.clone(),
                    },
                    span,
                ));
                Ok(method_call(receiver, method_args, args, returns))
            }
            Type::Structure(n) | Type::Union(n) | Type::Opaque(n) => {
                let concrete = self
                    .templates()
                    .concrete_method(n.def, method)
                    .ok_or_else(|| undefined(self.ctx()))?;
                let params = concrete.params.get(1..).unwrap_or_default();
                self.arity(method, params.len(), args.len(), span)?;
                let mut typed_args = vec![receiver];
                typed_args.extend(self.check_args(args, params)?);
                if self.templates().intrinsics.contains(&concrete.def) {
                    return Ok(TypedExpr::new(
                        TypedExprKind::IntrinsicCall {
                            name: concrete.identifier.clone(),
                            type_args: Vec::new(),
                            args: typed_args,
                        },
                        concrete.returns.clone(),
                        span,
                    ));
                }
                let callee = TypedExpr::variable(
                    concrete.identifier.clone(),
                    Some(concrete.def),
                    Type::function(concrete.params.clone(), concrete.returns.clone()),
                    span,
                );
                Ok(TypedExpr::new(
                    TypedExprKind::Call {
                        callee: Box::new(callee),
                        args: typed_args,
                    },
                    concrete.returns.clone(),
                    span,
                ))
            }
            _ => Err(undefined(self.ctx())),
        }
    }

    fn infer_field_access(&mut self, base: &Expr, field: &str, span: Span) -> Result<TypedExpr, SemanticError> {
        if let Some(def) = self.module_member(base, field)? {
            return self.global_value(def, field, span);
        }
        let base = self.synthesize(base)?;
        let shape = match self.shape_of(&base.ty) {
            Type::Reference(inner) | Type::Pointer(inner) => self.shape_of(&inner),
            other => other,
        };
        let member = match &shape {
            Type::Structure(n) => self
                .ctx()
                .struct_member(n.def, field)
                .map(|(index, m)| (index, m.ty.clone())),
            Type::GenericStruct { template, args } => {
                self.templates().structs.get(&template.def).and_then(|t| {
                    let map = substitution_map(&t.type_params, args);
                    t.members
                        .iter()
                        .enumerate()
                        .find(|(_, m)| m.name == field)
                        .map(|(index, m)| (index, m.ty.substitute(&map)))
                })
            }
            _ => None,
        };
        let (index, ty) = member.ok_or_else(|| {
            error(
                SemanticErrorKind::UndefinedMember {
                    ty: self.ctx().debug_name(&shape),
                    member: field.to_string(),
                },
                span,
            )
        })?;
        Ok(TypedExpr::new(
            TypedExprKind::FieldAccess {
                base: Box::new(base),
                field: field.to_string(),
                index,
            },
            ty,
            span,
        ))
    }

    // ── Unions and matching ────────────────────────────────────────────

    /// Case index and parameter types of `case` in a union-shaped type.
    fn case_params(&self, shape: &Type, case: &str, span: Span) -> Result<(usize, Vec<Type>), SemanticError> {
        let unknown = |union: &str| {
            error(
                SemanticErrorKind::UnknownCase {
                    union: union.to_string(),
                    case: case.to_string(),
                },
                span,
            )
        };
        match shape {
            Type::Union(n) => self
                .ctx()
                .union_case(n.def, case)
                .map(|(tag, c)| (tag, c.params.iter().map(|p| p.ty.clone()).collect()))
                .ok_or_else(|| unknown(&n.name)),
            Type::GenericUnion { template, args } => {
                let union = self
                    .templates()
                    .unions
                    .get(&template.def)
                    .ok_or_else(|| unknown(&template.name))?;
                let map = substitution_map(&union.type_params, args);
                union
                    .cases
                    .iter()
                    .enumerate()
                    .find(|(_, c)| c.name == case)
                    .map(|(tag, c)| (tag, c.params.iter().map(|p| p.ty.substitute(&map)).collect()))
                    .ok_or_else(|| unknown(&template.name))
            }
            other => Err(error(
                SemanticErrorKind::TypeMismatch {
                    expected: "a union".into(),
                    found: self.ctx().debug_name(other),
                },
                span,
            )),
        }
    }

    fn infer_union_case(
        &mut self,
        union: Option<&str>,
        type_args: &[TypeNode],
        case: &str,
        args: &[Expr],
        expected: Option<&Type>,
        span: Span,
    ) -> Result<TypedExpr, SemanticError> {
        let (target, fresh) = match union {
            Some(name) => {
                let def = self.resolver.resolve_name(name, span)?.ok_or_else(|| {
                    error(
                        SemanticErrorKind::UndefinedType {
                            name: name.to_string(),
                        },
                        span,
                    )
                })?;
                match self.ctx().defs().kind(def) {
                    Some(DefKind::Type(TypeDefKind::Union)) => {
                        (self.resolver.nominal_type(def), false)
                    }
                    Some(DefKind::GenericTemplate(TemplateKind::Union)) => {
                        let templates = self.templates();
                        let template = templates.unions.get(&def).ok_or_else(|| {
                            error(
                                SemanticErrorKind::UndefinedType {
                                    name: name.to_string(),
                                },
                                span,
                            )
                        })?;
                        let explicit = if type_args.is_empty() {
                            None
                        } else {
                            Some(type_args)
                        };
                        let args = self.type_arguments(name, &template.type_params, explicit, span)?;
                        self.bound_params(&template.type_params, &args, span);
                        let generic = Type::GenericUnion {
                            template: Nominal::new(def, template.name.clone()),
                            args,
                        };
                        (Some(generic), true)
                    }
                    _ => (None, false),
                }
            }
            None => match expected {
                Some(ty @ (Type::Union(_) | Type::GenericUnion { .. })) => (Some(ty.clone()), false),
                _ => (None, false),
            },
        };
        let target = target.ok_or_else(|| {
            error(
                SemanticErrorKind::InvalidOperation {
                    op: format!(".{}", case),
                    ty: union.unwrap_or("a value that is not a union").to_string(),
                },
                span,
            )
        })?;

        let (tag, params) = self.case_params(&target, case, span)?;
        self.arity(case, params.len(), args.len(), span)?;
        let args = self.check_args(args, &params)?;
        let ty = if fresh {
            self.instantiate(target, span)
        } else {
            target
        };
        Ok(TypedExpr::new(
            TypedExprKind::UnionConstruct {
                case: case.to_string(),
                tag,
                args,
            },
            ty,
            span,
        ))
    }

    fn infer_match(
        &mut self,
        subject: &Expr,
        arms: &[MatchArm],
        expected: Option<&Type>,
        span: Span,
    ) -> Result<TypedExpr, SemanticError> {
        let subject = self.synthesize(subject)?;
        let mut result = expected.cloned();
        let mut typed_arms = Vec::with_capacity(arms.len());
        for arm in arms {
            let typed = self.in_scope(|this| -> Result<TypedArm, SemanticError> {
                let pattern = this.infer_pattern(&arm.pattern, &subject.ty)?;
                let body = match &result {
                    Some(ty) => this.check(&arm.body, ty)?,
                    None => this.synthesize(&arm.body)?,
                };
                Ok(TypedArm { pattern, body })
            })?;
            if result.is_none() {
                result = Some(typed.body.ty.clone());
            }
            typed_arms.push(typed);
        }
        Ok(TypedExpr::new(
            TypedExprKind::Match {
                subject: Box::new(subject),
                arms: typed_arms,
            },
            result.unwrap_or(Type::Void),
            span,
        ))
    }

    fn require_integer(&mut self, subject: &Type, span: Span) -> Result<(), SemanticError> {
        match self.shape_of(subject) {
            ty if ty.is_integer() || ty.is_type_variable() => Ok(()),
            other => Err(error(
                SemanticErrorKind::TypeMismatch {
                    expected: "an integer type".into(),
                    found: self.ctx().debug_name(&other),
                },
                span,
            )),
        }
    }

    fn infer_pattern(&mut self, pattern: &Pattern, subject: &Type) -> Result<TypedPattern, SemanticError> {
        let span = pattern.span;
        let kind = match &pattern.kind {
            PatternKind::Wildcard => TypedPatternKind::Wildcard,
            PatternKind::Variable(name) => {
                self.env.insert(name.clone(), subject.clone(), false);
                TypedPatternKind::Variable(name.clone())
            }
            PatternKind::Bool(value) => {
                self.equal(subject.clone(), Type::Bool, span);
                TypedPatternKind::Bool(*value)
            }
            PatternKind::Int(value) => {
                self.require_integer(subject, span)?;
                TypedPatternKind::Int(*value)
            }
            PatternKind::Comparison { op, value } => {
                self.require_integer(subject, span)?;
                TypedPatternKind::Comparison {
                    op: *op,
                    value: *value,
                }
            }
            PatternKind::Case { name, args } => {
                let shape = self.shape_of(subject);
                let (tag, params) = self.case_params(&shape, name, span)?;
                self.arity(name, params.len(), args.len(), span)?;
                let args = args
                    .iter()
                    .zip(&params)
                    .map(|(a, p)| self.infer_pattern(a, p))
                    .collect::<Result<Vec<_>, _>>()?;
                TypedPatternKind::Case {
                    name: name.clone(),
                    tag,
                    args,
                }
            }
            PatternKind::Or(a, b) => TypedPatternKind::Or(
                Box::new(self.infer_pattern(a, subject)?),
                Box::new(self.infer_pattern(b, subject)?),
            ),
            PatternKind::And(a, b) => TypedPatternKind::And(
                Box::new(self.infer_pattern(a, subject)?),
                Box::new(self.infer_pattern(b, subject)?),
            ),
            PatternKind::Not(inner) => {
                TypedPatternKind::Not(Box::new(self.infer_pattern(inner, subject)?))
            }
        };
        Ok(TypedPattern {
            kind,
            ty: subject.clone(),
            span,
        })
    }

    // ── Solving ────────────────────────────────────────────────────────

    /// Solve, substitute, and check the coverage of every `match`.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn finish(mut self, expr: TypedExpr) -> Result<Finished, SemanticError> {
        if let Some((name, span)) = self.unknown.first() {
            return Err(error(
                SemanticErrorKind::UndefinedVariable { name: name.clone() },
                *span,
            ));
        }
        let scope = TraitScope {
            registry: self.traits,
            ctx: self.resolver.ctx,
            param_bounds: &self.param_bounds,
        };
        let substitution = self.solver.solve(&mut self.unifier, &scope)?;

        let mut zonker = Zonker {
            substitution: &substitution,
            ctx: self.resolver.ctx,
            templates: self.resolver.templates,
            span: expr.span,
        };
        let expr = zonker.fold_expr(expr)?;
        let requests = self
            .pending
            .iter()
            .map(|r| r.map_types(|ty| substitution.apply(ty)))
            .collect();
        Ok(Finished { expr, requests })
    }
}

/// Applies the solved substitution to a typed tree. Any variable left over
/// is reported at the innermost expression whose type still holds it.
struct Zonker<'s> {
    substitution: &'s Substitution,
    ctx: &'s CompilerContext,
    templates: &'s GenericTemplates,
    span: Span,
}

impl TypedFolder for Zonker<'_> {
    type Error = SemanticError;

    fn fold_type(&mut self, ty: Type) -> Result<Type, SemanticError> {
        let ty = self.substitution.apply(&ty);
        match self.ctx.free_type_variables(&ty).first() {
            Some(var) => Err(SolverError::UnsolvedVariable {
                var: *var,
                span: self.span,
            }
            .into()),
            None => Ok(ty),
        }
    }

    fn fold_expr(&mut self, expr: TypedExpr) -> Result<TypedExpr, SemanticError> {
        let outer = std::mem::replace(&mut self.span, expr.span);
        let folded = walk_expr(self, expr);
        self.span = outer;
        let folded = folded?;
        if let TypedExprKind::Match { subject, arms } = &folded.kind {
            let shape = SubjectShape::of(&subject.ty, self.ctx, self.templates);
            let patterns: Vec<&TypedPattern> = arms.iter().map(|arm| &arm.pattern).collect();
            check_match(&patterns, &shape, folded.span)?;
        }
        Ok(folded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::def_id::{AccessModifier, CaseParam, UnionCase};
    use koral_common::ModuleGraph;

    struct World {
        ctx: CompilerContext,
        graph: ModuleGraph,
        templates: GenericTemplates,
        traits: TraitRegistry,
    }

    fn world() -> World {
        World {
            ctx: CompilerContext::new(),
            graph: ModuleGraph::new(),
            templates: GenericTemplates::new(),
            traits: TraitRegistry::with_builtins(),
        }
    }

    fn engine(w: &World) -> InferenceEngine<'_> {
        let resolver = Resolver {
            ctx: &w.ctx,
            graph: &w.graph,
            templates: &w.templates,
            module: &[],
            file: "main.koral",
        };
        InferenceEngine::new(resolver, &w.traits, &[], &CompilerConfig::default())
    }

    fn synthesize(w: &World, expr: Expr) -> Result<TypedExpr, SemanticError> {
        let mut engine = engine(w);
        let typed = engine.synthesize(&expr)?;
        engine.finish(typed).map(|f| f.expr)
    }

    fn color(w: &mut World) {
        let def = w.ctx.defs_mut().allocate(
            &[],
            "Color",
            DefKind::Type(TypeDefKind::Union),
            "main.koral",
            AccessModifier::Default,
            Span::DUMMY,
        );
        let cases = ["Red", "Green", "Blue"]
            .into_iter()
            .map(|name| UnionCase {
                name: name.to_string(),
                params: Vec::<CaseParam>::new(),
            })
            .collect();
        w.ctx.defs_mut().set_union_cases(def, cases);
    }

    // ── Literals and defaults ────────────────────────────────────────

    #[test]
    fn let_binding_defaults_to_int() {
        let w = world();
        let expr = Expr::block(vec![Stmt::let_("x", Expr::int(1))], Some(Expr::ident("x")));
        assert_eq!(synthesize(&w, expr).unwrap().ty, Type::Int);
    }

    #[test]
    fn float_literal_defaults_to_float64() {
        let w = world();
        assert_eq!(synthesize(&w, Expr::float(1.5)).unwrap().ty, Type::Float64);
    }

    #[test]
    fn checked_literal_takes_expected_type() {
        let w = world();
        let mut engine = engine(&w);
        let typed = engine.check(&Expr::int(2), &Type::Float32).unwrap();
        let finished = engine.finish(typed).unwrap();
        assert_eq!(finished.expr.ty, Type::Float32);
    }

    #[test]
    fn literal_receiver_settles_to_default() {
        let w = world();
        let expr = Expr::method(Expr::float(1.0), "to_bits", vec![]);
        assert_eq!(synthesize(&w, expr).unwrap().ty, Type::UInt64);
    }

    #[test]
    fn annotation_before_method_call_pins_literal() {
        let w = world();
        let expr = Expr::block(
            vec![
                Stmt::let_("x", Expr::int(1)),
                Stmt::let_typed("y", TypeNode::named("UInt8"), Expr::ident("x")),
            ],
            Some(Expr::method(Expr::ident("x"), "equals", vec![Expr::ident("x")])),
        );
        assert_eq!(synthesize(&w, expr).unwrap().ty, Type::Bool);
    }

    #[test]
    fn annotation_after_method_call_pins_literal() {
        let w = world();
        let expr = Expr::block(
            vec![
                Stmt::let_("x", Expr::int(1)),
                Stmt::let_("sum", Expr::method(Expr::ident("x"), "add", vec![Expr::int(2)])),
                Stmt::let_typed("y", TypeNode::named("UInt8"), Expr::ident("x")),
            ],
            Some(Expr::ident("sum")),
        );
        let typed = synthesize(&w, expr).unwrap();
        assert_eq!(typed.ty, Type::UInt8);
        let TypedExprKind::Block { statements, .. } = &typed.kind else {
            panic!("not a block: {:?}", typed.kind);
        };
        let TypedStmt::Let { value, .. } = &statements[1] else {
            panic!("not a let: {:?}", statements[1]);
        };
        let TypedExprKind::MethodCall { receiver, .. } = &value.kind else {
            panic!("not a method call: {:?}", value.kind);
        };
        assert_eq!(receiver.ty, Type::UInt8);
    }

    #[test]
    fn bit_width_follows_later_float_annotation() {
        let w = world();
        let expr = Expr::block(
            vec![
                Stmt::let_("f", Expr::float(1.5)),
                Stmt::let_("bits", Expr::method(Expr::ident("f"), "to_bits", vec![])),
                Stmt::let_typed("g", TypeNode::named("Float32"), Expr::ident("f")),
            ],
            Some(Expr::ident("bits")),
        );
        assert_eq!(synthesize(&w, expr).unwrap().ty, Type::UInt32);
    }

    #[test]
    fn remainder_method_on_float_literal_is_unsatisfied() {
        let w = world();
        let expr = Expr::method(Expr::float(1.5), "rem", vec![Expr::float(2.0)]);
        let err = synthesize(&w, expr).unwrap_err();
        assert_eq!(err.code(), "E0023");
    }

    // ── Errors ───────────────────────────────────────────────────────

    #[test]
    fn unknown_identifier_is_undefined_variable() {
        let w = world();
        let err = synthesize(&w, Expr::ident("missing")).unwrap_err();
        assert_eq!(err.code(), "E0003");
    }

    #[test]
    fn remainder_on_floats_is_unsatisfied() {
        let w = world();
        let expr = Expr::binary(BinaryOp::Rem, Expr::float(1.0), Expr::float(2.0));
        let err = synthesize(&w, expr).unwrap_err();
        assert_eq!(err.code(), "E0023");
    }

    #[test]
    fn if_without_else_is_void() {
        let w = world();
        let expr = Expr::if_else(Expr::bool(true), Expr::int(1), None);
        assert_eq!(synthesize(&w, expr).unwrap().ty, Type::Void);
    }

    // ── Unions and lambdas ───────────────────────────────────────────

    #[test]
    fn match_missing_case_is_reported() {
        let mut w = world();
        color(&mut w);
        let expr = Expr::match_on(
            Expr::case(Some("Color"), "Red", vec![]),
            vec![
                (Pattern::case("Red", vec![]), Expr::int(1)),
                (Pattern::case("Green", vec![]), Expr::int(2)),
            ],
        );
        let err = synthesize(&w, expr).unwrap_err();
        assert_eq!(
            err.kind,
            SemanticErrorKind::NonExhaustiveMatch {
                missing: vec![".Blue".into()]
            }
        );
    }

    #[test]
    fn implicit_case_uses_expected_union() {
        let mut w = world();
        color(&mut w);
        let expected = Type::Union(Nominal::new(DefId(0), "Color"));
        let mut engine = engine(&w);
        let typed = engine.check(&Expr::case(None, "Blue", vec![]), &expected).unwrap();
        let finished = engine.finish(typed).unwrap();
        assert!(matches!(
            finished.expr.kind,
            TypedExprKind::UnionConstruct { tag: 2, .. }
        ));
    }

    #[test]
    fn lambda_takes_expected_parameter_types() {
        let w = world();
        let lambda = Expr::new(
            ExprKind::Lambda {
                params: vec![LambdaParam {
                    name: "x".into(),
                    ty: None,
                }],
                returns: None,
                body: Box::new(Expr::binary(BinaryOp::Add, Expr::ident("x"), Expr::int(1))),
            },
            Span::DUMMY,
        );
        let expected = Type::function(vec![Type::Int], Type::Int);
        let mut engine = engine(&w);
        let typed = engine.check(&lambda, &expected).unwrap();
        let finished = engine.finish(typed).unwrap();
        assert_eq!(finished.expr.ty, expected);
    }
}
