//! Unification up to definitional equality.
//!
//! Metavariables are solved by pattern unification: a metavariable applied to
//! distinct local variables, `?m x1 .. xn =?= t`, is solved by
//! `?m := fun x1 .. xn => t` when `t` mentions no other locals and does not
//! contain `?m`. Solutions are therefore closed terms.

use crate::ast::{unfold_apps, MetaId, Name, Term, Transparency};
use crate::context::Context;
use crate::env::Environment;
use crate::reduce::{ReduceError, Reducer};
use crate::subst::{
    alpha_eq, fresh_name, free_vars, instantiate_metas, occurs_free, occurs_meta,
    structurally_equal, substitute, Substitution,
};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

// =============================================================================
// Metavariables
// =============================================================================

/// Metavariables allocated during one elaboration, with their types and
/// solutions.
#[derive(Debug, Clone, Default)]
pub struct MetaContext {
    next: usize,
    types: BTreeMap<MetaId, Arc<Term>>,
    solutions: BTreeMap<MetaId, Arc<Term>>,
}

impl MetaContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a metavariable of the given closed type.
    pub fn fresh(&mut self, ty: Arc<Term>) -> MetaId {
        let id = MetaId(self.next);
        self.next += 1;
        self.types.insert(id, ty);
        id
    }

    pub fn type_of(&self, id: MetaId) -> Option<&Arc<Term>> {
        self.types.get(&id)
    }

    pub fn solution(&self, id: MetaId) -> Option<Arc<Term>> {
        self.solutions.get(&id).cloned()
    }

    pub fn is_solved(&self, id: MetaId) -> bool {
        self.solutions.contains_key(&id)
    }

    pub fn assign(&mut self, id: MetaId, solution: Arc<Term>) {
        self.solutions.insert(id, solution);
    }

    /// Allocated metavariables that have no solution yet.
    pub fn unsolved(&self) -> impl Iterator<Item = MetaId> + '_ {
        self.types
            .keys()
            .copied()
            .filter(|id| !self.solutions.contains_key(id))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Replace every solved metavariable in `term` by its solution.
    pub fn instantiate(&self, term: &Arc<Term>) -> Arc<Term> {
        if self.solutions.is_empty() {
            return term.clone();
        }
        instantiate_metas(term, &|id| self.solutions.get(&id).cloned())
            .unwrap_or_else(|| term.clone())
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Position of a subterm relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStep {
    Domain,
    Codomain,
    Body,
    Function,
    Argument(usize),
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Domain => write!(f, "domain"),
            PathStep::Codomain => write!(f, "codomain"),
            PathStep::Body => write!(f, "body"),
            PathStep::Function => write!(f, "function"),
            PathStep::Argument(i) => write!(f, "argument {}", i + 1),
        }
    }
}

/// Route from the compared terms down to a mismatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Path(pub Vec<PathStep>);

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "the top level");
        }
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " > ")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnifyError {
    #[error("cannot unify `{expected}` with `{actual}` (at {path})")]
    Mismatch {
        expected: Arc<Term>,
        actual: Arc<Term>,
        path: Path,
    },
    #[error("{meta} would occur in its own solution `{term}`")]
    OccursCheck { meta: MetaId, term: Arc<Term> },
    #[error(transparent)]
    Reduce(#[from] ReduceError),
}

// =============================================================================
// Unifier
// =============================================================================

pub struct Unifier<'a> {
    env: &'a Environment,
    metas: &'a mut MetaContext,
    budget: usize,
    fuel: usize,
    depth: usize,
    max_depth: usize,
    path: Vec<PathStep>,
    assigned: Vec<MetaId>,
}

impl<'a> Unifier<'a> {
    pub fn new(env: &'a Environment, metas: &'a mut MetaContext) -> Self {
        let config = env.config();
        Unifier {
            env,
            metas,
            budget: config.fuel,
            fuel: config.fuel,
            depth: 0,
            max_depth: config.max_depth,
            path: Vec::new(),
            assigned: Vec::new(),
        }
    }

    /// Make `expected` and `actual` definitionally equal, returning the
    /// metavariable solutions this required.
    pub fn unify(
        &mut self,
        ctx: &Context,
        expected: &Arc<Term>,
        actual: &Arc<Term>,
    ) -> Result<Substitution, UnifyError> {
        self.fuel = self.budget;
        self.path.clear();
        self.assigned.clear();
        self.unify_at(ctx, expected, actual)?;
        let mut subst = Substitution::new();
        for id in &self.assigned {
            if let Some(solution) = self.metas.solution(*id) {
                subst.bind_meta(*id, solution);
            }
        }
        Ok(subst)
    }

    fn unify_at(
        &mut self,
        ctx: &Context,
        expected: &Arc<Term>,
        actual: &Arc<Term>,
    ) -> Result<(), UnifyError> {
        if self.depth >= self.max_depth {
            return Err(ReduceError::DepthExceeded {
                max_depth: self.max_depth,
            }
            .into());
        }
        self.depth += 1;
        let result = self.unify_inner(ctx, expected, actual);
        self.depth -= 1;
        result
    }

    fn unify_inner(
        &mut self,
        ctx: &Context,
        expected: &Arc<Term>,
        actual: &Arc<Term>,
    ) -> Result<(), UnifyError> {
        if structurally_equal(expected, actual) {
            return Ok(());
        }
        let expected = self.metas.instantiate(expected);
        let actual = self.metas.instantiate(actual);
        if structurally_equal(&expected, &actual) {
            return Ok(());
        }
        log::trace!("unify `{}` =?= `{}`", expected, actual);

        if self.try_solve(ctx, &expected, &actual)? || self.try_solve(ctx, &actual, &expected)? {
            return Ok(());
        }
        if self.try_congruence(ctx, &expected, &actual)? {
            return Ok(());
        }

        let expected_whnf = self.whnf(ctx, &expected)?;
        let actual_whnf = self.whnf(ctx, &actual)?;
        if !alpha_eq(&expected_whnf, &expected) || !alpha_eq(&actual_whnf, &actual) {
            return self.unify_at(ctx, &expected_whnf, &actual_whnf);
        }

        match self.unify_rigid(ctx, &expected, &actual) {
            Err(mismatch @ UnifyError::Mismatch { .. }) => {
                if self.normalize_equal(ctx, &expected, &actual)? {
                    Ok(())
                } else {
                    Err(mismatch)
                }
            }
            other => other,
        }
    }

    /// Compare two terms already in weak-head normal form by their head
    /// constructors.
    fn unify_rigid(
        &mut self,
        ctx: &Context,
        expected: &Arc<Term>,
        actual: &Arc<Term>,
    ) -> Result<(), UnifyError> {
        match (&**expected, &**actual) {
            (Term::Sort(l1), Term::Sort(l2)) if l1 == l2 => Ok(()),
            (Term::Lit(x), Term::Lit(y)) if x == y => Ok(()),
            (Term::Var(x), Term::Var(y)) if x == y => Ok(()),
            (Term::Const(x), Term::Const(y)) if x == y => Ok(()),
            (Term::Pi(x, d1, b1), Term::Pi(y, d2, b2)) => {
                self.at(PathStep::Domain, |u| u.unify_at(ctx, d1, d2))?;
                self.unify_under(ctx, PathStep::Codomain, (x, d1, b1), (y, b2))
            }
            (Term::Lam(x, d1, b1), Term::Lam(y, d2, b2))
            | (Term::Fix(x, d1, b1), Term::Fix(y, d2, b2)) => {
                if !matches!(**d1, Term::Hole) && !matches!(**d2, Term::Hole) {
                    self.at(PathStep::Domain, |u| u.unify_at(ctx, d1, d2))?;
                }
                self.unify_under(ctx, PathStep::Body, (x, d1, b1), (y, b2))
            }
            (Term::Lam(x, d, body), other) if is_neutral(other) => {
                self.eta(ctx, (x, d, body), actual, true)
            }
            (other, Term::Lam(x, d, body)) if is_neutral(other) => {
                self.eta(ctx, (x, d, body), expected, false)
            }
            (Term::App(..), Term::App(..)) => {
                let (h1, args1) = unfold_apps(expected);
                let (h2, args2) = unfold_apps(actual);
                if args1.len() != args2.len() {
                    return Err(self.mismatch(expected, actual));
                }
                self.at(PathStep::Function, |u| u.unify_at(ctx, &h1, &h2))?;
                self.unify_args(ctx, &args1, &args2)
            }
            _ => Err(self.mismatch(expected, actual)),
        }
    }

    /// Compare two binder bodies under a shared fresh variable.
    fn unify_under(
        &mut self,
        ctx: &Context,
        step: PathStep,
        (x, domain, b1): (&Name, &Arc<Term>, &Arc<Term>),
        (y, b2): (&Name, &Arc<Term>),
    ) -> Result<(), UnifyError> {
        let z = if !ctx.contains(x) && (x == y || !occurs_free(x, b2)) {
            x.clone()
        } else {
            fresh_name(x, |c| ctx.contains(c) || occurs_free(c, b1) || occurs_free(c, b2))
        };
        let var = Term::var(z.clone());
        let b1 = substitute(b1, x, &var);
        let b2 = substitute(b2, y, &var);
        let inner = ctx.push(z, domain.clone());
        self.at(step, |u| u.unify_at(&inner, &b1, &b2))
    }

    /// `fun x => b =?= t` becomes `b =?= t x` under a fresh `x`.
    fn eta(
        &mut self,
        ctx: &Context,
        (x, domain, body): (&Name, &Arc<Term>, &Arc<Term>),
        other: &Arc<Term>,
        lambda_expected: bool,
    ) -> Result<(), UnifyError> {
        let z = fresh_name(x, |c| ctx.contains(c) || occurs_free(c, body) || occurs_free(c, other));
        let var = Term::var(z.clone());
        let body = substitute(body, x, &var);
        let applied = Term::app(other.clone(), var);
        let inner = ctx.push(z, domain.clone());
        self.at(PathStep::Body, |u| {
            if lambda_expected {
                u.unify_at(&inner, &body, &applied)
            } else {
                u.unify_at(&inner, &applied, &body)
            }
        })
    }

    fn unify_args(
        &mut self,
        ctx: &Context,
        args1: &[Arc<Term>],
        args2: &[Arc<Term>],
    ) -> Result<(), UnifyError> {
        for (i, (a, b)) in args1.iter().zip(args2).enumerate() {
            self.at(PathStep::Argument(i), |u| u.unify_at(ctx, a, b))?;
        }
        Ok(())
    }

    /// Lazy delta: `c a1 .. an =?= c b1 .. bn` is first tried argument-wise,
    /// without unfolding `c`. Solutions made by a failed attempt are undone.
    fn try_congruence(
        &mut self,
        ctx: &Context,
        expected: &Arc<Term>,
        actual: &Arc<Term>,
    ) -> Result<bool, UnifyError> {
        let (h1, args1) = unfold_apps(expected);
        let (h2, args2) = unfold_apps(actual);
        match (&*h1, &*h2) {
            (Term::Const(a), Term::Const(b))
                if a == b && !args1.is_empty() && args1.len() == args2.len() => {}
            _ => return Ok(false),
        }
        let saved_metas = self.metas.clone();
        let saved_assigned = self.assigned.len();
        match self.unify_args(ctx, &args1, &args2) {
            Ok(()) => Ok(true),
            Err(UnifyError::Reduce(err)) => Err(err.into()),
            Err(_) => {
                *self.metas = saved_metas;
                self.assigned.truncate(saved_assigned);
                Ok(false)
            }
        }
    }

    /// Solve `?m x1 .. xn =?= other` if the left side is a pattern.
    fn try_solve(
        &mut self,
        ctx: &Context,
        flex: &Arc<Term>,
        other: &Arc<Term>,
    ) -> Result<bool, UnifyError> {
        let (head, spine) = unfold_apps(flex);
        let Term::Meta(id) = &*head else {
            return Ok(false);
        };
        let id = *id;
        if self.metas.is_solved(id) {
            return Ok(false);
        }
        let (other_head, _) = unfold_apps(other);
        if matches!(&*other_head, Term::Meta(m) if *m == id) {
            return Ok(false);
        }
        let mut params: Vec<Name> = Vec::with_capacity(spine.len());
        for arg in &spine {
            match &**arg {
                Term::Var(x) if !params.contains(x) => params.push(x.clone()),
                _ => return Ok(false),
            }
        }
        if occurs_meta(id, other) {
            return Err(UnifyError::OccursCheck {
                meta: id,
                term: other.clone(),
            });
        }

        let escapes = |t: &Term| free_vars(t).iter().any(|v| !params.contains(v));
        let mut rhs = other.clone();
        if escapes(&rhs) {
            rhs = self.normalize(ctx, &rhs, Transparency::Reducible)?;
            if escapes(&rhs) {
                return Err(self.mismatch(flex, other));
            }
        }

        let mut solution = rhs;
        for name in params.iter().rev() {
            let ty = ctx
                .lookup(name)
                .map(|binding| binding.ty.clone())
                .unwrap_or_else(Term::hole);
            solution = Term::lam(name.clone(), ty, solution);
        }
        log::trace!("solved {} := {}", id, solution);
        self.metas.assign(id, solution);
        self.assigned.push(id);
        Ok(true)
    }

    fn normalize_equal(
        &mut self,
        ctx: &Context,
        expected: &Arc<Term>,
        actual: &Arc<Term>,
    ) -> Result<bool, UnifyError> {
        let expected = self.normalize(ctx, expected, Transparency::All)?;
        let actual = self.normalize(ctx, actual, Transparency::All)?;
        Ok(alpha_eq(&expected, &actual))
    }

    fn whnf(&mut self, ctx: &Context, term: &Arc<Term>) -> Result<Arc<Term>, UnifyError> {
        let mut reducer = Reducer::new(self.env)
            .with_metas(&*self.metas)
            .with_fuel(self.fuel);
        let result = reducer.whnf(ctx, term);
        self.fuel = reducer.remaining();
        Ok(result?)
    }

    fn normalize(
        &mut self,
        ctx: &Context,
        term: &Arc<Term>,
        transparency: Transparency,
    ) -> Result<Arc<Term>, UnifyError> {
        let mut reducer = Reducer::new(self.env)
            .with_metas(&*self.metas)
            .with_transparency(transparency)
            .with_fuel(self.fuel);
        let result = reducer.normalize(ctx, term);
        self.fuel = reducer.remaining();
        Ok(result?)
    }

    fn at<T>(
        &mut self,
        step: PathStep,
        f: impl FnOnce(&mut Self) -> Result<T, UnifyError>,
    ) -> Result<T, UnifyError> {
        self.path.push(step);
        let result = f(self);
        self.path.pop();
        result
    }

    fn mismatch(&self, expected: &Arc<Term>, actual: &Arc<Term>) -> UnifyError {
        UnifyError::Mismatch {
            expected: expected.clone(),
            actual: actual.clone(),
            path: Path(self.path.clone()),
        }
    }
}

fn is_neutral(term: &Term) -> bool {
    matches!(
        term,
        Term::Var(_) | Term::Const(_) | Term::App(..) | Term::Meta(_) | Term::Fix(..)
    )
}

/// Unify two terms with no metavariables in scope besides those they mention.
pub fn unify(
    a: &Arc<Term>,
    b: &Arc<Term>,
    ctx: &Context,
    env: &Environment,
) -> Result<Substitution, UnifyError> {
    let mut metas = MetaContext::new();
    Unifier::new(env, &mut metas).unify(ctx, a, b)
}
