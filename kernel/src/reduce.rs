//! Weak-head and full normalization by substitution.
//!
//! Reductions: beta, delta (constants, subject to [`Transparency`]), zeta
//! (`let` and let-bound locals), fixpoint unfolding and the primitive rules in
//! [`crate::primitives`]. Every step spends one unit of fuel; running out, or
//! nesting deeper than the configured depth, is reported as non-termination.

use crate::ast::{unfold_apps, Term, Transparency};
use crate::context::Context;
use crate::env::Environment;
use crate::primitives;
use crate::subst::substitute;
use crate::unify::MetaContext;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReduceError {
    #[error("reduction did not terminate within {fuel} steps")]
    FuelExhausted { fuel: usize },
    #[error("nesting exceeds the maximum depth of {max_depth}")]
    DepthExceeded { max_depth: usize },
}

pub struct Reducer<'a> {
    env: &'a Environment,
    metas: Option<&'a MetaContext>,
    transparency: Transparency,
    budget: usize,
    fuel: usize,
    depth: usize,
    max_depth: usize,
}

impl<'a> Reducer<'a> {
    pub fn new(env: &'a Environment) -> Self {
        let config = env.config();
        Reducer {
            env,
            metas: None,
            transparency: Transparency::Reducible,
            budget: config.fuel,
            fuel: config.fuel,
            depth: 0,
            max_depth: config.max_depth,
        }
    }

    /// Look through solved metavariables while reducing.
    pub fn with_metas(mut self, metas: &'a MetaContext) -> Self {
        self.metas = Some(metas);
        self
    }

    pub fn with_transparency(mut self, transparency: Transparency) -> Self {
        self.transparency = transparency;
        self
    }

    pub fn with_fuel(mut self, fuel: usize) -> Self {
        self.budget = fuel;
        self.fuel = fuel;
        self
    }

    /// Fuel left for further steps.
    pub fn remaining(&self) -> usize {
        self.fuel
    }

    fn tick(&mut self) -> Result<(), ReduceError> {
        if self.fuel == 0 {
            log::debug!("reduction ran out of fuel after {} steps", self.budget);
            return Err(ReduceError::FuelExhausted { fuel: self.budget });
        }
        self.fuel -= 1;
        Ok(())
    }

    fn descend(&mut self) -> Result<(), ReduceError> {
        if self.depth >= self.max_depth {
            return Err(ReduceError::DepthExceeded {
                max_depth: self.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    pub fn whnf(&mut self, ctx: &Context, term: &Arc<Term>) -> Result<Arc<Term>, ReduceError> {
        self.descend()?;
        let result = self.whnf_inner(ctx, term);
        self.depth -= 1;
        result
    }

    fn whnf_inner(&mut self, ctx: &Context, term: &Arc<Term>) -> Result<Arc<Term>, ReduceError> {
        let mut current = term.clone();
        loop {
            let next = match &*current {
                Term::Var(name) => match ctx.lookup(name).and_then(|b| b.value.clone()) {
                    Some(value) => {
                        self.tick()?;
                        value
                    }
                    None => return Ok(current),
                },
                Term::Const(name) => match self.unfold(name) {
                    Some(body) => {
                        self.tick()?;
                        body
                    }
                    None => return Ok(current),
                },
                Term::Let(name, _, value, body) => {
                    self.tick()?;
                    substitute(body, name, value)
                }
                Term::Ann(inner, _) => inner.clone(),
                Term::Meta(id) => match self.metas.and_then(|m| m.solution(*id)) {
                    Some(solution) => solution,
                    None => return Ok(current),
                },
                // A fixpoint whose body is a lambda is already a value.
                Term::Fix(name, _, body) if !matches!(**body, Term::Lam(..)) => {
                    self.tick()?;
                    substitute(body, name, &current)
                }
                Term::App(..) => {
                    let (head, args) = unfold_apps(&current);
                    let head = self.whnf(ctx, &head)?;
                    match &*head {
                        Term::Lam(name, _, body) => {
                            self.tick()?;
                            let reduced = substitute(body, name, &args[0]);
                            Term::apps(reduced, args[1..].iter().cloned())
                        }
                        Term::Fix(name, _, body) => {
                            self.tick()?;
                            Term::apps(substitute(body, name, &head), args)
                        }
                        Term::Const(name) if self.is_primitive(name) => {
                            match primitives::reduce(self, ctx, name, &args)? {
                                Some(reduced) => {
                                    self.tick()?;
                                    reduced
                                }
                                None => return Ok(Term::apps(head.clone(), args)),
                            }
                        }
                        _ => return Ok(Term::apps(head.clone(), args)),
                    }
                }
                Term::Lit(_)
                | Term::Sort(_)
                | Term::Lam(..)
                | Term::Pi(..)
                | Term::Fix(..)
                | Term::Hole => return Ok(current),
            };
            current = next;
        }
    }

    fn unfold(&self, name: &str) -> Option<Arc<Term>> {
        self.env
            .get(name)
            .and_then(|def| def.unfold(self.transparency))
            .cloned()
    }

    fn is_primitive(&self, name: &str) -> bool {
        self.env.get(name).is_some_and(|def| def.is_primitive())
    }

    /// Full normal form: weak-head normalize, then normalize every subterm,
    /// going under binders.
    pub fn normalize(&mut self, ctx: &Context, term: &Arc<Term>) -> Result<Arc<Term>, ReduceError> {
        self.descend()?;
        let result = self.normalize_inner(ctx, term);
        self.depth -= 1;
        result
    }

    fn normalize_inner(&mut self, ctx: &Context, term: &Arc<Term>) -> Result<Arc<Term>, ReduceError> {
        let whnf = self.whnf(ctx, term)?;
        match &*whnf {
            Term::App(..) => {
                let (head, args) = unfold_apps(&whnf);
                let head = if head.is_atomic() {
                    head
                } else {
                    self.normalize(ctx, &head)?
                };
                let mut normalized = Vec::with_capacity(args.len());
                for arg in &args {
                    normalized.push(self.normalize(ctx, arg)?);
                }
                Ok(Term::apps(head, normalized))
            }
            Term::Lam(name, domain, body) => {
                let (domain, name, body) = self.normalize_binder(ctx, name, domain, body)?;
                Ok(Term::lam(name, domain, body))
            }
            Term::Pi(name, domain, body) => {
                let (domain, name, body) = self.normalize_binder(ctx, name, domain, body)?;
                Ok(Term::pi(name, domain, body))
            }
            Term::Fix(name, ty, body) => {
                let (ty, name, body) = self.normalize_binder(ctx, name, ty, body)?;
                Ok(Term::fix(name, ty, body))
            }
            _ => Ok(whnf.clone()),
        }
    }

    fn normalize_binder(
        &mut self,
        ctx: &Context,
        name: &String,
        domain: &Arc<Term>,
        body: &Arc<Term>,
    ) -> Result<(Arc<Term>, String, Arc<Term>), ReduceError> {
        let domain2 = if matches!(**domain, Term::Hole) {
            domain.clone()
        } else {
            self.normalize(ctx, domain)?
        };
        let (name, body) = ctx.open_binder(name, body);
        let inner = ctx.push(name.clone(), domain.clone());
        let body = self.normalize(&inner, &body)?;
        Ok((domain2, name, body))
    }
}

/// Weak-head normal form with the environment's default limits.
pub fn whnf(term: &Arc<Term>, ctx: &Context, env: &Environment) -> Result<Arc<Term>, ReduceError> {
    Reducer::new(env).whnf(ctx, term)
}

/// Full normal form with the environment's default limits.
pub fn normalize(
    term: &Arc<Term>,
    ctx: &Context,
    env: &Environment,
) -> Result<Arc<Term>, ReduceError> {
    Reducer::new(env).normalize(ctx, term)
}
