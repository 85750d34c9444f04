//! Bidirectional type checking and elaboration.
//!
//! `infer` synthesizes a type; `check` pushes an expected type inward. Holes
//! become metavariables applied to the variables of the local context, and
//! are solved by the unifier. Binders are renamed on entry whenever their name
//! is already bound, so a context never holds two bindings of one name.

use crate::ast::{unfold_apps, Level, MetaId, Name, Term};
use crate::context::Context;
use crate::env::Environment;
use crate::primitives::literal_type;
use crate::reduce::{ReduceError, Reducer};
use crate::subst::{deeper_than, elide, fresh_name, substitute};
use crate::unify::{MetaContext, Path, Unifier, UnifyError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("unbound variable `{0}`")]
    UnboundVariable(Name),
    #[error("unknown definition `{0}`")]
    UnknownDefinition(Name),
    #[error("`{term}` is not a function; its type is `{ty}`")]
    NotAFunction { term: Arc<Term>, ty: Arc<Term> },
    #[error("type mismatch at {path}: expected `{expected}`, found `{actual}`")]
    UnificationFailure {
        expected: Arc<Term>,
        actual: Arc<Term>,
        path: Path,
    },
    #[error("{meta} would occur in its own solution `{term}`")]
    OccursCheck { meta: MetaId, term: Arc<Term> },
    #[error("non-termination: {0}")]
    NonTermination(ReduceError),
    #[error("`{term}` is not a type; its type is `{ty}`")]
    NotAType { term: Arc<Term>, ty: Arc<Term> },
    #[error("a theorem must state a proposition, but `{ty}` is a `{sort}`")]
    NotAProposition { ty: Arc<Term>, sort: Level },
    #[error("could not infer a value for {0}")]
    UnsolvedMetavariable(MetaId),
    #[error("cannot elaborate `_` here")]
    CannotInferHole,
    #[error("`{0}` is the largest universe and has no type")]
    UniverseTooLarge(Level),
}

/// A failed judgment: what went wrong, on which subterm, in which context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}\n  while checking `{term}`{}", render_context(.context))]
pub struct ElaborationError {
    pub kind: ErrorKind,
    pub term: Arc<Term>,
    /// Local bindings in scope, outermost first.
    pub context: Vec<(Name, Arc<Term>)>,
}

fn render_context(context: &[(Name, Arc<Term>)]) -> String {
    let mut out = String::new();
    for (name, ty) in context {
        out.push_str(&format!("\n    {} : {}", name, ty));
    }
    out
}

/// Levels of a rejected deep term kept for the error message.
const ELIDED_DEPTH: usize = 4;

impl ElaborationError {
    /// A term nested deeper than `max_depth`, shown with its top levels only.
    pub fn too_deep(term: &Arc<Term>, max_depth: usize) -> Self {
        ElaborationError {
            kind: ErrorKind::NonTermination(ReduceError::DepthExceeded { max_depth }),
            term: elide(term, ELIDED_DEPTH),
            context: Vec::new(),
        }
    }
}

/// Reject a term before any recursive traversal touches it.
pub fn ensure_depth(term: &Arc<Term>, max_depth: usize) -> Result<(), ElaborationError> {
    if deeper_than(term, max_depth) {
        log::debug!("rejecting a term nested deeper than {}", max_depth);
        return Err(ElaborationError::too_deep(term, max_depth));
    }
    Ok(())
}

impl From<UnifyError> for ErrorKind {
    fn from(err: UnifyError) -> Self {
        match err {
            UnifyError::Mismatch {
                expected,
                actual,
                path,
            } => ErrorKind::UnificationFailure {
                expected,
                actual,
                path,
            },
            UnifyError::OccursCheck { meta, term } => ErrorKind::OccursCheck { meta, term },
            UnifyError::Reduce(err) => ErrorKind::NonTermination(err),
        }
    }
}

pub struct Elaborator<'env> {
    env: &'env Environment,
    metas: MetaContext,
    allow_metas: bool,
    depth: usize,
}

impl<'env> Elaborator<'env> {
    pub fn new(env: &'env Environment) -> Self {
        Elaborator {
            env,
            metas: MetaContext::new(),
            allow_metas: true,
            depth: 0,
        }
    }

    /// A checker for fully elaborated terms: holes and metavariables are errors.
    pub fn kernel(env: &'env Environment) -> Self {
        Elaborator {
            allow_metas: false,
            ..Elaborator::new(env)
        }
    }

    pub fn metas(&self) -> &MetaContext {
        &self.metas
    }

    /// Replace solved metavariables in `term`.
    pub fn zonk(&self, term: &Arc<Term>) -> Arc<Term> {
        self.metas.instantiate(term)
    }

    /// Zonk `term` and require that nothing is left unsolved.
    pub fn finish(&self, ctx: &Context, term: &Arc<Term>) -> Result<Arc<Term>, ElaborationError> {
        let zonked = self.zonk(term);
        log::trace!("{} metavariable(s) in scope, finishing {}", self.metas.len(), zonked);
        match first_unsolved(&zonked) {
            None => Ok(zonked),
            Some(Some(id)) => Err(self.error(ctx, &zonked, ErrorKind::UnsolvedMetavariable(id))),
            Some(None) => Err(self.error(ctx, &zonked, ErrorKind::CannotInferHole)),
        }
    }

    fn error(&self, ctx: &Context, term: &Arc<Term>, kind: ErrorKind) -> ElaborationError {
        ElaborationError {
            kind,
            term: self.zonk(term),
            context: ctx
                .snapshot()
                .into_iter()
                .map(|(name, ty)| (name, self.zonk(&ty)))
                .collect(),
        }
    }

    fn enter(&mut self, ctx: &Context, term: &Arc<Term>) -> Result<(), ElaborationError> {
        let max_depth = self.env.config().max_depth;
        if self.depth >= max_depth {
            let err = ReduceError::DepthExceeded { max_depth };
            return Err(self.error(ctx, term, ErrorKind::NonTermination(err)));
        }
        self.depth += 1;
        Ok(())
    }

    // =========================================================================
    // Judgments
    // =========================================================================

    /// Synthesize a type: returns the elaborated term and its type.
    pub fn infer(
        &mut self,
        ctx: &Context,
        term: &Arc<Term>,
    ) -> Result<(Arc<Term>, Arc<Term>), ElaborationError> {
        self.enter(ctx, term)?;
        let result = self.infer_core(ctx, term);
        self.depth -= 1;
        result
    }

    /// Check against an expected type, which must itself be well-typed in `ctx`.
    pub fn check(
        &mut self,
        ctx: &Context,
        term: &Arc<Term>,
        expected: &Arc<Term>,
    ) -> Result<Arc<Term>, ElaborationError> {
        self.enter(ctx, term)?;
        let result = self.check_core(ctx, term, expected);
        self.depth -= 1;
        result
    }

    /// Elaborate a term that must be a type, returning its universe level.
    pub fn infer_type(
        &mut self,
        ctx: &Context,
        term: &Arc<Term>,
    ) -> Result<(Arc<Term>, Level), ElaborationError> {
        if self.allow_metas && matches!(**term, Term::Hole) {
            // The level is a guess until the hole is solved.
            return Ok((self.fresh_meta(ctx, Term::type0()), Level::TYPE));
        }
        let (elaborated, ty) = self.infer(ctx, term)?;
        let sort = self.whnf(ctx, &ty)?;
        match &*sort {
            Term::Sort(level) => Ok((elaborated, *level)),
            _ if self.allow_metas && is_flex(&sort) => {
                self.unify(ctx, term, &Term::type0(), &sort)?;
                Ok((elaborated, Level::TYPE))
            }
            _ => {
                let kind = ErrorKind::NotAType {
                    term: self.zonk(&elaborated),
                    ty: self.zonk(&sort),
                };
                Err(self.error(ctx, term, kind))
            }
        }
    }

    fn infer_core(
        &mut self,
        ctx: &Context,
        term: &Arc<Term>,
    ) -> Result<(Arc<Term>, Arc<Term>), ElaborationError> {
        match &**term {
            Term::Var(name) => match ctx.lookup(name) {
                Some(binding) => Ok((term.clone(), binding.ty.clone())),
                None => Err(self.error(ctx, term, ErrorKind::UnboundVariable(name.clone()))),
            },
            Term::Const(name) => match self.env.get(name) {
                Some(def) => Ok((term.clone(), def.ty.clone())),
                None => Err(self.error(ctx, term, ErrorKind::UnknownDefinition(name.clone()))),
            },
            Term::Lit(lit) => {
                let ty = literal_type(lit);
                match ty.head_constant() {
                    Some(name) if !self.env.contains(name) => {
                        let kind = ErrorKind::UnknownDefinition(name.to_string());
                        Err(self.error(ctx, term, kind))
                    }
                    _ => Ok((term.clone(), ty)),
                }
            }
            Term::Sort(level) => match level.succ() {
                Some(above) => Ok((term.clone(), Term::sort(above))),
                None => Err(self.error(ctx, term, ErrorKind::UniverseTooLarge(*level))),
            },
            Term::Pi(name, domain, codomain) => {
                let (domain2, domain_level) = self.infer_type(ctx, domain)?;
                let (name2, codomain) = ctx.open_binder(name, codomain);
                let inner = ctx.push(name2.clone(), domain2.clone());
                let (codomain2, codomain_level) = self.infer_type(&inner, &codomain)?;
                let domain_level = if matches!(**domain, Term::Hole) {
                    self.settle_level(ctx, &domain2, domain_level)?
                } else {
                    domain_level
                };
                let sort = Term::sort(domain_level.imax(codomain_level));
                Ok((Term::pi(name2, domain2, codomain2), sort))
            }
            Term::Lam(name, domain, body) => {
                let (domain2, _) = self.infer_type(ctx, domain)?;
                let (name2, body) = ctx.open_binder(name, body);
                let inner = ctx.push(name2.clone(), domain2.clone());
                let (body2, body_ty) = self.infer(&inner, &body)?;
                Ok((
                    Term::lam(name2.clone(), domain2.clone(), body2),
                    Term::pi(name2, domain2, body_ty),
                ))
            }
            Term::App(..) => self.infer_app(ctx, term),
            Term::Let(name, ty, value, body) => {
                let (ty2, value2) = self.let_value(ctx, ty, value)?;
                let (name2, body) = ctx.open_binder(name, body);
                let inner = ctx.push_def(name2.clone(), ty2.clone(), value2.clone());
                let (body2, body_ty) = self.infer(&inner, &body)?;
                let result_ty = substitute(&body_ty, &name2, &value2);
                Ok((Term::let_in(name2, ty2, value2, body2), result_ty))
            }
            Term::Fix(name, ty, body) => {
                let (ty2, _) = self.infer_type(ctx, ty)?;
                let (name2, body) = ctx.open_binder(name, body);
                let inner = ctx.push(name2.clone(), ty2.clone());
                let body2 = self.check(&inner, &body, &ty2)?;
                Ok((Term::fix(name2, ty2.clone(), body2), ty2))
            }
            Term::Ann(inner, ty) => {
                let (ty2, _) = self.infer_type(ctx, ty)?;
                let inner2 = self.check(ctx, inner, &ty2)?;
                Ok((inner2, ty2))
            }
            Term::Hole => {
                if !self.allow_metas {
                    return Err(self.error(ctx, term, ErrorKind::CannotInferHole));
                }
                let ty = self.fresh_meta(ctx, Term::type0());
                let hole = self.fresh_meta(ctx, ty.clone());
                Ok((hole, ty))
            }
            Term::Meta(id) => {
                if !self.allow_metas {
                    return Err(self.error(ctx, term, ErrorKind::UnsolvedMetavariable(*id)));
                }
                match self.metas.type_of(*id) {
                    Some(ty) => Ok((term.clone(), ty.clone())),
                    None => Err(self.error(ctx, term, ErrorKind::CannotInferHole)),
                }
            }
        }
    }

    fn check_core(
        &mut self,
        ctx: &Context,
        term: &Arc<Term>,
        expected: &Arc<Term>,
    ) -> Result<Arc<Term>, ElaborationError> {
        match &**term {
            Term::Lam(name, domain, body) => {
                let expected_whnf = self.whnf(ctx, expected)?;
                let Term::Pi(pi_name, pi_domain, pi_codomain) = &*expected_whnf else {
                    return self.check_by_inference(ctx, term, expected);
                };
                let domain2 = if matches!(**domain, Term::Hole) {
                    pi_domain.clone()
                } else {
                    let (domain2, _) = self.infer_type(ctx, domain)?;
                    self.unify(ctx, domain, pi_domain, &domain2)?;
                    domain2
                };
                let (name2, body) = ctx.open_binder(name, body);
                let codomain = substitute(pi_codomain, pi_name, &Term::var(name2.clone()));
                let inner = ctx.push(name2.clone(), domain2.clone());
                let body2 = self.check(&inner, &body, &codomain)?;
                Ok(Term::lam(name2, domain2, body2))
            }
            Term::Let(name, ty, value, body) => {
                let (ty2, value2) = self.let_value(ctx, ty, value)?;
                let (name2, body) = ctx.open_binder(name, body);
                let inner = ctx.push_def(name2.clone(), ty2.clone(), value2.clone());
                let body2 = self.check(&inner, &body, expected)?;
                Ok(Term::let_in(name2, ty2, value2, body2))
            }
            Term::Hole if self.allow_metas => Ok(self.fresh_meta(ctx, expected.clone())),
            _ => self.check_by_inference(ctx, term, expected),
        }
    }

    fn check_by_inference(
        &mut self,
        ctx: &Context,
        term: &Arc<Term>,
        expected: &Arc<Term>,
    ) -> Result<Arc<Term>, ElaborationError> {
        let (elaborated, actual) = self.infer(ctx, term)?;
        self.unify(ctx, term, expected, &actual)?;
        Ok(elaborated)
    }

    fn infer_app(
        &mut self,
        ctx: &Context,
        term: &Arc<Term>,
    ) -> Result<(Arc<Term>, Arc<Term>), ElaborationError> {
        let (head, args) = unfold_apps(term);
        let (mut fun, mut fun_ty) = self.infer(ctx, &head)?;
        for arg in &args {
            let (name, domain, codomain) = self.expect_pi(ctx, &fun, &fun_ty)?;
            let arg2 = self.check(ctx, arg, &domain)?;
            fun_ty = substitute(&codomain, &name, &arg2);
            fun = Term::app(fun, arg2);
        }
        Ok((fun, fun_ty))
    }

    /// The Pi type `fun_ty` reduces to. An unsolved metavariable is refined
    /// to a Pi of fresh metavariables.
    fn expect_pi(
        &mut self,
        ctx: &Context,
        fun: &Arc<Term>,
        fun_ty: &Arc<Term>,
    ) -> Result<(Name, Arc<Term>, Arc<Term>), ElaborationError> {
        let ty = self.whnf(ctx, fun_ty)?;
        match &*ty {
            Term::Pi(name, domain, codomain) => Ok((name.clone(), domain.clone(), codomain.clone())),
            _ if self.allow_metas && is_flex(&ty) => {
                let name = fresh_name("x", |c| ctx.contains(c));
                let domain = self.fresh_meta(ctx, Term::type0());
                let inner = ctx.push(name.clone(), domain.clone());
                let codomain = self.fresh_meta(&inner, Term::type0());
                let pi = Term::pi(name.clone(), domain.clone(), codomain.clone());
                self.unify(ctx, fun, &ty, &pi)?;
                Ok((name, domain, codomain))
            }
            _ => {
                let kind = ErrorKind::NotAFunction {
                    term: self.zonk(fun),
                    ty: self.zonk(&ty),
                };
                Err(self.error(ctx, fun, kind))
            }
        }
    }

    /// Elaborate the annotation and value of a `let`; a hole annotation takes
    /// the inferred type of the value.
    fn let_value(
        &mut self,
        ctx: &Context,
        ty: &Arc<Term>,
        value: &Arc<Term>,
    ) -> Result<(Arc<Term>, Arc<Term>), ElaborationError> {
        if matches!(**ty, Term::Hole) {
            let (value2, ty2) = self.infer(ctx, value)?;
            return Ok((ty2, value2));
        }
        let (ty2, _) = self.infer_type(ctx, ty)?;
        let value2 = self.check(ctx, value, &ty2)?;
        Ok((ty2, value2))
    }

    /// Recompute the level of a type that started out as a hole.
    fn settle_level(
        &mut self,
        ctx: &Context,
        ty: &Arc<Term>,
        guess: Level,
    ) -> Result<Level, ElaborationError> {
        let ty = self.zonk(ty);
        if is_flex(&ty) {
            return Ok(guess);
        }
        Ok(self.infer_type(ctx, &ty)?.1)
    }

    // =========================================================================
    // Metavariables and conversion
    // =========================================================================

    /// A fresh metavariable of type `ty`, applied to every local variable so
    /// its solution may depend on them.
    fn fresh_meta(&mut self, ctx: &Context, ty: Arc<Term>) -> Arc<Term> {
        let bindings = ctx.bindings();
        let closed_ty = bindings
            .iter()
            .rev()
            .fold(ty, |acc, b| Term::pi(b.name.clone(), b.ty.clone(), acc));
        let id = self.metas.fresh(closed_ty);
        Term::apps(
            Term::meta(id),
            bindings.iter().map(|b| Term::var(b.name.clone())),
        )
    }

    fn whnf(&self, ctx: &Context, term: &Arc<Term>) -> Result<Arc<Term>, ElaborationError> {
        Reducer::new(self.env)
            .with_metas(&self.metas)
            .whnf(ctx, term)
            .map_err(|err| self.error(ctx, term, ErrorKind::NonTermination(err)))
    }

    fn unify(
        &mut self,
        ctx: &Context,
        term: &Arc<Term>,
        expected: &Arc<Term>,
        actual: &Arc<Term>,
    ) -> Result<(), ElaborationError> {
        let result = Unifier::new(self.env, &mut self.metas).unify(ctx, expected, actual);
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let kind = match ErrorKind::from(err) {
                    ErrorKind::UnificationFailure {
                        expected,
                        actual,
                        path,
                    } => ErrorKind::UnificationFailure {
                        expected: self.zonk(&expected),
                        actual: self.zonk(&actual),
                        path,
                    },
                    other => other,
                };
                Err(self.error(ctx, term, kind))
            }
        }
    }
}

/// Headed by a metavariable (solved ones are gone after zonking or whnf).
fn is_flex(term: &Arc<Term>) -> bool {
    let (head, _) = unfold_apps(term);
    matches!(*head, Term::Meta(_))
}

/// `Some(Some(id))` for a leftover metavariable, `Some(None)` for a hole.
fn first_unsolved(term: &Term) -> Option<Option<MetaId>> {
    match term {
        Term::Meta(id) => Some(Some(*id)),
        Term::Hole => Some(None),
        Term::Var(_) | Term::Lit(_) | Term::Sort(_) | Term::Const(_) => None,
        Term::App(f, a) | Term::Ann(f, a) => first_unsolved(f).or_else(|| first_unsolved(a)),
        Term::Lam(_, a, b) | Term::Pi(_, a, b) | Term::Fix(_, a, b) => {
            first_unsolved(a).or_else(|| first_unsolved(b))
        }
        Term::Let(_, t, v, b) => first_unsolved(t)
            .or_else(|| first_unsolved(v))
            .or_else(|| first_unsolved(b)),
    }
}
