//! The Cosmos kernel: dependent type checking with proof terms.
//!
//! Terms are elaborated bidirectionally against an [`Environment`] of global
//! definitions. Equality of types is decided by unification up to
//! beta/delta/zeta/fix reduction, with a step bound that turns runaway
//! reduction into an error.

pub mod ast;
pub mod batch;
pub mod checker;
pub mod config;
pub mod context;
pub mod env;
pub mod pretty;
pub mod primitives;
pub mod reduce;
pub mod subst;
pub mod unify;

pub use ast::*;
pub use batch::{check_module, BatchReport, Declaration, DeclarationError};
pub use checker::{ensure_depth, ElaborationError, Elaborator, ErrorKind};
pub use config::KernelConfig;
pub use context::Context;
pub use env::{Environment, EnvironmentError};
pub use reduce::ReduceError;
pub use unify::{Path, PathStep};

use std::sync::Arc;

/// Elaborate a closed term, optionally against an expected type. Returns the
/// elaborated term and its type, both free of metavariables. The result is
/// checked a second time with holes disallowed before it is returned.
/// Terms nested deeper than the configured depth are rejected up front.
pub fn elaborate(
    term: &Arc<Term>,
    expected: Option<Arc<Term>>,
    env: &Environment,
) -> Result<(Arc<Term>, Arc<Term>), ElaborationError> {
    let max_depth = env.config().max_depth;
    ensure_depth(term, max_depth)?;
    if let Some(expected) = &expected {
        ensure_depth(expected, max_depth)?;
    }
    let ctx = Context::new();
    let mut elab = Elaborator::new(env);
    let (term, ty) = match expected {
        Some(expected) => {
            let (ty, _) = elab.infer_type(&ctx, &expected)?;
            let term = elab.check(&ctx, term, &ty)?;
            (term, ty)
        }
        None => elab.infer(&ctx, term)?,
    };
    let ty = elab.finish(&ctx, &ty)?;
    let term = elab.finish(&ctx, &term)?;

    let mut kernel = Elaborator::kernel(env);
    kernel.infer_type(&ctx, &ty)?;
    kernel.check(&ctx, &term, &ty)?;
    log::debug!("elaborated `{}` : `{}`", term, ty);
    Ok((term, ty))
}

/// Add an already elaborated declaration. A missing body declares an axiom.
pub fn define_top(
    name: &str,
    ty: Arc<Term>,
    body: Option<Arc<Term>>,
    env: &mut Environment,
) -> Result<(), EnvironmentError> {
    env.define(name, ty, body)
}

/// Elaborate a declaration's type and body, then add it.
pub fn declare(
    name: &str,
    ty: Arc<Term>,
    body: Option<Arc<Term>>,
    env: &mut Environment,
) -> Result<(), DeclarationError> {
    let decl = match body {
        Some(body) => Declaration::definition(name, ty, body),
        None => Declaration::axiom(name, ty),
    };
    batch::declare_checked(&decl, env)
}

/// Full normal form for printing, unfolding every definition.
pub fn normalize_for_display(term: &Arc<Term>, env: &Environment) -> Result<Arc<Term>, ReduceError> {
    let max_depth = env.config().max_depth;
    if subst::deeper_than(term, max_depth) {
        return Err(ReduceError::DepthExceeded { max_depth });
    }
    reduce::Reducer::new(env)
        .with_transparency(Transparency::All)
        .normalize(&Context::new(), term)
}
