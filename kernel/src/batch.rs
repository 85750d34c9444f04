//! Checking top-level declarations, one at a time or a module at once.
//!
//! A module is checked in waves. A declaration is ready once no earlier
//! declaration it mentions is still pending; every ready declaration is
//! checked in parallel against a snapshot of the environment, and the results
//! are added serially in source order. A declaration that reuses a name also
//! waits for every earlier declaration of that name and every earlier
//! declaration that mentions it, so each one sees the same binding it would
//! see if the module were checked top to bottom.

use crate::ast::{Definition, DefinitionKind, Name, Term};
use crate::checker::{ensure_depth, ElaborationError, ErrorKind, Elaborator};
use crate::context::Context;
use crate::env::{Environment, EnvironmentError};
use crate::elaborate;
use crate::subst::referenced_constants;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("in `{name}`: {source}")]
    Elaboration { name: Name, source: ElaborationError },
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
}

impl DeclarationError {
    /// The elaboration failure, if that is what went wrong.
    pub fn kind(&self) -> Option<&ErrorKind> {
        match self {
            DeclarationError::Elaboration { source, .. } => Some(&source.kind),
            DeclarationError::Environment(_) => None,
        }
    }
}

/// A top-level declaration before checking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: Name,
    pub ty: Arc<Term>,
    pub value: Option<Arc<Term>>,
    pub kind: DefinitionKind,
}

impl Declaration {
    pub fn definition(name: impl Into<Name>, ty: Arc<Term>, value: Arc<Term>) -> Self {
        Declaration {
            name: name.into(),
            ty,
            value: Some(value),
            kind: DefinitionKind::Definition,
        }
    }

    pub fn theorem(name: impl Into<Name>, ty: Arc<Term>, proof: Arc<Term>) -> Self {
        Declaration {
            name: name.into(),
            ty,
            value: Some(proof),
            kind: DefinitionKind::Theorem,
        }
    }

    pub fn axiom(name: impl Into<Name>, ty: Arc<Term>) -> Self {
        Declaration {
            name: name.into(),
            ty,
            value: None,
            kind: DefinitionKind::Axiom,
        }
    }

    /// Reject a type or body nested deeper than `max_depth`.
    pub fn ensure_depth(&self, max_depth: usize) -> Result<(), DeclarationError> {
        let parts = std::iter::once(&self.ty).chain(self.value.iter());
        for term in parts {
            ensure_depth(term, max_depth).map_err(|source| DeclarationError::Elaboration {
                name: self.name.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Constants mentioned by the type or the body.
    pub fn references(&self) -> BTreeSet<Name> {
        let mut refs = referenced_constants(&self.ty);
        if let Some(value) = &self.value {
            refs.extend(referenced_constants(value));
        }
        refs
    }
}

/// Elaborate a declaration against `env` without adding it.
pub fn check_declaration(
    decl: &Declaration,
    env: &Environment,
) -> Result<Definition, DeclarationError> {
    let wrap = |source: ElaborationError| DeclarationError::Elaboration {
        name: decl.name.clone(),
        source,
    };
    decl.ensure_depth(env.config().max_depth)?;
    if let Some(existing) = env.get(&decl.name) {
        if existing.is_primitive() || decl.kind == DefinitionKind::Primitive {
            return Err(EnvironmentError::ReservedName(decl.name.clone()).into());
        }
        if !env.allows_redefinition() {
            return Err(EnvironmentError::DuplicateDefinition(decl.name.clone()).into());
        }
    }

    let ctx = Context::new();
    let ty = {
        let mut elab = Elaborator::new(env);
        let (ty, _) = elab.infer_type(&ctx, &decl.ty).map_err(wrap)?;
        elab.finish(&ctx, &ty).map_err(wrap)?
    };
    let (_, level) = Elaborator::kernel(env)
        .infer_type(&ctx, &ty)
        .map_err(wrap)?;

    if decl.kind == DefinitionKind::Theorem && !level.is_prop() {
        return Err(wrap(ElaborationError {
            kind: ErrorKind::NotAProposition {
                ty: ty.clone(),
                sort: level,
            },
            term: ty,
            context: Vec::new(),
        }));
    }

    let value = match &decl.value {
        Some(value) => Some(elaborate(value, Some(ty.clone()), env).map_err(wrap)?.0),
        None => None,
    };
    let def = match (decl.kind, value) {
        (DefinitionKind::Theorem, Some(proof)) => Definition::theorem(decl.name.clone(), ty, proof),
        (_, Some(value)) => Definition::definition(decl.name.clone(), ty, value),
        (_, None) => Definition::axiom(decl.name.clone(), ty),
    };
    Ok(def)
}

/// Elaborate a declaration and add it to `env`.
pub fn declare_checked(decl: &Declaration, env: &mut Environment) -> Result<(), DeclarationError> {
    let def = check_declaration(decl, env)?;
    env.add_definition(def)?;
    Ok(())
}

/// Outcome of checking a module.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Names added to the environment, in the order they were added.
    pub defined: Vec<Name>,
    /// Declarations that failed, with their errors.
    pub failures: Vec<(Name, DeclarationError)>,
    /// Names whose earlier definition was replaced.
    pub redefined: Vec<Name>,
    /// Number of dependency waves the module needed.
    pub waves: usize,
}

impl BatchReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

struct Pending {
    index: usize,
    decl: Declaration,
    references: BTreeSet<Name>,
}

/// Check a module's declarations, adding each one that succeeds.
pub fn check_module(decls: Vec<Declaration>, env: &mut Environment) -> BatchReport {
    let mut report = BatchReport::default();
    let max_depth = env.config().max_depth;
    let mut pending = Vec::with_capacity(decls.len());
    for (index, decl) in decls.into_iter().enumerate() {
        match decl.ensure_depth(max_depth) {
            Ok(()) => pending.push(Pending {
                index,
                references: decl.references(),
                decl,
            }),
            Err(err) => report.failures.push((decl.name, err)),
        }
    }

    while !pending.is_empty() {
        let blocked: Vec<bool> = pending
            .iter()
            .map(|p| pending.iter().any(|q| q.index < p.index && must_follow(p, q)))
            .collect();
        let mut ready = Vec::new();
        let mut waiting = Vec::new();
        for (p, is_blocked) in pending.into_iter().zip(blocked) {
            if is_blocked {
                waiting.push(p);
            } else {
                ready.push(p);
            }
        }

        report.waves += 1;
        log::debug!(
            "wave {}: checking {} declaration(s), {} waiting",
            report.waves,
            ready.len(),
            waiting.len()
        );
        let snapshot = env.snapshot();
        let results: Vec<(Pending, Result<Definition, DeclarationError>)> = ready
            .into_par_iter()
            .map(|p| {
                let result = check_declaration(&p.decl, &snapshot);
                (p, result)
            })
            .collect();

        for (p, result) in results {
            let added = result.and_then(|def| env.add_definition(def).map_err(DeclarationError::from));
            match added {
                Ok(previous) => {
                    if previous.is_some() {
                        report.redefined.push(p.decl.name.clone());
                    }
                    report.defined.push(p.decl.name);
                }
                Err(err) => {
                    log::debug!("declaration `{}` failed: {}", p.decl.name, err);
                    report.failures.push((p.decl.name, err));
                }
            }
        }
        pending = waiting;
    }
    report
}

/// Whether `later` has to wait until the earlier `earlier` has been added.
fn must_follow(later: &Pending, earlier: &Pending) -> bool {
    later.references.contains(&earlier.decl.name)
        || earlier.decl.name == later.decl.name
        || earlier.references.contains(&later.decl.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nat() -> Arc<Term> {
        Term::constant("Nat")
    }

    #[test]
    fn dependent_declarations_wait_for_their_dependencies() {
        let mut env = Environment::with_prelude();
        let decls = vec![
            Declaration::definition("two", nat(), Term::nat(2)),
            Declaration::definition("one", nat(), Term::nat(1)),
            Declaration::definition(
                "three",
                nat(),
                Term::apps(
                    Term::constant("Nat.add"),
                    vec![Term::constant("one"), Term::constant("two")],
                ),
            ),
        ];
        let report = check_module(decls, &mut env);
        assert!(report.is_ok(), "{:?}", report.failures);
        assert_eq!(report.waves, 2);
        assert_eq!(report.defined, vec!["two", "one", "three"]);
        assert!(env.contains("three"));
    }

    #[test]
    fn forward_references_fail_like_sequential_checking() {
        let mut env = Environment::with_prelude();
        let decls = vec![
            Declaration::definition("early", nat(), Term::constant("late")),
            Declaration::definition("late", nat(), Term::nat(0)),
        ];
        let report = check_module(decls, &mut env);
        assert_eq!(report.defined, vec!["late"]);
        let (name, err) = &report.failures[0];
        assert_eq!(name, "early");
        assert_eq!(err.kind(), Some(&ErrorKind::UnknownDefinition("late".into())));
    }

    #[test]
    fn failures_do_not_block_unrelated_declarations() {
        let mut env = Environment::with_prelude();
        let decls = vec![
            Declaration::definition("bad", nat(), Term::string("nope")),
            Declaration::definition("uses_bad", nat(), Term::constant("bad")),
            Declaration::definition("good", nat(), Term::nat(7)),
        ];
        let report = check_module(decls, &mut env);
        assert_eq!(report.defined, vec!["good"]);
        let failed: Vec<&str> = report.failures.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(failed, vec!["bad", "uses_bad"]);
    }

    #[test]
    fn duplicates_within_a_module_are_rejected() {
        let mut env = Environment::with_prelude();
        let decls = vec![
            Declaration::axiom("A", Term::type0()),
            Declaration::axiom("A", Term::type0()),
        ];
        let report = check_module(decls, &mut env);
        assert_eq!(report.defined, vec!["A"]);
        assert!(matches!(
            report.failures[0].1,
            DeclarationError::Environment(EnvironmentError::DuplicateDefinition(_))
        ));
    }

    #[test]
    fn redefinitions_wait_for_earlier_uses_of_the_name() {
        let mut env = Environment::with_prelude();
        env.set_allow_redefine(true);
        let decls = vec![
            Declaration::definition("x", nat(), Term::nat(1)),
            Declaration::definition("y", nat(), Term::constant("x")),
            Declaration::definition("x", Term::constant("String"), Term::string("s")),
        ];
        let report = check_module(decls, &mut env);
        assert!(report.is_ok(), "{:?}", report.failures);
        assert_eq!(report.defined, vec!["x", "y", "x"]);
        assert_eq!(report.redefined, vec!["x"]);
        assert_eq!(report.waves, 3);
        assert_eq!(env.lookup("y").unwrap().ty, nat());
        assert_eq!(env.lookup("x").unwrap().ty, Term::constant("String"));
    }

    #[test]
    fn deep_declarations_fail_without_blocking_the_module() {
        let handle = std::thread::Builder::new()
            .stack_size(256 * 1024 * 1024)
            .spawn(|| {
                let mut env = Environment::with_prelude();
                let mut deep = nat();
                for _ in 0..50_000 {
                    deep = Term::arrow(nat(), deep);
                }
                let decls = vec![
                    Declaration::axiom("A", deep),
                    Declaration::definition("ok", nat(), Term::nat(0)),
                ];
                let report = check_module(decls, &mut env);
                assert_eq!(report.defined, vec!["ok"]);
                let (name, err) = &report.failures[0];
                assert_eq!(name, "A");
                assert!(
                    matches!(err.kind(), Some(ErrorKind::NonTermination(_))),
                    "{}",
                    err
                );
            })
            .unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn theorems_must_be_propositions() {
        let env = Environment::with_prelude();
        let decl = Declaration::theorem("not_a_prop", nat(), Term::nat(0));
        let err = check_declaration(&decl, &env).unwrap_err();
        assert!(matches!(err.kind(), Some(ErrorKind::NotAProposition { .. })), "{}", err);
    }
}
