//! Negative tests for the kernel: these programs MUST fail, and with the
//! documented error kind.

use kernel::ast::{Level, Term};
use kernel::checker::{Elaborator, ErrorKind};
use kernel::config::KernelConfig;
use kernel::context::Context;
use kernel::env::{Environment, EnvironmentError};
use kernel::reduce::ReduceError;
use kernel::unify::{unify, MetaContext, PathStep, Unifier, UnifyError};
use kernel::{declare, define_top, elaborate, normalize_for_display, DeclarationError};
use std::sync::Arc;

fn nat() -> Arc<Term> {
    Term::constant("Nat")
}

fn string() -> Arc<Term> {
    Term::constant("String")
}

fn small_fuel_env() -> Environment {
    Environment::with_prelude().with_config(KernelConfig::default().with_fuel(2_000))
}

// =============================================================================
// TYPE MISMATCH ERRORS
// =============================================================================

/// Negative test: a lambda whose body disagrees with the declared codomain
#[test]
fn negative_body_does_not_match_codomain() {
    let env = Environment::with_prelude();
    let id = Term::lam("x", nat(), Term::var("x"));
    let err = elaborate(&id, Some(Term::arrow(nat(), string())), &env).unwrap_err();
    match err.kind {
        ErrorKind::UnificationFailure {
            expected, actual, ..
        } => {
            assert_eq!(expected, string());
            assert_eq!(actual, nat());
        }
        other => panic!("expected a unification failure, got {}", other),
    }
}

/// Negative test: argument of the wrong type
#[test]
fn negative_argument_type_mismatch() {
    let env = Environment::with_prelude();
    let call = Term::app(Term::constant("Nat.succ"), Term::string("one"));
    let err = elaborate(&call, None, &env).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnificationFailure { .. }), "{}", err);
    assert_eq!(err.term, Term::string("one"));
}

/// Negative test: the mismatch path points inside the types
#[test]
fn negative_mismatch_path_names_the_argument() {
    let env = Environment::with_prelude();
    let lhs = Term::arrow(nat(), Term::arrow(nat(), nat()));
    let rhs = Term::arrow(nat(), Term::arrow(string(), nat()));
    let err = unify(&lhs, &rhs, &Context::new(), &env).unwrap_err();
    let UnifyError::Mismatch { path, .. } = err else {
        panic!("expected a mismatch, got {}", err);
    };
    assert_eq!(path.0, vec![PathStep::Codomain, PathStep::Domain]);
    insta::assert_snapshot!(path.to_string(), @"codomain > domain");
}

/// Negative test: applying something that is not a function
#[test]
fn negative_apply_non_function() {
    let env = Environment::with_prelude();
    let err = elaborate(&Term::app(Term::nat(1), Term::nat(2)), None, &env).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NotAFunction { .. }), "{}", err);
}

/// Negative test: a value used as a type
#[test]
fn negative_value_as_type() {
    let env = Environment::with_prelude();
    let err = elaborate(&Term::ann(Term::nat(1), Term::nat(2)), None, &env).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NotAType { .. }), "{}", err);
}

/// Negative test: a theorem whose statement lives in Type
#[test]
fn negative_theorem_about_data() {
    let mut env = Environment::with_prelude();
    let decl = kernel::Declaration::theorem("three", nat(), Term::nat(3));
    let err = kernel::batch::declare_checked(&decl, &mut env).unwrap_err();
    assert!(matches!(err.kind(), Some(ErrorKind::NotAProposition { .. })), "{}", err);
    assert!(!env.contains("three"));
}

// =============================================================================
// SCOPING ERRORS
// =============================================================================

/// Negative test: a variable popped from the context is no longer in scope
#[test]
fn negative_variable_after_pop() {
    let env = Environment::with_prelude();
    let ctx = Context::new().push("x", nat());
    let popped = ctx.pop().expect("one binding to pop");
    let mut elab = Elaborator::new(&env);
    let err = elab.infer(&popped, &Term::var("x")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnboundVariable("x".into()));

    // Still fine in the original context.
    assert!(Elaborator::new(&env).infer(&ctx, &Term::var("x")).is_ok());
}

/// Negative test: free variables in a closed term
#[test]
fn negative_unbound_variable() {
    let env = Environment::with_prelude();
    let err = elaborate(&Term::var("y"), None, &env).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnboundVariable("y".into()));
}

/// Negative test: a binder's scope ends with its body
#[test]
fn negative_binder_does_not_leak() {
    let env = Environment::with_prelude();
    let term = Term::app(
        Term::lam("x", nat(), Term::var("x")),
        Term::var("x"),
    );
    let err = elaborate(&term, None, &env).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnboundVariable("x".into()));
}

/// Negative test: constants must be defined before use
#[test]
fn negative_unknown_definition() {
    let env = Environment::with_prelude();
    let err = elaborate(&Term::constant("Bool"), None, &env).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownDefinition("Bool".into()));
}

// =============================================================================
// UNIVERSES
// =============================================================================

/// Negative test: the top universe has no type, so `Sort MAX : Sort MAX`
/// cannot be derived
#[test]
fn negative_top_universe_is_not_its_own_type() {
    let env = Environment::with_prelude();
    let top = Term::sort(Level(u32::MAX));
    let err = elaborate(&top, None, &env).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UniverseTooLarge(Level(u32::MAX)));

    let err = elaborate(&top, Some(top.clone()), &env).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UniverseTooLarge(Level(u32::MAX)));

    // The level below has the top universe as its type, which is ill formed.
    let err = elaborate(&Term::sort(Level(u32::MAX - 1)), None, &env).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UniverseTooLarge(Level(u32::MAX)));

    let (_, ty) = elaborate(&Term::sort(Level(u32::MAX - 2)), None, &env).unwrap();
    assert_eq!(ty, Term::sort(Level(u32::MAX - 1)));
}

// =============================================================================
// ENVIRONMENT ERRORS
// =============================================================================

/// Negative test: names can be defined once
#[test]
fn negative_duplicate_definition() {
    let mut env = Environment::with_prelude();
    define_top("zero", nat(), Some(Term::nat(0)), &mut env).unwrap();
    let err = define_top("zero", nat(), Some(Term::nat(1)), &mut env).unwrap_err();
    assert_eq!(err, EnvironmentError::DuplicateDefinition("zero".into()));

    env.set_allow_redefine(true);
    define_top("zero", nat(), Some(Term::nat(1)), &mut env).unwrap();
    assert_eq!(normalize_for_display(&Term::constant("zero"), &env).unwrap(), Term::nat(1));
}

/// Negative test: primitives cannot be replaced
#[test]
fn negative_redefine_primitive() {
    let mut env = Environment::with_prelude();
    env.set_allow_redefine(true);
    let err = declare("Nat.add", nat(), Some(Term::nat(0)), &mut env).unwrap_err();
    assert!(matches!(
        err,
        DeclarationError::Environment(EnvironmentError::ReservedName(_))
    ));
}

// =============================================================================
// METAVARIABLES
// =============================================================================

/// Negative test: a metavariable cannot be solved by a term containing it
#[test]
fn negative_occurs_check() {
    let env = Environment::with_prelude();
    let mut metas = MetaContext::new();
    let m = metas.fresh(Term::type0());
    let cyclic = Term::arrow(Term::meta(m), nat());
    let err = Unifier::new(&env, &mut metas)
        .unify(&Context::new(), &Term::meta(m), &cyclic)
        .unwrap_err();
    assert!(matches!(err, UnifyError::OccursCheck { meta, .. } if meta == m), "{}", err);
    assert!(!metas.is_solved(m));
}

/// Negative test: a hole nothing constrains
#[test]
fn negative_unsolved_hole() {
    let env = Environment::with_prelude();
    let term = Term::lam("x", Term::hole(), Term::var("x"));
    let err = elaborate(&term, None, &env).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnsolvedMetavariable(_)), "{}", err);
}

/// Negative test: a solution may not mention variables the metavariable cannot see
#[test]
fn negative_escaping_variable() {
    let env = Environment::with_prelude();
    // (fun (A : Type) (y : A) => y) _ : the hole would have to be a bound type
    let id = Term::lam("A", Term::type0(), Term::lam("y", Term::var("A"), Term::var("y")));
    let outer = Term::lam(
        "B",
        Term::type0(),
        Term::lam(
            "b",
            Term::var("B"),
            Term::ann(
                Term::apps(id, vec![Term::hole(), Term::var("b")]),
                Term::var("B"),
            ),
        ),
    );
    // The hole sees `B` and `b`, so this one is fine.
    assert!(elaborate(&outer, None, &env).is_ok());

    let mut metas = MetaContext::new();
    let m = metas.fresh(Term::type0());
    let ctx = Context::new().push("B", Term::type0());
    let err = Unifier::new(&env, &mut metas)
        .unify(&ctx, &Term::meta(m), &Term::var("B"))
        .unwrap_err();
    assert!(matches!(err, UnifyError::Mismatch { .. }), "{}", err);
}

// =============================================================================
// NON-TERMINATION
// =============================================================================

/// Negative test: a fixpoint that only unfolds to itself
#[test]
fn negative_fix_loop_reports_non_termination() {
    let env = small_fuel_env();
    let looping = Term::fix("f", nat(), Term::var("f"));
    // Well-typed, but normalizing it never ends.
    let (elaborated, _) = elaborate(&looping, None, &env).unwrap();
    let err = normalize_for_display(&elaborated, &env).unwrap_err();
    assert_eq!(err, ReduceError::FuelExhausted { fuel: 2_000 });
}

/// Negative test: checking that needs to evaluate a loop
#[test]
fn negative_conversion_through_a_loop() {
    let mut env = small_fuel_env();
    env.define("Vec", Term::arrow(nat(), Term::type0()), None).unwrap();
    let looping = Term::fix("f", nat(), Term::var("f"));
    let term = Term::ann(
        Term::nat(0),
        Term::app(Term::constant("Vec"), looping),
    );
    let err = elaborate(&term, None, &env).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NonTermination(_)), "{}", err);
}

/// Negative test: a self-referential constant, `define loop := loop`
#[test]
fn negative_self_referential_definition() {
    let mut env = small_fuel_env();
    define_top("Loop", Term::type0(), Some(Term::constant("Loop")), &mut env).unwrap();
    let err = normalize_for_display(&Term::constant("Loop"), &env).unwrap_err();
    assert!(matches!(err, ReduceError::FuelExhausted { .. }));

    let term = Term::ann(Term::nat(3), Term::constant("Loop"));
    let err = elaborate(&term, None, &env).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NonTermination(_)), "{}", err);
}

/// Negative test: nesting beyond the depth limit fails instead of overflowing
#[test]
fn negative_depth_limit() {
    let handle = std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(|| {
            let env = Environment::with_prelude()
                .with_config(KernelConfig::default().with_max_depth(64));
            let mut term = Term::nat(0);
            for _ in 0..200 {
                term = Term::app(Term::constant("Nat.succ"), term);
            }
            let err = elaborate(&term, None, &env).unwrap_err();
            assert_eq!(
                err.kind,
                ErrorKind::NonTermination(ReduceError::DepthExceeded { max_depth: 64 })
            );

            let mut ty = nat();
            for i in 0..200 {
                ty = Term::pi(format!("x{}", i), nat(), ty);
            }
            let err = elaborate(&ty, None, &env).unwrap_err();
            assert!(matches!(err.kind, ErrorKind::NonTermination(_)), "{}", err);
        })
        .expect("spawn test thread");
    handle.join().expect("depth test panicked");
}
