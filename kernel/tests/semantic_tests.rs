//! Kernel semantic tests: substitution, reduction and elaboration behaviour
//! that the rest of the toolchain relies on.

use kernel::ast::{Level, Term};
use kernel::context::Context;
use kernel::env::Environment;
use kernel::reduce::normalize;
use kernel::subst::{alpha_eq, free_vars, substitute};
use kernel::{declare, elaborate, normalize_for_display, Declaration};
use std::sync::Arc;

fn nat() -> Arc<Term> {
    Term::constant("Nat")
}

fn prop() -> Arc<Term> {
    Term::prop()
}

fn var(name: &str) -> Arc<Term> {
    Term::var(name)
}

fn app(head: Arc<Term>, args: Vec<Arc<Term>>) -> Arc<Term> {
    Term::apps(head, args)
}

fn add(a: Arc<Term>, b: Arc<Term>) -> Arc<Term> {
    app(Term::constant("Nat.add"), vec![a, b])
}

/// `Eq A a b := (P : A -> Prop) -> P a -> P b` and its reflexivity proof.
fn with_leibniz_eq(env: &mut Environment) {
    let eq_body = Term::lam(
        "A",
        Term::type0(),
        Term::lam(
            "a",
            var("A"),
            Term::lam(
                "b",
                var("A"),
                Term::pi(
                    "P",
                    Term::arrow(var("A"), prop()),
                    Term::arrow(
                        Term::app(var("P"), var("a")),
                        Term::app(var("P"), var("b")),
                    ),
                ),
            ),
        ),
    );
    let eq_ty = Term::pi(
        "A",
        Term::type0(),
        Term::arrow(var("A"), Term::arrow(var("A"), prop())),
    );
    declare("Eq", eq_ty, Some(eq_body), env).expect("Eq should check");

    let refl_ty = Term::pi(
        "A",
        Term::type0(),
        Term::pi("a", var("A"), eq(var("A"), var("a"), var("a"))),
    );
    let refl = Term::lam(
        "A",
        Term::type0(),
        Term::lam(
            "a",
            var("A"),
            Term::lam("P", Term::hole(), Term::lam("h", Term::hole(), var("h"))),
        ),
    );
    declare("refl", refl_ty, Some(refl), env).expect("refl should check");
}

fn eq(ty: Arc<Term>, a: Arc<Term>, b: Arc<Term>) -> Arc<Term> {
    app(Term::constant("Eq"), vec![ty, a, b])
}

fn refl(ty: Arc<Term>, a: Arc<Term>) -> Arc<Term> {
    app(Term::constant("refl"), vec![ty, a])
}

// =============================================================================
// SUBSTITUTION
// =============================================================================

#[test]
fn substitution_never_captures_free_variables() {
    // (fun (y : Nat) => x y)[x := y]
    let term = Term::lam("y", nat(), Term::app(var("x"), var("y")));
    let result = substitute(&term, "x", &var("y"));

    assert!(free_vars(&result).contains("y"), "y was captured: {}", result);
    let Term::Lam(binder, _, body) = &*result else {
        panic!("expected a lambda, got {}", result);
    };
    assert_ne!(binder, "y");
    assert_eq!(body, &Term::app(var("y"), var(binder)));
}

#[test]
fn substitution_stops_at_shadowing_binders() {
    // (fun (x : Nat) => x)[x := 5] is unchanged
    let term = Term::lam("x", nat(), var("x"));
    assert_eq!(substitute(&term, "x", &Term::nat(5)), term);
}

#[test]
fn substitution_renames_under_pi_and_let() {
    let pi = Term::pi("n", nat(), Term::app(var("m"), var("n")));
    let result = substitute(&pi, "m", &var("n"));
    assert!(free_vars(&result).contains("n"));

    let let_term = Term::let_in("z", nat(), var("w"), add(var("z"), var("w")));
    let result = substitute(&let_term, "w", &var("z"));
    assert_eq!(free_vars(&result).into_iter().collect::<Vec<_>>(), vec!["z"]);
}

// =============================================================================
// REDUCTION
// =============================================================================

#[test]
fn normalize_is_idempotent() {
    let env = Environment::with_prelude();
    let ctx = Context::new().push("k", nat());
    let terms = vec![
        add(Term::nat(2), Term::let_in("x", nat(), Term::nat(3), var("x"))),
        Term::app(
            Term::lam("f", Term::arrow(nat(), nat()), Term::app(var("f"), var("k"))),
            Term::lam("y", nat(), add(var("y"), Term::nat(1))),
        ),
        Term::lam(
            "z",
            nat(),
            Term::app(Term::lam("w", nat(), add(var("w"), var("z"))), Term::nat(0)),
        ),
    ];
    for term in terms {
        let once = normalize(&term, &ctx, &env).unwrap();
        let twice = normalize(&once, &ctx, &env).unwrap();
        assert!(alpha_eq(&once, &twice), "{} then {}", once, twice);
    }
}

#[test]
fn normalize_for_display_unfolds_theorems() {
    let mut env = Environment::with_prelude();
    env.add_definition(kernel::ast::Definition::theorem("five", nat(), Term::nat(5)))
        .unwrap();
    let ctx = Context::new();
    // Default reduction keeps theorems opaque.
    assert_eq!(
        normalize(&Term::constant("five"), &ctx, &env).unwrap(),
        Term::constant("five")
    );
    assert_eq!(
        normalize_for_display(&Term::constant("five"), &env).unwrap(),
        Term::nat(5)
    );
}

#[test]
fn recursor_computes_through_definitions() {
    let mut env = Environment::with_prelude();
    // double n := Nat.rec (fun _ => Nat) 0 (fun k acc => Nat.succ (Nat.succ acc)) n
    let step = Term::lam(
        "k",
        nat(),
        Term::lam(
            "acc",
            nat(),
            Term::app(
                Term::constant("Nat.succ"),
                Term::app(Term::constant("Nat.succ"), var("acc")),
            ),
        ),
    );
    let body = Term::lam(
        "n",
        nat(),
        app(
            Term::constant("Nat.rec"),
            vec![Term::lam("_", nat(), nat()), Term::nat(0), step, var("n")],
        ),
    );
    declare("double", Term::arrow(nat(), nat()), Some(body), &mut env).unwrap();
    let result = normalize_for_display(&Term::app(Term::constant("double"), Term::nat(21)), &env);
    assert_eq!(result.unwrap(), Term::nat(42));
}

// =============================================================================
// ELABORATION
// =============================================================================

#[test]
fn inferred_types_are_well_typed() {
    let mut env = Environment::with_prelude();
    with_leibniz_eq(&mut env);
    let terms = vec![
        Term::nat(3),
        Term::string("hi"),
        Term::type0(),
        Term::lam("A", Term::type0(), Term::lam("x", var("A"), var("x"))),
        Term::constant("refl"),
        refl(nat(), Term::nat(4)),
        Term::let_in("n", nat(), Term::nat(2), add(var("n"), var("n"))),
        Term::fix("f", Term::arrow(nat(), nat()), Term::lam("x", nat(), var("x"))),
    ];
    for term in terms {
        let (_, ty) = elaborate(&term, None, &env).unwrap_or_else(|e| panic!("{}: {}", term, e));
        elaborate(&ty, None, &env).unwrap_or_else(|e| panic!("type {} of {}: {}", ty, term, e));
    }
}

#[test]
fn dependent_application_substitutes_the_argument() {
    let mut env = Environment::with_prelude();
    env.define("Vec", Term::arrow(nat(), Term::type0()), None).unwrap();
    env.define(
        "replicate",
        Term::pi("x", nat(), Term::app(Term::constant("Vec"), var("x"))),
        None,
    )
    .unwrap();

    let call = Term::app(Term::constant("replicate"), Term::nat(3));
    let (_, ty) = elaborate(&call, None, &env).unwrap();
    assert_eq!(ty, Term::app(Term::constant("Vec"), Term::nat(3)));
}

#[test]
fn let_types_see_the_bound_value() {
    let mut env = Environment::with_prelude();
    env.define("Vec", Term::arrow(nat(), Term::type0()), None).unwrap();
    env.define("empty", Term::app(Term::constant("Vec"), Term::nat(0)), None)
        .unwrap();
    // let n := 0 in (empty : Vec n)
    let term = Term::let_in(
        "n",
        Term::hole(),
        Term::nat(0),
        Term::ann(
            Term::constant("empty"),
            Term::app(Term::constant("Vec"), var("n")),
        ),
    );
    let (_, ty) = elaborate(&term, None, &env).unwrap();
    assert_eq!(ty, Term::app(Term::constant("Vec"), Term::nat(0)));
}

#[test]
fn holes_are_solved_from_the_expected_type() {
    let env = Environment::with_prelude();
    let id = Term::lam("A", Term::type0(), Term::lam("x", var("A"), var("x")));
    let call = app(id, vec![Term::hole(), Term::string("s")]);
    let (term, ty) = elaborate(&call, None, &env).unwrap();
    assert_eq!(ty, Term::constant("String"));
    assert!(!kernel::subst::has_metas(&term), "{}", term);
}

#[test]
fn universes_are_stratified() {
    let env = Environment::with_prelude();
    let (_, ty) = elaborate(&Term::prop(), None, &env).unwrap();
    assert_eq!(ty, Term::type0());
    let (_, ty) = elaborate(&Term::type0(), None, &env).unwrap();
    assert_eq!(ty, Term::sort(Level(2)));
    // Quantifying over a proposition stays in Prop.
    let forall = Term::pi("A", prop(), Term::arrow(var("A"), var("A")));
    let (_, ty) = elaborate(&forall, None, &env).unwrap();
    assert_eq!(ty, prop());
}

// =============================================================================
// PROOFS
// =============================================================================

#[test]
fn two_plus_two_is_four() {
    let mut env = Environment::with_prelude();
    with_leibniz_eq(&mut env);
    let statement = eq(nat(), add(Term::nat(2), Term::nat(2)), Term::nat(4));
    let proof = refl(nat(), Term::nat(4));
    let decl = Declaration::theorem("two_plus_two", statement, proof);
    kernel::batch::declare_checked(&decl, &mut env).unwrap();
    assert!(env.get("two_plus_two").is_some());
}

#[test]
fn two_plus_two_is_not_five() {
    let mut env = Environment::with_prelude();
    with_leibniz_eq(&mut env);
    let statement = eq(nat(), add(Term::nat(2), Term::nat(2)), Term::nat(5));
    let result = elaborate(&refl(nat(), Term::nat(4)), Some(statement), &env);
    assert!(result.is_err());
}

#[test]
fn modus_ponens() {
    let env = Environment::with_prelude();
    let ty = Term::pi(
        "A",
        prop(),
        Term::pi(
            "B",
            prop(),
            Term::arrow(
                Term::arrow(var("A"), var("B")),
                Term::arrow(var("A"), var("B")),
            ),
        ),
    );
    let proof = Term::lam(
        "A",
        prop(),
        Term::lam(
            "B",
            prop(),
            Term::lam(
                "f",
                Term::hole(),
                Term::lam("a", Term::hole(), Term::app(var("f"), var("a"))),
            ),
        ),
    );
    let (_, checked) = elaborate(&proof, Some(ty.clone()), &env).unwrap();
    assert!(alpha_eq(&checked, &ty), "{}", checked);
}

#[test]
fn conjunction_commutes() {
    let mut env = Environment::with_prelude();
    // And A B := (C : Prop) -> (A -> B -> C) -> C
    let and_body = Term::lam(
        "A",
        prop(),
        Term::lam(
            "B",
            prop(),
            Term::pi(
                "C",
                prop(),
                Term::arrow(
                    Term::arrow(var("A"), Term::arrow(var("B"), var("C"))),
                    var("C"),
                ),
            ),
        ),
    );
    let and_ty = Term::arrow(prop(), Term::arrow(prop(), prop()));
    declare("And", and_ty, Some(and_body), &mut env).unwrap();
    let and = |a: &str, b: &str| app(Term::constant("And"), vec![var(a), var(b)]);

    let statement = Term::pi(
        "A",
        prop(),
        Term::pi("B", prop(), Term::arrow(and("A", "B"), and("B", "A"))),
    );
    // fun A B h C k => h C (fun a b => k b a)
    let swap = Term::lam(
        "a",
        Term::hole(),
        Term::lam("b", Term::hole(), app(var("k"), vec![var("b"), var("a")])),
    );
    let proof = Term::lam(
        "A",
        prop(),
        Term::lam(
            "B",
            prop(),
            Term::lam(
                "h",
                Term::hole(),
                Term::lam(
                    "C",
                    Term::hole(),
                    Term::lam("k", Term::hole(), app(var("h"), vec![var("C"), swap])),
                ),
            ),
        ),
    );
    let decl = Declaration::theorem("and_comm", statement, proof);
    kernel::batch::declare_checked(&decl, &mut env).unwrap();
}

#[test]
fn induction_proves_reflexivity_for_every_nat() {
    let mut env = Environment::with_prelude();
    with_leibniz_eq(&mut env);
    let statement = Term::pi("n", nat(), eq(nat(), var("n"), var("n")));
    let motive = Term::lam("n", nat(), eq(nat(), var("n"), var("n")));
    let step = Term::lam(
        "k",
        Term::hole(),
        Term::lam(
            "ih",
            Term::hole(),
            refl(nat(), Term::app(Term::constant("Nat.succ"), var("k"))),
        ),
    );
    let proof = app(
        Term::constant("Nat.ind"),
        vec![motive, refl(nat(), Term::nat(0)), step],
    );
    let decl = Declaration::theorem("eq_self", statement, proof);
    kernel::batch::declare_checked(&decl, &mut env).unwrap();
}
