//! Built-in types, operations and recursors over literals.

use crate::ast::{Definition, Literal, Term};
use crate::context::Context;
use crate::reduce::{ReduceError, Reducer};
use num_bigint::{BigInt, BigUint};
use num_traits::{One, ToPrimitive, Zero};
use std::sync::Arc;

pub const NAT: &str = "Nat";
pub const STRING: &str = "String";
pub const NAT_SUCC: &str = "Nat.succ";
pub const NAT_ADD: &str = "Nat.add";
pub const NAT_SUB: &str = "Nat.sub";
pub const NAT_MUL: &str = "Nat.mul";
pub const NAT_DIV: &str = "Nat.div";
pub const NAT_MOD: &str = "Nat.mod";
pub const NAT_REC: &str = "Nat.rec";
pub const NAT_IND: &str = "Nat.ind";
pub const STRING_APPEND: &str = "String.append";
pub const STRING_LENGTH: &str = "String.length";
pub const INT: &str = "Int";
pub const INT_OF_NAT: &str = "Int.ofNat";
pub const INT_NEG: &str = "Int.neg";
pub const INT_ADD: &str = "Int.add";
pub const INT_SUB: &str = "Int.sub";
pub const INT_MUL: &str = "Int.mul";
pub const INT_DIV: &str = "Int.div";
pub const INT_MOD: &str = "Int.mod";

const NAT_BINARY: [&str; 5] = [NAT_ADD, NAT_SUB, NAT_MUL, NAT_DIV, NAT_MOD];
const INT_BINARY: [&str; 5] = [INT_ADD, INT_SUB, INT_MUL, INT_DIV, INT_MOD];

pub fn is_primitive_name(name: &str) -> bool {
    declarations().iter().any(|def| def.name == name)
}

fn nat() -> Arc<Term> {
    Term::constant(NAT)
}

fn string() -> Arc<Term> {
    Term::constant(STRING)
}

fn int() -> Arc<Term> {
    Term::constant(INT)
}

/// `(C : Nat -> motive) -> C 0 -> ((n : Nat) -> C n -> C (Nat.succ n)) -> (n : Nat) -> C n`
fn recursor_type(motive: Arc<Term>) -> Arc<Term> {
    let c = || Term::var("C");
    let step = Term::pi(
        "n",
        nat(),
        Term::arrow(
            Term::app(c(), Term::var("n")),
            Term::app(c(), Term::app(Term::constant(NAT_SUCC), Term::var("n"))),
        ),
    );
    Term::pi(
        "C",
        Term::arrow(nat(), motive),
        Term::arrow(
            Term::app(c(), Term::nat(0)),
            Term::arrow(step, Term::pi("n", nat(), Term::app(c(), Term::var("n")))),
        ),
    )
}

pub(crate) fn declarations() -> Vec<Definition> {
    let binary_nat = || Term::arrow(nat(), Term::arrow(nat(), nat()));
    let binary_int = || Term::arrow(int(), Term::arrow(int(), int()));
    let mut defs = vec![
        Definition::primitive(NAT, Term::type0()),
        Definition::primitive(STRING, Term::type0()),
        Definition::primitive(INT, Term::type0()),
        Definition::primitive(NAT_SUCC, Term::arrow(nat(), nat())),
    ];
    defs.extend(
        NAT_BINARY
            .iter()
            .map(|name| Definition::primitive(*name, binary_nat())),
    );
    defs.push(Definition::primitive(INT_OF_NAT, Term::arrow(nat(), int())));
    defs.push(Definition::primitive(INT_NEG, Term::arrow(int(), int())));
    defs.extend(
        INT_BINARY
            .iter()
            .map(|name| Definition::primitive(*name, binary_int())),
    );
    defs.push(Definition::primitive(
        STRING_APPEND,
        Term::arrow(string(), Term::arrow(string(), string())),
    ));
    defs.push(Definition::primitive(STRING_LENGTH, Term::arrow(string(), nat())));
    defs.push(Definition::primitive(NAT_REC, recursor_type(Term::type0())));
    defs.push(Definition::primitive(NAT_IND, recursor_type(Term::prop())));
    defs
}

/// Type of a literal.
pub fn literal_type(lit: &Literal) -> Arc<Term> {
    match lit {
        Literal::Nat(_) => nat(),
        Literal::Int(_) => int(),
        Literal::Str(_) => string(),
    }
}

/// Apply the computation rule of primitive `name` to `args`, if the
/// arguments it inspects reduce to literals. Extra arguments are kept.
pub(crate) fn reduce(
    reducer: &mut Reducer<'_>,
    ctx: &Context,
    name: &str,
    args: &[Arc<Term>],
) -> Result<Option<Arc<Term>>, ReduceError> {
    let reduced = match name {
        NAT_SUCC if !args.is_empty() => {
            let n = reducer.whnf(ctx, &args[0])?;
            as_nat(&n).map(|n| (Term::nat_big(n + 1u32), 1))
        }
        _ if NAT_BINARY.contains(&name) && args.len() >= 2 => {
            let lhs = reducer.whnf(ctx, &args[0])?;
            let rhs = reducer.whnf(ctx, &args[1])?;
            match (as_nat(&lhs), as_nat(&rhs)) {
                (Some(a), Some(b)) => Some((Term::nat_big(nat_binary(name, a, b)), 2)),
                _ => None,
            }
        }
        INT_OF_NAT if !args.is_empty() => {
            let n = reducer.whnf(ctx, &args[0])?;
            as_nat(&n).map(|n| (Term::int(BigInt::from(n)), 1))
        }
        INT_NEG if !args.is_empty() => {
            let i = reducer.whnf(ctx, &args[0])?;
            as_int(&i).map(|i| (Term::int(-i), 1))
        }
        _ if INT_BINARY.contains(&name) && args.len() >= 2 => {
            let lhs = reducer.whnf(ctx, &args[0])?;
            let rhs = reducer.whnf(ctx, &args[1])?;
            match (as_int(&lhs), as_int(&rhs)) {
                (Some(a), Some(b)) => Some((Term::int(int_binary(name, a, b)), 2)),
                _ => None,
            }
        }
        STRING_APPEND if args.len() >= 2 => {
            let lhs = reducer.whnf(ctx, &args[0])?;
            let rhs = reducer.whnf(ctx, &args[1])?;
            match (as_str(&lhs), as_str(&rhs)) {
                (Some(a), Some(b)) => Some((Term::string(format!("{}{}", a, b)), 2)),
                _ => None,
            }
        }
        STRING_LENGTH if !args.is_empty() => {
            let s = reducer.whnf(ctx, &args[0])?;
            as_str(&s).map(|s| (Term::nat(s.chars().count() as u64), 1))
        }
        NAT_REC | NAT_IND if args.len() >= 4 => {
            let major = reducer.whnf(ctx, &args[3])?;
            recursor_step(name, &args[..3], &major).map(|t| (t, 4))
        }
        _ => None,
    };
    Ok(reduced.map(|(head, used)| Term::apps(head, args[used..].iter().cloned())))
}

fn nat_binary(name: &str, a: BigUint, b: BigUint) -> BigUint {
    match name {
        NAT_ADD => a + b,
        NAT_SUB => {
            if a > b {
                a - b
            } else {
                BigUint::zero()
            }
        }
        NAT_MUL => a * b,
        NAT_DIV if b.is_zero() => BigUint::zero(),
        NAT_DIV => a / b,
        NAT_MOD if b.is_zero() => BigUint::zero(),
        _ => a % b,
    }
}

/// Division truncates toward zero and the remainder takes the sign of the
/// dividend; dividing by zero yields zero.
fn int_binary(name: &str, a: BigInt, b: BigInt) -> BigInt {
    match name {
        INT_ADD => a + b,
        INT_SUB => a - b,
        INT_MUL => a * b,
        _ if b.is_zero() => BigInt::zero(),
        INT_DIV => a / b,
        _ => a % b,
    }
}

/// `rec C z s 0 ~> z`, `rec C z s (n+1) ~> s n (rec C z s n)`; the predecessor
/// is read off a literal or a `Nat.succ` application.
fn recursor_step(name: &str, params: &[Arc<Term>], major: &Arc<Term>) -> Option<Arc<Term>> {
    let (motive, zero, step) = (&params[0], &params[1], &params[2]);
    let pred = match &**major {
        Term::Lit(Literal::Nat(n)) if n.is_zero() => return Some(zero.clone()),
        Term::Lit(Literal::Nat(n)) => Term::nat_big(n - BigUint::one()),
        Term::App(f, k) if matches!(&**f, Term::Const(c) if c == NAT_SUCC) => k.clone(),
        _ => return None,
    };
    let recursive = Term::apps(
        Term::constant(name),
        vec![motive.clone(), zero.clone(), step.clone(), pred.clone()],
    );
    Some(Term::apps(step.clone(), vec![pred, recursive]))
}

fn as_nat(term: &Term) -> Option<BigUint> {
    match term {
        Term::Lit(Literal::Nat(n)) => Some(n.clone()),
        _ => None,
    }
}

fn as_int(term: &Term) -> Option<BigInt> {
    match term {
        Term::Lit(Literal::Int(i)) => Some(i.clone()),
        _ => None,
    }
}

fn as_str(term: &Term) -> Option<&str> {
    match term {
        Term::Lit(Literal::Str(s)) => Some(s),
        _ => None,
    }
}

/// Small literal for display and tests.
pub fn nat_value(term: &Term) -> Option<u64> {
    as_nat(term).and_then(|n| n.to_u64())
}
