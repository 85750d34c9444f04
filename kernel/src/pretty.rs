//! Surface-like rendering of core terms, used in error messages and by the REPL.

use crate::ast::{Level, Literal, Term, ANONYMOUS};
use crate::subst::occurs_free;
use num_bigint::Sign;
use std::fmt;

/// Binding strength of the position a term is printed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    /// Binder bodies, top level
    Open,
    /// Domain of an arrow
    Arrow,
    /// Function position of an application
    Head,
    /// Argument position
    Atom,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => write!(f, "Prop"),
            1 => write!(f, "Type"),
            n => write!(f, "Sort {}", n),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Nat(n) => write!(f, "{}", n),
            Literal::Int(i) if i.sign() == Sign::Minus => write!(f, "{}", i),
            Literal::Int(i) => write!(f, "+{}", i),
            Literal::Str(s) => write!(f, "{:?}", s),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_term(f, self, Prec::Open)
    }
}

fn write_term(f: &mut fmt::Formatter<'_>, term: &Term, prec: Prec) -> fmt::Result {
    match term {
        Term::Var(name) | Term::Const(name) => write!(f, "{}", name),
        Term::Lit(lit) => write!(f, "{}", lit),
        Term::Sort(level) if level.0 >= 2 => parens(f, prec >= Prec::Atom, |f| {
            write!(f, "{}", level)
        }),
        Term::Sort(level) => write!(f, "{}", level),
        Term::Hole => write!(f, "_"),
        Term::Meta(id) => write!(f, "{}", id),
        Term::App(fun, arg) => parens(f, prec >= Prec::Atom, |f| {
            write_term(f, fun, Prec::Head)?;
            write!(f, " ")?;
            write_term(f, arg, Prec::Atom)
        }),
        Term::Ann(inner, ty) => {
            write!(f, "(")?;
            write_term(f, inner, Prec::Open)?;
            write!(f, " : ")?;
            write_term(f, ty, Prec::Open)?;
            write!(f, ")")
        }
        Term::Lam(name, domain, body) => parens(f, prec > Prec::Open, |f| {
            if matches!(**domain, Term::Hole) {
                write!(f, "fun {} => ", name)?;
            } else {
                write!(f, "fun ({} : ", name)?;
                write_term(f, domain, Prec::Open)?;
                write!(f, ") => ")?;
            }
            write_term(f, body, Prec::Open)
        }),
        Term::Pi(name, domain, codomain) => parens(f, prec > Prec::Open, |f| {
            if name == ANONYMOUS || !occurs_free(name, codomain) {
                write_term(f, domain, Prec::Arrow)?;
            } else {
                write!(f, "({} : ", name)?;
                write_term(f, domain, Prec::Open)?;
                write!(f, ")")?;
            }
            write!(f, " -> ")?;
            write_term(f, codomain, Prec::Open)
        }),
        Term::Let(name, ty, value, body) => parens(f, prec > Prec::Open, |f| {
            write!(f, "let {} : ", name)?;
            write_term(f, ty, Prec::Open)?;
            write!(f, " := ")?;
            write_term(f, value, Prec::Open)?;
            write!(f, " in ")?;
            write_term(f, body, Prec::Open)
        }),
        Term::Fix(name, ty, body) => parens(f, prec > Prec::Open, |f| {
            write!(f, "fix ({} : ", name)?;
            write_term(f, ty, Prec::Open)?;
            write!(f, ") => ")?;
            write_term(f, body, Prec::Open)
        }),
    }
}

fn parens(
    f: &mut fmt::Formatter<'_>,
    wrap: bool,
    inner: impl FnOnce(&mut fmt::Formatter<'_>) -> fmt::Result,
) -> fmt::Result {
    if wrap {
        write!(f, "(")?;
        inner(f)?;
        write!(f, ")")
    } else {
        inner(f)
    }
}
