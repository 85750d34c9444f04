use num_bigint::{BigInt, BigUint};
use std::fmt;
use std::sync::Arc;

/// Binder and variable names. Bound occurrences refer to the innermost
/// enclosing binder with the same name.
pub type Name = String;

/// Binder name used for non-dependent function types (`A -> B`).
pub const ANONYMOUS: &str = "_";

// =============================================================================
// Definitions
// =============================================================================

/// Classification of environment entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionKind {
    /// Ordinary definition with a body.
    Definition,
    /// Proof of a proposition. Opaque to default reduction.
    Theorem,
    /// Assumed without a body.
    Axiom,
    /// Built-in constant whose computation rule lives in the reducer.
    Primitive,
}

/// Transparency levels for reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Transparency {
    None,      // Nothing unfolds
    Reducible, // Ordinary definitions
    All,       // Definitions and theorems
}

/// A global definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub name: Name,
    pub ty: Arc<Term>,
    pub value: Option<Arc<Term>>, // None for axioms and primitives
    pub kind: DefinitionKind,
    /// Minimum transparency at which the body unfolds.
    pub transparency: Transparency,
}

impl Definition {
    /// A definition with a body, or an axiom when `value` is `None`.
    pub fn new(name: impl Into<Name>, ty: Arc<Term>, value: Option<Arc<Term>>) -> Self {
        match value {
            Some(value) => Definition::definition(name, ty, value),
            None => Definition::axiom(name, ty),
        }
    }

    pub fn definition(name: impl Into<Name>, ty: Arc<Term>, value: Arc<Term>) -> Self {
        Definition {
            name: name.into(),
            ty,
            value: Some(value),
            kind: DefinitionKind::Definition,
            transparency: Transparency::Reducible,
        }
    }

    pub fn theorem(name: impl Into<Name>, ty: Arc<Term>, proof: Arc<Term>) -> Self {
        Definition {
            name: name.into(),
            ty,
            value: Some(proof),
            kind: DefinitionKind::Theorem,
            transparency: Transparency::All,
        }
    }

    pub fn axiom(name: impl Into<Name>, ty: Arc<Term>) -> Self {
        Definition {
            name: name.into(),
            ty,
            value: None,
            kind: DefinitionKind::Axiom,
            transparency: Transparency::None,
        }
    }

    pub fn primitive(name: impl Into<Name>, ty: Arc<Term>) -> Self {
        Definition {
            name: name.into(),
            ty,
            value: None,
            kind: DefinitionKind::Primitive,
            transparency: Transparency::None,
        }
    }

    pub fn is_axiom(&self) -> bool {
        self.kind == DefinitionKind::Axiom
    }

    pub fn is_primitive(&self) -> bool {
        self.kind == DefinitionKind::Primitive
    }

    /// The body, if it may be unfolded at the given transparency.
    pub fn unfold(&self, transparency: Transparency) -> Option<&Arc<Term>> {
        match self.kind {
            DefinitionKind::Axiom | DefinitionKind::Primitive => None,
            DefinitionKind::Definition | DefinitionKind::Theorem => {
                if transparency != Transparency::None && transparency >= self.transparency {
                    self.value.as_ref()
                } else {
                    None
                }
            }
        }
    }
}

// =============================================================================
// Universe Levels
// =============================================================================

/// Universe level. `Sort 0` is the impredicative universe of propositions,
/// `Sort 1` the universe of ordinary data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Level(pub u32);

impl Level {
    pub const PROP: Level = Level(0);
    pub const TYPE: Level = Level(1);

    /// The next universe up, or `None` past the largest representable level.
    pub fn succ(self) -> Option<Level> {
        self.0.checked_add(1).map(Level)
    }

    /// Level of a Pi type with a domain at `self` and a codomain at `codomain`.
    /// A Pi into `Prop` is itself a proposition.
    pub fn imax(self, codomain: Level) -> Level {
        if codomain.is_prop() {
            Level::PROP
        } else {
            std::cmp::max(self, codomain)
        }
    }

    pub fn is_prop(self) -> bool {
        self == Level::PROP
    }
}

// =============================================================================
// Terms
// =============================================================================

/// Metavariable identifier, allocated by the elaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetaId(pub usize);

impl fmt::Display for MetaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?m{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    Nat(BigUint),
    Int(BigInt),
    Str(String),
}

/// The core terms of the calculus, using named binders.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// Variable bound by an enclosing binder or the local context
    Var(Name),
    /// Natural number, integer or string literal
    Lit(Literal),
    /// Universe
    Sort(Level),
    /// Constant (global definition)
    Const(Name),
    /// Application: (f a)
    App(Arc<Term>, Arc<Term>),
    /// Lambda abstraction: fun (x : A) => b. The domain may be a `Hole`.
    Lam(Name, Arc<Term>, Arc<Term>),
    /// Pi type: (x : A) -> B
    Pi(Name, Arc<Term>, Arc<Term>),
    /// Let binding: let x : A := v in b
    Let(Name, Arc<Term>, Arc<Term>, Arc<Term>),
    /// Fixpoint: fix (f : T) => body
    Fix(Name, Arc<Term>, Arc<Term>),
    /// Type ascription: (t : T)
    Ann(Arc<Term>, Arc<Term>),
    /// Placeholder written by the user
    Hole,
    /// Metavariable to be solved by unification
    Meta(MetaId),
}

impl Term {
    pub fn var(name: impl Into<Name>) -> Arc<Self> {
        Arc::new(Term::Var(name.into()))
    }

    pub fn constant(name: impl Into<Name>) -> Arc<Self> {
        Arc::new(Term::Const(name.into()))
    }

    pub fn sort(level: Level) -> Arc<Self> {
        Arc::new(Term::Sort(level))
    }

    pub fn prop() -> Arc<Self> {
        Term::sort(Level::PROP)
    }

    pub fn type0() -> Arc<Self> {
        Term::sort(Level::TYPE)
    }

    pub fn nat(n: u64) -> Arc<Self> {
        Arc::new(Term::Lit(Literal::Nat(BigUint::from(n))))
    }

    pub fn nat_big(n: BigUint) -> Arc<Self> {
        Arc::new(Term::Lit(Literal::Nat(n)))
    }

    pub fn int(i: BigInt) -> Arc<Self> {
        Arc::new(Term::Lit(Literal::Int(i)))
    }

    pub fn string(s: impl Into<String>) -> Arc<Self> {
        Arc::new(Term::Lit(Literal::Str(s.into())))
    }

    pub fn app(f: Arc<Term>, a: Arc<Term>) -> Arc<Self> {
        Arc::new(Term::App(f, a))
    }

    /// Left-nested application of `head` to every argument in order.
    pub fn apps(head: Arc<Term>, args: impl IntoIterator<Item = Arc<Term>>) -> Arc<Self> {
        args.into_iter().fold(head, Term::app)
    }

    pub fn lam(name: impl Into<Name>, domain: Arc<Term>, body: Arc<Term>) -> Arc<Self> {
        Arc::new(Term::Lam(name.into(), domain, body))
    }

    pub fn pi(name: impl Into<Name>, domain: Arc<Term>, codomain: Arc<Term>) -> Arc<Self> {
        Arc::new(Term::Pi(name.into(), domain, codomain))
    }

    /// Non-dependent function type.
    pub fn arrow(domain: Arc<Term>, codomain: Arc<Term>) -> Arc<Self> {
        Term::pi(ANONYMOUS, domain, codomain)
    }

    pub fn let_in(
        name: impl Into<Name>,
        ty: Arc<Term>,
        value: Arc<Term>,
        body: Arc<Term>,
    ) -> Arc<Self> {
        Arc::new(Term::Let(name.into(), ty, value, body))
    }

    pub fn fix(name: impl Into<Name>, ty: Arc<Term>, body: Arc<Term>) -> Arc<Self> {
        Arc::new(Term::Fix(name.into(), ty, body))
    }

    pub fn ann(term: Arc<Term>, ty: Arc<Term>) -> Arc<Self> {
        Arc::new(Term::Ann(term, ty))
    }

    pub fn hole() -> Arc<Self> {
        Arc::new(Term::Hole)
    }

    pub fn meta(id: MetaId) -> Arc<Self> {
        Arc::new(Term::Meta(id))
    }

    /// Name of the head constant, looking through applications.
    pub fn head_constant(&self) -> Option<&str> {
        let mut current = self;
        loop {
            match current {
                Term::App(f, _) => current = f,
                Term::Const(name) => return Some(name),
                _ => return None,
            }
        }
    }

    pub fn is_atomic(&self) -> bool {
        matches!(
            self,
            Term::Var(_) | Term::Lit(_) | Term::Sort(_) | Term::Const(_) | Term::Hole | Term::Meta(_)
        )
    }
}

/// Split an application spine into its head and arguments (outermost last).
pub fn unfold_apps(term: &Arc<Term>) -> (Arc<Term>, Vec<Arc<Term>>) {
    let mut args = Vec::new();
    let mut current = term.clone();
    while let Term::App(f, a) = &*current {
        args.push(a.clone());
        let next = f.clone();
        current = next;
    }
    args.reverse();
    (current, args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imax_collapses_into_prop() {
        assert_eq!(Level::TYPE.imax(Level::PROP), Level::PROP);
        assert_eq!(Level::PROP.imax(Level::TYPE), Level::TYPE);
        assert_eq!(Level(3).imax(Level(2)), Level(3));
    }

    #[test]
    fn the_largest_level_has_no_successor() {
        assert_eq!(Level::TYPE.succ(), Some(Level(2)));
        assert_eq!(Level(u32::MAX).succ(), None);
    }

    #[test]
    fn unfold_apps_preserves_argument_order() {
        let t = Term::apps(Term::constant("f"), vec![Term::nat(1), Term::nat(2), Term::nat(3)]);
        let (head, args) = unfold_apps(&t);
        assert_eq!(head, Term::constant("f"));
        assert_eq!(args, vec![Term::nat(1), Term::nat(2), Term::nat(3)]);
        assert_eq!(t.head_constant(), Some("f"));
    }

    #[test]
    fn theorems_only_unfold_at_full_transparency() {
        let thm = Definition::theorem("t", Term::prop(), Term::prop());
        assert!(thm.unfold(Transparency::Reducible).is_none());
        assert!(thm.unfold(Transparency::All).is_some());

        let def = Definition::new("d", Term::type0(), Some(Term::nat(0)));
        assert!(def.unfold(Transparency::Reducible).is_some());
        assert!(def.unfold(Transparency::None).is_none());
        assert!(Definition::new("a", Term::type0(), None).is_axiom());
    }
}
