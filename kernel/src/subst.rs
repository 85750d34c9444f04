//! Free variables, alpha-equivalence and capture-avoiding substitution.
//!
//! Substitution is simultaneous: every binding of a [`Substitution`] is applied
//! to the original term in one pass. Binders that would capture a free variable
//! of a replacement are renamed by priming (`x`, `x'`, `x''`, ...).

use crate::ast::{unfold_apps, MetaId, Name, Term};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// =============================================================================
// Queries
// =============================================================================

pub fn free_vars(term: &Term) -> BTreeSet<Name> {
    let mut out = BTreeSet::new();
    collect_free_vars(term, &mut Vec::new(), &mut out);
    out
}

fn collect_free_vars(term: &Term, bound: &mut Vec<Name>, out: &mut BTreeSet<Name>) {
    match term {
        Term::Var(name) => {
            if !bound.iter().any(|b| b == name) {
                out.insert(name.clone());
            }
        }
        Term::Lit(_) | Term::Sort(_) | Term::Const(_) | Term::Hole | Term::Meta(_) => {}
        Term::App(f, a) | Term::Ann(f, a) => {
            collect_free_vars(f, bound, out);
            collect_free_vars(a, bound, out);
        }
        Term::Lam(name, domain, body) | Term::Pi(name, domain, body) | Term::Fix(name, domain, body) => {
            collect_free_vars(domain, bound, out);
            bound.push(name.clone());
            collect_free_vars(body, bound, out);
            bound.pop();
        }
        Term::Let(name, ty, value, body) => {
            collect_free_vars(ty, bound, out);
            collect_free_vars(value, bound, out);
            bound.push(name.clone());
            collect_free_vars(body, bound, out);
            bound.pop();
        }
    }
}

/// Whether `name` occurs free in `term`.
pub fn occurs_free(name: &str, term: &Term) -> bool {
    match term {
        Term::Var(x) => x == name,
        Term::Lit(_) | Term::Sort(_) | Term::Const(_) | Term::Hole | Term::Meta(_) => false,
        Term::App(f, a) | Term::Ann(f, a) => occurs_free(name, f) || occurs_free(name, a),
        Term::Lam(x, domain, body) | Term::Pi(x, domain, body) | Term::Fix(x, domain, body) => {
            occurs_free(name, domain) || (x != name && occurs_free(name, body))
        }
        Term::Let(x, ty, value, body) => {
            occurs_free(name, ty)
                || occurs_free(name, value)
                || (x != name && occurs_free(name, body))
        }
    }
}

/// Whether the metavariable `meta` occurs anywhere in `term`.
pub fn occurs_meta(meta: MetaId, term: &Term) -> bool {
    any_subterm(term, &|t| matches!(t, Term::Meta(m) if *m == meta))
}

/// Whether `term` still contains holes or metavariables.
pub fn has_metas(term: &Term) -> bool {
    any_subterm(term, &|t| matches!(t, Term::Meta(_) | Term::Hole))
}

/// Closed: no free variables and nothing left to elaborate.
pub fn is_closed(term: &Term) -> bool {
    free_vars(term).is_empty() && !has_metas(term)
}

fn any_subterm(term: &Term, pred: &dyn Fn(&Term) -> bool) -> bool {
    if pred(term) {
        return true;
    }
    match term {
        Term::Var(_) | Term::Lit(_) | Term::Sort(_) | Term::Const(_) | Term::Hole | Term::Meta(_) => {
            false
        }
        Term::App(f, a) | Term::Ann(f, a) => any_subterm(f, pred) || any_subterm(a, pred),
        Term::Lam(_, a, b) | Term::Pi(_, a, b) | Term::Fix(_, a, b) => {
            any_subterm(a, pred) || any_subterm(b, pred)
        }
        Term::Let(_, t, v, b) => any_subterm(t, pred) || any_subterm(v, pred) || any_subterm(b, pred),
    }
}

/// Every constant mentioned by `term`.
pub fn referenced_constants(term: &Term) -> BTreeSet<Name> {
    let mut out = BTreeSet::new();
    collect_constants(term, &mut out);
    out
}

fn collect_constants(term: &Term, out: &mut BTreeSet<Name>) {
    match term {
        Term::Const(name) => {
            out.insert(name.clone());
        }
        Term::Var(_) | Term::Lit(_) | Term::Sort(_) | Term::Hole | Term::Meta(_) => {}
        Term::App(f, a) | Term::Ann(f, a) => {
            collect_constants(f, out);
            collect_constants(a, out);
        }
        Term::Lam(_, a, b) | Term::Pi(_, a, b) | Term::Fix(_, a, b) => {
            collect_constants(a, out);
            collect_constants(b, out);
        }
        Term::Let(_, t, v, b) => {
            collect_constants(t, out);
            collect_constants(v, out);
            collect_constants(b, out);
        }
    }
}

/// Whether `term` nests more than `limit` constructors deep. Iterative, so it
/// is safe to call on terms too deep for the recursive traversals.
pub fn deeper_than(term: &Term, limit: usize) -> bool {
    let mut stack = vec![(term, 1usize)];
    while let Some((term, depth)) = stack.pop() {
        if depth > limit {
            return true;
        }
        match term {
            Term::Var(_) | Term::Lit(_) | Term::Sort(_) | Term::Const(_) | Term::Hole | Term::Meta(_) => {}
            Term::App(f, a) | Term::Ann(f, a) => {
                stack.push((f, depth + 1));
                stack.push((a, depth + 1));
            }
            Term::Lam(_, a, b) | Term::Pi(_, a, b) | Term::Fix(_, a, b) => {
                stack.push((a, depth + 1));
                stack.push((b, depth + 1));
            }
            Term::Let(_, t, v, b) => {
                stack.push((t, depth + 1));
                stack.push((v, depth + 1));
                stack.push((b, depth + 1));
            }
        }
    }
    false
}

/// `term` cut off after `depth` levels; everything below becomes `_`.
pub fn elide(term: &Arc<Term>, depth: usize) -> Arc<Term> {
    if term.is_atomic() {
        return term.clone();
    }
    let Some(depth) = depth.checked_sub(1) else {
        return Term::hole();
    };
    let cut = |t: &Arc<Term>| elide(t, depth);
    Arc::new(match &**term {
        Term::App(f, a) => Term::App(cut(f), cut(a)),
        Term::Ann(e, t) => Term::Ann(cut(e), cut(t)),
        Term::Lam(x, a, b) => Term::Lam(x.clone(), cut(a), cut(b)),
        Term::Pi(x, a, b) => Term::Pi(x.clone(), cut(a), cut(b)),
        Term::Fix(x, a, b) => Term::Fix(x.clone(), cut(a), cut(b)),
        Term::Let(x, t, v, b) => Term::Let(x.clone(), cut(t), cut(v), cut(b)),
        _ => return term.clone(),
    })
}

/// First primed variant of `base` rejected by `taken`.
pub fn fresh_name(base: &str, taken: impl Fn(&str) -> bool) -> Name {
    let mut candidate = format!("{}'", base);
    while taken(&candidate) {
        candidate.push('\'');
    }
    candidate
}

// =============================================================================
// Alpha-equivalence
// =============================================================================

/// Syntactic equality up to the names of bound variables.
pub fn alpha_eq(a: &Term, b: &Term) -> bool {
    alpha_eq_in(a, b, &mut Vec::new())
}

/// Cheap pre-check used before any reduction.
pub fn structurally_equal(a: &Arc<Term>, b: &Arc<Term>) -> bool {
    Arc::ptr_eq(a, b) || alpha_eq(a, b)
}

fn alpha_eq_in(a: &Term, b: &Term, bound: &mut Vec<(Name, Name)>) -> bool {
    match (a, b) {
        (Term::Var(x), Term::Var(y)) => {
            for (left, right) in bound.iter().rev() {
                if left == x || right == y {
                    return left == x && right == y;
                }
            }
            x == y
        }
        (Term::Lit(x), Term::Lit(y)) => x == y,
        (Term::Sort(x), Term::Sort(y)) => x == y,
        (Term::Const(x), Term::Const(y)) => x == y,
        (Term::Meta(x), Term::Meta(y)) => x == y,
        (Term::Hole, Term::Hole) => true,
        (Term::App(f1, a1), Term::App(f2, a2)) | (Term::Ann(f1, a1), Term::Ann(f2, a2)) => {
            alpha_eq_in(f1, f2, bound) && alpha_eq_in(a1, a2, bound)
        }
        (Term::Lam(x, d1, b1), Term::Lam(y, d2, b2))
        | (Term::Pi(x, d1, b1), Term::Pi(y, d2, b2))
        | (Term::Fix(x, d1, b1), Term::Fix(y, d2, b2)) => {
            if !alpha_eq_in(d1, d2, bound) {
                return false;
            }
            bound.push((x.clone(), y.clone()));
            let result = alpha_eq_in(b1, b2, bound);
            bound.pop();
            result
        }
        (Term::Let(x, t1, v1, b1), Term::Let(y, t2, v2, b2)) => {
            if !alpha_eq_in(t1, t2, bound) || !alpha_eq_in(v1, v2, bound) {
                return false;
            }
            bound.push((x.clone(), y.clone()));
            let result = alpha_eq_in(b1, b2, bound);
            bound.pop();
            result
        }
        _ => false,
    }
}

// =============================================================================
// Substitution
// =============================================================================

/// Replace free occurrences of `var` in `term` by `replacement`, renaming
/// binders of `term` that would capture free variables of `replacement`.
pub fn substitute(term: &Arc<Term>, var: &str, replacement: &Arc<Term>) -> Arc<Term> {
    let scope = VarScope::new(BTreeMap::from([(var.to_string(), replacement.clone())]));
    subst_vars(term, &scope).unwrap_or_else(|| term.clone())
}

/// Finite map from variables and metavariables to terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitution {
    vars: BTreeMap<Name, Arc<Term>>,
    metas: BTreeMap<MetaId, Arc<Term>>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(var: impl Into<Name>, replacement: Arc<Term>) -> Self {
        let mut subst = Self::new();
        subst.bind_var(var, replacement);
        subst
    }

    pub fn bind_var(&mut self, var: impl Into<Name>, replacement: Arc<Term>) {
        self.vars.insert(var.into(), replacement);
    }

    /// Meta solutions are closed terms; a meta applied to arguments is
    /// instantiated by beta-reducing the solution against them.
    pub fn bind_meta(&mut self, meta: MetaId, solution: Arc<Term>) {
        self.metas.insert(meta, solution);
    }

    pub fn var(&self, var: &str) -> Option<&Arc<Term>> {
        self.vars.get(var)
    }

    pub fn meta(&self, meta: MetaId) -> Option<&Arc<Term>> {
        self.metas.get(&meta)
    }

    pub fn metas(&self) -> impl Iterator<Item = (MetaId, &Arc<Term>)> {
        self.metas.iter().map(|(id, t)| (*id, t))
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty() && self.metas.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vars.len() + self.metas.len()
    }

    pub fn apply(&self, term: &Arc<Term>) -> Arc<Term> {
        let term = if self.metas.is_empty() {
            term.clone()
        } else {
            instantiate_metas(term, &|m| self.metas.get(&m).cloned()).unwrap_or_else(|| term.clone())
        };
        if self.vars.is_empty() {
            return term;
        }
        let scope = VarScope::new(self.vars.clone());
        subst_vars(&term, &scope).unwrap_or(term)
    }

    /// The substitution that applies `self` and then `later`.
    pub fn compose(&self, later: &Substitution) -> Substitution {
        let mut out = Substitution::new();
        for (var, t) in &self.vars {
            out.vars.insert(var.clone(), later.apply(t));
        }
        for (meta, t) in &self.metas {
            out.metas.insert(*meta, later.apply(t));
        }
        for (var, t) in &later.vars {
            out.vars.entry(var.clone()).or_insert_with(|| t.clone());
        }
        for (meta, t) in &later.metas {
            out.metas.entry(*meta).or_insert_with(|| t.clone());
        }
        out
    }
}

struct VarScope {
    map: BTreeMap<Name, Arc<Term>>,
    /// Free variables of the replacements.
    captured: BTreeSet<Name>,
}

impl VarScope {
    fn new(map: BTreeMap<Name, Arc<Term>>) -> Self {
        let mut captured = BTreeSet::new();
        for replacement in map.values() {
            captured.extend(free_vars(replacement));
        }
        VarScope { map, captured }
    }

    fn without(&self, name: &str) -> VarScope {
        let mut map = self.map.clone();
        map.remove(name);
        VarScope::new(map)
    }

    fn touches(&self, body: &Term) -> bool {
        self.map.keys().any(|k| occurs_free(k, body))
    }
}

/// `None` when nothing changed, so untouched subterms stay shared.
fn subst_vars(term: &Arc<Term>, scope: &VarScope) -> Option<Arc<Term>> {
    if scope.map.is_empty() {
        return None;
    }
    match &**term {
        Term::Var(name) => scope.map.get(name).cloned(),
        Term::Lit(_) | Term::Sort(_) | Term::Const(_) | Term::Hole | Term::Meta(_) => None,
        Term::App(f, a) => {
            let (f2, a2) = (subst_vars(f, scope), subst_vars(a, scope));
            if f2.is_none() && a2.is_none() {
                return None;
            }
            Some(Arc::new(Term::App(or_keep(f2, f), or_keep(a2, a))))
        }
        Term::Ann(e, t) => {
            let (e2, t2) = (subst_vars(e, scope), subst_vars(t, scope));
            if e2.is_none() && t2.is_none() {
                return None;
            }
            Some(Arc::new(Term::Ann(or_keep(e2, e), or_keep(t2, t))))
        }
        Term::Lam(x, domain, body) => {
            let domain2 = subst_vars(domain, scope);
            let body2 = subst_binder(x, body, scope);
            rebuild_binder(domain2, body2, x, domain, body, Term::Lam)
        }
        Term::Pi(x, domain, body) => {
            let domain2 = subst_vars(domain, scope);
            let body2 = subst_binder(x, body, scope);
            rebuild_binder(domain2, body2, x, domain, body, Term::Pi)
        }
        Term::Fix(x, ty, body) => {
            let ty2 = subst_vars(ty, scope);
            let body2 = subst_binder(x, body, scope);
            rebuild_binder(ty2, body2, x, ty, body, Term::Fix)
        }
        Term::Let(x, ty, value, body) => {
            let ty2 = subst_vars(ty, scope);
            let value2 = subst_vars(value, scope);
            let body2 = subst_binder(x, body, scope);
            if ty2.is_none() && value2.is_none() && body2.is_none() {
                return None;
            }
            let (x2, body2) = body2.unwrap_or_else(|| (x.clone(), body.clone()));
            Some(Arc::new(Term::Let(
                x2,
                or_keep(ty2, ty),
                or_keep(value2, value),
                body2,
            )))
        }
    }
}

fn or_keep(changed: Option<Arc<Term>>, original: &Arc<Term>) -> Arc<Term> {
    changed.unwrap_or_else(|| original.clone())
}

fn rebuild_binder(
    domain2: Option<Arc<Term>>,
    body2: Option<(Name, Arc<Term>)>,
    name: &Name,
    domain: &Arc<Term>,
    body: &Arc<Term>,
    build: fn(Name, Arc<Term>, Arc<Term>) -> Term,
) -> Option<Arc<Term>> {
    if domain2.is_none() && body2.is_none() {
        return None;
    }
    let (name2, body2) = body2.unwrap_or_else(|| (name.clone(), body.clone()));
    Some(Arc::new(build(name2, or_keep(domain2, domain), body2)))
}

/// Substitute under the binder `name`, renaming it if it would capture.
fn subst_binder(name: &Name, body: &Arc<Term>, scope: &VarScope) -> Option<(Name, Arc<Term>)> {
    // A shadowed key stops here, but the other replacements still enter the
    // body and may mention `name`.
    let shadowed;
    let scope = if scope.map.contains_key(name) {
        shadowed = scope.without(name);
        &shadowed
    } else {
        scope
    };
    if scope.captured.contains(name) && scope.touches(body) {
        let fresh = fresh_name(name, |c| {
            scope.captured.contains(c) || scope.map.contains_key(c) || occurs_free(c, body)
        });
        let mut map = scope.map.clone();
        map.insert(name.clone(), Term::var(fresh.clone()));
        let renamed = VarScope::new(map);
        let body2 = subst_vars(body, &renamed).unwrap_or_else(|| body.clone());
        return Some((fresh, body2));
    }
    subst_vars(body, scope).map(|b| (name.clone(), b))
}

// =============================================================================
// Metavariable instantiation
// =============================================================================

/// Replace solved metavariables, beta-reducing solutions applied to arguments.
/// Returns `None` when no solved metavariable occurs in `term`.
pub fn instantiate_metas(
    term: &Arc<Term>,
    solution: &dyn Fn(MetaId) -> Option<Arc<Term>>,
) -> Option<Arc<Term>> {
    match &**term {
        Term::Meta(m) => solution(*m).map(|s| instantiate_metas(&s, solution).unwrap_or(s)),
        Term::Var(_) | Term::Lit(_) | Term::Sort(_) | Term::Const(_) | Term::Hole => None,
        Term::App(f, a) => {
            let (head, args) = unfold_apps(term);
            if let Term::Meta(m) = &*head {
                if let Some(sol) = solution(*m) {
                    let sol = instantiate_metas(&sol, solution).unwrap_or(sol);
                    let args: Vec<Arc<Term>> = args
                        .iter()
                        .map(|arg| instantiate_metas(arg, solution).unwrap_or_else(|| arg.clone()))
                        .collect();
                    return Some(beta_apps(&sol, &args));
                }
            }
            let (f2, a2) = (instantiate_metas(f, solution), instantiate_metas(a, solution));
            if f2.is_none() && a2.is_none() {
                return None;
            }
            Some(Arc::new(Term::App(or_keep(f2, f), or_keep(a2, a))))
        }
        Term::Ann(e, t) => {
            let (e2, t2) = (instantiate_metas(e, solution), instantiate_metas(t, solution));
            if e2.is_none() && t2.is_none() {
                return None;
            }
            Some(Arc::new(Term::Ann(or_keep(e2, e), or_keep(t2, t))))
        }
        Term::Lam(x, a, b) | Term::Pi(x, a, b) | Term::Fix(x, a, b) => {
            let (a2, b2) = (instantiate_metas(a, solution), instantiate_metas(b, solution));
            if a2.is_none() && b2.is_none() {
                return None;
            }
            let (a2, b2) = (or_keep(a2, a), or_keep(b2, b));
            Some(Arc::new(match &**term {
                Term::Lam(..) => Term::Lam(x.clone(), a2, b2),
                Term::Pi(..) => Term::Pi(x.clone(), a2, b2),
                _ => Term::Fix(x.clone(), a2, b2),
            }))
        }
        Term::Let(x, t, v, b) => {
            let t2 = instantiate_metas(t, solution);
            let v2 = instantiate_metas(v, solution);
            let b2 = instantiate_metas(b, solution);
            if t2.is_none() && v2.is_none() && b2.is_none() {
                return None;
            }
            Some(Arc::new(Term::Let(
                x.clone(),
                or_keep(t2, t),
                or_keep(v2, v),
                or_keep(b2, b),
            )))
        }
    }
}

/// Apply `head` to `args`, contracting the beta-redexes this creates.
pub fn beta_apps(head: &Arc<Term>, args: &[Arc<Term>]) -> Arc<Term> {
    let mut current = head.clone();
    let mut rest = args;
    loop {
        let next = match (&*current, rest.split_first()) {
            (Term::Lam(x, _, body), Some((first, tail))) => {
                rest = tail;
                substitute(body, x, first)
            }
            _ => break,
        };
        current = next;
    }
    Term::apps(current, rest.iter().cloned())
}
