//! Local typing contexts.
//!
//! A context is a persistent stack of bindings. Pushing returns a child and
//! leaves the parent untouched, so a scope ends when its child is dropped on
//! any exit path.

use crate::ast::{Name, Term};
use crate::subst::{fresh_name, occurs_free, substitute};
use std::sync::Arc;

/// A local binding `name : ty`, or `name : ty := value` for let-bound locals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub name: Name,
    pub ty: Arc<Term>,
    pub value: Option<Arc<Term>>,
}

#[derive(Debug)]
struct Frame {
    binding: Binding,
    parent: Option<Arc<Frame>>,
}

#[derive(Debug, Clone, Default)]
pub struct Context {
    top: Option<Arc<Frame>>,
    len: usize,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, name: impl Into<Name>, ty: Arc<Term>) -> Context {
        self.push_binding(Binding {
            name: name.into(),
            ty,
            value: None,
        })
    }

    pub fn push_def(&self, name: impl Into<Name>, ty: Arc<Term>, value: Arc<Term>) -> Context {
        self.push_binding(Binding {
            name: name.into(),
            ty,
            value: Some(value),
        })
    }

    fn push_binding(&self, binding: Binding) -> Context {
        Context {
            top: Some(Arc::new(Frame {
                binding,
                parent: self.top.clone(),
            })),
            len: self.len + 1,
        }
    }

    /// The enclosing context, or `None` at the outermost scope.
    pub fn pop(&self) -> Option<Context> {
        self.top.as_ref().map(|frame| Context {
            top: frame.parent.clone(),
            len: self.len - 1,
        })
    }

    /// Innermost binding named `name`.
    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.iter().find(|binding| binding.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bindings from innermost to outermost.
    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        let mut frame = self.top.as_deref();
        std::iter::from_fn(move || {
            let current = frame?;
            frame = current.parent.as_deref();
            Some(&current.binding)
        })
    }

    /// Bindings from outermost to innermost.
    pub fn bindings(&self) -> Vec<&Binding> {
        let mut out: Vec<&Binding> = self.iter().collect();
        out.reverse();
        out
    }

    /// Names and types, outermost first, for error reports.
    pub fn snapshot(&self) -> Vec<(Name, Arc<Term>)> {
        self.bindings()
            .into_iter()
            .map(|b| (b.name.clone(), b.ty.clone()))
            .collect()
    }

    /// Prepare to go under a binder: keep `name` if it is not bound here,
    /// otherwise rename it (and its occurrences in `body`) to a fresh name so
    /// that the names in a context stay distinct.
    pub fn open_binder(&self, name: &Name, body: &Arc<Term>) -> (Name, Arc<Term>) {
        if !self.contains(name) {
            return (name.clone(), body.clone());
        }
        let fresh = fresh_name(name, |candidate| {
            self.contains(candidate) || occurs_free(candidate, body)
        });
        let renamed = substitute(body, name, &Term::var(fresh.clone()));
        (fresh, renamed)
    }
}

impl Drop for Context {
    // Unlink long chains iteratively so deep contexts cannot overflow the stack.
    fn drop(&mut self) {
        let mut next = self.top.take();
        while let Some(frame) = next {
            match Arc::try_unwrap(frame) {
                Ok(mut frame) => next = frame.parent.take(),
                Err(_) => break,
            }
        }
    }
}
