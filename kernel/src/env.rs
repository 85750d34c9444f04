//! The global environment of definitions, axioms and primitives.

use crate::ast::{Definition, Name, Term};
use crate::config::KernelConfig;
use crate::primitives;
use crate::subst::{deeper_than, free_vars, has_metas};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("`{0}` is already defined")]
    DuplicateDefinition(Name),
    #[error("unknown definition `{0}`")]
    UnknownDefinition(Name),
    #[error("`{0}` is a built-in primitive and cannot be redefined")]
    ReservedName(Name),
    #[error("declaration of `{name}` is not closed: {detail}")]
    OpenTerm { name: Name, detail: String },
    #[error("declaration of `{name}` is nested deeper than {max_depth}")]
    TooDeep { name: Name, max_depth: usize },
}

/// Global definitions. Cloning is cheap: the table is shared copy-on-write,
/// so a clone is a snapshot that never observes later writes.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    entries: Arc<HashMap<Name, Arc<Definition>>>,
    order: Arc<Vec<Name>>,
    config: KernelConfig,
    allow_redefine: bool,
    generation: u64,
}

impl Environment {
    /// An environment without any primitives.
    pub fn new() -> Self {
        Self::default()
    }

    /// An environment with the built-in types and operations registered.
    pub fn with_prelude() -> Self {
        let mut env = Environment::new();
        for def in primitives::declarations() {
            env.insert(def);
        }
        env
    }

    pub fn config(&self) -> KernelConfig {
        self.config
    }

    pub fn set_config(&mut self, config: KernelConfig) {
        self.config = config;
    }

    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn allows_redefinition(&self) -> bool {
        self.allow_redefine
    }

    pub fn set_allow_redefine(&mut self, allow: bool) {
        self.allow_redefine = allow;
    }

    /// Incremented on every write.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Add a definition, returning the entry it replaced. Redefining a name
    /// fails unless redefinition is allowed; primitives can never be replaced.
    pub fn add_definition(
        &mut self,
        def: Definition,
    ) -> Result<Option<Arc<Definition>>, EnvironmentError> {
        if self.contains(&def.name) && !self.allow_redefine {
            return Err(EnvironmentError::DuplicateDefinition(def.name));
        }
        self.redefine(def)
    }

    /// `define(name, type, body?)`; a missing body declares an axiom.
    pub fn define(
        &mut self,
        name: impl Into<Name>,
        ty: Arc<Term>,
        value: Option<Arc<Term>>,
    ) -> Result<(), EnvironmentError> {
        self.add_definition(Definition::new(name, ty, value)).map(|_| ())
    }

    /// Replace (or add) a definition regardless of the redefinition flag,
    /// returning the entry it replaced.
    pub fn redefine(&mut self, def: Definition) -> Result<Option<Arc<Definition>>, EnvironmentError> {
        if self.get(&def.name).is_some_and(|old| old.is_primitive()) {
            return Err(EnvironmentError::ReservedName(def.name));
        }
        ensure_closed(&def, self.config.max_depth)?;
        let previous = self.insert(def);
        if let Some(old) = &previous {
            log::warn!("redefined `{}`", old.name);
        }
        Ok(previous)
    }

    fn insert(&mut self, def: Definition) -> Option<Arc<Definition>> {
        let name = def.name.clone();
        log::debug!("defining `{}` : {}", name, def.ty);
        let previous = Arc::make_mut(&mut self.entries).insert(name.clone(), Arc::new(def));
        if previous.is_none() {
            Arc::make_mut(&mut self.order).push(name);
        }
        self.generation += 1;
        previous
    }

    pub fn lookup(&self, name: &str) -> Result<&Arc<Definition>, EnvironmentError> {
        self.get(name)
            .ok_or_else(|| EnvironmentError::UnknownDefinition(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Definition>> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &Name> {
        self.order.iter()
    }

    /// Definitions in declaration order.
    pub fn definitions(&self) -> impl Iterator<Item = &Arc<Definition>> {
        self.order.iter().filter_map(|name| self.entries.get(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every user definition, keeping the primitives.
    pub fn clear(&mut self) {
        Arc::make_mut(&mut self.entries).retain(|_, def| def.is_primitive());
        let entries = &self.entries;
        Arc::make_mut(&mut self.order).retain(|name| entries.contains_key(name));
        self.generation += 1;
    }

    /// A read-only copy for parallel checkers.
    pub fn snapshot(&self) -> Environment {
        self.clone()
    }
}

fn ensure_closed(def: &Definition, max_depth: usize) -> Result<(), EnvironmentError> {
    let parts = std::iter::once(("type", &def.ty)).chain(def.value.iter().map(|v| ("body", v)));
    for (part, term) in parts {
        if deeper_than(term, max_depth) {
            return Err(EnvironmentError::TooDeep {
                name: def.name.clone(),
                max_depth,
            });
        }
        let free = free_vars(term);
        if let Some(var) = free.iter().next() {
            return Err(EnvironmentError::OpenTerm {
                name: def.name.clone(),
                detail: format!("{} mentions the free variable `{}`", part, var),
            });
        }
        if has_metas(term) {
            return Err(EnvironmentError::OpenTerm {
                name: def.name.clone(),
                detail: format!("{} contains unsolved holes", part),
            });
        }
    }
    Ok(())
}
