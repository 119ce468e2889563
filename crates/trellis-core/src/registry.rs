//! Ordered, named registries.
//!
//! Applications keep their controllers here, views keep variables and
//! widgets, view sets keep child views and controllers. Adding a name twice
//! or looking up a missing name is an error naming the registry.

use std::fmt;

use crate::error::{Error, RegistryKind, Result};

/// An insertion-ordered map from name to value.
pub struct Registry<T> {
    kind: RegistryKind,
    entries: Vec<(String, T)>,
}

impl<T> Registry<T> {
    /// An empty registry of `kind` entries.
    pub fn new(kind: RegistryKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    /// What this registry holds.
    pub fn kind(&self) -> RegistryKind {
        self.kind
    }

    /// Register `value` under `name`.
    ///
    /// Fails with [`Error::DuplicateRegistration`] if `name` is taken.
    pub fn add(&mut self, name: impl Into<String>, value: T) -> Result<()> {
        let name = name.into();
        if self.contains(&name) {
            return Err(Error::duplicate(self.kind, name));
        }
        self.entries.push((name, value));
        Ok(())
    }

    /// The value under `name`.
    ///
    /// Fails with [`Error::UnknownRegistration`] if absent.
    pub fn get(&self, name: &str) -> Result<&T> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| Error::unknown(self.kind, name))
    }

    /// Remove and return the value under `name`.
    ///
    /// Fails with [`Error::UnknownRegistration`] if absent.
    pub fn remove(&mut self, name: &str) -> Result<T> {
        let index = self
            .entries
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| Error::unknown(self.kind, name))?;
        Ok(self.entries.remove(index).1)
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Registered names, in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Entries, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry, returning them in insertion order.
    pub fn drain(&mut self) -> Vec<(String, T)> {
        std::mem::take(&mut self.entries)
    }
}

impl<T: Clone> Registry<T> {
    /// A copy of every value, in insertion order.
    pub fn values(&self) -> Vec<T> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}
