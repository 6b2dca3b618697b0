//! Environment variable access behind a provider trait.
//!
//! The template resolver never reads `std::env` directly; it asks an [`EnvironmentProvider`],
//! which lets tests pin `$NAME` lookups to a fixed table.

use std::{collections::HashMap, fmt::Debug};

/// Read-only source of environment variables.
pub trait EnvironmentProvider: Send + Sync + Debug {
    /// Value of `name`, or `None` when it is unset or not valid Unicode.
    fn var(&self, name: &str) -> Option<String>;
}

/// Provider backed by the current process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl EnvironmentProvider for ProcessEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Provider backed by a fixed table.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StaticEnvironment {
    variables: HashMap<String, String>,
}

impl StaticEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }
}

impl<K, V> FromIterator<(K, V)> for StaticEnvironment
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            variables: iter.into_iter().map(|(name, value)| (name.into(), value.into())).collect(),
        }
    }
}

impl EnvironmentProvider for StaticEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        self.variables.get(name).cloned()
    }
}
