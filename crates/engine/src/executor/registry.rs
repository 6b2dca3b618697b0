//! Statically built table of step operations and deprecated aliases.

use indexmap::IndexMap;
use tracing::debug;

use super::invoker::{BlockingStep, StepOperation, SuspendingStep};

/// Maps qualified step names to their operations.
///
/// Deprecated names are kept in a separate alias table so that lookups through an old name can
/// be reported to the user while still reaching the current operation.
#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    operations: IndexMap<String, StepOperation>,
    aliases: IndexMap<String, String>,
}

/// A registry hit.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedStep<'a> {
    /// Current qualified name of the operation.
    pub name: &'a str,
    pub operation: &'a StepOperation,
    /// The deprecated name the lookup went through, if any.
    pub deprecated_name: Option<&'a str>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation under `name`, replacing any previous registration.
    pub fn register(&mut self, name: impl Into<String>, operation: StepOperation) -> &mut Self {
        let name = name.into();
        debug!(step = %name, kind = operation.kind(), "registered step operation");
        self.operations.insert(name, operation);
        self
    }

    pub fn register_blocking(&mut self, name: impl Into<String>, step: impl BlockingStep + 'static) -> &mut Self {
        self.register(name, StepOperation::blocking(step))
    }

    pub fn register_suspending(&mut self, name: impl Into<String>, step: impl SuspendingStep + 'static) -> &mut Self {
        self.register(name, StepOperation::suspending(step))
    }

    /// Route `deprecated` to the operation registered as `target`.
    pub fn register_alias(&mut self, deprecated: impl Into<String>, target: impl Into<String>) -> &mut Self {
        self.aliases.insert(deprecated.into(), target.into());
        self
    }

    /// Find the operation for `name`, consulting the alias table first.
    ///
    /// Returns `None` when neither table knows the name or when an alias points at an
    /// operation that was never registered.
    pub fn resolve(&self, name: &str) -> Option<ResolvedStep<'_>> {
        if let Some((deprecated_name, target)) = self.aliases.get_key_value(name) {
            let (name, operation) = self.operations.get_key_value(target.as_str())?;
            return Some(ResolvedStep {
                name,
                operation,
                deprecated_name: Some(deprecated_name),
            });
        }
        let (name, operation) = self.operations.get_key_value(name)?;
        Some(ResolvedStep {
            name,
            operation,
            deprecated_name: None,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Registered operation names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    /// `(deprecated, target)` pairs in registration order.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases.iter().map(|(deprecated, target)| (deprecated.as_str(), target.as_str()))
    }

    /// The registered operation behind `name`, if any.
    pub fn operation(&self, name: &str) -> Option<&StepOperation> {
        self.operations.get(name)
    }
}
