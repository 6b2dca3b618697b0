//! Dispatch of a resolved step to its registered operation.
//!
//! Operations come in two flavours chosen at registration time. [`BlockingStep`]s do
//! synchronous work and are moved onto Tokio's blocking pool; [`SuspendingStep`]s are awaited
//! directly on the pipeline task. Either way exactly one step is in flight at a time.

use std::{fmt, sync::Arc};

use anyhow::anyhow;
use async_trait::async_trait;
use rigger_types::{Diagnostic, Diagnostics};
use serde_json::{Map as JsonMap, Value};
use tracing::{debug, warn};

use super::registry::StepRegistry;
use crate::error::StepError;

/// A synchronous step operation.
///
/// Implemented for any `Fn(JsonMap<String, Value>, &mut Diagnostics) -> anyhow::Result<Value>`.
pub trait BlockingStep: Send + Sync {
    fn run(&self, parameters: JsonMap<String, Value>, diagnostics: &mut Diagnostics) -> anyhow::Result<Value>;
}

impl<F> BlockingStep for F
where
    F: Fn(JsonMap<String, Value>, &mut Diagnostics) -> anyhow::Result<Value> + Send + Sync,
{
    fn run(&self, parameters: JsonMap<String, Value>, diagnostics: &mut Diagnostics) -> anyhow::Result<Value> {
        self(parameters, diagnostics)
    }
}

/// An asynchronous step operation, typically one that waits on a child process.
#[async_trait]
pub trait SuspendingStep: Send + Sync {
    async fn run(&self, parameters: JsonMap<String, Value>, diagnostics: &mut Diagnostics) -> anyhow::Result<Value>;
}

/// A registered operation.
#[derive(Clone)]
pub enum StepOperation {
    Blocking(Arc<dyn BlockingStep>),
    Suspending(Arc<dyn SuspendingStep>),
}

impl StepOperation {
    pub fn blocking(step: impl BlockingStep + 'static) -> Self {
        Self::Blocking(Arc::new(step))
    }

    pub fn suspending(step: impl SuspendingStep + 'static) -> Self {
        Self::Suspending(Arc::new(step))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Blocking(_) => "blocking",
            Self::Suspending(_) => "suspending",
        }
    }
}

impl fmt::Debug for StepOperation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_tuple("StepOperation").field(&self.kind()).finish()
    }
}

/// Result of a successful invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub output: Value,
    /// Alias deprecation first, then whatever the operation reported.
    pub diagnostics: Diagnostics,
}

/// Look up `name` and run its operation with already-resolved parameters.
///
/// Diagnostics collected before a failing operation returns are logged here, since the error
/// path has no other way to carry them.
///
/// # Errors
///
/// [`StepError::UnknownStep`] when the registry has no entry for `name`, and
/// [`StepError::Operation`] when the operation itself fails.
pub async fn invoke(
    registry: &StepRegistry,
    name: &str,
    requires: &[String],
    parameters: JsonMap<String, Value>,
) -> Result<Invocation, StepError> {
    let resolved = registry.resolve(name).ok_or_else(|| StepError::UnknownStep {
        name: name.to_string(),
        requires: requires.to_vec(),
    })?;

    let mut diagnostics = Diagnostics::new();
    if let Some(deprecated_name) = resolved.deprecated_name {
        diagnostics.push(Diagnostic::deprecation(format!(
            "'{deprecated_name}' has been deprecated and will be removed in a future release. Use '{}' instead.",
            resolved.name
        )));
    }

    debug!(step = %resolved.name, kind = resolved.operation.kind(), "invoking step operation");
    let result = match resolved.operation {
        StepOperation::Blocking(step) => {
            let step = Arc::clone(step);
            let (result, reported) = tokio::task::spawn_blocking(move || {
                let mut reported = Diagnostics::new();
                let result = step.run(parameters, &mut reported);
                (result, reported)
            })
            .await
            .map_err(|join_error| StepError::Operation(anyhow!("step '{}' did not complete: {join_error}", resolved.name)))?;
            diagnostics.extend(reported);
            result
        }
        StepOperation::Suspending(step) => step.run(parameters, &mut diagnostics).await,
    };

    match result {
        Ok(output) => Ok(Invocation { output, diagnostics }),
        Err(error) => {
            for diagnostic in diagnostics.iter() {
                warn!(step = %resolved.name, message = %diagnostic.message, "diagnostic raised by failed step");
            }
            Err(StepError::Operation(error))
        }
    }
}
