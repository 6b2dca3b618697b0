//! Step pipeline: validates entries, resolves placeholders, invokes operations in order, and
//! threads each result into the [`OutputContext`] seen by later steps.
//!
//! - [`registry::StepRegistry`] maps qualified names (and deprecated aliases) to operations
//! - [`invoker`] runs one operation and collects its diagnostics
//! - [`sink::PrintSink`] receives progress lines and diagnostics

use std::sync::Arc;

use rigger_types::{Diagnostics, StepSpec};
use rigger_util::{EnvironmentProvider, KeychainReferenceStore, ProcessEnvironment, ReferenceStore, redact_sensitive};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    context::OutputContext,
    error::{PipelineError, StepError, StepExecutionError},
    resolve::{ResolutionContext, resolve_parameters},
};

pub mod invoker;
pub mod registry;
pub mod sink;

pub use invoker::{BlockingStep, Invocation, StepOperation, SuspendingStep, invoke};
pub use registry::{ResolvedStep, StepRegistry};
pub use sink::{ConsoleSink, PrintSink, TracingSink};

use sink::emit;

/// Runs step entries against a registry, environment, and reference store.
#[derive(Debug, Clone)]
pub struct StepPipeline {
    registry: Arc<StepRegistry>,
    environment: Arc<dyn EnvironmentProvider>,
    store: Arc<dyn ReferenceStore>,
}

impl StepPipeline {
    /// Pipeline reading the process environment and the keychain-backed reference store.
    pub fn new(registry: Arc<StepRegistry>) -> Self {
        let environment: Arc<dyn EnvironmentProvider> = Arc::new(ProcessEnvironment);
        Self {
            registry,
            store: Arc::new(KeychainReferenceStore::with_environment(Arc::clone(&environment))),
            environment,
        }
    }

    pub fn with_environment(mut self, environment: Arc<dyn EnvironmentProvider>) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_reference_store(mut self, store: Arc<dyn ReferenceStore>) -> Self {
        self.store = store;
        self
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Run a single step entry and return its raw result.
    ///
    /// Placeholders resolve against `outputs` (or an empty context). Diagnostics raised by the
    /// step are logged rather than printed.
    pub async fn run_step(&self, step: &Value, outputs: Option<&OutputContext>) -> Result<Value, StepError> {
        let spec = StepSpec::from_value(step)?;
        let empty = OutputContext::new();
        let invocation = self.execute(&spec, outputs.unwrap_or(&empty)).await?;
        log_diagnostics(&spec.name, &invocation.diagnostics);
        Ok(invocation.output)
    }

    /// Run step entries in order, stopping at the first failure.
    ///
    /// Every entry is validated before any step runs. Each step's progress line and diagnostics
    /// go to `sink`; its result is merged into the returned context.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Format`] when an entry is malformed, otherwise
    /// [`PipelineError::Step`] naming the failing step and its position.
    pub async fn run_steps(
        &self,
        steps: &[Value],
        upstream: Option<OutputContext>,
        sink: &dyn PrintSink,
    ) -> Result<OutputContext, PipelineError> {
        let specs = steps
            .iter()
            .enumerate()
            .map(|(index, step)| StepSpec::from_value(step).map_err(|source| PipelineError::Format { index, source }))
            .collect::<Result<Vec<_>, _>>()?;

        let mut outputs = upstream.unwrap_or_default();
        for (index, spec) in specs.iter().enumerate() {
            emit(sink, &format!(" > Running {} step...", spec.short_name()), None);

            let invocation = match self.execute(spec, &outputs).await {
                Ok(invocation) => invocation,
                Err(source) => {
                    warn!(step = %spec.name, index, error = %source, "step failed; stopping pipeline");
                    return Err(StepExecutionError {
                        name: spec.name.clone(),
                        index,
                        source,
                    }
                    .into());
                }
            };

            for diagnostic in invocation.diagnostics.iter() {
                emit(sink, &diagnostic.message, diagnostic.style.as_deref());
            }
            outputs.record(spec.id.as_deref(), invocation.output);
        }

        info!(steps = specs.len(), "pipeline completed");
        Ok(outputs)
    }

    async fn execute(&self, spec: &StepSpec, outputs: &OutputContext) -> Result<Invocation, StepError> {
        let parameters = {
            let context = ResolutionContext::new(outputs, self.environment.as_ref(), self.store.as_ref());
            resolve_parameters(&spec.parameters, &context)?
        };
        debug!(
            step = %spec.name,
            id = spec.id.as_deref().unwrap_or_default(),
            parameters = %redact_sensitive(&serde_json::to_string(&parameters).unwrap_or_default()),
            "resolved step parameters"
        );
        invoke(&self.registry, &spec.name, &spec.requires, parameters).await
    }
}

fn log_diagnostics(step: &str, diagnostics: &Diagnostics) {
    for diagnostic in diagnostics.iter() {
        warn!(step, kind = ?diagnostic.kind, "{}", diagnostic.message);
    }
}
