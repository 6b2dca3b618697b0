//! Error types surfaced by the step pipeline.

use rigger_types::FormatError;
use thiserror::Error;

use crate::resolve::ResolutionError;

/// Why a single step could not produce a result.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("{}", unknown_step_message(.name, .requires))]
    UnknownStep { name: String, requires: Vec<String> },

    #[error(transparent)]
    Operation(anyhow::Error),
}

fn unknown_step_message(name: &str, requires: &[String]) -> String {
    if requires.is_empty() {
        format!("step '{name}' is not registered")
    } else {
        format!(
            "step '{name}' is not registered; it is expected to be provided by {}",
            requires.join(", ")
        )
    }
}

/// A step failure annotated with the step's position in the pipeline.
#[derive(Debug, Error)]
#[error("encountered error while running {name} (step {index})")]
pub struct StepExecutionError {
    /// Qualified step name.
    pub name: String,
    /// Zero-based position in the step list.
    pub index: usize,
    #[source]
    pub source: StepError,
}

/// Failure of a whole `run_steps` call.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An entry failed validation; no step was run.
    #[error("step {index} is malformed: {source}")]
    Format {
        index: usize,
        #[source]
        source: FormatError,
    },

    #[error(transparent)]
    Step(#[from] StepExecutionError),
}
