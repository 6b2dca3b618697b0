//! # Rigger Engine
//!
//! Runs ordered lists of named steps (clone a repository, install dependencies, run shell
//! commands) where later steps reference values produced by earlier ones, by stored secrets and
//! variables, or by the process environment.
//!
//! ## Key Features
//!
//! - **Placeholder Resolution**: `{{ ... }}` substitution across arbitrary parameter trees, with
//!   native types preserved for whole-string placeholders
//! - **Step Registry**: statically registered blocking and suspending operations plus a
//!   deprecated-alias table
//! - **Fail-fast Pipelines**: every entry is validated up front, steps run strictly in order, and
//!   the first failure names the step and its position
//! - **Diagnostics**: non-fatal messages returned from each invocation and forwarded to a print sink
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use rigger_engine::{ConsoleSink, StepPipeline, StepRegistry, load_pipeline_file};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let document = load_pipeline_file("rigger.yaml")?;
//! let steps = document.section("pull")?;
//!
//! let pipeline = StepPipeline::new(Arc::new(StepRegistry::with_builtin_steps()));
//! let outputs = pipeline.run_steps(steps, None, &ConsoleSink).await?;
//! println!("{}", serde_json::to_string_pretty(&outputs.merged())?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`templates`**: placeholder scanning and reference classification
//! - **`resolve`**: namespace dispatch and substitution
//! - **`context`**: outputs accumulated across a run
//! - **`executor`**: registry, invoker, print sinks, and the pipeline runner
//! - **`steps`**: built-in step operations

use std::{fs, path::Path};

use anyhow::{Context, Result};

pub mod context;
pub mod error;
pub mod executor;
pub mod resolve;
pub mod steps;
pub mod templates;

pub use context::OutputContext;
pub use error::{PipelineError, StepError, StepExecutionError};
pub use executor::{
    BlockingStep, ConsoleSink, Invocation, PrintSink, ResolvedStep, StepOperation, StepPipeline, StepRegistry, SuspendingStep,
    TracingSink,
};
pub use resolve::{ResolutionContext, ResolutionError, resolve_value};
pub use rigger_types::{Diagnostic, DiagnosticKind, Diagnostics, PipelineDocument, StepSpec};
pub use steps::{DEPRECATED_ALIASES, register_builtin_steps};

/// Loads a pipeline document from the filesystem.
///
/// YAML is a superset of JSON, so both formats are accepted regardless of the file extension.
///
/// # Errors
///
/// This function will return an error if:
/// - The file cannot be read from the filesystem
/// - The content is neither a step sequence nor a mapping of sections
///
/// # Examples
///
/// ```rust
/// use rigger_engine::load_pipeline_file;
///
/// let temp_dir = tempfile::tempdir()?;
/// let pipeline_path = temp_dir.path().join("rigger.yaml");
/// std::fs::write(&pipeline_path, r#"
/// - rigger.steps.run_shell_script:
///     script: echo hello
/// "#)?;
///
/// let document = load_pipeline_file(&pipeline_path)?;
/// assert_eq!(document.section("steps")?.len(), 1);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn load_pipeline_file(file_path: impl AsRef<Path>) -> Result<PipelineDocument> {
    let file_path = file_path.as_ref();
    let content =
        fs::read_to_string(file_path).with_context(|| format!("Failed to read pipeline file: {}", file_path.display()))?;
    serde_yaml::from_str::<PipelineDocument>(&content).with_context(|| {
        format!(
            "Unsupported pipeline document in {}. Expected a sequence of steps or a mapping of named step sections",
            file_path.display()
        )
    })
}
