//! `rigger.steps.pip_install_requirements`

use std::{path::PathBuf, sync::Arc};

use anyhow::{Result, bail};
use async_trait::async_trait;
use rigger_types::Diagnostics;
use rigger_util::EnvironmentProvider;
use serde::Deserialize;
use serde_json::{Map as JsonMap, Value, json};

use super::{parse_parameters, process::run_process};
use crate::executor::SuspendingStep;

/// Environment variable naming the Python interpreter used to run pip.
pub const PYTHON_ENV_VAR: &str = "RIGGER_PYTHON";
const DEFAULT_PYTHON: &str = "python3";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PipInstallParameters {
    #[serde(default)]
    directory: Option<PathBuf>,
    #[serde(default = "default_requirements_file")]
    requirements_file: String,
    #[serde(default = "default_stream_output")]
    stream_output: bool,
}

fn default_requirements_file() -> String {
    "requirements.txt".to_string()
}

fn default_stream_output() -> bool {
    true
}

/// Runs `<python> -m pip install -r <requirements_file>` and returns `{stdout, stderr}`.
#[derive(Debug, Clone)]
pub struct PipInstallStep {
    environment: Arc<dyn EnvironmentProvider>,
}

impl PipInstallStep {
    pub fn new(environment: Arc<dyn EnvironmentProvider>) -> Self {
        Self { environment }
    }

    fn command(&self, requirements_file: &str) -> Vec<String> {
        let python = self
            .environment
            .var(PYTHON_ENV_VAR)
            .filter(|python| !python.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PYTHON.to_string());
        [python.as_str(), "-m", "pip", "install", "-r", requirements_file]
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl SuspendingStep for PipInstallStep {
    async fn run(&self, parameters: JsonMap<String, Value>, _diagnostics: &mut Diagnostics) -> Result<Value> {
        let parameters: PipInstallParameters = parse_parameters("pip_install_requirements", parameters)?;
        let argv = self.command(&parameters.requirements_file);
        let output = run_process(
            &argv,
            parameters.directory.as_deref(),
            std::iter::empty::<(String, String)>(),
            parameters.stream_output,
        )
        .await?;
        if !output.success() {
            bail!(
                "pip_install_requirements failed with error code {}: {}",
                output.code_label(),
                output.stderr
            );
        }
        Ok(json!({"stdout": output.stdout.trim(), "stderr": output.stderr.trim()}))
    }
}
