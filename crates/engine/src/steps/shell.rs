//! `rigger.steps.run_shell_script`: run each line of a script as its own command.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use indexmap::IndexMap;
use rigger_types::Diagnostics;
use rigger_util::{EnvironmentProvider, split_command_line};
use serde::Deserialize;
use serde_json::{Map as JsonMap, Value, json};
use tracing::debug;

use super::{parse_parameters, process::run_process};
use crate::{executor::SuspendingStep, resolve::format_json_value};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ShellScriptParameters {
    script: String,
    #[serde(default)]
    directory: Option<PathBuf>,
    #[serde(default)]
    env: IndexMap<String, Value>,
    #[serde(default = "default_stream_output")]
    stream_output: bool,
    #[serde(default)]
    expand_env_vars: bool,
}

fn default_stream_output() -> bool {
    true
}

/// Runs every non-blank script line without a shell and returns `{stdout, stderr}`.
#[derive(Debug, Clone)]
pub struct ShellScriptStep {
    environment: Arc<dyn EnvironmentProvider>,
}

impl ShellScriptStep {
    /// `environment` is consulted for `$VAR` expansion when `expand_env_vars` is set.
    pub fn new(environment: Arc<dyn EnvironmentProvider>) -> Self {
        Self { environment }
    }

    fn expand(&self, line: &str, env: &IndexMap<String, String>) -> String {
        shellexpand::env_with_context_no_errors(line, |name: &str| {
            env.get(name).cloned().or_else(|| self.environment.var(name))
        })
        .into_owned()
    }
}

#[async_trait]
impl SuspendingStep for ShellScriptStep {
    async fn run(&self, parameters: JsonMap<String, Value>, _diagnostics: &mut Diagnostics) -> Result<Value> {
        let parameters: ShellScriptParameters = parse_parameters("run_shell_script", parameters)?;
        let env: IndexMap<String, String> = parameters
            .env
            .iter()
            .map(|(key, value)| (key.clone(), format_json_value(value)))
            .collect();

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        for line in parameters.script.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let line = if parameters.expand_env_vars {
                self.expand(line, &env)
            } else {
                line.to_string()
            };
            let argv = split_command_line(&line).with_context(|| format!("could not parse script line '{line}'"))?;
            if argv.is_empty() {
                continue;
            }

            debug!(program = %argv[0], "running script line");
            let output = run_process(&argv, parameters.directory.as_deref(), &env, parameters.stream_output).await?;
            if !output.success() {
                bail!(
                    "run_shell_script failed with error code {}: {}",
                    output.code_label(),
                    output.stderr
                );
            }
            if !output.stdout.is_empty() {
                stdout.push(output.stdout);
            }
            if !output.stderr.is_empty() {
                stderr.push(output.stderr);
            }
        }

        Ok(json!({
            "stdout": stdout.join("\n").trim(),
            "stderr": stderr.join("\n").trim(),
        }))
    }
}
