//! `rigger.steps.set_working_directory`

use std::path::PathBuf;

use anyhow::{Context, Result};
use rigger_types::Diagnostics;
use serde::Deserialize;
use serde_json::{Map as JsonMap, Value, json};
use tracing::info;

use super::parse_parameters;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WorkingDirectoryParameters {
    directory: PathBuf,
}

/// Changes the process working directory and returns `{directory}`.
pub fn set_working_directory(parameters: JsonMap<String, Value>, _diagnostics: &mut Diagnostics) -> Result<Value> {
    let parameters: WorkingDirectoryParameters = parse_parameters("set_working_directory", parameters)?;
    std::env::set_current_dir(&parameters.directory)
        .with_context(|| format!("could not change the working directory to '{}'", parameters.directory.display()))?;
    info!(directory = %parameters.directory.display(), "changed working directory");
    Ok(json!({"directory": parameters.directory}))
}
