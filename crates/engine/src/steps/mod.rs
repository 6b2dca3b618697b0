//! Built-in step operations and the deprecated alias table.
//!
//! | Name | Variant |
//! |---|---|
//! | `rigger.steps.run_shell_script` | suspending |
//! | `rigger.steps.git_clone` | suspending |
//! | `rigger.steps.pip_install_requirements` | suspending |
//! | `rigger.steps.set_working_directory` | blocking |

use std::sync::Arc;

use anyhow::{Context, Result};
use rigger_util::{EnvironmentProvider, ProcessEnvironment};
use serde::de::DeserializeOwned;
use serde_json::{Map as JsonMap, Value};

use crate::executor::StepRegistry;

pub mod directory;
pub mod git;
pub mod pip;
mod process;
pub mod shell;

pub use directory::set_working_directory;
pub use git::{GitCloneStep, GitCredentials};
pub use pip::PipInstallStep;
pub use shell::ShellScriptStep;

pub const RUN_SHELL_SCRIPT: &str = "rigger.steps.run_shell_script";
pub const GIT_CLONE: &str = "rigger.steps.git_clone";
pub const PIP_INSTALL_REQUIREMENTS: &str = "rigger.steps.pip_install_requirements";
pub const SET_WORKING_DIRECTORY: &str = "rigger.steps.set_working_directory";

/// `(deprecated name, current name)` pairs registered alongside the built-in steps.
pub const DEPRECATED_ALIASES: [(&str, &str); 5] = [
    ("rigger.projects.steps.git_clone_project", GIT_CLONE),
    ("rigger.steps.git_clone_project", GIT_CLONE),
    ("rigger.projects.steps.set_working_directory", SET_WORKING_DIRECTORY),
    ("rigger.projects.steps.run_shell_script", RUN_SHELL_SCRIPT),
    ("rigger.projects.steps.pip_install_requirements", PIP_INSTALL_REQUIREMENTS),
];

/// Register every built-in step and alias into `registry`.
///
/// `environment` backs `$VAR` expansion in shell scripts and the interpreter lookup for pip.
pub fn register_builtin_steps(registry: &mut StepRegistry, environment: Arc<dyn EnvironmentProvider>) {
    registry
        .register_suspending(RUN_SHELL_SCRIPT, ShellScriptStep::new(Arc::clone(&environment)))
        .register_suspending(GIT_CLONE, GitCloneStep::new())
        .register_suspending(PIP_INSTALL_REQUIREMENTS, PipInstallStep::new(environment))
        .register_blocking(SET_WORKING_DIRECTORY, set_working_directory);
    for (deprecated, target) in DEPRECATED_ALIASES {
        registry.register_alias(deprecated, target);
    }
}

impl StepRegistry {
    /// Registry holding the built-in steps, reading the process environment.
    pub fn with_builtin_steps() -> Self {
        Self::with_builtin_steps_using(Arc::new(ProcessEnvironment))
    }

    pub fn with_builtin_steps_using(environment: Arc<dyn EnvironmentProvider>) -> Self {
        let mut registry = Self::new();
        register_builtin_steps(&mut registry, environment);
        registry
    }
}

/// Deserialize resolved parameters into a step's parameter struct.
pub(crate) fn parse_parameters<T: DeserializeOwned>(step: &str, parameters: JsonMap<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(parameters)).with_context(|| format!("invalid parameters for {step}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_resolves_every_alias() {
        let registry = StepRegistry::with_builtin_steps();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec![RUN_SHELL_SCRIPT, GIT_CLONE, PIP_INSTALL_REQUIREMENTS, SET_WORKING_DIRECTORY]
        );
        for (deprecated, target) in DEPRECATED_ALIASES {
            let resolved = registry.resolve(deprecated).expect("alias resolves");
            assert_eq!(resolved.name, target);
            assert_eq!(resolved.deprecated_name, Some(deprecated));
        }
        assert_eq!(registry.operation(SET_WORKING_DIRECTORY).map(|operation| operation.kind()), Some("blocking"));
        assert_eq!(registry.operation(GIT_CLONE).map(|operation| operation.kind()), Some("suspending"));
    }

    #[test]
    fn parse_parameters_names_the_step() {
        assert!(parse_parameters::<JsonMap<String, Value>>("demo", JsonMap::new()).is_ok());

        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Required {
            value: String,
        }
        let error = parse_parameters::<Required>("demo", JsonMap::new()).expect_err("missing field");
        assert_eq!(error.to_string(), "invalid parameters for demo");
        assert!(format!("{error:#}").contains("value"));
    }
}
