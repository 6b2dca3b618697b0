//! `rigger.steps.git_clone`: shallow-clone a repository, or update an existing checkout.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use rigger_types::Diagnostics;
use rigger_util::redact_sensitive;
use serde::Deserialize;
use serde_json::{Map as JsonMap, Value, json};
use tracing::{debug, info};
use url::Url;

use super::{parse_parameters, process::run_process};
use crate::executor::SuspendingStep;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GitCloneParameters {
    repository: String,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    include_submodules: bool,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    credentials: Option<Value>,
}

/// Credentials embedded into an HTTPS clone URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
}

impl GitCredentials {
    /// Interpret a `credentials` parameter: a bare token string, or a mapping with
    /// `access_token`/`token` and/or `username`/`password`.
    pub fn from_value(value: &Value) -> Result<Option<Self>> {
        let credentials = match value {
            Value::Null => return Ok(None),
            Value::String(token) => Self {
                token: Some(token.clone()),
                ..Self::default()
            },
            Value::Object(fields) => {
                let field = |name: &str| -> Result<Option<String>> {
                    match fields.get(name) {
                        None | Some(Value::Null) => Ok(None),
                        Some(Value::String(text)) => Ok(Some(text.clone())),
                        Some(_) => Err(anyhow!("git credentials field '{name}' must be a string")),
                    }
                };
                Self {
                    username: field("username")?,
                    password: field("password")?,
                    token: field("access_token")?.or(field("token")?),
                }
            }
            _ => bail!("git credentials must be a token string or a mapping"),
        };
        Ok(Some(credentials))
    }
}

/// What the step will do, before any process is spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClonePlan {
    /// Clone URL with credentials embedded, if any were given.
    pub url: String,
    pub branch: Option<String>,
    pub include_submodules: bool,
    /// Checkout directory, relative to the working directory.
    pub directory: String,
}

impl ClonePlan {
    fn clone_arguments(&self) -> Vec<String> {
        let mut argv = vec!["clone".to_string(), self.url.clone()];
        if let Some(branch) = &self.branch {
            argv.extend(["--branch".to_string(), branch.clone()]);
        }
        if self.include_submodules {
            argv.push("--recurse-submodules".to_string());
        }
        argv.extend(["--depth".to_string(), "1".to_string(), self.directory.clone()]);
        argv
    }

    fn pull_arguments(&self) -> Vec<String> {
        let mut argv = vec!["pull".to_string(), "origin".to_string()];
        if let Some(branch) = &self.branch {
            argv.push(branch.clone());
        }
        if self.include_submodules {
            argv.push("--recurse-submodules".to_string());
        }
        argv.extend(["--depth".to_string(), "1".to_string()]);
        argv
    }
}

/// Build a [`ClonePlan`] from the step parameters.
///
/// A legacy `access_token` is folded into the credentials and reported as a deprecation.
pub fn plan_clone(parameters: JsonMap<String, Value>, diagnostics: &mut Diagnostics) -> Result<ClonePlan> {
    let parameters: GitCloneParameters = parse_parameters("git_clone", parameters)?;

    let credentials = match (parameters.access_token, parameters.credentials) {
        (Some(_), Some(_)) => bail!("please provide either an access token or credentials but not both"),
        (Some(token), None) => {
            diagnostics.deprecate(
                "the `access_token` parameter of git_clone is deprecated and will be removed in a future release. \
                 Use `credentials` instead.",
            );
            Some(GitCredentials {
                token: Some(token),
                ..GitCredentials::default()
            })
        }
        (None, Some(credentials)) => GitCredentials::from_value(&credentials)?,
        (None, None) => None,
    };

    let url = match &credentials {
        Some(credentials) => embed_credentials(&parameters.repository, credentials)?,
        None => parameters.repository.clone(),
    };

    Ok(ClonePlan {
        url,
        branch: parameters.branch,
        include_submodules: parameters.include_submodules,
        directory: repository_directory_name(&parameters.repository)?,
    })
}

/// Directory a clone of `repository` lands in: the URL's last path segment without `.git`.
pub fn repository_directory_name(repository: &str) -> Result<String> {
    let trimmed = repository.trim_end_matches('/');
    let last_segment = trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed);
    let name = last_segment.strip_suffix(".git").unwrap_or(last_segment);
    if name.is_empty() {
        bail!("cannot derive a directory name from repository '{repository}'");
    }
    Ok(name.to_string())
}

/// Insert credentials into the userinfo of an HTTP(S) repository URL.
///
/// Tokens use the form each host expects: `oauth2:<token>` for GitLab, `x-token-auth:<token>`
/// for Bitbucket (or `<username>:<token>` when a username is given), and the bare token elsewhere.
pub fn embed_credentials(repository: &str, credentials: &GitCredentials) -> Result<String> {
    let mut url = Url::parse(repository).map_err(|error| anyhow!("invalid repository URL '{repository}': {error}"))?;
    if !matches!(url.scheme(), "https" | "http") {
        bail!("credentials can only be embedded in HTTP(S) repository URLs");
    }
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();

    let (username, password) = match (&credentials.token, &credentials.username, &credentials.password) {
        (Some(token), username, _) if host.contains("bitbucket") => {
            (username.clone().unwrap_or_else(|| "x-token-auth".to_string()), Some(token.clone()))
        }
        (Some(token), _, _) if host.contains("gitlab") => ("oauth2".to_string(), Some(token.clone())),
        (Some(token), _, _) => (token.clone(), None),
        (None, Some(username), Some(password)) => (username.clone(), Some(password.clone())),
        _ => bail!("git credentials need a token or both a username and a password"),
    };

    url.set_username(&username)
        .and_then(|()| url.set_password(password.as_deref()))
        .map_err(|()| anyhow!("cannot embed credentials in '{repository}'"))?;
    Ok(url.to_string())
}

/// Clones with `git --depth 1` and returns `{directory}`.
#[derive(Debug, Clone)]
pub struct GitCloneStep {
    program: String,
    base_directory: Option<PathBuf>,
}

impl Default for GitCloneStep {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
            base_directory: None,
        }
    }
}

impl GitCloneStep {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different git executable.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Resolve checkout directories against `directory` instead of the working directory.
    pub fn with_base_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.base_directory = Some(directory.into());
        self
    }

    async fn git(&self, arguments: Vec<String>, directory: Option<&Path>) -> Result<()> {
        let mut argv = Vec::with_capacity(arguments.len() + 1);
        argv.push(self.program.clone());
        argv.extend(arguments);
        let output = run_process(&argv, directory, std::iter::empty::<(String, String)>(), false).await?;
        if !output.success() {
            bail!(
                "git_clone failed with error code {}: {}",
                output.code_label(),
                redact_sensitive(&output.stderr)
            );
        }
        Ok(())
    }
}

#[async_trait]
impl SuspendingStep for GitCloneStep {
    async fn run(&self, parameters: JsonMap<String, Value>, diagnostics: &mut Diagnostics) -> Result<Value> {
        let plan = plan_clone(parameters, diagnostics)?;
        let base = self.base_directory.as_deref();
        let checkout = base.map_or_else(|| PathBuf::from(&plan.directory), |base| base.join(&plan.directory));

        if checkout.join(".git").is_dir() {
            info!(directory = %plan.directory, "repository already cloned; pulling latest changes");
            self.git(plan.pull_arguments(), Some(&checkout)).await?;
        } else {
            debug!(url = %redact_sensitive(&plan.url), directory = %plan.directory, "cloning repository");
            self.git(plan.clone_arguments(), base).await?;
        }

        Ok(json!({ "directory": plan.directory }))
    }
}
