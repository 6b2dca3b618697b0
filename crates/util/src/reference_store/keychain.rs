//! OS keychain backed reference store, with an environment fallback for CI.

use std::sync::Arc;

use serde_json::{Map as JsonMap, Value};
use tracing::debug;

use super::{ReferenceStore, StoreError};
use crate::environment::{EnvironmentProvider, ProcessEnvironment};

static SERVICE: &str = "rigger";
/// Environment variable used to select the secret resolution backend.
pub const SECRETS_BACKEND_ENV_VAR: &str = "RIGGER_SECRETS_BACKEND";

const BLOCK_ENV_PREFIX: &str = "RIGGER_BLOCK";
const VARIABLE_ENV_PREFIX: &str = "RIGGER_VARIABLE";

/// Secret resolution backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretsBackend {
    /// Entries live in the OS keychain (`keyring-rs`) as JSON text.
    Keychain,
    /// Entries are read from `RIGGER_BLOCK_<TYPE>_<NAME>` and `RIGGER_VARIABLE_<NAME>`.
    ///
    /// Values are decoded exactly like keychain payloads: JSON when they parse, raw text otherwise.
    Environment,
}

impl SecretsBackend {
    fn from_env_var(raw: Option<String>) -> Self {
        match raw.unwrap_or_default().trim().to_ascii_lowercase().as_str() {
            "env" => Self::Environment,
            _ => Self::Keychain,
        }
    }

    /// Determine the configured backend from `RIGGER_SECRETS_BACKEND`.
    pub fn from_environment(environment: &dyn EnvironmentProvider) -> Self {
        Self::from_env_var(environment.var(SECRETS_BACKEND_ENV_VAR))
    }

    fn label(self) -> &'static str {
        match self {
            Self::Keychain => "keychain",
            Self::Environment => "environment",
        }
    }
}

/// Reference store reading blocks and variables from the configured [`SecretsBackend`].
#[derive(Debug, Clone)]
pub struct KeychainReferenceStore {
    service: String,
    backend: SecretsBackend,
    environment: Arc<dyn EnvironmentProvider>,
}

impl Default for KeychainReferenceStore {
    fn default() -> Self {
        Self::with_environment(Arc::new(ProcessEnvironment))
    }
}

impl KeychainReferenceStore {
    /// Store bound to the process environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose backend selection and environment lookups go through `environment`.
    pub fn with_environment(environment: Arc<dyn EnvironmentProvider>) -> Self {
        let backend = SecretsBackend::from_environment(environment.as_ref());
        Self {
            service: SERVICE.to_string(),
            backend,
            environment,
        }
    }

    /// Override the keychain service name (defaults to `rigger`).
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn backend(&self) -> SecretsBackend {
        self.backend
    }

    /// Write a block document to the keychain.
    pub fn store_block(&self, block_type: &str, name: &str, document: &Value) -> Result<(), StoreError> {
        self.store_entry(&block_account(block_type, name), document)
    }

    /// Write a variable to the keychain.
    pub fn store_variable(&self, name: &str, value: &Value) -> Result<(), StoreError> {
        self.store_entry(&variable_account(name), value)
    }

    /// Remove a block document from the keychain.
    pub fn remove_block(&self, block_type: &str, name: &str) -> Result<(), StoreError> {
        self.remove_entry(&block_account(block_type, name))
    }

    /// Remove a variable from the keychain.
    pub fn remove_variable(&self, name: &str) -> Result<(), StoreError> {
        self.remove_entry(&variable_account(name))
    }

    fn entry(&self, account: &str) -> Result<keyring::Entry, StoreError> {
        keyring::Entry::new(&self.service, account).map_err(|error| StoreError::Keyring {
            reference: account.to_string(),
            error: error.to_string(),
        })
    }

    fn read_entry(&self, account: &str) -> Result<Option<String>, StoreError> {
        match self.entry(account)?.get_password() {
            Ok(secret) => {
                debug!("Read keychain entry: {} -> [REDACTED]", account);
                Ok(Some(secret))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(StoreError::Keyring {
                reference: account.to_string(),
                error: error.to_string(),
            }),
        }
    }

    fn store_entry(&self, account: &str, value: &Value) -> Result<(), StoreError> {
        if self.backend == SecretsBackend::Environment {
            return Err(StoreError::ReadOnly {
                backend: self.backend.label(),
            });
        }
        let serialized = serde_json::to_string(value).map_err(|error| StoreError::MalformedDocument {
            reference: account.to_string(),
            error: error.to_string(),
        })?;
        self.entry(account)?
            .set_password(&serialized)
            .map_err(|error| StoreError::Keyring {
                reference: account.to_string(),
                error: error.to_string(),
            })?;
        debug!("Stored keychain entry: {}", account);
        Ok(())
    }

    fn remove_entry(&self, account: &str) -> Result<(), StoreError> {
        if self.backend == SecretsBackend::Environment {
            return Err(StoreError::ReadOnly {
                backend: self.backend.label(),
            });
        }
        self.entry(account)?
            .delete_credential()
            .map_err(|error| StoreError::Keyring {
                reference: account.to_string(),
                error: error.to_string(),
            })?;
        debug!("Removed keychain entry: {}", account);
        Ok(())
    }

    fn read_raw_block(&self, block_type: &str, name: &str) -> Result<Option<String>, StoreError> {
        match self.backend {
            SecretsBackend::Environment => Ok(self
                .environment
                .var(&environment_key(BLOCK_ENV_PREFIX, &[block_type, name]))),
            SecretsBackend::Keychain => self.read_entry(&block_account(block_type, name)),
        }
    }

    fn read_raw_variable(&self, name: &str) -> Result<Option<String>, StoreError> {
        match self.backend {
            SecretsBackend::Environment => Ok(self.environment.var(&environment_key(VARIABLE_ENV_PREFIX, &[name]))),
            SecretsBackend::Keychain => self.read_entry(&variable_account(name)),
        }
    }
}

impl ReferenceStore for KeychainReferenceStore {
    fn read_block(&self, block_type: &str, name: &str) -> Result<Value, StoreError> {
        let raw = self
            .read_raw_block(block_type, name)?
            .ok_or_else(|| StoreError::BlockNotFound {
                block_type: block_type.to_string(),
                name: name.to_string(),
            })?;
        Ok(decode_block_document(raw))
    }

    fn read_variable(&self, name: &str) -> Result<Value, StoreError> {
        let raw = self
            .read_raw_variable(name)?
            .ok_or_else(|| StoreError::VariableNotFound { name: name.to_string() })?;
        Ok(decode_payload(raw))
    }
}

/// JSON text decodes to its value; anything else is kept as a plain string.
fn decode_payload(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

/// Block documents are JSON mappings; any other payload is a bare secret under `value`.
fn decode_block_document(raw: String) -> Value {
    match decode_payload(raw) {
        Value::Object(document) => Value::Object(document),
        secret => {
            let mut document = JsonMap::new();
            document.insert("value".into(), secret);
            Value::Object(document)
        }
    }
}

fn block_account(block_type: &str, name: &str) -> String {
    format!("block/{}/{}", block_type.to_ascii_lowercase(), name)
}

fn variable_account(name: &str) -> String {
    format!("variable/{name}")
}

/// `RIGGER_BLOCK` + `["secret", "deploy-token"]` -> `RIGGER_BLOCK_SECRET_DEPLOY_TOKEN`.
fn environment_key(prefix: &str, parts: &[&str]) -> String {
    let mut key = prefix.to_string();
    for part in parts {
        key.push('_');
        key.extend(
            part.chars()
                .map(|character| if character.is_ascii_alphanumeric() { character.to_ascii_uppercase() } else { '_' }),
        );
    }
    key
}
