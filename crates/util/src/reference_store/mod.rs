//! Read access to externally stored blocks and variables.
//!
//! A *block* is a typed document (a secret, a set of git credentials, ...) addressed by
//! `(type, name)`; a *variable* is a named raw value. Placeholders of the form
//! `{{ store.blocks.<type>.<name> }}` and `{{ store.variables.<name> }}` are answered by a
//! [`ReferenceStore`]. Two backends ship with the crate:
//!
//! - [`InMemoryReferenceStore`]: a table, optionally loaded from a YAML or JSON file
//! - [`KeychainReferenceStore`]: the OS keychain, or environment variables in CI

use std::{fmt::Debug, path::PathBuf};

use serde_json::Value;
use thiserror::Error;

mod keychain;
mod memory;

pub use keychain::{KeychainReferenceStore, SECRETS_BACKEND_ENV_VAR, SecretsBackend};
pub use memory::InMemoryReferenceStore;

/// Read-only client for blocks and variables.
///
/// Implementations must be deterministic for the duration of a pipeline run.
pub trait ReferenceStore: Send + Sync + Debug {
    /// Full document of the block `block_type/name`. Block types compare case-insensitively.
    fn read_block(&self, block_type: &str, name: &str) -> Result<Value, StoreError>;

    /// Raw value of the variable `name`.
    fn read_variable(&self, name: &str) -> Result<Value, StoreError>;
}

/// Failures surfaced by reference store backends.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("block '{block_type}/{name}' was not found")]
    BlockNotFound { block_type: String, name: String },

    #[error("variable '{name}' was not found")]
    VariableNotFound { name: String },

    #[error("stored document for '{reference}' is malformed: {error}")]
    MalformedDocument { reference: String, error: String },

    #[error("keyring error for {reference}: {error}")]
    Keyring { reference: String, error: String },

    #[error("the {backend} backend is read-only")]
    ReadOnly { backend: &'static str },

    #[error("failed to load reference store from {}: {error}", .path.display())]
    Load { path: PathBuf, error: String },
}
