//! Utilities shared by the Rigger engine and command-line binary.
//!
//! - [`environment`]: injectable access to environment variables
//! - [`reference_store`]: read access to stored blocks (secrets, credentials) and variables
//! - [`shell_lexing`]: shell-like command splitting without invoking a shell
//! - [`redact_sensitive`]: masking of secret-looking values before they are logged

use once_cell::sync::Lazy;
use regex::Regex;

pub mod environment;
pub mod reference_store;
pub mod shell_lexing;

pub use environment::{EnvironmentProvider, ProcessEnvironment, StaticEnvironment};
pub use reference_store::{
    InMemoryReferenceStore, KeychainReferenceStore, ReferenceStore, SECRETS_BACKEND_ENV_VAR, SecretsBackend, StoreError,
};
pub use shell_lexing::{LexError, split_command_line};

static SENSITIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(authorization: )([\w\-\.=:/+]+)",
        r"(?i)([A-Z0-9_]*?(KEY|TOKEN|SECRET|PASSWORD)[\x22']?\s*[=:]\s*[\x22']?)([^\s\x22',}]+)",
        r"(?i)(DATABASE_URL=)([^\s]+)",
        r"(https?://)([^\s/@:]+(:[^\s/@]*)?@)",
    ]
    .into_iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Redacts values that look like secrets in a string.
///
/// Covers authorization headers, `*_KEY`/`*_TOKEN`/`*_SECRET`/`*_PASSWORD` assignments (including
/// JSON `"token": "..."` pairs), database URLs, and credentials embedded in HTTP URLs.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for pattern in SENSITIVE_PATTERNS.iter() {
        redacted = pattern
            .replace_all(&redacted, |caps: &regex::Captures| {
                let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("{}<redacted>", prefix)
            })
            .to_string();
    }
    redacted
}
