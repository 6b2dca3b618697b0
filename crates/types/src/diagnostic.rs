//! Non-fatal messages raised while a step runs.

use serde::{Deserialize, Serialize};

/// Style tag attached to diagnostics unless the producer overrides it.
pub const DEFAULT_DIAGNOSTIC_STYLE: &str = "yellow";

/// Category of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A deprecated step name or parameter was used.
    Deprecation,
    /// Any other warning surfaced by a step operation.
    Warning,
}

/// A message that never aborts the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    /// Presentation hint forwarded to the print sink (for example `"yellow"`).
    #[serde(default)]
    pub style: Option<String>,
}

impl Diagnostic {
    pub fn deprecation(message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::Deprecation,
            message: message.into(),
            style: Some(DEFAULT_DIAGNOSTIC_STYLE.to_string()),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::Warning,
            message: message.into(),
            style: Some(DEFAULT_DIAGNOSTIC_STYLE.to_string()),
        }
    }

    /// Replace the style tag; `None` requests unstyled output.
    pub fn with_style(mut self, style: Option<&str>) -> Self {
        self.style = style.map(str::to_string);
        self
    }
}

/// Collector handed to step operations so they can report diagnostics alongside their result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    /// Record a deprecation notice with the default style.
    pub fn deprecate(&mut self, message: impl Into<String>) {
        self.push(Diagnostic::deprecation(message));
    }

    /// Record a warning with the default style.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(Diagnostic::warning(message));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Append every diagnostic of `other`, preserving order.
    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}
