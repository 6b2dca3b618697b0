//! Shared type definitions for the Rigger workspace.
//!
//! The engine, utilities, and command-line binary all exchange the same handful of
//! wire-level shapes: a step entry as authored in a pipeline document, the non-fatal
//! diagnostics a step may raise, and the document that groups steps into sections.

pub mod diagnostic;
pub mod document;
pub mod step;

pub use diagnostic::{DEFAULT_DIAGNOSTIC_STYLE, Diagnostic, DiagnosticKind, Diagnostics};
pub use document::{DEFAULT_SECTION, DocumentError, PipelineDocument};
pub use step::{FormatError, RESERVED_PARAMETER_KEYS, STEP_ID_KEY, STEP_REQUIRES_KEY, StepSpec};
