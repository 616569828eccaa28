//! Diagnostic reporting.
//!
//! This crate owns no logging dependency of its own: diagnostics are
//! surfaced through a plain callback the caller supplies, the same shape an
//! interactive command would use for a progress-bar callback.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

/// A sink for diagnostics raised mid-operation. `&mut dyn FnMut` rather than
/// a generic so drivers can pass it across call boundaries without infecting
/// every signature with a type parameter.
pub type DiagnosticSink<'a> = &'a mut dyn FnMut(Diagnostic);

/// A sink that discards everything, for callers that don't care.
pub fn null_sink(_: Diagnostic) {}
