//! Diagnostics for ill-typed intermediate code.
//!
//! A failure of the IR checker indicates a bug in an earlier pass, never
//! an error in the user's program; the diagnostic severity is accordingly
//! [`Bug`](codespan_reporting::diagnostic::Severity::Bug). The driver
//! prints the diagnostic and exits.

use std::fmt;

use codespan_reporting::diagnostic::{Diagnostic, Label};

use crate::source::Span;

/// The single error produced by a failing run of the IR checker. Carries
/// the name of the pass after which the tree was found to be ill-typed.
#[derive(Debug, Clone)]
pub struct CheckError {
    pub phase: String,
    pub span: Span,
    pub message: String,
}

impl CheckError {
    pub fn new(phase: impl Into<String>, span: Span, message: impl Into<String>) -> CheckError {
        CheckError {
            phase: phase.into(),
            span,
            message: message.into(),
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        let diagnostic = Diagnostic::bug()
            .with_message(format!(
                "ill-typed intermediate code after {}",
                self.phase
            ))
            .with_notes(vec![format!("IR type error: {}", self.message)]);
        match self.span.range() {
            Some(range) => diagnostic.with_labels(vec![
                Label::primary(range.file_id, range.range).with_message(self.message.clone())
            ]),
            None => diagnostic,
        }
    }
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ill-typed intermediate code after {}: {}: IR type error: {}",
            self.phase, self.span, self.message
        )
    }
}

impl std::error::Error for CheckError {}
