//! Error types shared by the blockloc crates

use thiserror::Error;

/// Fatal session errors.
///
/// An operator abort is not represented here: it ends a session early but
/// keeps every record captured so far, see `SessionStatus::Aborted`.
#[derive(Error, Debug)]
pub enum ParadigmError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Trigger wait failed: {0}")]
    TriggerWaitFailure(#[source] std::io::Error),

    #[error("Display failed: {0}")]
    Display(#[source] std::io::Error),

    #[error("Recording failed: {0}")]
    Record(#[source] std::io::Error),

    #[error("Malformed table at line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

impl ParadigmError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        ParadigmError::InvalidConfiguration(reason.into())
    }

    pub(crate) fn parse(line: usize, reason: impl Into<String>) -> Self {
        ParadigmError::Parse {
            line,
            reason: reason.into(),
        }
    }
}

/// Result type for blockloc operations
pub type Result<T> = std::result::Result<T, ParadigmError>;
