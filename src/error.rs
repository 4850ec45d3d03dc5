//! Panel error taxonomy.
//!
//! Every failure the panel can observe is one of these. None of them escape
//! into rendering: operations record the message in
//! [`PanelViewState::last_error`](crate::state::PanelViewState::last_error).

use crate::abi::AbiError;
use crate::sink::SinkError;

/// Grepable error code and retryable flag.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PanelError {
    #[error("No Safe connected")]
    SessionUnavailable,

    #[error("Failed to fetch {what}: {reason}")]
    ReadFailure { what: String, reason: String },

    #[error("Failed to fetch delegate info for {}", .failed.join(", "))]
    PartialReadFailure { failed: Vec<String> },

    #[error("Failed to submit transaction: {0}")]
    SubmissionFailure(#[from] SinkError),

    #[error("{0}")]
    InvalidAction(String),
}

impl PanelError {
    pub(crate) fn read(what: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ReadFailure { what: what.into(), reason: reason.to_string() }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidAction(message.into())
    }
}

impl From<AbiError> for PanelError {
    fn from(err: AbiError) -> Self {
        Self::read("return data", err)
    }
}

impl ErrorCode for PanelError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::SessionUnavailable => "E_SESSION_UNAVAILABLE",
            Self::ReadFailure { .. } => "E_READ_FAILURE",
            Self::PartialReadFailure { .. } => "E_PARTIAL_READ_FAILURE",
            Self::SubmissionFailure(_) => "E_SUBMISSION_FAILURE",
            Self::InvalidAction(_) => "E_INVALID_ACTION",
        }
    }

    fn retryable(&self) -> bool {
        matches!(
            self,
            Self::ReadFailure { .. }
                | Self::PartialReadFailure { .. }
                | Self::SubmissionFailure(SinkError::Transport(_))
        )
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
