//! Error taxonomy shared by every contract.
//!
//! Each module keeps its own `thiserror` enum. This module only answers the
//! question an operator asks first: *is this my input, the auction's state,
//! somebody else's ledger, or a permissions problem?*

use serde::{Deserialize, Serialize};

/// The four kinds of rejection a contract can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Rejected before any state change. Retry with corrected input.
    Admission,
    /// Reflects the state machine. Retrying only helps after the state
    /// changes (e.g. the auction expires).
    State,
    /// A value-transfer collaborator failed. Never retried automatically.
    Collaborator,
    /// The caller lacks the capability. Fatal to the call.
    Authorization,
}

impl ErrorClass {
    /// Whether resubmitting the same call can ever succeed without a change
    /// in input or state.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorClass::Admission)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Admission => write!(f, "admission"),
            ErrorClass::State => write!(f, "state"),
            ErrorClass::Collaborator => write!(f, "collaborator"),
            ErrorClass::Authorization => write!(f, "authorization"),
        }
    }
}

/// Implemented by every contract error enum.
pub trait Classified {
    /// Taxonomy bucket of this error.
    fn class(&self) -> ErrorClass;

    /// Stable, machine-readable error code (e.g. `"BidTooLow"`).
    fn code(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_admission_errors_are_retryable() {
        assert!(ErrorClass::Admission.is_retryable());
        assert!(!ErrorClass::State.is_retryable());
        assert!(!ErrorClass::Collaborator.is_retryable());
        assert!(!ErrorClass::Authorization.is_retryable());
    }

    #[test]
    fn class_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorClass::Collaborator).unwrap();
        assert_eq!(json, "\"collaborator\"");
    }
}
