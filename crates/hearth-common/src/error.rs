//! Unified error type for the hearth workspace

use thiserror::Error;

/// Result type alias for hearth operations
pub type Result<T> = std::result::Result<T, HearthError>;

/// Unified error type for all hearth automation operations
#[derive(Error, Debug, Clone)]
pub enum HearthError {
    /// Bad rule code, unknown rule, invalid rule_type, or other caller-supplied mistake
    #[error("Invalid input: {0}")]
    UserInput(String),

    /// A rule name collides with one already installed
    #[error("Rule '{0}' already exists")]
    DuplicateRule(String),

    /// Uninstall/lookup referenced a rule that isn't active
    #[error("Rule '{0}' not found")]
    RuleNotFound(String),

    /// The hub is unreachable or returned a non-2xx response
    #[error("Device I/O error: {0}")]
    DeviceIo(String),

    /// A condition's `evaluate()` failed; the condition is treated as false for the cycle
    #[error("Condition evaluation error: {0}")]
    ConditionEvaluation(String),

    /// A timer callback failed; the timer is still removed as normal
    #[error("Timer error: {0}")]
    Timer(String),

    /// Audit sink failure; never propagated to callers, logged only
    #[error("Audit error: {0}")]
    Audit(String),

    /// Serialization/deserialization failure at a JSON boundary
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Programming-error-class fault: a missing expected entry under the engine lock, etc.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HearthError {
    /// Errors that originate from caller mistakes rather than runtime failures.
    ///
    /// Installers should surface these directly; they never warrant a retry.
    pub fn is_user_fault(&self) -> bool {
        matches!(
            self,
            HearthError::UserInput(_)
                | HearthError::DuplicateRule(_)
                | HearthError::RuleNotFound(_)
        )
    }
}

impl From<serde_json::Error> for HearthError {
    fn from(err: serde_json::Error) -> Self {
        HearthError::Serialization(err.to_string())
    }
}
