use thiserror::Error;

/// Errors produced by the provisioning components.
///
/// `NotFound` is the only recoverable absence; lookups that return `Option`
/// have already folded it away. Everything else propagates to the caller.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("concurrency token mismatch: {0}")]
    Conflict(String),
    #[error("{service} {operation} failed ({code}): {message}")]
    Provider {
        service: &'static str,
        operation: &'static str,
        code: String,
        message: String,
        transient: bool,
    },
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("certificate validation timed out: {0}")]
    ValidationTimedOut(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl ProvisionError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_state(what: impl Into<String>) -> Self {
        Self::InvalidState(what.into())
    }

    pub fn invalid_input(what: impl Into<String>) -> Self {
        Self::InvalidInput(what.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Whether a caller may reasonably retry a read that failed this way.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Provider { transient, .. } => *transient,
            Self::Timeout(_) => true,
            _ => false,
        }
    }
}

pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;
