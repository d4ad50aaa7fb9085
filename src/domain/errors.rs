//! Domain errors for the fleetcache system.

use thiserror::Error;

/// Errors raised by a backing key-value store.
///
/// Stores never retry; whatever the transport reports is surfaced here and
/// turned into [`DomainError::StoreUnavailable`] by the cache layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),
}

/// Domain-level errors that can occur in the fleetcache system.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Lock lost during execution of agent {agent_type}")]
    LockLostDuringExecution { agent_type: String },

    #[error("Node identity unresolved: {0}")]
    IdentityUnresolved(String),

    #[error("Invalid type name: {0:?}")]
    InvalidType(String),

    #[error("Invalid identifier pattern: {0}")]
    InvalidPattern(String),
}

/// Result type of cache and scheduling operations.
pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        DomainError::StoreUnavailable(err.to_string())
    }
}

/// Failure inside an [`ExecutionInstrumentation`] callback.
///
/// Distinct from execution errors: an instrumentation failure while reporting
/// an execution failure terminates the agent's schedule.
///
/// [`ExecutionInstrumentation`]: crate::domain::ports::ExecutionInstrumentation
#[derive(Debug, Error)]
#[error("Instrumentation callback {callback} failed for agent {agent_type}: {message}")]
pub struct InstrumentationError {
    /// Callback that failed, e.g. `execution_failed`.
    pub callback: &'static str,
    /// Agent whose cycle was being reported.
    pub agent_type: String,
    /// What the callback reported.
    pub message: String,
}

impl InstrumentationError {
    /// Error for `callback` reporting on `agent_type`.
    pub fn new(callback: &'static str, agent_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            callback,
            agent_type: agent_type.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_maps_to_store_unavailable() {
        let err: DomainError = StoreError::Connection("refused".to_string()).into();
        assert!(matches!(err, DomainError::StoreUnavailable(ref msg) if msg.contains("refused")));
    }

    #[test]
    fn test_json_error_maps_to_serialization_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: DomainError = json_err.into();
        assert!(matches!(err, DomainError::SerializationError(_)));
    }

    #[test]
    fn test_lock_lost_message_names_agent() {
        let err = DomainError::LockLostDuringExecution {
            agent_type: "aws/instances".to_string(),
        };
        assert_eq!(err.to_string(), "Lock lost during execution of agent aws/instances");
    }
}
