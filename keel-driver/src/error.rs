//! Error types for drivers and the driver registry

use keel_core::domain::engine::{Capability, Engine};
use keel_core::domain::task::FailureReason;
use thiserror::Error;

/// Errors reported by a driver
#[derive(Debug, Error)]
pub enum DriverError {
    /// The engine cannot perform this operation at all
    #[error("{capability} for {engine} is not implemented yet")]
    CapabilityNotImplemented {
        engine: Engine,
        capability: Capability,
    },

    /// The connection could not be established or was lost
    #[error("connection error: {0}")]
    Connection(String),

    /// The engine rejected or failed the operation
    #[error("execution failed: {0}")]
    Execution(String),

    /// The requested role does not exist
    #[error("role '{0}' not found")]
    RoleNotFound(String),

    /// The request is malformed for this engine
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DriverError {
    pub fn not_implemented(engine: Engine, capability: Capability) -> Self {
        Self::CapabilityNotImplemented { engine, capability }
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::CapabilityNotImplemented { .. })
    }

    /// Whether another attempt could possibly succeed.
    ///
    /// Non-support is permanent, and so is a malformed request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Execution(_))
    }

    /// Reason recorded on a task that failed with this error
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::CapabilityNotImplemented { .. } => FailureReason::CapabilityNotImplemented,
            Self::Connection(_) => FailureReason::ConnectionError,
            Self::Execution(_) | Self::RoleNotFound(_) | Self::InvalidRequest(_) => {
                FailureReason::ExecutionFailure
            }
        }
    }
}

impl From<sqlx::Error> for DriverError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Configuration(_) => DriverError::Connection(err.to_string()),
            other => DriverError::Execution(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for DriverError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            DriverError::Connection(err.to_string())
        } else {
            DriverError::Execution(err.to_string())
        }
    }
}

/// Errors returned when resolving a driver
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No adapter is registered for the engine
    #[error("no driver registered for engine {0}")]
    UnsupportedEngine(Engine),

    /// The adapter could not establish or validate its connection
    #[error("failed to connect to {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: DriverError,
    },
}

impl RegistryError {
    /// Reason recorded on a task whose driver could not be resolved
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::UnsupportedEngine(_) => FailureReason::UnsupportedEngine,
            Self::Connection { .. } => FailureReason::ConnectionError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_implemented_message() {
        let err = DriverError::not_implemented(Engine::ClickHouse, Capability::CreateRole);
        assert_eq!(
            err.to_string(),
            "create role for ClickHouse is not implemented yet"
        );
        assert!(err.is_not_implemented());
        assert!(!err.is_retryable());
        assert_eq!(err.failure_reason(), FailureReason::CapabilityNotImplemented);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(DriverError::Connection("reset".into()).is_retryable());
        assert!(DriverError::Execution("deadlock".into()).is_retryable());
        assert!(!DriverError::RoleNotFound("x".into()).is_retryable());
        assert!(!DriverError::InvalidRequest("x".into()).is_retryable());
    }

    #[test]
    fn test_registry_failure_reasons() {
        assert_eq!(
            RegistryError::UnsupportedEngine(Engine::Oracle).failure_reason(),
            FailureReason::UnsupportedEngine
        );
        let err = RegistryError::Connection {
            target: "db".into(),
            source: DriverError::Connection("refused".into()),
        };
        assert_eq!(err.failure_reason(), FailureReason::ConnectionError);
    }
}
