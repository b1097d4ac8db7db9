//! Error types for pools and connector operations

use crate::connector::ConnectorKey;
use crate::operation::{OperationKind, Uid};
use std::time::Duration;
use thiserror::Error;

/// Error raised by a [`PoolHandler`](crate::PoolHandler) capability.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("No object became available within {0:?} - max objects exceeded")]
    PoolExhausted(Duration),

    #[error("Object pool already shut down")]
    PoolShutdown,

    #[error("Failed to construct a new pooled object: {0}")]
    Construction(#[source] HandlerError),

    #[error("Pooled object failed its health check: {0}")]
    Unhealthy(#[source] HandlerError),

    #[error("Attempt to return an object that is not active in this pool")]
    InvalidReturn,

    #[error("Invalid pool configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to dispose pooled object: {0}")]
    Disposal(#[source] HandlerError),

    #[error("Pool handler failed to shut down: {0}")]
    HandlerShutdown(#[source] HandlerError),

    #[error("Operation was cancelled")]
    Cancelled,
}

pub type PoolResult<T> = Result<T, PoolError>;

/// Errors crossing the facade boundary
#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Operation {operation} timed out after {timeout:?}")]
    Timeout {
        operation: OperationKind,
        timeout: Duration,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Operation {0} is not supported by this connector")]
    UnsupportedOperation(OperationKind),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Connector failure: {0}")]
    Connector(String),

    #[error("Connector {0} does not support pooling")]
    NotPoolable(ConnectorKey),

    #[error("Connector facade has been disposed")]
    Disposed,

    #[error("More than one object matched uid {0}")]
    MultipleResults(Uid),
}

impl ConnectorError {
    /// Shorthand for a connector-side failure.
    pub fn connector(message: impl Into<String>) -> Self {
        Self::Connector(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Classify the failure for logging and caller-side retry decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Pool(PoolError::PoolExhausted(_)) => ErrorKind::PoolExhausted,
            Self::Pool(PoolError::PoolShutdown) => ErrorKind::PoolShutdown,
            Self::Pool(PoolError::Construction(_)) => ErrorKind::ResourceConstruction,
            Self::Pool(PoolError::Unhealthy(_)) => ErrorKind::ResourceUnhealthy,
            Self::Pool(PoolError::InvalidReturn) => ErrorKind::InvalidReturn,
            Self::Pool(PoolError::InvalidConfiguration(_)) | Self::Configuration(_) => {
                ErrorKind::ConfigurationValidation
            }
            Self::Pool(PoolError::Disposal(_)) | Self::Pool(PoolError::HandlerShutdown(_)) => {
                ErrorKind::Disposal
            }
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Pool(PoolError::Cancelled) => ErrorKind::Cancelled,
            Self::Connector(_) | Self::MultipleResults(_) => ErrorKind::Connector,
            Self::UnsupportedOperation(_)
            | Self::InvalidArgument(_)
            | Self::NotPoolable(_)
            | Self::Disposed => ErrorKind::Usage,
        }
    }

    /// Whether the caller may reasonably retry the same call later.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::PoolExhausted | ErrorKind::Timeout)
    }
}

/// Failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PoolExhausted,
    PoolShutdown,
    ResourceConstruction,
    ResourceUnhealthy,
    InvalidReturn,
    Disposal,
    Timeout,
    Cancelled,
    ConfigurationValidation,
    Connector,
    Usage,
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let err = ConnectorError::from(PoolError::PoolExhausted(Duration::from_millis(5)));
        assert_eq!(err.kind(), ErrorKind::PoolExhausted);
        assert!(err.is_retryable());

        let err = ConnectorError::from(PoolError::PoolShutdown);
        assert_eq!(err.kind(), ErrorKind::PoolShutdown);
        assert!(!err.is_retryable());

        let err = ConnectorError::Timeout {
            operation: OperationKind::Search,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.to_string().contains("Search"));
    }

    #[test]
    fn test_construction_error_keeps_source() {
        let err = PoolError::Construction("boom".into());
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("boom"));
    }
}
