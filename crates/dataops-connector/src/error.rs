//! Connector framework error types
//!
//! Error definitions with transient/permanent classification for retry logic.

use thiserror::Error;

/// Error that can occur during connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    // Connection errors (usually transient)
    /// Failed to establish connection to the target database.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection timed out.
    #[error("connection timeout after {timeout_secs} seconds")]
    ConnectionTimeout { timeout_secs: u64 },

    /// Target database is temporarily unavailable.
    #[error("target database unavailable: {message}")]
    TargetUnavailable { message: String },

    // Authentication errors (permanent)
    /// Invalid credentials provided.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    // Configuration errors (permanent)
    /// Connection profile or connector configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Database family is not supported by any registered connector.
    #[error("unsupported database family: {family}")]
    UnsupportedDatabase { family: String },

    /// Operation is not supported by this database family.
    #[error("operation '{operation}' not supported by {family}")]
    UnsupportedOperation { operation: String, family: String },

    // State errors
    /// Connector method called before `connect()` (or after `disconnect()`).
    #[error("connector is not connected")]
    NotConnected,

    /// No transaction is active for commit/rollback.
    #[error("no active transaction")]
    NoActiveTransaction,

    // Execution errors
    /// Query execution failed.
    #[error("query failed: {message}")]
    QueryFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Schema introspection failed.
    #[error("schema discovery failed: {message}")]
    SchemaDiscoveryFailed { message: String },

    /// Malformed input data (e.g. a document query that is not valid JSON).
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    // Encryption errors
    /// Credential encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed { message: String },

    /// Credential decryption failed.
    #[error("decryption failed: {message}")]
    DecryptionFailed { message: String },

    // Internal errors
    /// Internal error.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ConnectorError {
    /// Check if this error is transient and the operation should be retried.
    ///
    /// Transient errors are those caused by temporary conditions that may resolve
    /// themselves, such as network issues or temporary unavailability.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed { .. }
                | ConnectorError::ConnectionTimeout { .. }
                | ConnectorError::TargetUnavailable { .. }
        )
    }

    /// Check if this error is permanent and retry won't help.
    ///
    /// Permanent errors require human intervention or configuration changes.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ConnectorError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            ConnectorError::TargetUnavailable { .. } => "TARGET_UNAVAILABLE",
            ConnectorError::AuthenticationFailed => "AUTH_FAILED",
            ConnectorError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ConnectorError::UnsupportedDatabase { .. } => "UNSUPPORTED_DATABASE",
            ConnectorError::UnsupportedOperation { .. } => "UNSUPPORTED_OPERATION",
            ConnectorError::NotConnected => "NOT_CONNECTED",
            ConnectorError::NoActiveTransaction => "NO_ACTIVE_TRANSACTION",
            ConnectorError::QueryFailed { .. } => "QUERY_FAILED",
            ConnectorError::SchemaDiscoveryFailed { .. } => "SCHEMA_DISCOVERY_FAILED",
            ConnectorError::InvalidData { .. } => "INVALID_DATA",
            ConnectorError::EncryptionFailed { .. } => "ENCRYPTION_FAILED",
            ConnectorError::DecryptionFailed { .. } => "DECRYPTION_FAILED",
            ConnectorError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a query failed error.
    pub fn query_failed(message: impl Into<String>) -> Self {
        ConnectorError::QueryFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a query failed error with source.
    pub fn query_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::QueryFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        ConnectorError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported_operation(
        operation: impl Into<String>,
        family: impl Into<String>,
    ) -> Self {
        ConnectorError::UnsupportedOperation {
            operation: operation.into(),
            family: family.into(),
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        ConnectorError::InvalidData {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ConnectorError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error with source.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
