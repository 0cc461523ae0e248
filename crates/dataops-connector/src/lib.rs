//! Connector framework for operational databases.
//!
//! Provides a uniform [`Connector`](traits::Connector) surface over
//! relational and document stores, a [`ConnectionManager`](manager::ConnectionManager)
//! that caches live connectors per profile, encrypted credential storage
//! via the [`CredentialVault`](crypto::CredentialVault), and retry
//! helpers for transient connection failures.

pub mod crypto;
pub mod error;
pub mod manager;
pub mod profile;
pub mod resilience;
pub mod traits;
pub mod types;

pub use crypto::{generate_master_key, generate_master_key_hex, CredentialVault};
pub use error::{ConnectorError, ConnectorResult};
pub use manager::ConnectionManager;
pub use profile::ConnectionProfile;
pub use resilience::{RetryConfig, RetryExecutor};
pub use traits::{Connector, ConnectorFactory};
pub use types::{
    AccessMode, ColumnInfo, DatabaseCapabilities, DatabaseFamily, ForeignKeyInfo,
    HealthCheckResult, HealthStatus, IndexInfo, QueryResult, TableSchema,
};

/// Commonly used items.
pub mod prelude {
    pub use crate::crypto::CredentialVault;
    pub use crate::error::{ConnectorError, ConnectorResult};
    pub use crate::manager::ConnectionManager;
    pub use crate::profile::ConnectionProfile;
    pub use crate::traits::{Connector, ConnectorFactory};
    pub use crate::types::{
        AccessMode, DatabaseCapabilities, DatabaseFamily, HealthCheckResult, HealthStatus,
        QueryResult, TableSchema,
    };
}
