//! Connector traits
//!
//! The uniform surface every database family implements. Relational and
//! document engines expose the same operations; a family that cannot
//! support one returns `UnsupportedOperation` instead of panicking.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ConnectorResult;
use crate::profile::ConnectionProfile;
use crate::types::{
    DatabaseCapabilities, DatabaseFamily, HealthCheckResult, QueryResult, TableSchema,
};

/// Uniform database access for one connection profile.
///
/// Implementations hold their own pool/client state behind interior
/// mutability so a connector can be shared as `Arc<dyn Connector>`.
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// Database family this connector speaks.
    fn family(&self) -> DatabaseFamily;

    /// Id of the profile this connector was built from.
    fn profile_id(&self) -> Uuid;

    /// Human-readable name for logs.
    fn display_name(&self) -> String {
        format!("{}-connector", self.family())
    }

    /// Establish the connection (or pool). Idempotent.
    async fn connect(&self) -> ConnectorResult<()>;

    /// Tear down the connection. Idempotent.
    async fn disconnect(&self) -> ConnectorResult<()>;

    /// Whether a live connection is currently held.
    async fn is_connected(&self) -> bool;

    /// Probe the target with a cheap round trip and measure latency.
    ///
    /// A failed probe is a normal result, not an error: the outcome is
    /// carried in [`HealthCheckResult::healthy`].
    async fn test_connection(&self) -> ConnectorResult<HealthCheckResult>;

    /// Execute a query and return rows as JSON objects.
    ///
    /// For document stores the "query" is a JSON operation document
    /// rather than SQL.
    async fn execute_query(
        &self,
        query: &str,
        params: &[serde_json::Value],
    ) -> ConnectorResult<QueryResult>;

    /// Execute a DDL statement.
    async fn execute_ddl(&self, statement: &str) -> ConnectorResult<QueryResult>;

    /// List databases visible to this connection.
    async fn list_databases(&self) -> ConnectorResult<Vec<String>>;

    /// List schemas (namespaces) in the current database.
    async fn list_schemas(&self) -> ConnectorResult<Vec<String>>;

    /// List tables (or collections) in a schema.
    async fn list_tables(&self, schema: Option<&str>) -> ConnectorResult<Vec<String>>;

    /// Describe one table: columns, keys, indexes.
    async fn table_schema(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> ConnectorResult<TableSchema>;

    /// Begin a transaction on this connection.
    async fn begin_transaction(&self) -> ConnectorResult<()>;

    /// Commit the active transaction.
    ///
    /// Errors with `NoActiveTransaction` when none is open.
    async fn commit_transaction(&self) -> ConnectorResult<()>;

    /// Roll back the active transaction.
    async fn rollback_transaction(&self) -> ConnectorResult<()>;

    /// Probe the server for version, features and limits.
    async fn detect_capabilities(&self) -> ConnectorResult<DatabaseCapabilities>;
}

/// Builds connectors for one database family.
///
/// The connection registry holds one factory per family and dispatches
/// profile lookups through it.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    /// Family this factory builds connectors for.
    fn family(&self) -> DatabaseFamily;

    /// Build a connector for the profile.
    ///
    /// `connection_string` carries decrypted credentials and must not be
    /// retained beyond pool construction.
    async fn create(
        &self,
        profile: &ConnectionProfile,
        connection_string: &str,
    ) -> ConnectorResult<Arc<dyn Connector>>;
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectorError;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug)]
    struct StubConnector {
        profile_id: Uuid,
        connected: AtomicBool,
    }

    impl StubConnector {
        fn new() -> Self {
            Self {
                profile_id: Uuid::new_v4(),
                connected: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Connector for StubConnector {
        fn family(&self) -> DatabaseFamily {
            DatabaseFamily::Postgres
        }

        fn profile_id(&self) -> Uuid {
            self.profile_id
        }

        async fn connect(&self) -> ConnectorResult<()> {
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn disconnect(&self) -> ConnectorResult<()> {
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn test_connection(&self) -> ConnectorResult<HealthCheckResult> {
            Ok(HealthCheckResult::healthy(1))
        }

        async fn execute_query(
            &self,
            _query: &str,
            _params: &[serde_json::Value],
        ) -> ConnectorResult<QueryResult> {
            if !self.is_connected().await {
                return Err(ConnectorError::NotConnected);
            }
            Ok(QueryResult::default())
        }

        async fn execute_ddl(&self, _statement: &str) -> ConnectorResult<QueryResult> {
            Ok(QueryResult::default())
        }

        async fn list_databases(&self) -> ConnectorResult<Vec<String>> {
            Ok(vec!["app".to_string()])
        }

        async fn list_schemas(&self) -> ConnectorResult<Vec<String>> {
            Ok(vec!["public".to_string()])
        }

        async fn list_tables(&self, _schema: Option<&str>) -> ConnectorResult<Vec<String>> {
            Ok(vec![])
        }

        async fn table_schema(
            &self,
            table: &str,
            schema: Option<&str>,
        ) -> ConnectorResult<TableSchema> {
            Ok(TableSchema {
                name: table.to_string(),
                schema: Some(schema.unwrap_or("public").to_string()),
                columns: vec![],
                primary_keys: vec![],
                foreign_keys: vec![],
                indexes: vec![],
            })
        }

        async fn begin_transaction(&self) -> ConnectorResult<()> {
            Ok(())
        }

        async fn commit_transaction(&self) -> ConnectorResult<()> {
            Err(ConnectorError::NoActiveTransaction)
        }

        async fn rollback_transaction(&self) -> ConnectorResult<()> {
            Err(ConnectorError::NoActiveTransaction)
        }

        async fn detect_capabilities(&self) -> ConnectorResult<DatabaseCapabilities> {
            Ok(DatabaseCapabilities::default())
        }
    }

    #[tokio::test]
    async fn test_connector_as_trait_object() {
        let connector: Arc<dyn Connector> = Arc::new(StubConnector::new());

        assert!(!connector.is_connected().await);
        connector.connect().await.unwrap();
        assert!(connector.is_connected().await);

        let health = connector.test_connection().await.unwrap();
        assert!(health.healthy);

        connector.disconnect().await.unwrap();
        assert!(!connector.is_connected().await);
    }

    #[tokio::test]
    async fn test_default_display_name() {
        let connector = StubConnector::new();
        assert_eq!(connector.display_name(), "postgres-connector");
    }

    #[tokio::test]
    async fn test_query_requires_connection() {
        let connector = StubConnector::new();
        let err = connector.execute_query("SELECT 1", &[]).await.unwrap_err();
        assert_eq!(err.error_code(), "NOT_CONNECTED");
    }

    #[tokio::test]
    async fn test_commit_without_transaction() {
        let connector = StubConnector::new();
        let err = connector.commit_transaction().await.unwrap_err();
        assert_eq!(err.error_code(), "NO_ACTIVE_TRANSACTION");
    }
}
