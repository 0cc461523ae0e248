//! Core connector types
//!
//! Database family tags, health status, access modes, and the structured
//! result types every connector returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Database family a connector speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseFamily {
    /// PostgreSQL.
    Postgres,
    /// MySQL.
    Mysql,
    /// MariaDB (wire-compatible with MySQL).
    Mariadb,
    /// SQLite (file-based, no host/port).
    Sqlite,
    /// MongoDB document store.
    Mongodb,
}

impl DatabaseFamily {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseFamily::Postgres => "postgres",
            DatabaseFamily::Mysql => "mysql",
            DatabaseFamily::Mariadb => "mariadb",
            DatabaseFamily::Sqlite => "sqlite",
            DatabaseFamily::Mongodb => "mongodb",
        }
    }

    /// Default port for this family, if it is a server database.
    #[must_use]
    pub fn default_port(&self) -> Option<u16> {
        match self {
            DatabaseFamily::Postgres => Some(5432),
            DatabaseFamily::Mysql | DatabaseFamily::Mariadb => Some(3306),
            DatabaseFamily::Sqlite => None,
            DatabaseFamily::Mongodb => Some(27017),
        }
    }

    /// Whether this family is a relational SQL engine.
    #[must_use]
    pub fn is_relational(&self) -> bool {
        !matches!(self, DatabaseFamily::Mongodb)
    }
}

impl fmt::Display for DatabaseFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DatabaseFamily {
    type Err = ParseDatabaseFamilyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DatabaseFamily::Postgres),
            "mysql" => Ok(DatabaseFamily::Mysql),
            "mariadb" => Ok(DatabaseFamily::Mariadb),
            "sqlite" => Ok(DatabaseFamily::Sqlite),
            "mongodb" | "mongo" => Ok(DatabaseFamily::Mongodb),
            _ => Err(ParseDatabaseFamilyError(s.to_string())),
        }
    }
}

/// Error parsing a [`DatabaseFamily`] from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDatabaseFamilyError(pub String);

impl fmt::Display for ParseDatabaseFamilyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown database family: {}", self.0)
    }
}

impl std::error::Error for ParseDatabaseFamilyError {}

/// Rolling health classification of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Last probe succeeded.
    Online,
    /// Probe failing but below the offline threshold.
    Degraded,
    /// Probe failing at or above the offline threshold, or probing raised.
    Offline,
    /// Never checked.
    #[default]
    Unknown,
}

impl HealthStatus {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Online => "online",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Offline => "offline",
            HealthStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HealthStatus {
    type Err = ParseHealthStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "online" => Ok(HealthStatus::Online),
            "degraded" => Ok(HealthStatus::Degraded),
            "offline" => Ok(HealthStatus::Offline),
            "unknown" => Ok(HealthStatus::Unknown),
            _ => Err(ParseHealthStatusError(s.to_string())),
        }
    }
}

/// Error parsing a [`HealthStatus`] from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseHealthStatusError(pub String);

impl fmt::Display for ParseHealthStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown health status: {}", self.0)
    }
}

impl std::error::Error for ParseHealthStatusError {}

/// Access mode granted to a connection profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Full read-write access.
    #[default]
    ReadWrite,
    /// Read-only access.
    ReadOnly,
    /// Maintenance window access.
    Maintenance,
}

impl AccessMode {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::ReadWrite => "read_write",
            AccessMode::ReadOnly => "read_only",
            AccessMode::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AccessMode {
    type Err = ParseAccessModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "read_write" | "readwrite" => Ok(AccessMode::ReadWrite),
            "read_only" | "readonly" => Ok(AccessMode::ReadOnly),
            "maintenance" => Ok(AccessMode::Maintenance),
            _ => Err(ParseAccessModeError(s.to_string())),
        }
    }
}

/// Error parsing an [`AccessMode`] from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAccessModeError(pub String);

impl fmt::Display for ParseAccessModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown access mode: {}", self.0)
    }
}

impl std::error::Error for ParseAccessModeError {}

/// Result of a connection health probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Whether the probe succeeded.
    pub healthy: bool,
    /// Probe round-trip time in milliseconds.
    pub response_time_ms: u64,
    /// Error message when the probe failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// When the probe ran.
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckResult {
    /// Build a successful probe result.
    #[must_use]
    pub fn healthy(response_time_ms: u64) -> Self {
        Self {
            healthy: true,
            response_time_ms,
            error_message: None,
            checked_at: Utc::now(),
        }
    }

    /// Build a failed probe result.
    pub fn unhealthy(response_time_ms: u64, error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            response_time_ms,
            error_message: Some(error.into()),
            checked_at: Utc::now(),
        }
    }
}

/// Structured result of a query execution.
///
/// Expected failures (bad query, unreachable host) surface as
/// `ConnectorError`; this type only represents a completed execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names, in result order. Empty for statements without a result set.
    pub columns: Vec<String>,
    /// Rows as JSON objects keyed by column name.
    pub rows: Vec<serde_json::Value>,
    /// Number of rows in the result set.
    pub row_count: u64,
    /// Rows affected by a write statement.
    pub rows_affected: u64,
    /// Wall-clock execution time in milliseconds.
    pub execution_time_ms: u64,
}

/// One column of a table (or inferred document field).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Engine-reported data type.
    pub data_type: String,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Default expression, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Whether the column participates in the primary key.
    pub is_primary_key: bool,
}

/// Foreign key edge from a column to a referenced table/column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    /// Local column name.
    pub column: String,
    /// Referenced table.
    pub references_table: String,
    /// Referenced column.
    pub references_column: String,
}

/// Index on a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Indexed columns.
    pub columns: Vec<String>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

/// Full schema of a table (or collection).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Owning schema (database for document stores).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Columns.
    pub columns: Vec<ColumnInfo>,
    /// Primary key column names.
    pub primary_keys: Vec<String>,
    /// Foreign key edges.
    pub foreign_keys: Vec<ForeignKeyInfo>,
    /// Indexes.
    pub indexes: Vec<IndexInfo>,
}

/// Detected capabilities of a database engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseCapabilities {
    /// Engine version string.
    pub version: String,
    /// Multi-statement transaction support.
    pub supports_transactions: bool,
    /// Stored procedure / server-side routine support.
    pub supports_stored_procedures: bool,
    /// View support.
    pub supports_views: bool,
    /// Materialized view support.
    pub supports_materialized_views: bool,
    /// Native JSON support.
    pub supports_json: bool,
    /// Full-text search support.
    pub supports_full_text_search: bool,
    /// Configured connection ceiling, when the engine reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
    /// Engine-specific feature names.
    #[serde(default)]
    pub features: Vec<String>,
    /// Installed extensions/plugins.
    #[serde(default)]
    pub extensions: Vec<String>,
}

impl DatabaseCapabilities {
    /// Check a named feature flag (`transactions`, `stored_procedures`,
    /// `views`, `materialized_views`, `json`, `full_text_search`).
    #[must_use]
    pub fn supports_feature(&self, feature: &str) -> bool {
        match feature {
            "transactions" => self.supports_transactions,
            "stored_procedures" => self.supports_stored_procedures,
            "views" => self.supports_views,
            "materialized_views" => self.supports_materialized_views,
            "json" => self.supports_json,
            "full_text_search" => self.supports_full_text_search,
            _ => false,
        }
    }
}
