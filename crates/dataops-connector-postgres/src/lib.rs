//! PostgreSQL connector for the dataops connector framework.
//!
//! Built on SQLx with a lazily created connection pool. Register a
//! [`PostgresConnectorFactory`] with the connection manager to serve
//! profiles in the postgres family.

pub mod connector;

pub use connector::{PostgresConnector, PostgresConnectorFactory};
