//! MongoDB connector for the dataops connector framework.
//!
//! Queries are JSON operation documents rather than SQL; see
//! [`query::DocumentQuery`] for the accepted shape. Register a
//! [`MongoConnectorFactory`] with the connection manager to serve
//! profiles in the mongodb family.

pub mod connector;
pub mod query;

pub use connector::{MongoConnector, MongoConnectorFactory};
pub use query::{DocumentOperation, DocumentQuery};
