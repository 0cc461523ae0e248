//! Document operation parsing
//!
//! Document stores have no SQL, so the uniform `execute_query` surface
//! carries a JSON operation document instead. This module parses and
//! validates it.

use mongodb::bson::Document;
use serde::Deserialize;

use dataops_connector::error::{ConnectorError, ConnectorResult};

/// Operation kind carried in a document query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentOperation {
    Find,
    Aggregate,
    Count,
    Distinct,
}

/// A parsed document-store operation.
///
/// ```json
/// {"collection": "users", "operation": "find", "filter": {"active": true}, "limit": 50}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentQuery {
    /// Target collection.
    pub collection: String,
    /// What to run against it.
    pub operation: DocumentOperation,
    /// Filter document for find/count/distinct.
    #[serde(default)]
    pub filter: Option<serde_json::Value>,
    /// Projection document for find.
    #[serde(default)]
    pub projection: Option<serde_json::Value>,
    /// Sort document for find.
    #[serde(default)]
    pub sort: Option<serde_json::Value>,
    /// Result cap for find.
    #[serde(default)]
    pub limit: Option<i64>,
    /// Results to skip for find.
    #[serde(default)]
    pub skip: Option<u64>,
    /// Aggregation pipeline for aggregate.
    #[serde(default)]
    pub pipeline: Option<Vec<serde_json::Value>>,
    /// Field name for distinct.
    #[serde(default)]
    pub field: Option<String>,
}

impl DocumentQuery {
    /// Parse an operation document from its JSON text form.
    pub fn parse(raw: &str) -> ConnectorResult<Self> {
        let query: Self = serde_json::from_str(raw).map_err(|e| {
            ConnectorError::invalid_data(format!("invalid document query: {e}"))
        })?;
        query.validate()?;
        Ok(query)
    }

    fn validate(&self) -> ConnectorResult<()> {
        if self.collection.trim().is_empty() {
            return Err(ConnectorError::invalid_data(
                "document query requires a collection",
            ));
        }
        match self.operation {
            DocumentOperation::Aggregate if self.pipeline.is_none() => Err(
                ConnectorError::invalid_data("aggregate operation requires a pipeline"),
            ),
            DocumentOperation::Distinct if self.field.is_none() => Err(
                ConnectorError::invalid_data("distinct operation requires a field"),
            ),
            _ => Ok(()),
        }
    }

    /// Filter as a BSON document, defaulting to match-all.
    pub fn filter_document(&self) -> ConnectorResult<Document> {
        match &self.filter {
            Some(value) => to_document(value),
            None => Ok(Document::new()),
        }
    }

    /// Projection as a BSON document, when present.
    pub fn projection_document(&self) -> ConnectorResult<Option<Document>> {
        self.projection.as_ref().map(to_document).transpose()
    }

    /// Sort as a BSON document, when present.
    pub fn sort_document(&self) -> ConnectorResult<Option<Document>> {
        self.sort.as_ref().map(to_document).transpose()
    }

    /// Pipeline stages as BSON documents.
    pub fn pipeline_documents(&self) -> ConnectorResult<Vec<Document>> {
        self.pipeline
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(to_document)
            .collect()
    }
}

fn to_document(value: &serde_json::Value) -> ConnectorResult<Document> {
    mongodb::bson::to_document(value)
        .map_err(|e| ConnectorError::invalid_data(format!("not a valid BSON document: {e}")))
}
