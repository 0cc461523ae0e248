//! Stored procedure executor
//!
//! Invokes a stored procedure or function with positional parameters.
//! Procedure and schema names are restricted to plain identifiers and
//! checked against the catalog, since they are interpolated into the
//! call statement.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

use crate::error::{JobError, JobResult};
use crate::executor::{
    redact_secrets, ExecutionContext, ExecutionLog, JobExecutor, Permission, ValidationResult,
    PREVIEW_ROW_LIMIT,
};
use crate::model::JobType;
use dataops_connector::traits::Connector;

#[derive(Debug, Deserialize)]
struct ProcedureConfig {
    procedure_name: String,
    #[serde(default = "default_schema")]
    schema: String,
    #[serde(default)]
    params: Vec<serde_json::Value>,
    #[serde(default)]
    is_function: bool,
}

fn default_schema() -> String {
    "public".to_string()
}

fn parse_config(configuration: &serde_json::Value) -> JobResult<ProcedureConfig> {
    let config: ProcedureConfig = serde_json::from_value(configuration.clone())
        .map_err(|e| JobError::validation_failed(vec![format!("invalid configuration: {e}")]))?;
    if config.procedure_name.trim().is_empty() {
        return Err(JobError::validation_failed(vec![
            "procedure_name is required".to_string(),
        ]));
    }
    Ok(config)
}

/// Plain SQL identifier: letter or underscore, then letters, digits or
/// underscores.
fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A routine found in the target's catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureInfo {
    pub name: String,
    pub schema: String,
    /// PROCEDURE or FUNCTION.
    pub routine_type: String,
    pub return_type: Option<String>,
}

/// A typed parameter of a catalog routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterInfo {
    pub name: Option<String>,
    pub data_type: String,
    /// IN, OUT or INOUT.
    pub mode: String,
    pub position: i64,
}

/// List routines in a schema from the catalog.
pub async fn discover_procedures(
    connector: &Arc<dyn Connector>,
    schema: &str,
) -> JobResult<Vec<ProcedureInfo>> {
    let result = connector
        .execute_query(
            "SELECT routine_name, routine_schema, routine_type, data_type \
             FROM information_schema.routines \
             WHERE routine_schema = $1 \
             ORDER BY routine_name",
            &[json!(schema)],
        )
        .await?;

    Ok(result
        .rows
        .iter()
        .map(|row| ProcedureInfo {
            name: row["routine_name"].as_str().unwrap_or_default().to_string(),
            schema: row["routine_schema"].as_str().unwrap_or_default().to_string(),
            routine_type: row["routine_type"].as_str().unwrap_or_default().to_string(),
            return_type: row["data_type"].as_str().map(str::to_string),
        })
        .collect())
}

/// List the typed parameters of one routine.
pub async fn procedure_parameters(
    connector: &Arc<dyn Connector>,
    schema: &str,
    procedure_name: &str,
) -> JobResult<Vec<ParameterInfo>> {
    let result = connector
        .execute_query(
            "SELECT p.parameter_name, p.data_type, p.parameter_mode, p.ordinal_position \
             FROM information_schema.parameters p \
             JOIN information_schema.routines r \
               ON p.specific_name = r.specific_name \
             WHERE r.routine_schema = $1 AND r.routine_name = $2 \
             ORDER BY p.ordinal_position",
            &[json!(schema), json!(procedure_name)],
        )
        .await?;

    Ok(result
        .rows
        .iter()
        .map(|row| ParameterInfo {
            name: row["parameter_name"].as_str().map(str::to_string),
            data_type: row["data_type"].as_str().unwrap_or_default().to_string(),
            mode: row["parameter_mode"].as_str().unwrap_or("IN").to_string(),
            position: row["ordinal_position"].as_i64().unwrap_or_default(),
        })
        .collect())
}

/// Build the invocation statement with positional placeholders.
fn build_call(schema: &str, name: &str, param_count: usize, is_function: bool) -> String {
    let placeholders: Vec<String> = (1..=param_count).map(|i| format!("${i}")).collect();
    let arguments = placeholders.join(", ");
    if is_function {
        format!("SELECT {schema}.{name}({arguments})")
    } else {
        format!("CALL {schema}.{name}({arguments})")
    }
}

/// Executes stored procedures and functions.
#[derive(Debug, Default)]
pub struct ProcedureExecutor;

#[async_trait]
impl JobExecutor for ProcedureExecutor {
    fn job_type(&self) -> JobType {
        JobType::StoredProcedure
    }

    fn required_permissions(&self, _configuration: &serde_json::Value) -> Vec<Permission> {
        vec![Permission::Execute]
    }

    async fn validate(&self, context: &ExecutionContext) -> JobResult<ValidationResult> {
        let mut result = ValidationResult::default();

        let config = match parse_config(&context.job.configuration) {
            Ok(config) => config,
            Err(JobError::ValidationFailed { messages }) => {
                for message in messages {
                    result.error(message);
                }
                return Ok(result);
            }
            Err(e) => return Err(e),
        };

        if !is_plain_identifier(&config.procedure_name) {
            result.error(format!(
                "procedure_name '{}' is not a plain identifier",
                config.procedure_name
            ));
        }
        if !is_plain_identifier(&config.schema) {
            result.error(format!("schema '{}' is not a plain identifier", config.schema));
        }
        if !result.is_valid() {
            return Ok(result);
        }

        // Catalog check when a connector is available
        if let Some(connector) = &context.connector {
            let known = discover_procedures(connector, &config.schema).await?;
            if !known.iter().any(|p| p.name == config.procedure_name) {
                result.error(format!(
                    "procedure '{}.{}' not found in catalog",
                    config.schema, config.procedure_name
                ));
            }
        }

        Ok(result)
    }

    #[instrument(skip_all, fields(job_id = %context.job.id, execution_id = %context.execution_id))]
    async fn execute(
        &self,
        context: &ExecutionContext,
        log: &mut ExecutionLog,
    ) -> JobResult<serde_json::Value> {
        let config = parse_config(&context.job.configuration)?;
        let connector = context.connector.as_ref().ok_or_else(|| {
            JobError::execution_failed("procedure executor requires a connector")
        })?;

        if !is_plain_identifier(&config.procedure_name) || !is_plain_identifier(&config.schema) {
            return Err(JobError::validation_failed(vec![format!(
                "'{}.{}' is not a callable identifier",
                config.schema, config.procedure_name
            )]));
        }

        let statement = build_call(
            &config.schema,
            &config.procedure_name,
            config.params.len(),
            config.is_function,
        );

        log.info(format!(
            "invoking {} {}.{} with {} parameter(s)",
            if config.is_function { "function" } else { "procedure" },
            config.schema,
            config.procedure_name,
            config.params.len()
        ));
        if !config.params.is_empty() {
            let sanitized = redact_secrets(&serde_json::Value::Array(config.params.clone()));
            log.info(format!("parameters: {sanitized}"));
        }

        let query_result = match connector.execute_query(&statement, &config.params).await {
            Ok(result) => result,
            Err(e) => {
                log.error(format!("invocation failed: {e}"));
                return Err(e.into());
            }
        };

        let total_rows = query_result.row_count;
        let truncated = query_result.rows.len() > PREVIEW_ROW_LIMIT;
        let preview: Vec<serde_json::Value> = query_result
            .rows
            .iter()
            .take(PREVIEW_ROW_LIMIT)
            .cloned()
            .collect();

        log.info(format!(
            "invocation complete: {} row(s) in {} ms",
            total_rows, query_result.execution_time_ms
        ));

        Ok(json!({
            "procedure": format!("{}.{}", config.schema, config.procedure_name),
            "is_function": config.is_function,
            "columns": query_result.columns,
            "preview": preview,
            "total_rows": total_rows,
            "truncated": truncated,
            "execution_time_ms": query_result.execution_time_ms,
        }))
    }
}
