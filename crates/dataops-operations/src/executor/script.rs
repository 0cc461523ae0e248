//! SQL script executor
//!
//! Runs an ad-hoc SQL script against the job's connection, optionally
//! inside a transaction. Read-only jobs statically reject write and DDL
//! statements before anything touches the database; the check is a
//! word-boundary keyword scan, not a SQL parse.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::error::{JobError, JobResult};
use crate::executor::{
    redact_secrets, ExecutionContext, ExecutionLog, JobExecutor, Permission, ValidationResult,
    PREVIEW_ROW_LIMIT,
};
use crate::model::JobType;

/// Keywords a read-only script must not contain.
const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "CREATE", "ALTER", "DROP", "TRUNCATE",
];

/// Two-word phrases that always draw a warning.
const DESTRUCTIVE_PHRASES: &[(&str, &str)] = &[
    ("DROP", "DATABASE"),
    ("DROP", "SCHEMA"),
    ("TRUNCATE", "TABLE"),
];

#[derive(Debug, Deserialize)]
struct ScriptConfig {
    sql_script: String,
    #[serde(default)]
    params: Vec<serde_json::Value>,
    #[serde(default = "default_use_transaction")]
    use_transaction: bool,
    #[serde(default)]
    read_only: bool,
}

fn default_use_transaction() -> bool {
    true
}

fn parse_config(configuration: &serde_json::Value) -> JobResult<ScriptConfig> {
    let config: ScriptConfig = serde_json::from_value(configuration.clone())
        .map_err(|e| JobError::validation_failed(vec![format!("invalid configuration: {e}")]))?;
    if config.sql_script.trim().is_empty() {
        return Err(JobError::validation_failed(vec![
            "sql_script is required".to_string(),
        ]));
    }
    Ok(config)
}

/// Uppercased word tokens of a script, for keyword scanning.
fn script_words(script: &str) -> Vec<String> {
    script
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_uppercase)
        .collect()
}

/// Executes ad-hoc SQL scripts.
#[derive(Debug, Default)]
pub struct ScriptExecutor;

#[async_trait]
impl JobExecutor for ScriptExecutor {
    fn job_type(&self) -> JobType {
        JobType::SqlScript
    }

    /// Infer the privileges the script actually uses.
    fn required_permissions(&self, configuration: &serde_json::Value) -> Vec<Permission> {
        let script = configuration
            .get("sql_script")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let words = script_words(script);

        let mut permissions = Vec::new();
        if words.iter().any(|w| w == "SELECT") {
            permissions.push(Permission::Select);
        }
        if words.iter().any(|w| w == "INSERT") {
            permissions.push(Permission::Insert);
        }
        if words.iter().any(|w| w == "UPDATE") {
            permissions.push(Permission::Update);
        }
        if words.iter().any(|w| w == "DELETE") {
            permissions.push(Permission::Delete);
        }
        if words
            .iter()
            .any(|w| ["CREATE", "ALTER", "DROP", "TRUNCATE"].contains(&w.as_str()))
        {
            permissions.push(Permission::Ddl);
        }
        permissions
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

        let words = script_words(&config.sql_script);

        for (first, second) in DESTRUCTIVE_PHRASES {
            if words
                .windows(2)
                .any(|pair| pair[0] == *first && pair[1] == *second)
            {
                result.warning(format!(
                    "script contains destructive statement: {first} {second}"
                ));
            }
        }

        if config.read_only {
            for keyword in WRITE_KEYWORDS {
                if words.iter().any(|w| w == keyword) {
                    result.error(format!(
                        "read-only job must not contain {keyword} statements"
                    ));
                }
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
        let connector = context
            .connector
            .as_ref()
            .ok_or_else(|| JobError::execution_failed("script executor requires a connector"))?;

        log.info(format!(
            "executing SQL script ({} chars, transaction={}, read_only={})",
            config.sql_script.len(),
            config.use_transaction,
            config.read_only
        ));
        if !config.params.is_empty() {
            let sanitized = redact_secrets(&serde_json::Value::Array(config.params.clone()));
            log.info(format!("parameters: {sanitized}"));
        }

        if config.use_transaction {
            connector.begin_transaction().await?;
        }

        let query_result = match connector
            .execute_query(&config.sql_script, &config.params)
            .await
        {
            Ok(result) => {
                if config.use_transaction {
                    connector.commit_transaction().await?;
                    log.info("transaction committed");
                }
                result
            }
            Err(e) => {
                if config.use_transaction {
                    if let Err(rollback_err) = connector.rollback_transaction().await {
                        log.error(format!("rollback failed: {rollback_err}"));
                    } else {
                        log.info("transaction rolled back");
                    }
                }
                log.error(format!("script failed: {e}"));
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
            "script complete: {} rows returned, {} rows affected in {} ms",
            total_rows, query_result.rows_affected, query_result.execution_time_ms
        ));

        Ok(json!({
            "columns": query_result.columns,
            "preview": preview,
            "total_rows": total_rows,
            "truncated": truncated,
            "rows_affected": query_result.rows_affected,
            "execution_time_ms": query_result.execution_time_ms,
        }))
    }
}
