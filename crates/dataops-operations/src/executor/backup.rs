//! Database backup executor
//!
//! Shells out to the engine's native dump tool (`pg_dump`,
//! `mysqldump`) with a bounded runtime. Credentials reach the child
//! process through its environment (`PGPASSWORD`, `MYSQL_PWD`), never
//! through argv where they would be visible in the process table.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{instrument, warn};

use crate::error::{JobError, JobResult};
use crate::executor::{
    ExecutionContext, ExecutionLog, JobExecutor, Permission, ValidationResult,
};
use crate::model::JobType;
use dataops_connector::types::DatabaseFamily;

/// Hard ceiling on dump runtime when the job carries none.
const DEFAULT_BACKUP_TIMEOUT_SECS: u64 = 3600;

/// What the dump includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupType {
    #[default]
    Full,
    SchemaOnly,
    DataOnly,
}

impl BackupType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Full => "full",
            BackupType::SchemaOnly => "schema_only",
            BackupType::DataOnly => "data_only",
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// On-disk format of the dump. `Tar` and `Custom` are pg_dump archive
/// formats; MySQL dumps are always plain SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupFormat {
    #[default]
    Plain,
    Tar,
    Custom,
}

impl BackupFormat {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupFormat::Plain => "plain",
            BackupFormat::Tar => "tar",
            BackupFormat::Custom => "custom",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            BackupFormat::Plain => "sql",
            BackupFormat::Tar => "tar",
            BackupFormat::Custom => "dump",
        }
    }

    /// pg_dump `--format` flag value.
    fn pg_flag(&self) -> &'static str {
        match self {
            BackupFormat::Plain => "p",
            BackupFormat::Tar => "t",
            BackupFormat::Custom => "c",
        }
    }
}

impl fmt::Display for BackupFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct BackupConfig {
    #[serde(default)]
    backup_type: BackupType,
    #[serde(default)]
    format: BackupFormat,
    #[serde(default)]
    compress: bool,
    #[serde(default = "default_retention_days")]
    retention_days: i64,
}

fn default_retention_days() -> i64 {
    30
}

fn parse_config(configuration: &serde_json::Value) -> JobResult<BackupConfig> {
    let config: BackupConfig = serde_json::from_value(configuration.clone())
        .map_err(|e| JobError::validation_failed(vec![format!("invalid configuration: {e}")]))?;
    if config.retention_days < 1 {
        return Err(JobError::validation_failed(vec![
            "retention_days must be at least 1".to_string(),
        ]));
    }
    Ok(config)
}

/// Whether gzip compression applies: pg_dump only compresses inline for
/// the plain format (tar does not support `-Z`; custom is already
/// compressed).
fn compression_applies(family: DatabaseFamily, config: &BackupConfig) -> bool {
    config.compress
        && family == DatabaseFamily::Postgres
        && config.format == BackupFormat::Plain
}

fn build_filename(
    database: &str,
    config: &BackupConfig,
    compressed: bool,
    now: DateTime<Utc>,
) -> String {
    let stamp = now.format("%Y%m%d_%H%M%S");
    let mut name = format!(
        "{database}_{}_{stamp}.{}",
        config.backup_type.as_str(),
        config.format.extension()
    );
    if compressed {
        name.push_str(".gz");
    }
    name
}

fn pg_dump_args(
    profile: &dataops_connector::profile::ConnectionProfile,
    config: &BackupConfig,
    output: &Path,
    compressed: bool,
) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(host) = &profile.host {
        args.push("-h".to_string());
        args.push(host.clone());
    }
    if let Some(port) = profile.effective_port() {
        args.push("-p".to_string());
        args.push(port.to_string());
    }
    if let Some(user) = &profile.username {
        args.push("-U".to_string());
        args.push(user.clone());
    }
    args.push("-d".to_string());
    args.push(profile.database.clone());
    args.push(format!("--format={}", config.format.pg_flag()));
    match config.backup_type {
        BackupType::SchemaOnly => args.push("--schema-only".to_string()),
        BackupType::DataOnly => args.push("--data-only".to_string()),
        BackupType::Full => {}
    }
    if compressed {
        args.push("-Z".to_string());
        args.push("6".to_string());
    }
    args.push("-f".to_string());
    args.push(output.to_string_lossy().into_owned());
    args
}

fn mysqldump_args(
    profile: &dataops_connector::profile::ConnectionProfile,
    config: &BackupConfig,
    output: &Path,
) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(host) = &profile.host {
        args.push("-h".to_string());
        args.push(host.clone());
    }
    if let Some(port) = profile.effective_port() {
        args.push("-P".to_string());
        args.push(port.to_string());
    }
    if let Some(user) = &profile.username {
        args.push("-u".to_string());
        args.push(user.clone());
    }
    match config.backup_type {
        BackupType::SchemaOnly => args.push("--no-data".to_string()),
        BackupType::DataOnly => args.push("--no-create-info".to_string()),
        BackupType::Full => {}
    }
    args.push("--single-transaction".to_string());
    args.push("--routines".to_string());
    args.push("--triggers".to_string());
    args.push(format!("--result-file={}", output.to_string_lossy()));
    args.push(profile.database.clone());
    args
}

/// SHA-256 of a file, hex-encoded.
async fn sha256_file(path: &Path) -> JobResult<String> {
    let contents = tokio::fs::read(path)
        .await
        .map_err(|e| JobError::execution_failed(format!("failed to read backup file: {e}")))?;
    let digest = tokio::task::spawn_blocking(move || {
        let mut hasher = Sha256::new();
        hasher.update(&contents);
        hex::encode(hasher.finalize())
    })
    .await
    .map_err(|e| JobError::execution_failed(format!("checksum task failed: {e}")))?;
    Ok(digest)
}

/// Remove a partial dump left behind by a failed or timed-out run.
async fn remove_partial(path: &Path, log: &mut ExecutionLog) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => log.info(format!("removed partial backup file {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log.warning(format!(
            "could not remove partial backup file {}: {e}",
            path.display()
        )),
    }
}

/// Dumps a database to a local file via the engine's native tool.
#[derive(Debug)]
pub struct BackupExecutor {
    backup_dir: PathBuf,
}

impl BackupExecutor {
    #[must_use]
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
        }
    }

    fn command_for(
        &self,
        context: &ExecutionContext,
        config: &BackupConfig,
        output: &Path,
        compressed: bool,
    ) -> JobResult<Command> {
        let profile = &context.profile;
        match profile.family {
            DatabaseFamily::Postgres => {
                let mut command = Command::new("pg_dump");
                command.args(pg_dump_args(profile, config, output, compressed));
                if let Some(password) = &context.password {
                    command.env("PGPASSWORD", password);
                }
                Ok(command)
            }
            DatabaseFamily::Mysql | DatabaseFamily::Mariadb => {
                let mut command = Command::new("mysqldump");
                command.args(mysqldump_args(profile, config, output));
                if let Some(password) = &context.password {
                    command.env("MYSQL_PWD", password);
                }
                Ok(command)
            }
            family => Err(JobError::validation_failed(vec![format!(
                "backups are not supported for {family} connections"
            )])),
        }
    }
}

#[async_trait]
impl JobExecutor for BackupExecutor {
    fn job_type(&self) -> JobType {
        JobType::DatabaseBackup
    }

    /// Dump tools read table contents, view and trigger definitions,
    /// and take table locks during a consistent snapshot.
    fn required_permissions(&self, _configuration: &serde_json::Value) -> Vec<Permission> {
        vec![
            Permission::Select,
            Permission::ShowView,
            Permission::Trigger,
            Permission::LockTables,
        ]
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

        match context.profile.family {
            DatabaseFamily::Postgres | DatabaseFamily::Mysql | DatabaseFamily::Mariadb => {}
            family => {
                result.error(format!(
                    "backups are not supported for {family} connections"
                ));
                return Ok(result);
            }
        }

        if config.compress && !compression_applies(context.profile.family, &config) {
            result.warning(
                "compression only applies to postgres plain-format dumps; ignoring",
            );
        }
        if context.profile.family != DatabaseFamily::Postgres
            && config.format != BackupFormat::Plain
        {
            result.error(format!(
                "format '{}' is only available for postgres dumps",
                config.format
            ));
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
        let compressed = compression_applies(context.profile.family, &config);

        tokio::fs::create_dir_all(&self.backup_dir)
            .await
            .map_err(|e| {
                JobError::execution_failed(format!(
                    "failed to create backup directory {}: {e}",
                    self.backup_dir.display()
                ))
            })?;

        let started = Utc::now();
        let filename = build_filename(&context.profile.database, &config, compressed, started);
        let output = self.backup_dir.join(&filename);

        let mut command = self.command_for(context, &config, &output, compressed)?;
        command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        log.info(format!(
            "starting {} backup of '{}' (format={}, compressed={})",
            config.backup_type, context.profile.database, config.format, compressed
        ));

        let timeout_secs = if context.job.max_runtime_seconds > 0 {
            context.job.max_runtime_seconds
        } else {
            DEFAULT_BACKUP_TIMEOUT_SECS
        };

        let run = async {
            command.output().await.map_err(|e| {
                JobError::execution_failed(format!("failed to launch dump tool: {e}"))
            })
        };
        let outcome = tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), run).await;

        let process_output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                remove_partial(&output, log).await;
                log.error(format!("backup failed: {e}"));
                return Err(e);
            }
            Err(_) => {
                remove_partial(&output, log).await;
                log.error(format!("backup exceeded {timeout_secs}s runtime limit"));
                return Err(JobError::Timeout {
                    seconds: timeout_secs,
                });
            }
        };

        if !process_output.status.success() {
            let stderr = String::from_utf8_lossy(&process_output.stderr);
            remove_partial(&output, log).await;
            log.error(format!("dump tool exited with {}", process_output.status));
            warn!(
                job_id = %context.job.id,
                status = %process_output.status,
                "Backup subprocess failed"
            );
            return Err(JobError::execution_failed(format!(
                "dump tool failed ({}): {}",
                process_output.status,
                stderr.trim()
            )));
        }

        let metadata = tokio::fs::metadata(&output).await.map_err(|e| {
            JobError::execution_failed(format!("backup file missing after dump: {e}"))
        })?;
        let checksum = sha256_file(&output).await?;
        let completed = Utc::now();
        let expires_at = completed + Duration::days(config.retention_days);

        log.info(format!(
            "backup complete: {} bytes in {} ms, sha256={}",
            metadata.len(),
            (completed - started).num_milliseconds(),
            checksum
        ));

        Ok(json!({
            "file_path": output.to_string_lossy(),
            "file_size_bytes": metadata.len(),
            "checksum_sha256": checksum,
            "backup_type": config.backup_type.as_str(),
            "format": config.format.as_str(),
            "compressed": compressed,
            "retention_days": config.retention_days,
            "expires_at": expires_at.to_rfc3339(),
        }))
    }
}
