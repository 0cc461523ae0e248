//! In-memory doubles and fixture builders shared by tests across this
//! crate.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::executor::ExecutionContext;
use crate::model::{
    ConnectionHealthLog, JobExecution, JobType, RetryPolicy, ScheduledJob,
};
use crate::store::{JobStore, ProfileStore, StoreError, StoreResult};
use dataops_connector::error::{ConnectorError, ConnectorResult};
use dataops_connector::profile::ConnectionProfile;
use dataops_connector::traits::Connector;
use dataops_connector::types::{
    DatabaseCapabilities, DatabaseFamily, HealthCheckResult, HealthStatus, QueryResult,
    TableSchema,
};

/// A postgres-shaped active profile.
pub fn sample_profile(family: DatabaseFamily) -> ConnectionProfile {
    ConnectionProfile::new("orders-db", family, "orders")
        .with_host("db.internal")
        .with_username("app")
        .activated()
}

/// A job of the given type with a plausible configuration.
pub fn sample_job(job_type: JobType) -> ScheduledJob {
    let configuration = match job_type {
        JobType::SqlScript => serde_json::json!({"sql_script": "SELECT 1"}),
        JobType::StoredProcedure => serde_json::json!({"procedure_name": "noop"}),
        JobType::DatabaseBackup => serde_json::json!({}),
    };
    let now = Utc::now();
    ScheduledJob {
        id: Uuid::new_v4(),
        name: format!("{job_type}-job"),
        description: None,
        job_type,
        connection_id: Uuid::new_v4(),
        configuration,
        pre_execution_sql: None,
        post_execution_sql: None,
        cron_expression: Some("0 * * * *".to_string()),
        timezone: "UTC".to_string(),
        is_active: true,
        max_runtime_seconds: 3600,
        retry_policy: RetryPolicy::default(),
        failure_threshold: 5,
        retry_count: 0,
        consecutive_failures: 0,
        next_retry_at: None,
        next_run_at: None,
        last_run_at: None,
        total_runs: 0,
        successful_runs: 0,
        failed_runs: 0,
        created_at: now,
        updated_at: now,
    }
}

fn context_for(
    job_type: JobType,
    configuration: serde_json::Value,
    family: DatabaseFamily,
    connector: Option<Arc<MockQueryConnector>>,
    password: Option<String>,
) -> ExecutionContext {
    let mut job = sample_job(job_type);
    job.configuration = configuration;
    let profile = sample_profile(family);
    ExecutionContext {
        job,
        execution_id: Uuid::new_v4(),
        profile,
        connector: connector.map(|c| c as Arc<dyn Connector>),
        password,
    }
}

/// Context for a SQL script job.
pub fn script_context(
    configuration: serde_json::Value,
    connector: Option<Arc<MockQueryConnector>>,
) -> ExecutionContext {
    context_for(
        JobType::SqlScript,
        configuration,
        DatabaseFamily::Postgres,
        connector,
        None,
    )
}

/// Context for a stored procedure job.
pub fn procedure_context(
    configuration: serde_json::Value,
    connector: Option<Arc<MockQueryConnector>>,
) -> ExecutionContext {
    context_for(
        JobType::StoredProcedure,
        configuration,
        DatabaseFamily::Postgres,
        connector,
        None,
    )
}

/// Context for a backup job against the given family; carries a
/// decrypted password the way the job manager would.
pub fn backup_context(
    configuration: serde_json::Value,
    family: DatabaseFamily,
) -> ExecutionContext {
    context_for(
        JobType::DatabaseBackup,
        configuration,
        family,
        None,
        Some("s3cret".to_string()),
    )
}

/// Connector double that replays canned rows and records transaction
/// calls.
#[derive(Debug)]
pub struct MockQueryConnector {
    profile_id: Uuid,
    rows: Vec<serde_json::Value>,
    failure: Option<String>,
    began: AtomicBool,
    committed: AtomicBool,
    rolled_back: AtomicBool,
    last_query: Mutex<String>,
}

impl MockQueryConnector {
    /// Connector whose every query returns these rows.
    pub fn with_rows(rows: Vec<serde_json::Value>) -> Self {
        Self {
            profile_id: Uuid::new_v4(),
            rows,
            failure: None,
            began: AtomicBool::new(false),
            committed: AtomicBool::new(false),
            rolled_back: AtomicBool::new(false),
            last_query: Mutex::new(String::new()),
        }
    }

    /// Connector whose every query fails with this message.
    pub fn failing(message: &str) -> Self {
        let mut connector = Self::with_rows(vec![]);
        connector.failure = Some(message.to_string());
        connector
    }

    pub fn began(&self) -> bool {
        self.began.load(Ordering::SeqCst)
    }

    pub fn committed(&self) -> bool {
        self.committed.load(Ordering::SeqCst)
    }

    pub fn rolled_back(&self) -> bool {
        self.rolled_back.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> String {
        self.last_query.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockQueryConnector {
    fn family(&self) -> DatabaseFamily {
        DatabaseFamily::Postgres
    }

    fn profile_id(&self) -> Uuid {
        self.profile_id
    }

    async fn connect(&self) -> ConnectorResult<()> {
        Ok(())
    }

    async fn disconnect(&self) -> ConnectorResult<()> {
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        true
    }

    async fn test_connection(&self) -> ConnectorResult<HealthCheckResult> {
        match &self.failure {
            Some(message) => Ok(HealthCheckResult::unhealthy(1, message.clone())),
            None => Ok(HealthCheckResult::healthy(1)),
        }
    }

    async fn execute_query(
        &self,
        query: &str,
        _params: &[serde_json::Value],
    ) -> ConnectorResult<QueryResult> {
        *self.last_query.lock().unwrap() = query.to_string();
        if let Some(message) = &self.failure {
            return Err(ConnectorError::query_failed(message.clone()));
        }
        let columns = self
            .rows
            .first()
            .and_then(|row| row.as_object())
            .map(|obj| obj.keys().cloned().collect())
            .unwrap_or_default();
        Ok(QueryResult {
            columns,
            rows: self.rows.clone(),
            row_count: self.rows.len() as u64,
            rows_affected: 0,
            execution_time_ms: 1,
        })
    }

    async fn execute_ddl(&self, statement: &str) -> ConnectorResult<QueryResult> {
        self.execute_query(statement, &[]).await
    }

    async fn list_databases(&self) -> ConnectorResult<Vec<String>> {
        Ok(vec!["orders".to_string()])
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
        self.began.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn commit_transaction(&self) -> ConnectorResult<()> {
        self.committed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback_transaction(&self) -> ConnectorResult<()> {
        self.rolled_back.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn detect_capabilities(&self) -> ConnectorResult<DatabaseCapabilities> {
        Ok(DatabaseCapabilities {
            version: "16.1".to_string(),
            supports_transactions: true,
            supports_stored_procedures: true,
            supports_views: true,
            supports_materialized_views: true,
            supports_json: true,
            supports_full_text_search: true,
            max_connections: Some(100),
            features: vec!["ACID".to_string()],
            extensions: vec![],
        })
    }
}

/// Job store backed by hash maps.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<Uuid, ScheduledJob>>,
    executions: Mutex<HashMap<Uuid, JobExecution>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert_job(&self, job: &ScheduledJob) -> StoreResult<()> {
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(())
    }

    async fn job(&self, job_id: Uuid) -> StoreResult<Option<ScheduledJob>> {
        Ok(self.jobs.lock().unwrap().get(&job_id).cloned())
    }

    async fn update_job(&self, job: &ScheduledJob) -> StoreResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if !jobs.contains_key(&job.id) {
            return Err(StoreError::NotFound {
                entity: "job",
                id: job.id,
            });
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn delete_job(&self, job_id: Uuid) -> StoreResult<()> {
        self.jobs
            .lock()
            .unwrap()
            .remove(&job_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound {
                entity: "job",
                id: job_id,
            })
    }

    async fn due_jobs(&self, now: DateTime<Utc>) -> StoreResult<Vec<ScheduledJob>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|job| {
                job.is_active
                    && (job.next_run_at.is_some_and(|at| at <= now)
                        || job.next_retry_at.is_some_and(|at| at <= now))
            })
            .cloned()
            .collect())
    }

    async fn insert_execution(&self, execution: &JobExecution) -> StoreResult<()> {
        self.executions
            .lock()
            .unwrap()
            .insert(execution.id, execution.clone());
        Ok(())
    }

    async fn execution(&self, execution_id: Uuid) -> StoreResult<Option<JobExecution>> {
        Ok(self.executions.lock().unwrap().get(&execution_id).cloned())
    }

    async fn update_execution(&self, execution: &JobExecution) -> StoreResult<()> {
        let mut executions = self.executions.lock().unwrap();
        if !executions.contains_key(&execution.id) {
            return Err(StoreError::NotFound {
                entity: "execution",
                id: execution.id,
            });
        }
        executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn executions_for_job(
        &self,
        job_id: Uuid,
        limit: u32,
    ) -> StoreResult<Vec<JobExecution>> {
        let mut rows: Vec<JobExecution> = self
            .executions
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

/// Profile store backed by hash maps.
#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: Mutex<HashMap<Uuid, ConnectionProfile>>,
    health_logs: Mutex<Vec<ConnectionHealthLog>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: ConnectionProfile) {
        self.profiles.lock().unwrap().insert(profile.id, profile);
    }

    pub fn health_log_count(&self) -> usize {
        self.health_logs.lock().unwrap().len()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn profile(&self, profile_id: Uuid) -> StoreResult<Option<ConnectionProfile>> {
        Ok(self.profiles.lock().unwrap().get(&profile_id).cloned())
    }

    async fn active_profiles(&self) -> StoreResult<Vec<ConnectionProfile>> {
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect())
    }

    async fn update_health(
        &self,
        profile_id: Uuid,
        status: HealthStatus,
        response_time_ms: Option<u64>,
        failed_attempts: u32,
        checked_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles.get_mut(&profile_id).ok_or(StoreError::NotFound {
            entity: "profile",
            id: profile_id,
        })?;
        profile.health_status = status;
        profile.response_time_ms = response_time_ms;
        profile.failed_attempts = failed_attempts;
        profile.last_health_check = Some(checked_at);
        Ok(())
    }

    async fn save_capabilities(
        &self,
        profile_id: Uuid,
        capabilities: serde_json::Value,
    ) -> StoreResult<()> {
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles.get_mut(&profile_id).ok_or(StoreError::NotFound {
            entity: "profile",
            id: profile_id,
        })?;
        profile.capabilities = Some(capabilities);
        Ok(())
    }

    async fn insert_health_log(&self, log: &ConnectionHealthLog) -> StoreResult<()> {
        self.health_logs.lock().unwrap().push(log.clone());
        Ok(())
    }

    async fn health_history(
        &self,
        connection_id: Uuid,
        hours: u32,
    ) -> StoreResult<Vec<ConnectionHealthLog>> {
        let cutoff = Utc::now() - Duration::hours(i64::from(hours));
        let mut rows: Vec<ConnectionHealthLog> = self
            .health_logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| log.connection_id == connection_id && log.checked_at >= cutoff)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.checked_at.cmp(&a.checked_at));
        Ok(rows)
    }
}
