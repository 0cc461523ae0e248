//! Job orchestration
//!
//! The job manager owns the execution lifecycle: it creates jobs,
//! dispatches them to the registered executor for their type, enforces
//! the per-job single-flight guard and runtime ceiling, and rolls the
//! outcome into the job's schedule, statistics and retry state.
//!
//! An executor failure is a job outcome, not a manager error: the
//! execution is finalized FAILED and returned. Errors are reserved for
//! conditions where no execution could run at all (unknown job,
//! already in flight, deactivated job on a scheduled trigger).

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{JobError, JobResult};
use crate::executor::{ExecutionContext, ExecutionLog, JobExecutor};
use crate::model::{
    JobExecution, JobStatus, JobType, NewJob, RetryPolicy, ScheduledJob, TriggerSource,
};
use crate::retry::RetryHandler;
use crate::scheduler;
use crate::store::{JobStore, ProfileStore};
use dataops_connector::manager::ConnectionManager;

type ExecutorFactory = Box<dyn Fn() -> Arc<dyn JobExecutor> + Send + Sync>;

/// Executor factories keyed by job type.
#[derive(Default)]
pub struct ExecutorRegistry {
    factories: HashMap<JobType, ExecutorFactory>,
}

impl ExecutorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory; the job type is taken from the executor it
    /// builds. Registering a second factory for a type replaces the
    /// first.
    pub fn register<F>(&mut self, factory: F)
    where
        F: Fn() -> Arc<dyn JobExecutor> + Send + Sync + 'static,
    {
        let job_type = factory().job_type();
        self.factories.insert(job_type, Box::new(factory));
    }

    /// Build an executor for a job type.
    #[must_use]
    pub fn executor(&self, job_type: JobType) -> Option<Arc<dyn JobExecutor>> {
        self.factories.get(&job_type).map(|factory| factory())
    }

    /// Job types with a registered executor.
    #[must_use]
    pub fn registered_types(&self) -> Vec<JobType> {
        self.factories.keys().copied().collect()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("types", &self.registered_types())
            .finish()
    }
}

/// Callback invoked around executor dispatch.
///
/// A failing pre-hook fails the execution before the executor runs;
/// the post-hook only runs after a successful executor, and its
/// failure fails the execution.
#[async_trait]
pub trait ExecutionHook: Send + Sync {
    async fn run(&self, context: &ExecutionContext, log: &mut ExecutionLog) -> JobResult<()>;
}

/// Orchestrates scheduled jobs end to end.
pub struct JobManager {
    jobs: Arc<dyn JobStore>,
    profiles: Arc<dyn ProfileStore>,
    connections: Arc<ConnectionManager>,
    registry: ExecutorRegistry,
    retry: RetryHandler,
    pre_hook: Option<Arc<dyn ExecutionHook>>,
    post_hook: Option<Arc<dyn ExecutionHook>>,
    /// Per-job single-flight guard.
    running: Mutex<HashSet<Uuid>>,
}

impl JobManager {
    #[must_use]
    pub fn new(
        jobs: Arc<dyn JobStore>,
        profiles: Arc<dyn ProfileStore>,
        connections: Arc<ConnectionManager>,
        registry: ExecutorRegistry,
    ) -> Self {
        Self {
            jobs,
            profiles,
            connections,
            registry,
            retry: RetryHandler,
            pre_hook: None,
            post_hook: None,
            running: Mutex::new(HashSet::new()),
        }
    }

    /// Install a hook that runs before every executor dispatch.
    #[must_use]
    pub fn with_pre_hook(mut self, hook: Arc<dyn ExecutionHook>) -> Self {
        self.pre_hook = Some(hook);
        self
    }

    /// Install a hook that runs after a successful executor.
    #[must_use]
    pub fn with_post_hook(mut self, hook: Arc<dyn ExecutionHook>) -> Self {
        self.post_hook = Some(hook);
        self
    }

    /// Create a job, validating its schedule and applying defaults.
    ///
    /// A job with a cron expression is immediately due, so the first
    /// scheduled run happens on the next scheduler sweep.
    #[instrument(skip(self, new_job), fields(name = %new_job.name, job_type = %new_job.job_type))]
    pub async fn create_job(&self, new_job: NewJob) -> JobResult<ScheduledJob> {
        let timezone = new_job.timezone.unwrap_or_else(|| "UTC".to_string());
        scheduler::validate_timezone(&timezone)?;
        if let Some(expression) = new_job.cron_expression.as_deref() {
            scheduler::validate_cron_expression(expression)?;
        }

        let now = Utc::now();
        let job = ScheduledJob {
            id: Uuid::new_v4(),
            name: new_job.name,
            description: new_job.description,
            job_type: new_job.job_type,
            connection_id: new_job.connection_id,
            configuration: new_job.configuration,
            pre_execution_sql: new_job.pre_execution_sql,
            post_execution_sql: new_job.post_execution_sql,
            next_run_at: new_job.cron_expression.as_deref().map(|_| now),
            cron_expression: new_job.cron_expression,
            timezone,
            is_active: true,
            max_runtime_seconds: new_job.max_runtime_seconds.unwrap_or(3600),
            retry_policy: new_job.retry_policy.unwrap_or_else(RetryPolicy::default),
            failure_threshold: new_job.failure_threshold.unwrap_or(5),
            retry_count: 0,
            consecutive_failures: 0,
            next_retry_at: None,
            last_run_at: None,
            total_runs: 0,
            successful_runs: 0,
            failed_runs: 0,
            created_at: now,
            updated_at: now,
        };

        self.jobs.insert_job(&job).await?;
        info!(job_id = %job.id, "Job created");
        Ok(job)
    }

    /// Fetch a job.
    pub async fn job(&self, job_id: Uuid) -> JobResult<ScheduledJob> {
        self.jobs
            .job(job_id)
            .await?
            .ok_or(JobError::JobNotFound { job_id })
    }

    /// Most recent executions of a job, newest first.
    pub async fn executions(&self, job_id: Uuid, limit: u32) -> JobResult<Vec<JobExecution>> {
        Ok(self.jobs.executions_for_job(job_id, limit).await?)
    }

    /// Run a job now.
    ///
    /// Manual and API triggers may run a deactivated job; scheduled
    /// triggers may not. At most one execution of a job is in flight at
    /// a time.
    #[instrument(skip(self), fields(job_id = %job_id, triggered_by = %triggered_by))]
    pub async fn execute_job(
        &self,
        job_id: Uuid,
        triggered_by: TriggerSource,
        parent_execution_id: Option<Uuid>,
    ) -> JobResult<JobExecution> {
        let job = self.job(job_id).await?;
        if !job.is_active && triggered_by == TriggerSource::Schedule {
            return Err(JobError::JobInactive { job_id });
        }

        {
            let mut running = self.running.lock().await;
            if !running.insert(job_id) {
                return Err(JobError::AlreadyRunning { job_id });
            }
        }

        let result = self
            .execute_locked(job, triggered_by, parent_execution_id)
            .await;

        self.running.lock().await.remove(&job_id);
        result
    }

    async fn execute_locked(
        &self,
        job: ScheduledJob,
        triggered_by: TriggerSource,
        parent_execution_id: Option<Uuid>,
    ) -> JobResult<JobExecution> {
        // Resolve the profile and executor before any execution row
        // exists, so an unresolvable job leaves no orphaned RUNNING row.
        let profile = self
            .profiles
            .profile(job.connection_id)
            .await?
            .ok_or(JobError::ConnectionNotFound {
                connection_id: job.connection_id,
            })?;

        let executor =
            self.registry
                .executor(job.job_type)
                .ok_or_else(|| JobError::UnknownJobType {
                    job_type: job.job_type.to_string(),
                })?;

        let mut execution = JobExecution::pending(job.id, triggered_by, parent_execution_id);
        self.jobs.insert_execution(&execution).await?;

        let started_at = Utc::now();
        execution.status = JobStatus::Running;
        execution.started_at = Some(started_at);
        self.jobs.update_execution(&execution).await?;

        let mut log = ExecutionLog::new();
        let outcome = self
            .run_executor(&job, &execution, profile, executor, &mut log)
            .await;

        match outcome {
            Ok(payload) => self.finalize_success(job, execution, payload, log).await,
            Err(e) => self.finalize_failure(job, execution, e, log).await,
        }
    }

    /// Build the context and drive the executor under the job's
    /// runtime ceiling.
    async fn run_executor(
        &self,
        job: &ScheduledJob,
        execution: &JobExecution,
        profile: dataops_connector::profile::ConnectionProfile,
        executor: Arc<dyn JobExecutor>,
        log: &mut ExecutionLog,
    ) -> JobResult<serde_json::Value> {
        // Query-based executors get a live connector; the backup
        // executor gets the decrypted password for its subprocess
        // environment instead, plus a connector when the job carries
        // hook statements.
        let hook_sql = job.pre_execution_sql.is_some() || job.post_execution_sql.is_some();
        let (connector, password) = match job.job_type {
            JobType::SqlScript | JobType::StoredProcedure => {
                (Some(self.connections.get_connector(&profile).await?), None)
            }
            JobType::DatabaseBackup => {
                let connector = if hook_sql {
                    Some(self.connections.get_connector(&profile).await?)
                } else {
                    None
                };
                (connector, self.connections.credentials_for(&profile)?)
            }
        };

        let context = ExecutionContext {
            job: job.clone(),
            execution_id: execution.id,
            profile,
            connector,
            password,
        };

        let validation = executor.validate(&context).await?;
        for warning in &validation.warnings {
            log.warning(warning);
        }
        if !validation.is_valid() {
            return Err(JobError::validation_failed(validation.errors));
        }

        if let Some(hook) = &self.pre_hook {
            hook.run(&context, log).await?;
        }
        if let Some(statement) = job.pre_execution_sql.as_deref() {
            self.run_hook_statement(&context, statement, "pre-execution", log)
                .await?;
        }

        let ceiling = Duration::from_secs(job.max_runtime_seconds);
        let payload = match tokio::time::timeout(ceiling, executor.execute(&context, log)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(JobError::Timeout {
                    seconds: job.max_runtime_seconds,
                })
            }
        };

        if let Some(statement) = job.post_execution_sql.as_deref() {
            self.run_hook_statement(&context, statement, "post-execution", log)
                .await?;
        }
        if let Some(hook) = &self.post_hook {
            hook.run(&context, log).await?;
        }
        Ok(payload)
    }

    /// Run one per-job hook statement on the job's connection.
    async fn run_hook_statement(
        &self,
        context: &ExecutionContext,
        statement: &str,
        stage: &str,
        log: &mut ExecutionLog,
    ) -> JobResult<()> {
        let connector = context.connector.as_ref().ok_or_else(|| {
            JobError::execution_failed(format!("{stage} hook requires a connection"))
        })?;
        log.info(format!("running {stage} hook"));
        if let Err(e) = connector.execute_query(statement, &[]).await {
            log.error(format!("{stage} hook failed: {e}"));
            return Err(e.into());
        }
        Ok(())
    }

    async fn finalize_success(
        &self,
        mut job: ScheduledJob,
        mut execution: JobExecution,
        payload: serde_json::Value,
        log: ExecutionLog,
    ) -> JobResult<JobExecution> {
        let completed_at = Utc::now();
        execution.status = JobStatus::Completed;
        execution.completed_at = Some(completed_at);
        execution.duration_ms = execution
            .started_at
            .map(|s| (completed_at - s).num_milliseconds().max(0) as u64);
        execution.result = Some(payload);
        execution.log = Some(log.render());
        self.jobs.update_execution(&execution).await?;

        job.last_run_at = Some(completed_at);
        job.total_runs += 1;
        job.successful_runs += 1;
        self.retry.reset_retry_state(&mut job);
        job.next_run_at = scheduler::next_run_for(&job, completed_at)?;
        job.updated_at = completed_at;
        self.jobs.update_job(&job).await?;

        info!(job_id = %job.id, execution_id = %execution.id, "Job execution completed");
        Ok(execution)
    }

    async fn finalize_failure(
        &self,
        mut job: ScheduledJob,
        mut execution: JobExecution,
        error: JobError,
        mut log: ExecutionLog,
    ) -> JobResult<JobExecution> {
        log.error(error.to_string());

        let completed_at = Utc::now();
        execution.status = JobStatus::Failed;
        execution.completed_at = Some(completed_at);
        execution.duration_ms = execution
            .started_at
            .map(|s| (completed_at - s).num_milliseconds().max(0) as u64);
        execution.error_message = Some(error.to_string());
        execution.log = Some(log.render());
        self.jobs.update_execution(&execution).await?;

        job.last_run_at = Some(completed_at);
        job.total_runs += 1;
        job.failed_runs += 1;
        let disabled = self.retry.record_failure(&mut job);
        job.next_retry_at = if self.retry.should_retry(&job) {
            Some(self.retry.next_retry_time(&job, completed_at))
        } else {
            None
        };
        job.next_run_at = scheduler::next_run_for(&job, completed_at)?;
        job.updated_at = completed_at;
        self.jobs.update_job(&job).await?;

        warn!(
            job_id = %job.id,
            execution_id = %execution.id,
            error_code = error.error_code(),
            disabled,
            "Job execution failed"
        );
        Ok(execution)
    }

    /// Cancel a running execution.
    ///
    /// Only executions in RUNNING can be cancelled.
    #[instrument(skip(self), fields(execution_id = %execution_id))]
    pub async fn cancel_execution(&self, execution_id: Uuid) -> JobResult<JobExecution> {
        let mut execution = self
            .jobs
            .execution(execution_id)
            .await?
            .ok_or(JobError::ExecutionNotFound { execution_id })?;

        if execution.status != JobStatus::Running {
            return Err(JobError::InvalidState {
                expected: JobStatus::Running.to_string(),
                actual: execution.status.to_string(),
            });
        }

        execution.status = JobStatus::Cancelled;
        execution.completed_at = Some(Utc::now());
        self.jobs.update_execution(&execution).await?;
        info!("Execution cancelled");
        Ok(execution)
    }

    /// One scheduler sweep: run every job whose scheduled run or
    /// pending retry is due.
    ///
    /// Retries run as fresh executions chained to the failed one
    /// through `parent_execution_id`. One failing job does not stop
    /// the sweep.
    #[instrument(skip(self))]
    pub async fn run_due_jobs(&self, now: chrono::DateTime<Utc>) -> JobResult<Vec<JobExecution>> {
        let due = self.jobs.due_jobs(now).await?;
        let mut executions = Vec::with_capacity(due.len());

        for mut job in due {
            let retry_due = job.next_retry_at.is_some_and(|at| at <= now);
            let (triggered_by, parent) = if retry_due {
                let parent = self
                    .jobs
                    .executions_for_job(job.id, 1)
                    .await?
                    .first()
                    .map(|e| e.id);
                // Consume the retry slot before running so a crash
                // mid-execution cannot replay it.
                job.next_retry_at = None;
                self.jobs.update_job(&job).await?;
                (TriggerSource::Retry, parent)
            } else {
                (TriggerSource::Schedule, None)
            };

            match self.execute_job(job.id, triggered_by, parent).await {
                Ok(execution) => executions.push(execution),
                Err(JobError::AlreadyRunning { job_id }) => {
                    warn!(%job_id, "Skipping due job: previous execution still in flight");
                }
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "Skipping due job");
                }
            }
        }

        Ok(executions)
    }
}

impl std::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobManager")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Permission, ScriptExecutor, ValidationResult};
    use crate::testing::{sample_profile, InMemoryJobStore, InMemoryProfileStore, MockQueryConnector};
    use async_trait::async_trait;
    use dataops_connector::crypto::CredentialVault;
    use dataops_connector::error::ConnectorResult;
    use dataops_connector::profile::ConnectionProfile;
    use dataops_connector::traits::{Connector, ConnectorFactory};
    use dataops_connector::types::DatabaseFamily;
    use serde_json::json;

    /// Factory that hands every caller the same mock connector, so
    /// tests can inspect the queries it saw.
    struct MockFactory {
        connector: Arc<MockQueryConnector>,
    }

    impl MockFactory {
        fn with_rows(rows: Vec<serde_json::Value>) -> Self {
            Self {
                connector: Arc::new(MockQueryConnector::with_rows(rows)),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                connector: Arc::new(MockQueryConnector::failing(message)),
            }
        }
    }

    #[async_trait]
    impl ConnectorFactory for MockFactory {
        fn family(&self) -> DatabaseFamily {
            DatabaseFamily::Postgres
        }

        async fn create(
            &self,
            _profile: &ConnectionProfile,
            _connection_string: &str,
        ) -> ConnectorResult<Arc<dyn Connector>> {
            Ok(self.connector.clone())
        }
    }

    struct Harness {
        manager: JobManager,
        jobs: Arc<InMemoryJobStore>,
        profiles: Arc<InMemoryProfileStore>,
        profile_id: Uuid,
        connector: Arc<MockQueryConnector>,
    }

    fn harness_with_factory(factory: MockFactory) -> Harness {
        let connector = factory.connector.clone();
        let mut connections = ConnectionManager::new(CredentialVault::new([1u8; 32]));
        connections.register_factory(Arc::new(factory));

        let jobs = Arc::new(InMemoryJobStore::new());
        let profiles = Arc::new(InMemoryProfileStore::new());
        let profile = sample_profile(DatabaseFamily::Postgres);
        let profile_id = profile.id;
        profiles.insert(profile);

        let mut registry = ExecutorRegistry::new();
        registry.register(|| Arc::new(ScriptExecutor) as Arc<dyn JobExecutor>);

        Harness {
            manager: JobManager::new(
                jobs.clone(),
                profiles.clone(),
                Arc::new(connections),
                registry,
            ),
            jobs,
            profiles,
            profile_id,
            connector,
        }
    }

    fn harness() -> Harness {
        harness_with_factory(MockFactory::with_rows(vec![json!({"id": 1})]))
    }

    fn script_job(harness: &Harness) -> NewJob {
        NewJob {
            name: "nightly-report".to_string(),
            description: None,
            job_type: JobType::SqlScript,
            connection_id: harness.profile_id,
            configuration: json!({"sql_script": "SELECT * FROM orders"}),
            pre_execution_sql: None,
            post_execution_sql: None,
            cron_expression: Some("0 2 * * *".to_string()),
            timezone: None,
            max_runtime_seconds: None,
            retry_policy: None,
            failure_threshold: None,
        }
    }

    #[tokio::test]
    async fn test_create_job_applies_defaults() {
        let h = harness();
        let job = h.manager.create_job(script_job(&h)).await.unwrap();

        assert!(job.is_active);
        assert_eq!(job.timezone, "UTC");
        assert_eq!(job.max_runtime_seconds, 3600);
        assert_eq!(job.failure_threshold, 5);
        assert_eq!(job.retry_policy.max_retries, 3);
        // Scheduled jobs are due for their first run immediately
        assert!(job.next_run_at.is_some());
        assert!(h.jobs.job(job.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_job_rejects_bad_cron() {
        let h = harness();
        let mut new_job = script_job(&h);
        new_job.cron_expression = Some("not a cron".to_string());

        let err = h.manager.create_job(new_job).await.unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CRON");
    }

    #[tokio::test]
    async fn test_create_manual_job_has_no_next_run() {
        let h = harness();
        let mut new_job = script_job(&h);
        new_job.cron_expression = None;

        let job = h.manager.create_job(new_job).await.unwrap();
        assert!(job.next_run_at.is_none());
    }

    #[tokio::test]
    async fn test_execute_job_success_path() {
        let h = harness();
        let job = h.manager.create_job(script_job(&h)).await.unwrap();

        let execution = h
            .manager
            .execute_job(job.id, TriggerSource::Manual, None)
            .await
            .unwrap();

        assert_eq!(execution.status, JobStatus::Completed);
        assert!(execution.completed_at.is_some());
        assert!(execution.duration_ms.is_some());
        assert_eq!(execution.result.as_ref().unwrap()["total_rows"], 1);
        assert!(execution.log.is_some());

        let updated = h.manager.job(job.id).await.unwrap();
        assert_eq!(updated.total_runs, 1);
        assert_eq!(updated.successful_runs, 1);
        assert_eq!(updated.retry_count, 0);
        assert!(updated.last_run_at.is_some());
        // Next occurrence recomputed from the cron expression
        assert!(updated.next_run_at.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_execute_job_failure_finalizes_and_schedules_retry() {
        let h = harness_with_factory(MockFactory::failing("relation does not exist"));
        let job = h.manager.create_job(script_job(&h)).await.unwrap();

        let execution = h
            .manager
            .execute_job(job.id, TriggerSource::Manual, None)
            .await
            .unwrap();

        assert_eq!(execution.status, JobStatus::Failed);
        assert!(execution
            .error_message
            .as_ref()
            .unwrap()
            .contains("relation does not exist"));

        let updated = h.manager.job(job.id).await.unwrap();
        assert_eq!(updated.failed_runs, 1);
        assert_eq!(updated.retry_count, 1);
        assert_eq!(updated.consecutive_failures, 1);
        assert!(updated.next_retry_at.is_some());
        assert!(updated.is_active);
    }

    #[tokio::test]
    async fn test_validation_failure_finalizes_failed() {
        let h = harness();
        let mut new_job = script_job(&h);
        new_job.configuration = json!({"sql_script": "DROP TABLE users", "read_only": true});
        let job = h.manager.create_job(new_job).await.unwrap();

        let execution = h
            .manager
            .execute_job(job.id, TriggerSource::Manual, None)
            .await
            .unwrap();

        assert_eq!(execution.status, JobStatus::Failed);
        assert!(execution.error_message.unwrap().contains("DROP"));
    }

    #[tokio::test]
    async fn test_unknown_job_unknown_connection_and_type() {
        let h = harness();

        let err = h
            .manager
            .execute_job(Uuid::new_v4(), TriggerSource::Manual, None)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "JOB_NOT_FOUND");

        let mut new_job = script_job(&h);
        new_job.connection_id = Uuid::new_v4();
        let orphan = h.manager.create_job(new_job).await.unwrap();
        let execution = h
            .manager
            .execute_job(orphan.id, TriggerSource::Manual, None)
            .await
            .unwrap_err();
        assert_eq!(execution.error_code(), "CONNECTION_NOT_FOUND");

        let mut new_job = script_job(&h);
        new_job.job_type = JobType::DatabaseBackup;
        new_job.configuration = json!({});
        let backup = h.manager.create_job(new_job).await.unwrap();
        let err = h
            .manager
            .execute_job(backup.id, TriggerSource::Manual, None)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_JOB_TYPE");
    }

    #[tokio::test]
    async fn test_inactive_job_rejects_schedule_allows_manual() {
        let h = harness();
        let created = h.manager.create_job(script_job(&h)).await.unwrap();

        let mut job = h.manager.job(created.id).await.unwrap();
        job.is_active = false;
        h.jobs.update_job(&job).await.unwrap();

        let err = h
            .manager
            .execute_job(job.id, TriggerSource::Schedule, None)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "JOB_INACTIVE");

        let execution = h
            .manager
            .execute_job(job.id, TriggerSource::Manual, None)
            .await
            .unwrap();
        assert_eq!(execution.status, JobStatus::Completed);
    }

    /// Hook that counts its invocations.
    struct CountingHook(std::sync::atomic::AtomicUsize);

    #[async_trait]
    impl ExecutionHook for CountingHook {
        async fn run(&self, _c: &ExecutionContext, log: &mut ExecutionLog) -> JobResult<()> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            log.info("hook ran");
            Ok(())
        }
    }

    impl CountingHook {
        fn new() -> Arc<Self> {
            Arc::new(Self(std::sync::atomic::AtomicUsize::new(0)))
        }

        fn count(&self) -> usize {
            self.0.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_hooks_run_around_executor() {
        let mut h = harness();
        let pre = CountingHook::new();
        let post = CountingHook::new();
        h.manager = h
            .manager
            .with_pre_hook(pre.clone())
            .with_post_hook(post.clone());

        let job = h.manager.create_job(script_job(&h)).await.unwrap();
        let execution = h
            .manager
            .execute_job(job.id, TriggerSource::Manual, None)
            .await
            .unwrap();

        assert_eq!(execution.status, JobStatus::Completed);
        assert_eq!(pre.count(), 1);
        assert_eq!(post.count(), 1);
    }

    #[tokio::test]
    async fn test_post_hook_skipped_on_executor_failure() {
        let mut h = harness_with_factory(MockFactory::failing("boom"));
        let pre = CountingHook::new();
        let post = CountingHook::new();
        h.manager = h
            .manager
            .with_pre_hook(pre.clone())
            .with_post_hook(post.clone());

        let job = h.manager.create_job(script_job(&h)).await.unwrap();
        let execution = h
            .manager
            .execute_job(job.id, TriggerSource::Manual, None)
            .await
            .unwrap();

        assert_eq!(execution.status, JobStatus::Failed);
        assert_eq!(pre.count(), 1);
        assert_eq!(post.count(), 0);
    }

    #[tokio::test]
    async fn test_job_hook_statements_run_around_executor() {
        let h = harness();
        let mut new_job = script_job(&h);
        new_job.pre_execution_sql = Some("SET application_name = 'etl'".to_string());
        new_job.post_execution_sql =
            Some("REFRESH MATERIALIZED VIEW daily_totals".to_string());
        let job = h.manager.create_job(new_job).await.unwrap();

        let execution = h
            .manager
            .execute_job(job.id, TriggerSource::Manual, None)
            .await
            .unwrap();

        assert_eq!(execution.status, JobStatus::Completed);
        let log = execution.log.unwrap();
        assert!(log.contains("running pre-execution hook"));
        assert!(log.contains("running post-execution hook"));
        // Post-execution hook is the last statement on the connection
        assert_eq!(
            h.connector.last_query(),
            "REFRESH MATERIALIZED VIEW daily_totals"
        );
    }

    #[tokio::test]
    async fn test_failing_pre_execution_sql_fails_before_executor() {
        let h = harness_with_factory(MockFactory::failing("permission denied"));
        let mut new_job = script_job(&h);
        new_job.pre_execution_sql = Some("SET ROLE etl".to_string());
        let job = h.manager.create_job(new_job).await.unwrap();

        let execution = h
            .manager
            .execute_job(job.id, TriggerSource::Manual, None)
            .await
            .unwrap();

        assert_eq!(execution.status, JobStatus::Failed);
        let log = execution.log.unwrap();
        assert!(log.contains("pre-execution hook failed"));
        // The executor never ran
        assert!(!log.contains("executing SQL script"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_ceiling_fails_the_execution() {
        /// Executor that outlives any reasonable ceiling.
        struct StallingExecutor;

        #[async_trait]
        impl JobExecutor for StallingExecutor {
            fn job_type(&self) -> JobType {
                JobType::SqlScript
            }

            fn required_permissions(&self, _c: &serde_json::Value) -> Vec<Permission> {
                vec![]
            }

            async fn validate(&self, _c: &ExecutionContext) -> JobResult<ValidationResult> {
                Ok(ValidationResult::default())
            }

            async fn execute(
                &self,
                _c: &ExecutionContext,
                _log: &mut ExecutionLog,
            ) -> JobResult<serde_json::Value> {
                tokio::time::sleep(Duration::from_secs(86_400)).await;
                Ok(json!({}))
            }
        }

        let h = harness();
        let mut registry = ExecutorRegistry::new();
        registry.register(|| Arc::new(StallingExecutor) as Arc<dyn JobExecutor>);
        let mut connections = ConnectionManager::new(CredentialVault::new([1u8; 32]));
        connections.register_factory(Arc::new(MockFactory::with_rows(vec![])));
        let manager = JobManager::new(
            h.jobs.clone(),
            h.profiles.clone(),
            Arc::new(connections),
            registry,
        );

        let mut new_job = script_job(&h);
        new_job.max_runtime_seconds = Some(5);
        let job = manager.create_job(new_job).await.unwrap();

        let execution = manager
            .execute_job(job.id, TriggerSource::Manual, None)
            .await
            .unwrap();

        assert_eq!(execution.status, JobStatus::Failed);
        assert!(execution.error_message.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancel_execution_state_machine() {
        let h = harness();
        let job = h.manager.create_job(script_job(&h)).await.unwrap();

        // A running execution cancels cleanly
        let mut execution = JobExecution::pending(job.id, TriggerSource::Manual, None);
        execution.status = JobStatus::Running;
        execution.started_at = Some(Utc::now());
        h.jobs.insert_execution(&execution).await.unwrap();

        let cancelled = h.manager.cancel_execution(execution.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(cancelled.completed_at.is_some());

        // A terminal execution does not
        let err = h.manager.cancel_execution(execution.id).await.unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATE");

        let err = h.manager.cancel_execution(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.error_code(), "EXECUTION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_run_due_jobs_executes_scheduled() {
        let h = harness();
        let job = h.manager.create_job(script_job(&h)).await.unwrap();
        // create_job marks it due immediately
        let executions = h.manager.run_due_jobs(Utc::now()).await.unwrap();

        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].job_id, job.id);
        assert_eq!(executions[0].status, JobStatus::Completed);
        assert_eq!(executions[0].triggered_by, TriggerSource::Schedule);
    }

    #[tokio::test]
    async fn test_run_due_jobs_dispatches_retry_with_parent() {
        let h = harness();
        let job = h.manager.create_job(script_job(&h)).await.unwrap();

        // A prior failed execution and a due retry slot
        let failed = {
            let mut e = JobExecution::pending(job.id, TriggerSource::Schedule, None);
            e.status = JobStatus::Failed;
            h.jobs.insert_execution(&e).await.unwrap();
            e
        };
        let mut stored = h.manager.job(job.id).await.unwrap();
        stored.next_run_at = None;
        stored.next_retry_at = Some(Utc::now() - chrono::Duration::seconds(1));
        stored.retry_count = 1;
        h.jobs.update_job(&stored).await.unwrap();

        let executions = h.manager.run_due_jobs(Utc::now()).await.unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].triggered_by, TriggerSource::Retry);
        assert_eq!(executions[0].parent_execution_id, Some(failed.id));
        assert_eq!(executions[0].status, JobStatus::Completed);

        // Retry slot consumed and failure chain cleared by the success
        let after = h.manager.job(job.id).await.unwrap();
        assert!(after.next_retry_at.is_none());
        assert_eq!(after.retry_count, 0);
    }

    #[tokio::test]
    async fn test_run_due_jobs_skips_idle_jobs() {
        let h = harness();
        let mut new_job = script_job(&h);
        new_job.cron_expression = None;
        h.manager.create_job(new_job).await.unwrap();

        let executions = h.manager.run_due_jobs(Utc::now()).await.unwrap();
        assert!(executions.is_empty());
    }

    #[tokio::test]
    async fn test_auto_disable_after_threshold_failures() {
        let h = harness_with_factory(MockFactory::failing("boom"));
        let mut new_job = script_job(&h);
        new_job.failure_threshold = Some(2);
        let job = h.manager.create_job(new_job).await.unwrap();

        h.manager
            .execute_job(job.id, TriggerSource::Manual, None)
            .await
            .unwrap();
        assert!(h.manager.job(job.id).await.unwrap().is_active);

        h.manager
            .execute_job(job.id, TriggerSource::Manual, None)
            .await
            .unwrap();
        let disabled = h.manager.job(job.id).await.unwrap();
        assert!(!disabled.is_active);
        // A disabled job schedules no further retries
        assert!(disabled.next_retry_at.is_none());
    }

    #[test]
    fn test_registry_replaces_and_lists() {
        let mut registry = ExecutorRegistry::new();
        registry.register(|| Arc::new(ScriptExecutor) as Arc<dyn JobExecutor>);
        registry.register(|| Arc::new(ScriptExecutor) as Arc<dyn JobExecutor>);

        assert_eq!(registry.registered_types(), vec![JobType::SqlScript]);
        assert!(registry.executor(JobType::SqlScript).is_some());
        assert!(registry.executor(JobType::DatabaseBackup).is_none());
    }
}
