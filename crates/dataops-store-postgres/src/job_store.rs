//! sqlx-backed job store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use dataops_operations::model::{JobExecution, ScheduledJob};
use dataops_operations::store::{JobStore, StoreError, StoreResult};

use crate::rows::{signed_32, signed_64, ExecutionRow, JobRow};

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::database_with_source("query failed", e)
}

/// Job storage over a postgres pool.
#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert_job(&self, job: &ScheduledJob) -> StoreResult<()> {
        let retry_policy = serde_json::to_value(&job.retry_policy)
            .map_err(|e| StoreError::serialization(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO scheduled_jobs (
                id, name, description, job_type, connection_id, configuration,
                pre_execution_sql, post_execution_sql,
                cron_expression, timezone, is_active, max_runtime_seconds,
                retry_policy, failure_threshold, retry_count, consecutive_failures,
                next_retry_at, next_run_at, last_run_at,
                total_runs, successful_runs, failed_runs,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19, $20,
                    $21, $22, $23, $24)
            ",
        )
        .bind(job.id)
        .bind(&job.name)
        .bind(&job.description)
        .bind(job.job_type.as_str())
        .bind(job.connection_id)
        .bind(&job.configuration)
        .bind(&job.pre_execution_sql)
        .bind(&job.post_execution_sql)
        .bind(&job.cron_expression)
        .bind(&job.timezone)
        .bind(job.is_active)
        .bind(signed_64(job.max_runtime_seconds, "max runtime")?)
        .bind(retry_policy)
        .bind(signed_32(job.failure_threshold, "failure threshold")?)
        .bind(signed_32(job.retry_count, "retry count")?)
        .bind(signed_32(job.consecutive_failures, "consecutive failures")?)
        .bind(job.next_retry_at)
        .bind(job.next_run_at)
        .bind(job.last_run_at)
        .bind(signed_64(job.total_runs, "total runs")?)
        .bind(signed_64(job.successful_runs, "successful runs")?)
        .bind(signed_64(job.failed_runs, "failed runs")?)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn job(&self, job_id: Uuid) -> StoreResult<Option<ScheduledJob>> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM scheduled_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(ScheduledJob::try_from).transpose()
    }

    async fn update_job(&self, job: &ScheduledJob) -> StoreResult<()> {
        let retry_policy = serde_json::to_value(&job.retry_policy)
            .map_err(|e| StoreError::serialization(e.to_string()))?;

        let result = sqlx::query(
            r"
            UPDATE scheduled_jobs SET
                name = $2,
                description = $3,
                configuration = $4,
                pre_execution_sql = $5,
                post_execution_sql = $6,
                cron_expression = $7,
                timezone = $8,
                is_active = $9,
                max_runtime_seconds = $10,
                retry_policy = $11,
                failure_threshold = $12,
                retry_count = $13,
                consecutive_failures = $14,
                next_retry_at = $15,
                next_run_at = $16,
                last_run_at = $17,
                total_runs = $18,
                successful_runs = $19,
                failed_runs = $20,
                updated_at = $21
            WHERE id = $1
            ",
        )
        .bind(job.id)
        .bind(&job.name)
        .bind(&job.description)
        .bind(&job.configuration)
        .bind(&job.pre_execution_sql)
        .bind(&job.post_execution_sql)
        .bind(&job.cron_expression)
        .bind(&job.timezone)
        .bind(job.is_active)
        .bind(signed_64(job.max_runtime_seconds, "max runtime")?)
        .bind(retry_policy)
        .bind(signed_32(job.failure_threshold, "failure threshold")?)
        .bind(signed_32(job.retry_count, "retry count")?)
        .bind(signed_32(job.consecutive_failures, "consecutive failures")?)
        .bind(job.next_retry_at)
        .bind(job.next_run_at)
        .bind(job.last_run_at)
        .bind(signed_64(job.total_runs, "total runs")?)
        .bind(signed_64(job.successful_runs, "successful runs")?)
        .bind(signed_64(job.failed_runs, "failed runs")?)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "job",
                id: job.id,
            });
        }
        Ok(())
    }

    async fn delete_job(&self, job_id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM scheduled_jobs WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "job",
                id: job_id,
            });
        }
        Ok(())
    }

    async fn due_jobs(&self, now: DateTime<Utc>) -> StoreResult<Vec<ScheduledJob>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r"
            SELECT * FROM scheduled_jobs
            WHERE is_active AND (next_run_at <= $1 OR next_retry_at <= $1)
            ORDER BY COALESCE(next_retry_at, next_run_at)
            ",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(ScheduledJob::try_from).collect()
    }

    async fn insert_execution(&self, execution: &JobExecution) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO job_executions (
                id, job_id, status, triggered_by, parent_execution_id,
                started_at, completed_at, duration_ms,
                result, error_message, log, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ",
        )
        .bind(execution.id)
        .bind(execution.job_id)
        .bind(execution.status.as_str())
        .bind(execution.triggered_by.as_str())
        .bind(execution.parent_execution_id)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(
            execution
                .duration_ms
                .map(|v| signed_64(v, "duration"))
                .transpose()?,
        )
        .bind(&execution.result)
        .bind(&execution.error_message)
        .bind(&execution.log)
        .bind(execution.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn execution(&self, execution_id: Uuid) -> StoreResult<Option<JobExecution>> {
        let row: Option<ExecutionRow> =
            sqlx::query_as("SELECT * FROM job_executions WHERE id = $1")
                .bind(execution_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        row.map(JobExecution::try_from).transpose()
    }

    async fn update_execution(&self, execution: &JobExecution) -> StoreResult<()> {
        let result = sqlx::query(
            r"
            UPDATE job_executions SET
                status = $2,
                started_at = $3,
                completed_at = $4,
                duration_ms = $5,
                result = $6,
                error_message = $7,
                log = $8
            WHERE id = $1
            ",
        )
        .bind(execution.id)
        .bind(execution.status.as_str())
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(
            execution
                .duration_ms
                .map(|v| signed_64(v, "duration"))
                .transpose()?,
        )
        .bind(&execution.result)
        .bind(&execution.error_message)
        .bind(&execution.log)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "execution",
                id: execution.id,
            });
        }
        Ok(())
    }

    async fn executions_for_job(
        &self,
        job_id: Uuid,
        limit: u32,
    ) -> StoreResult<Vec<JobExecution>> {
        let rows: Vec<ExecutionRow> = sqlx::query_as(
            r"
            SELECT * FROM job_executions
            WHERE job_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            ",
        )
        .bind(job_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(JobExecution::try_from).collect()
    }
}
