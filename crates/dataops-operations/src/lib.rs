//! Scheduled database operations.
//!
//! Cron-driven jobs (SQL scripts, stored procedures, backups) executed
//! against connection profiles, with retry and auto-disable handling,
//! connection health monitoring, and engine capability detection. The
//! [`JobManager`](manager::JobManager) is the orchestrating surface;
//! persistence sits behind the [`store`] traits.

pub mod capability;
pub mod error;
pub mod executor;
pub mod health;
pub mod manager;
pub mod model;
pub mod retry;
pub mod scheduler;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use capability::CapabilityDetector;
pub use error::{JobError, JobResult};
pub use executor::{
    BackupExecutor, ExecutionContext, ExecutionLog, JobExecutor, Permission, ProcedureExecutor,
    ScriptExecutor, ValidationResult,
};
pub use health::{HealthMonitor, HealthReport};
pub use manager::{ExecutionHook, ExecutorRegistry, JobManager};
pub use model::{
    ConnectionHealthLog, JobExecution, JobStatus, JobType, NewJob, RetryPolicy, ScheduledJob,
    TriggerSource,
};
pub use retry::RetryHandler;
pub use store::{JobStore, ProfileStore, StoreError, StoreResult};

/// Commonly used items.
pub mod prelude {
    pub use crate::error::{JobError, JobResult};
    pub use crate::executor::JobExecutor;
    pub use crate::manager::{ExecutorRegistry, JobManager};
    pub use crate::model::{
        JobExecution, JobStatus, JobType, NewJob, ScheduledJob, TriggerSource,
    };
    pub use crate::store::{JobStore, ProfileStore};
}
