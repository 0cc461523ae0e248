//! Postgres persistence for the operations subsystem.
//!
//! Implements the [`JobStore`](dataops_operations::store::JobStore) and
//! [`ProfileStore`](dataops_operations::store::ProfileStore) traits over
//! a `sqlx` pool. Schema migrations are embedded and applied with
//! [`run_migrations`].

use sqlx::migrate::Migrator;
use sqlx::PgPool;

use dataops_operations::store::{StoreError, StoreResult};

mod job_store;
mod profile_store;
mod rows;

pub use job_store::PgJobStore;
pub use profile_store::PgProfileStore;

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!();

/// Apply pending migrations.
pub async fn run_migrations(pool: &PgPool) -> StoreResult<()> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| StoreError::database_with_source("migration failed", e))
}
