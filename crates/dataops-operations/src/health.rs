//! Connection health monitoring
//!
//! Probes each active profile, rolls the outcome into the profile's
//! health classification, and appends an audit row per probe. Three
//! consecutive failed probes demote a connection from degraded to
//! offline.

use chrono::Utc;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::error::JobResult;
use crate::model::ConnectionHealthLog;
use crate::store::ProfileStore;
use dataops_connector::manager::ConnectionManager;
use dataops_connector::profile::ConnectionProfile;
use dataops_connector::types::HealthStatus;

/// Failed probes before a connection is classified offline.
const OFFLINE_THRESHOLD: u32 = 3;

/// Outcome of one monitoring pass over a profile.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub connection_id: Uuid,
    pub status: HealthStatus,
    pub response_time_ms: Option<u64>,
    pub error_message: Option<String>,
    pub failed_attempts: u32,
}

/// Probes connections and maintains their health trail.
pub struct HealthMonitor {
    connections: Arc<ConnectionManager>,
    profiles: Arc<dyn ProfileStore>,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(connections: Arc<ConnectionManager>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            connections,
            profiles,
        }
    }

    /// Probe one profile and persist the outcome.
    ///
    /// A failed probe is data, not an error: the report carries the
    /// new classification and the error goes into the health log.
    #[instrument(skip(self, profile), fields(connection_id = %profile.id))]
    pub async fn check_connection(&self, profile: &ConnectionProfile) -> JobResult<HealthReport> {
        let (status, response_time_ms, error_message, failed_attempts) =
            match self.connections.health_check(profile).await {
                Ok(probe) if probe.healthy => {
                    (HealthStatus::Online, Some(probe.response_time_ms), None, 0)
                }
                Ok(probe) => {
                    let failed = profile.failed_attempts + 1;
                    let status = if failed >= OFFLINE_THRESHOLD {
                        HealthStatus::Offline
                    } else {
                        HealthStatus::Degraded
                    };
                    (
                        status,
                        Some(probe.response_time_ms),
                        probe.error_message,
                        failed,
                    )
                }
                Err(e) => {
                    // Could not even build a connector to probe with
                    warn!(error = %e, "Health probe could not reach the target");
                    (
                        HealthStatus::Offline,
                        None,
                        Some(e.to_string()),
                        profile.failed_attempts + 1,
                    )
                }
            };

        let checked_at = Utc::now();
        self.profiles
            .update_health(profile.id, status, response_time_ms, failed_attempts, checked_at)
            .await?;
        self.profiles
            .insert_health_log(&ConnectionHealthLog::system(
                profile.id,
                status,
                response_time_ms,
                error_message.clone(),
            ))
            .await?;

        Ok(HealthReport {
            connection_id: profile.id,
            status,
            response_time_ms,
            error_message,
            failed_attempts,
        })
    }

    /// Probe every active profile. One unreachable connection does not
    /// stop the pass.
    pub async fn monitor_all_connections(&self) -> JobResult<Vec<HealthReport>> {
        let profiles = self.profiles.active_profiles().await?;
        let mut reports = Vec::with_capacity(profiles.len());
        for profile in &profiles {
            match self.check_connection(profile).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    warn!(connection_id = %profile.id, error = %e, "Health check pass skipped a connection");
                }
            }
        }
        Ok(reports)
    }

    /// Health log rows for a connection within the lookback window,
    /// newest first.
    pub async fn health_history(
        &self,
        connection_id: Uuid,
        hours: u32,
    ) -> JobResult<Vec<ConnectionHealthLog>> {
        Ok(self.profiles.health_history(connection_id, hours).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryProfileStore;
    use dataops_connector::crypto::CredentialVault;
    use dataops_connector::types::DatabaseFamily;

    fn monitor_with_store() -> (HealthMonitor, Arc<InMemoryProfileStore>) {
        // No factories registered: probes fail with UnsupportedDatabase,
        // which exercises the offline path.
        let manager = Arc::new(ConnectionManager::new(CredentialVault::new([1u8; 32])));
        let store = Arc::new(InMemoryProfileStore::new());
        (HealthMonitor::new(manager, store.clone()), store)
    }

    fn profile() -> ConnectionProfile {
        ConnectionProfile::new("orders-db", DatabaseFamily::Postgres, "orders")
            .with_host("db.internal")
            .activated()
    }

    #[tokio::test]
    async fn test_unreachable_target_goes_offline() {
        let (monitor, store) = monitor_with_store();
        let profile = profile();
        store.insert(profile.clone());

        let report = monitor.check_connection(&profile).await.unwrap();
        assert_eq!(report.status, HealthStatus::Offline);
        assert_eq!(report.failed_attempts, 1);
        assert!(report.error_message.is_some());

        // Probe outcome persisted onto the profile and the log
        let stored = store.profile(profile.id).await.unwrap().unwrap();
        assert_eq!(stored.health_status, HealthStatus::Offline);
        assert_eq!(stored.failed_attempts, 1);
        assert!(stored.last_health_check.is_some());
        assert_eq!(store.health_log_count(), 1);
    }

    #[tokio::test]
    async fn test_monitor_all_covers_active_profiles() {
        let (monitor, store) = monitor_with_store();
        store.insert(profile());
        store.insert(profile());

        let inactive = ConnectionProfile::new("old-db", DatabaseFamily::Postgres, "old")
            .with_host("db.internal");
        store.insert(inactive);

        let reports = monitor.monitor_all_connections().await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(store.health_log_count(), 2);
    }

    #[tokio::test]
    async fn test_health_history_filters_by_connection() {
        let (monitor, store) = monitor_with_store();
        let a = profile();
        let b = profile();
        store.insert(a.clone());
        store.insert(b.clone());

        monitor.check_connection(&a).await.unwrap();
        monitor.check_connection(&a).await.unwrap();
        monitor.check_connection(&b).await.unwrap();

        let history = monitor.health_history(a.id, 24).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|log| log.connection_id == a.id));
        assert!(history.iter().all(|log| log.checked_by == "system"));
    }
}
