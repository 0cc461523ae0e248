//! Capability detection
//!
//! Asks a live connector what its engine can do and caches the result
//! on the profile, so feature checks don't need a round trip.

use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{JobError, JobResult};
use crate::store::ProfileStore;
use dataops_connector::manager::ConnectionManager;
use dataops_connector::types::DatabaseCapabilities;

/// Detects and caches engine capabilities per connection profile.
pub struct CapabilityDetector {
    connections: Arc<ConnectionManager>,
    profiles: Arc<dyn ProfileStore>,
}

impl CapabilityDetector {
    #[must_use]
    pub fn new(connections: Arc<ConnectionManager>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            connections,
            profiles,
        }
    }

    /// Probe the engine and persist the capability blob onto the
    /// profile.
    #[instrument(skip(self), fields(connection_id = %connection_id))]
    pub async fn detect_and_save(&self, connection_id: Uuid) -> JobResult<DatabaseCapabilities> {
        let profile = self
            .profiles
            .profile(connection_id)
            .await?
            .ok_or(JobError::ConnectionNotFound { connection_id })?;

        let connector = self.connections.get_connector(&profile).await?;
        let capabilities = connector.detect_capabilities().await?;

        let blob = serde_json::to_value(&capabilities).map_err(|e| {
            JobError::execution_failed(format!("capability blob failed to serialize: {e}"))
        })?;
        self.profiles.save_capabilities(connection_id, blob).await?;

        info!(version = %capabilities.version, "Capabilities detected and cached");
        Ok(capabilities)
    }

    /// Check a named feature against the cached capability blob.
    ///
    /// False when nothing has been detected yet.
    pub async fn supports_feature(&self, connection_id: Uuid, feature: &str) -> JobResult<bool> {
        let profile = self
            .profiles
            .profile(connection_id)
            .await?
            .ok_or(JobError::ConnectionNotFound { connection_id })?;

        let Some(blob) = profile.capabilities else {
            return Ok(false);
        };
        let capabilities: DatabaseCapabilities = serde_json::from_value(blob)
            .map_err(|e| JobError::execution_failed(format!("cached capability blob is invalid: {e}")))?;
        Ok(capabilities.supports_feature(feature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_profile, InMemoryProfileStore};
    use dataops_connector::crypto::CredentialVault;
    use dataops_connector::types::DatabaseFamily;
    use serde_json::json;

    fn detector_with_store() -> (CapabilityDetector, Arc<InMemoryProfileStore>) {
        let manager = Arc::new(ConnectionManager::new(CredentialVault::new([1u8; 32])));
        let store = Arc::new(InMemoryProfileStore::new());
        (CapabilityDetector::new(manager, store.clone()), store)
    }

    #[tokio::test]
    async fn test_unknown_connection() {
        let (detector, _) = detector_with_store();
        let err = detector.detect_and_save(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.error_code(), "CONNECTION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_supports_feature_without_detection() {
        let (detector, store) = detector_with_store();
        let profile = sample_profile(DatabaseFamily::Postgres);
        store.insert(profile.clone());

        assert!(!detector
            .supports_feature(profile.id, "transactions")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_supports_feature_from_cached_blob() {
        let (detector, store) = detector_with_store();
        let mut profile = sample_profile(DatabaseFamily::Postgres);
        profile.capabilities = Some(json!({
            "version": "16.1",
            "supports_transactions": true,
            "supports_stored_procedures": true,
            "supports_views": true,
            "supports_materialized_views": false,
            "supports_json": true,
            "supports_full_text_search": true,
        }));
        store.insert(profile.clone());

        assert!(detector
            .supports_feature(profile.id, "transactions")
            .await
            .unwrap());
        assert!(!detector
            .supports_feature(profile.id, "materialized_views")
            .await
            .unwrap());
        assert!(!detector
            .supports_feature(profile.id, "time_travel")
            .await
            .unwrap());
    }
}
