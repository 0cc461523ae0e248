//! Connection manager
//!
//! Keeps one live connector per active profile, builds them on demand
//! through per-family factories, and owns credential decryption so
//! plaintext secrets never leave this module.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::crypto::CredentialVault;
use crate::error::{ConnectorError, ConnectorResult};
use crate::profile::ConnectionProfile;
use crate::resilience::{RetryConfig, RetryExecutor};
use crate::traits::{Connector, ConnectorFactory};
use crate::types::{DatabaseFamily, HealthCheckResult};

/// Timeout applied to throwaway connectors used for validation probes.
const TEMP_CONNECTOR_TIMEOUT_SECS: u64 = 10;

/// Manages live connectors keyed by profile id.
///
/// Connectors are created lazily, cached, and reused across callers.
/// The cache is guarded by an async `RwLock`; creation re-checks the
/// cache under the write lock so two racing callers end up sharing one
/// connector.
pub struct ConnectionManager {
    factories: HashMap<DatabaseFamily, Arc<dyn ConnectorFactory>>,
    connectors: RwLock<HashMap<Uuid, CachedConnector>>,
    vault: CredentialVault,
    retry: RetryExecutor,
}

struct CachedConnector {
    connector: Arc<dyn Connector>,
    last_used: Instant,
}

impl ConnectionManager {
    /// Create a manager with no registered factories.
    #[must_use]
    pub fn new(vault: CredentialVault) -> Self {
        Self {
            factories: HashMap::new(),
            connectors: RwLock::new(HashMap::new()),
            vault,
            retry: RetryExecutor::new(RetryConfig::default()),
        }
    }

    /// Override the retry policy used for connection attempts.
    #[must_use]
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry = RetryExecutor::new(config);
        self
    }

    /// Register a connector factory for its database family.
    ///
    /// Registering a second factory for the same family replaces the
    /// first.
    pub fn register_factory(&mut self, factory: Arc<dyn ConnectorFactory>) {
        let family = factory.family();
        debug!(family = %family, "Registered connector factory");
        self.factories.insert(family, factory);
    }

    /// Families with a registered factory.
    #[must_use]
    pub fn supported_families(&self) -> Vec<DatabaseFamily> {
        self.factories.keys().copied().collect()
    }

    /// Get (or create) the shared connector for a profile.
    ///
    /// A cached connector that lost its connection is reconnected in
    /// place. Connection attempts go through the retry executor, so
    /// transient failures are absorbed up to the configured budget.
    #[instrument(skip(self, profile), fields(profile_id = %profile.id, family = %profile.family))]
    pub async fn get_connector(
        &self,
        profile: &ConnectionProfile,
    ) -> ConnectorResult<Arc<dyn Connector>> {
        // Fast path: already cached and live.
        {
            let cache = self.connectors.read().await;
            if let Some(cached) = cache.get(&profile.id) {
                if cached.connector.is_connected().await {
                    let connector = cached.connector.clone();
                    drop(cache);
                    self.touch(profile.id).await;
                    return Ok(connector);
                }
            }
        }

        let mut cache = self.connectors.write().await;

        // Re-check under the write lock: a racing caller may have
        // created the connector while we waited.
        if let Some(cached) = cache.get(&profile.id) {
            let connector = cached.connector.clone();
            if connector.is_connected().await {
                return Ok(connector);
            }
            debug!("Cached connector lost its connection, reconnecting");
            self.retry.execute(|| connector.connect()).await?;
            return Ok(connector);
        }

        let connector = self.build_connector(profile, None).await?;
        self.retry.execute(|| connector.connect()).await?;

        info!("Connector created and cached");
        cache.insert(
            profile.id,
            CachedConnector {
                connector: connector.clone(),
                last_used: Instant::now(),
            },
        );

        Ok(connector)
    }

    /// Build a throwaway connector for validating a profile.
    ///
    /// Uses a single connection and a short timeout, and is never
    /// cached. The caller is responsible for disconnecting it.
    #[instrument(skip(self, profile), fields(profile_id = %profile.id, family = %profile.family))]
    pub async fn create_temp_connector(
        &self,
        profile: &ConnectionProfile,
    ) -> ConnectorResult<Arc<dyn Connector>> {
        let mut temp = profile.clone();
        temp.pool_size = 1;
        temp.timeout_seconds = TEMP_CONNECTOR_TIMEOUT_SECS;

        let connector = self.build_connector(&temp, Some(profile.id)).await?;
        connector.connect().await?;
        Ok(connector)
    }

    async fn build_connector(
        &self,
        profile: &ConnectionProfile,
        vault_scope: Option<Uuid>,
    ) -> ConnectorResult<Arc<dyn Connector>> {
        profile.validate()?;

        let factory = self.factories.get(&profile.family).ok_or_else(|| {
            ConnectorError::UnsupportedDatabase {
                family: profile.family.to_string(),
            }
        })?;

        // Decrypt just-in-time; the plaintext lives only for the span
        // of pool construction.
        let scope = vault_scope.unwrap_or(profile.id);
        let connection_string = self.connection_string_for_scope(profile, scope)?;
        factory.create(profile, &connection_string).await
    }

    /// Assemble the connection string for a profile, decrypting any
    /// stored credentials.
    pub fn connection_string_for(&self, profile: &ConnectionProfile) -> ConnectorResult<String> {
        self.connection_string_for_scope(profile, profile.id)
    }

    fn connection_string_for_scope(
        &self,
        profile: &ConnectionProfile,
        scope: Uuid,
    ) -> ConnectorResult<String> {
        let full_uri = profile
            .encrypted_uri
            .as_deref()
            .map(|ct| self.vault.decrypt_string(scope, ct))
            .transpose()?;
        let password = profile
            .encrypted_password
            .as_deref()
            .map(|ct| self.vault.decrypt_string(scope, ct))
            .transpose()?;

        profile.connection_string(password.as_deref(), full_uri.as_deref())
    }

    /// Decrypt the profile's stored password.
    ///
    /// For callers that hand credentials to a subprocess environment;
    /// the plaintext must not be retained or logged.
    pub fn credentials_for(&self, profile: &ConnectionProfile) -> ConnectorResult<Option<String>> {
        profile
            .encrypted_password
            .as_deref()
            .map(|ct| self.vault.decrypt_string(profile.id, ct))
            .transpose()
    }

    /// Run a health probe against a profile, using the cached connector
    /// when one exists and a temporary one otherwise.
    pub async fn health_check(
        &self,
        profile: &ConnectionProfile,
    ) -> ConnectorResult<HealthCheckResult> {
        let cached = {
            let cache = self.connectors.read().await;
            cache.get(&profile.id).map(|c| c.connector.clone())
        };

        match cached {
            Some(connector) => connector.test_connection().await,
            None => {
                let connector = self.create_temp_connector(profile).await?;
                let result = connector.test_connection().await;
                if let Err(e) = connector.disconnect().await {
                    warn!(error = %e, "Failed to disconnect temp connector after probe");
                }
                result
            }
        }
    }

    /// Disconnect and evict the connector for a profile.
    pub async fn close_connection(&self, profile_id: Uuid) -> ConnectorResult<()> {
        let removed = {
            let mut cache = self.connectors.write().await;
            cache.remove(&profile_id)
        };
        if let Some(cached) = removed {
            cached.connector.disconnect().await?;
            info!(%profile_id, "Connection closed");
        }
        Ok(())
    }

    /// Disconnect everything. Errors are logged, not propagated, so one
    /// bad connector cannot block shutdown.
    pub async fn close_all_connections(&self) {
        let drained: Vec<_> = {
            let mut cache = self.connectors.write().await;
            cache.drain().collect()
        };
        for (profile_id, cached) in drained {
            if let Err(e) = cached.connector.disconnect().await {
                warn!(%profile_id, error = %e, "Failed to disconnect connector during shutdown");
            }
        }
        info!("All connections closed");
    }

    /// Evict connectors that report themselves disconnected, plus any
    /// unused for longer than `max_idle`.
    ///
    /// Returns the number of connectors evicted.
    pub async fn cleanup_idle_connections(&self, max_idle: Duration) -> usize {
        let stale: Vec<(Uuid, Arc<dyn Connector>)> = {
            let mut cache = self.connectors.write().await;
            let now = Instant::now();
            let mut stale_ids = Vec::new();
            for (id, cached) in cache.iter() {
                if now.duration_since(cached.last_used) > max_idle
                    || !cached.connector.is_connected().await
                {
                    stale_ids.push(*id);
                }
            }
            stale_ids
                .into_iter()
                .filter_map(|id| cache.remove(&id).map(|c| (id, c.connector)))
                .collect()
        };

        let count = stale.len();
        for (profile_id, connector) in stale {
            if let Err(e) = connector.disconnect().await {
                warn!(%profile_id, error = %e, "Failed to disconnect idle connector");
            }
        }
        if count > 0 {
            info!(count, "Evicted idle connections");
        }
        count
    }

    /// Snapshot of cached connectors: profile id to display name.
    pub async fn active_connections(&self) -> HashMap<Uuid, String> {
        self.connectors
            .read()
            .await
            .iter()
            .map(|(id, cached)| (*id, cached.connector.display_name()))
            .collect()
    }

    async fn touch(&self, profile_id: Uuid) {
        let mut cache = self.connectors.write().await;
        if let Some(cached) = cache.get_mut(&profile_id) {
            cached.last_used = Instant::now();
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
