//! The tenant connection router.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use conduit_core::clock::{Clock, SystemClock};
use conduit_core::scope::RequestScope;
use conduit_lock::DistributedLock;
use tracing::{debug, info, instrument, warn};

use crate::connection::{ConnectionDescriptor, ConnectionFactory, TenantConnection};
use crate::directory::{IsolationLevel, SecretDecryptor, TenantDirectory};
use crate::error::TenancyError;

/// Lock resource guarding first-time registration of a tenant.
pub const REGISTRATION_RESOURCE: &str = "TenantRegistration";

struct RegistrationLock {
    lock: Arc<DistributedLock>,
    ttl: Duration,
    wait: Option<Duration>,
}

/// Resolves tenant ids to cached storage connections.
///
/// Entries are never evicted. When two resolutions of the same unseen tenant
/// race, both may open storage but the first to register wins and every
/// caller gets the registered connection.
pub struct TenantConnectionRouter {
    app_id: String,
    directory: Arc<dyn TenantDirectory>,
    decryptor: Arc<dyn SecretDecryptor>,
    factory: Arc<dyn ConnectionFactory>,
    clock: Arc<dyn Clock>,
    connections: RwLock<HashMap<String, Arc<TenantConnection>>>,
    registration_lock: Option<RegistrationLock>,
}

impl std::fmt::Debug for TenantConnectionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantConnectionRouter")
            .field("app_id", &self.app_id)
            .field("registered", &self.registered_count())
            .field("registration_lock", &self.registration_lock.is_some())
            .finish_non_exhaustive()
    }
}

impl TenantConnectionRouter {
    /// Creates a router for `app_id`.
    #[must_use]
    pub fn new(
        app_id: impl Into<String>,
        directory: Arc<dyn TenantDirectory>,
        decryptor: Arc<dyn SecretDecryptor>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            directory,
            decryptor,
            factory,
            clock: Arc::new(SystemClock),
            connections: RwLock::new(HashMap::new()),
            registration_lock: None,
        }
    }

    /// Stamps `created_at` from `clock` instead of the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Serializes first-time registration of a tenant across processes.
    ///
    /// `wait = None` waits for the lock indefinitely.
    #[must_use]
    pub fn with_registration_lock(
        mut self,
        lock: Arc<DistributedLock>,
        ttl: Duration,
        wait: Option<Duration>,
    ) -> Self {
        self.registration_lock = Some(RegistrationLock { lock, ttl, wait });
        self
    }

    /// Application id sent to the tenant directory.
    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Number of tenants registered so far.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.connections.read().map_or(0, |connections| connections.len())
    }

    /// Returns the connection for `tenant_id`, registering it on first use.
    ///
    /// # Errors
    ///
    /// Returns `TenancyError::TenantNotFound` when the directory does not know
    /// the tenant, and the directory, decryption, connection or lock errors
    /// raised along the way.
    #[instrument(skip(self), fields(app_id = %self.app_id))]
    pub async fn resolve(&self, tenant_id: &str) -> Result<Arc<TenantConnection>, TenancyError> {
        if let Some(connection) = self.cached(tenant_id)? {
            return Ok(connection);
        }

        let Some(guard) = &self.registration_lock else {
            return self.register(tenant_id).await;
        };

        let handle = guard
            .lock
            .acquire_blocking(REGISTRATION_RESOURCE, tenant_id, guard.ttl, guard.wait)
            .await?;

        let result = match self.cached(tenant_id) {
            Ok(Some(connection)) => Ok(connection),
            Ok(None) => self.register(tenant_id).await,
            Err(err) => Err(err),
        };

        match guard.lock.release(handle).await {
            Ok(true) => {}
            Ok(false) => warn!(tenant_id, "registration lock expired before release"),
            Err(err) => warn!(tenant_id, error = %err, "failed to release registration lock"),
        }

        result
    }

    /// Resolves `tenant_id` and makes it the active storage target of `scope`.
    ///
    /// # Errors
    ///
    /// Returns any error raised by [`TenantConnectionRouter::resolve`]; the
    /// scope is left untouched in that case.
    pub async fn switch_to(
        &self,
        scope: &mut RequestScope,
        tenant_id: &str,
    ) -> Result<Arc<TenantConnection>, TenancyError> {
        let connection = self.resolve(tenant_id).await?;
        scope.set_target(connection.target());
        debug!(tenant_id, storage = %connection.storage.describe(), "switched storage target");
        Ok(connection)
    }

    fn cached(&self, tenant_id: &str) -> Result<Option<Arc<TenantConnection>>, TenancyError> {
        let connections = self.connections.read().map_err(|_| TenancyError::Registry)?;
        Ok(connections.get(tenant_id).cloned())
    }

    async fn register(&self, tenant_id: &str) -> Result<Arc<TenantConnection>, TenancyError> {
        let info = self
            .directory
            .get_tenant_info(tenant_id, &self.app_id)
            .await?
            .ok_or_else(|| TenancyError::TenantNotFound(tenant_id.to_owned()))?;

        let (descriptor, storage) = match info.isolation_level {
            IsolationLevel::Shared => {
                let storage = self.factory.shared(tenant_id).await?;
                let descriptor = ConnectionDescriptor {
                    connection_string: None,
                    isolation: IsolationLevel::Shared,
                    namespace: Some(tenant_id.to_owned()),
                };
                (descriptor, storage)
            }
            IsolationLevel::Dedicated => {
                let encrypted = info
                    .connection_string_encrypted
                    .filter(|secret| !secret.is_empty())
                    .ok_or_else(|| TenancyError::Connect {
                        tenant_id: tenant_id.to_owned(),
                        reason: "dedicated tenant has no connection string".into(),
                    })?;
                let connection_string =
                    self.decryptor
                        .decrypt(&encrypted)
                        .ok_or_else(|| TenancyError::Decrypt {
                            tenant_id: tenant_id.to_owned(),
                        })?;
                let storage = self.factory.dedicated(tenant_id, &connection_string).await?;
                let descriptor = ConnectionDescriptor {
                    connection_string: Some(connection_string),
                    isolation: IsolationLevel::Dedicated,
                    namespace: None,
                };
                (descriptor, storage)
            }
        };

        let candidate = Arc::new(TenantConnection {
            tenant_id: tenant_id.to_owned(),
            descriptor,
            storage,
            created_at: self.clock.now(),
        });

        let mut connections = self.connections.write().map_err(|_| TenancyError::Registry)?;
        let registered = connections
            .entry(tenant_id.to_owned())
            .or_insert_with(|| Arc::clone(&candidate));
        if Arc::ptr_eq(registered, &candidate) {
            info!(
                tenant_id,
                isolation = ?registered.descriptor.isolation,
                storage = %registered.storage.describe(),
                "tenant connection registered"
            );
        } else {
            debug!(tenant_id, "lost registration race; using existing connection");
        }
        Ok(Arc::clone(registered))
    }
}
