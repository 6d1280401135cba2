//! Lease-backed service registration
//!
//! A [`Registrar`] advertises one address of a service under a lease. While
//! [`keep_alive`](Registrar::keep_alive) runs the lease is renewed, and a new
//! lease is granted whenever renewal stops. [`close`](Registrar::close)
//! retracts the address and revokes the lease.
//!
//! The state mutex is held while registering, never while waiting for
//! renewals, so `close` can always make progress: it cancels the registrar's
//! scope first, which aborts any store call `keep_alive` is waiting on.

use crate::error::{DiscoveryError, StoreError};
use crate::naming::{Address, Update};
use crate::store::{CoordinationStore, KeepAliveEvent, KeepAliveStream, LeaseId};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether_log::{debug, error, info, warn, Logger};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Smallest lease time-to-live, in seconds
pub const MIN_TTL_SECS: i64 = 3;

#[derive(Debug, Default)]
struct RegistrarState {
    /// Most recently granted lease
    lease: Option<LeaseId>,
    /// Lease the published name mapping is bound to
    published: Option<LeaseId>,
    closed: bool,
}

/// Clears the keeping flag when `keep_alive` returns or is dropped.
struct Keeping<'a>(&'a AtomicBool);

impl Drop for Keeping<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Registers one service address into a coordination store under a lease
pub struct Registrar<S> {
    store: S,
    service: String,
    address: Address,
    ttl: i64,
    logger: Arc<Logger>,
    scope: CancellationToken,
    keeping: AtomicBool,
    state: Mutex<RegistrarState>,
}

impl<S: CoordinationStore> Registrar<S> {
    /// Create a registrar. No store calls are made until
    /// [`keep_alive`](Self::keep_alive).
    ///
    /// `ttl` is raised to [`MIN_TTL_SECS`] if smaller.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use std::sync::Arc;
    /// use tether_discovery::{Address, EtcdConfig, EtcdStore, Registrar};
    /// use tether_log::Logger;
    ///
    /// let config = EtcdConfig::from_env()?;
    /// let store = EtcdStore::connect(&config).await?;
    /// let logger = Arc::new(Logger::from_env()?);
    ///
    /// let registrar = Arc::new(Registrar::new(
    ///     store,
    ///     "api",
    ///     Address::new("10.0.0.1:9000"),
    ///     config.ttl,
    ///     logger,
    /// ));
    ///
    /// let keeper = tokio::spawn({
    ///     let registrar = registrar.clone();
    ///     async move { registrar.keep_alive().await }
    /// });
    ///
    /// // on shutdown
    /// registrar.close().await?;
    /// ```
    pub fn new(
        store: S,
        service: impl Into<String>,
        address: Address,
        ttl: i64,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            store,
            service: service.into(),
            address,
            ttl: ttl.max(MIN_TTL_SECS),
            logger,
            scope: CancellationToken::new(),
            keeping: AtomicBool::new(false),
            state: Mutex::new(RegistrarState::default()),
        }
    }

    /// Derive the registrar's scope from `parent`, so cancelling `parent`
    /// also stops [`keep_alive`](Self::keep_alive).
    pub fn with_parent_scope(mut self, parent: &CancellationToken) -> Self {
        self.scope = parent.child_token();
        self
    }

    /// Service name
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Advertised address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Effective lease time-to-live in seconds
    pub fn ttl(&self) -> i64 {
        self.ttl
    }

    /// Coordination store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether [`close`](Self::close) has run
    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    /// Most recently granted lease, if any
    pub async fn lease(&self) -> Option<LeaseId> {
        self.state.lock().await.lease
    }

    /// Register, then keep the registration alive.
    ///
    /// Returns only on failure or shutdown: [`DiscoveryError::Cancelled`]
    /// when the scope is cancelled, [`DiscoveryError::Closed`] when the
    /// registrar was closed, or the store error that stopped
    /// (re-)registration. A second call while one is running fails with
    /// [`DiscoveryError::InvalidCall`]. Dropping the returned future ends the
    /// loop and allows a later call.
    pub async fn keep_alive(&self) -> Result<(), DiscoveryError> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(DiscoveryError::Closed);
        }
        if self
            .keeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DiscoveryError::InvalidCall);
        }
        let _keeping = Keeping(&self.keeping);

        self.run(state).await
    }

    /// Retract the address and revoke the lease.
    ///
    /// Teardown failures are logged, not returned. Every call after the
    /// first returns [`DiscoveryError::Closed`].
    pub async fn close(&self) -> Result<(), DiscoveryError> {
        self.scope.cancel();

        let mut state = self.state.lock().await;
        if state.closed {
            return Err(DiscoveryError::Closed);
        }
        state.closed = true;

        if state.published.take().is_some() {
            let update = Update::delete(&self.address);
            match self
                .bounded(self.store.update(&self.service, &update, None))
                .await
            {
                Ok(()) => info!(
                    self.logger,
                    "[discovery] unregister service({}) from etcd",
                    self.endpoint()
                ),
                Err(e) => error!(self.logger, "[discovery] delete service error - {}", e),
            }
        }

        if let Some(lease) = state.lease.take() {
            if let Err(e) = self.bounded(self.store.revoke_lease(lease)).await {
                error!(self.logger, "[discovery] revoke lease error - {}", e);
            }
        }

        Ok(())
    }

    async fn run(&self, mut state: MutexGuard<'_, RegistrarState>) -> Result<(), DiscoveryError> {
        let mut stream = self.establish(&mut state).await?;
        drop(state);

        loop {
            match stream.next(&self.scope).await {
                KeepAliveEvent::Cancelled => return Err(DiscoveryError::Cancelled),
                KeepAliveEvent::Renewed(renewal) => {
                    debug!(
                        self.logger,
                        "[discovery] service keepalive (lease {}, ttl {}s)",
                        renewal.id,
                        renewal.ttl
                    );
                }
                KeepAliveEvent::Ended => {
                    let mut state = self.state.lock().await;
                    if state.closed {
                        return Err(DiscoveryError::Closed);
                    }

                    warn!(
                        self.logger,
                        "[discovery] keepalive of service({}) stopped, registering again",
                        self.endpoint()
                    );
                    stream = self.establish(&mut state).await?;
                }
            }
        }
    }

    /// Register under a fresh lease and open its keepalive stream.
    ///
    /// A lease displaced by the new grant is revoked. If the grant fails the
    /// previous lease stays recorded so `close` still revokes it.
    async fn establish(
        &self,
        state: &mut RegistrarState,
    ) -> Result<KeepAliveStream, DiscoveryError> {
        state.published = None;
        let previous = state.lease;

        let result = match self.register(state).await {
            Ok(lease) => self.scoped(self.store.keep_alive(lease)).await,
            Err(e) => Err(e),
        };

        if let Some(stale) = previous.filter(|stale| state.lease != Some(*stale)) {
            self.revoke_stale(stale).await;
        }

        result
    }

    async fn register(&self, state: &mut RegistrarState) -> Result<LeaseId, DiscoveryError> {
        let lease = self.scoped(self.store.grant_lease(self.ttl)).await?;
        state.lease = Some(lease);

        let update = Update::add(&self.address);
        self.scoped(self.store.update(&self.service, &update, Some(lease)))
            .await?;
        state.published = Some(lease);

        info!(
            self.logger,
            "[discovery] register service({}) into etcd",
            self.endpoint()
        );
        Ok(lease)
    }

    async fn revoke_stale(&self, lease: LeaseId) {
        // usually already expired
        match self.scoped(self.bounded(self.store.revoke_lease(lease))).await {
            Ok(()) => debug!(self.logger, "[discovery] revoked stale lease {}", lease),
            Err(e) => debug!(
                self.logger,
                "[discovery] stale lease {} not revoked - {}",
                lease,
                e
            ),
        }
    }

    /// Run a store call unless the scope is cancelled first.
    async fn scoped<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, DiscoveryError> {
        tokio::select! {
            biased;
            _ = self.scope.cancelled() => Err(DiscoveryError::Cancelled),
            result = call => result.map_err(DiscoveryError::from),
        }
    }

    /// Run a store call with a deadline of one lease period.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let limit = self.ttl_duration();
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| StoreError::Timeout(limit))?
    }

    fn ttl_duration(&self) -> Duration {
        Duration::from_secs(self.ttl.unsigned_abs())
    }

    fn endpoint(&self) -> String {
        format!("{}/{}", self.service, self.address.addr)
    }
}
