//! etcd coordination store

use crate::config::EtcdConfig;
use crate::error::StoreError;
use crate::naming::{Operation, Update};
use crate::store::{CoordinationStore, KeepAliveStream, LeaseId, LeaseKeepAlive};
use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, LeaseKeepAliveStream, LeaseKeeper, PutOptions};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Floor for the interval between keepalive requests
const MIN_RENEW_INTERVAL: Duration = Duration::from_secs(1);

/// etcd coordination store
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    /// Connect to etcd
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use tether_discovery::{EtcdConfig, EtcdStore};
    ///
    /// let store = EtcdStore::connect(&EtcdConfig::from_env()?).await?;
    /// ```
    pub async fn connect(config: &EtcdConfig) -> Result<Self, StoreError> {
        let mut options = ConnectOptions::new().with_connect_timeout(config.connect_timeout());
        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            options = options.with_user(user.clone(), password.clone());
        }

        let client = Client::connect(&config.endpoints, Some(options)).await?;
        info!("Connected to etcd at {}", config.endpoints.join(","));
        Ok(Self { client })
    }

    /// Wrap an already connected client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Interval between keepalive requests for a lease reporting `ttl` seconds
fn renew_interval(ttl: i64) -> Duration {
    let third = Duration::from_secs(u64::try_from(ttl / 3).unwrap_or(0));
    third.max(MIN_RENEW_INTERVAL)
}

/// Send keepalive requests and forward acknowledgments until the lease is
/// gone, the server stream breaks, or the receiving side is dropped.
async fn pump_keepalives(
    lease: LeaseId,
    mut keeper: LeaseKeeper,
    mut responses: LeaseKeepAliveStream,
    tx: mpsc::Sender<LeaseKeepAlive>,
) {
    let mut wait = Duration::ZERO;

    loop {
        tokio::select! {
            _ = tx.closed() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        if let Err(e) = keeper.keep_alive().await {
            warn!("Keepalive request for lease {} failed: {}", lease, e);
            break;
        }

        let message = tokio::select! {
            _ = tx.closed() => break,
            message = responses.message() => message,
        };

        match message {
            Ok(Some(resp)) if resp.ttl() > 0 => {
                wait = renew_interval(resp.ttl());
                let renewal = LeaseKeepAlive {
                    id: lease,
                    ttl: resp.ttl(),
                };
                if tx.send(renewal).await.is_err() {
                    break;
                }
            }
            Ok(Some(_)) => {
                debug!("Lease {} expired", lease);
                break;
            }
            Ok(None) => {
                debug!("Keepalive stream for lease {} closed by server", lease);
                break;
            }
            Err(e) => {
                warn!("Keepalive stream for lease {} failed: {}", lease, e);
                break;
            }
        }
    }
}

#[async_trait]
impl CoordinationStore for EtcdStore {
    async fn grant_lease(&self, ttl: i64) -> Result<LeaseId, StoreError> {
        let resp = self.client.clone().lease_grant(ttl, None).await?;
        debug!("Granted lease {:x} with ttl {}s", resp.id(), resp.ttl());
        Ok(LeaseId(resp.id()))
    }

    async fn revoke_lease(&self, lease: LeaseId) -> Result<(), StoreError> {
        self.client.clone().lease_revoke(lease.0).await?;
        debug!("Revoked lease {}", lease);
        Ok(())
    }

    async fn keep_alive(&self, lease: LeaseId) -> Result<KeepAliveStream, StoreError> {
        let (keeper, responses) = self.client.clone().lease_keep_alive(lease.0).await?;
        let (tx, stream) = KeepAliveStream::channel(lease);

        tokio::spawn(pump_keepalives(lease, keeper, responses, tx));
        Ok(stream)
    }

    async fn update(
        &self,
        target: &str,
        update: &Update,
        lease: Option<LeaseId>,
    ) -> Result<(), StoreError> {
        let key = update.key(target);
        let mut client = self.client.clone();

        match update.op {
            Operation::Add => {
                let value = serde_json::to_string(update)?;
                let options = lease.map(|lease| PutOptions::new().with_lease(lease.0));
                client.put(key, value, options).await?;
            }
            Operation::Delete => {
                client.delete(key, None).await?;
            }
        }
        Ok(())
    }
}
