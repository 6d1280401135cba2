//! Coordination store abstraction

use crate::error::StoreError;
use crate::naming::Update;
use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Buffered renewals per keepalive stream
pub const KEEPALIVE_BUFFER: usize = 16;

/// Identifier of a granted lease
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeaseId(pub i64);

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// A renewal acknowledged by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseKeepAlive {
    /// Renewed lease
    pub id: LeaseId,

    /// Remaining time-to-live in seconds
    pub ttl: i64,
}

/// Outcome of waiting on a keepalive stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveEvent {
    /// The lease was renewed
    Renewed(LeaseKeepAlive),

    /// Renewal stopped: the lease expired, was revoked, or the stream broke
    Ended,

    /// The waiting scope was cancelled
    Cancelled,
}

/// Receive side of a lease's renewals
#[derive(Debug)]
pub struct KeepAliveStream {
    lease: LeaseId,
    rx: mpsc::Receiver<LeaseKeepAlive>,
}

impl KeepAliveStream {
    /// Create a stream and the sender that feeds it.
    ///
    /// The stream ends once every sender is dropped.
    pub fn channel(lease: LeaseId) -> (mpsc::Sender<LeaseKeepAlive>, Self) {
        let (tx, rx) = mpsc::channel(KEEPALIVE_BUFFER);
        (tx, Self { lease, rx })
    }

    /// Lease this stream renews
    pub fn lease(&self) -> LeaseId {
        self.lease
    }

    /// Wait for the next keepalive event
    pub async fn next(&mut self, scope: &CancellationToken) -> KeepAliveEvent {
        tokio::select! {
            biased;
            _ = scope.cancelled() => KeepAliveEvent::Cancelled,
            renewal = self.rx.recv() => match renewal {
                Some(renewal) => KeepAliveEvent::Renewed(renewal),
                None => KeepAliveEvent::Ended,
            },
        }
    }
}

/// Lease and naming primitives of a coordination store
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Grant a lease living `ttl` seconds unless renewed
    async fn grant_lease(&self, ttl: i64) -> Result<LeaseId, StoreError>;

    /// Revoke a lease, deleting every key bound to it
    async fn revoke_lease(&self, lease: LeaseId) -> Result<(), StoreError>;

    /// Start renewing a lease
    async fn keep_alive(&self, lease: LeaseId) -> Result<KeepAliveStream, StoreError>;

    /// Apply a name-mapping update for `target`, optionally bound to a lease
    async fn update(
        &self,
        target: &str,
        update: &Update,
        lease: Option<LeaseId>,
    ) -> Result<(), StoreError>;
}
