//! In-memory coordination store (for testing)

use crate::error::StoreError;
use crate::naming::{Operation, Update};
use crate::store::{CoordinationStore, KeepAliveStream, LeaseId, LeaseKeepAlive};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, MutexGuard};

/// Kind of store call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Grant,
    Revoke,
    KeepAlive,
    Update,
}

/// A call received by the store, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Grant {
        ttl: i64,
    },
    Revoke(LeaseId),
    KeepAlive(LeaseId),
    Update {
        target: String,
        op: Operation,
        addr: String,
        lease: Option<LeaseId>,
    },
}

impl StoreCall {
    /// Kind of this call
    pub fn op(&self) -> StoreOp {
        match self {
            StoreCall::Grant { .. } => StoreOp::Grant,
            StoreCall::Revoke(_) => StoreOp::Revoke,
            StoreCall::KeepAlive(_) => StoreOp::KeepAlive,
            StoreCall::Update { .. } => StoreOp::Update,
        }
    }
}

/// Injected misbehaviour for one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Fail with `StoreError::Unavailable`
    Fail(String),
    /// Never complete
    Hang,
}

struct LeaseEntry {
    ttl: i64,
    streams: Vec<mpsc::Sender<LeaseKeepAlive>>,
}

struct Record {
    value: String,
    lease: Option<LeaseId>,
}

#[derive(Default)]
struct State {
    next_lease: i64,
    leases: HashMap<LeaseId, LeaseEntry>,
    records: BTreeMap<String, Record>,
    calls: Vec<StoreCall>,
    counts: HashMap<StoreOp, usize>,
    faults: HashMap<(StoreOp, usize), Fault>,
}

impl State {
    fn drop_lease(&mut self, lease: LeaseId) -> bool {
        let existed = self.leases.remove(&lease).is_some();
        self.records.retain(|_, record| record.lease != Some(lease));
        existed
    }
}

/// In-memory coordination store (for testing/development)
///
/// Leases never expire on their own; tests drive renewals and expiry through
/// [`renew`](Self::renew), [`end_streams`](Self::end_streams) and
/// [`expire`](Self::expire).
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    /// Create new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `nth` call (1-based) of kind `op` misbehave
    pub async fn inject(&self, op: StoreOp, nth: usize, fault: Fault) {
        self.state.lock().await.faults.insert((op, nth), fault);
    }

    /// Acknowledge a renewal on every open stream of `lease`.
    ///
    /// Waits while a stream's buffer is full, so every renewal is delivered.
    /// Returns false if the lease does not exist.
    pub async fn renew(&self, lease: LeaseId) -> bool {
        let (renewal, streams) = {
            let mut state = self.state.lock().await;
            let Some(entry) = state.leases.get_mut(&lease) else {
                return false;
            };

            entry.streams.retain(|tx| !tx.is_closed());
            let renewal = LeaseKeepAlive {
                id: lease,
                ttl: entry.ttl,
            };
            (renewal, entry.streams.clone())
        };

        for tx in streams {
            // receiver gone
            let _ = tx.send(renewal).await;
        }
        true
    }

    /// Close every keepalive stream of `lease` without expiring it
    pub async fn end_streams(&self, lease: LeaseId) {
        if let Some(entry) = self.state.lock().await.leases.get_mut(&lease) {
            entry.streams.clear();
        }
    }

    /// Expire `lease`: its records are deleted and its streams end
    pub async fn expire(&self, lease: LeaseId) -> bool {
        self.state.lock().await.drop_lease(lease)
    }

    /// All calls received so far
    pub async fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().await.calls.clone()
    }

    /// Number of calls of kind `op` received so far
    pub async fn count(&self, op: StoreOp) -> usize {
        self.state
            .lock()
            .await
            .counts
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    /// Wait until at least `n` calls of kind `op` were received
    pub async fn wait_for_count(&self, op: StoreOp, n: usize) {
        while self.count(op).await < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Value stored at `key`
    pub async fn get(&self, key: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .records
            .get(key)
            .map(|record| record.value.clone())
    }

    /// Lease `key` is bound to
    pub async fn lease_of(&self, key: &str) -> Option<LeaseId> {
        self.state
            .lock()
            .await
            .records
            .get(key)
            .and_then(|record| record.lease)
    }

    /// Whether `lease` exists
    pub async fn is_live(&self, lease: LeaseId) -> bool {
        self.state.lock().await.leases.contains_key(&lease)
    }

    /// Number of live leases
    pub async fn lease_count(&self) -> usize {
        self.state.lock().await.leases.len()
    }

    /// Record the call, then apply any injected fault
    async fn enter(&self, call: StoreCall) -> Result<MutexGuard<'_, State>, StoreError> {
        let fault = {
            let mut state = self.state.lock().await;
            let op = call.op();
            state.calls.push(call);

            let count = state.counts.entry(op).or_insert(0);
            *count += 1;
            let nth = *count;

            match state.faults.remove(&(op, nth)) {
                Some(fault) => fault,
                None => return Ok(state),
            }
        };

        match fault {
            Fault::Fail(message) => Err(StoreError::Unavailable(message)),
            Fault::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl CoordinationStore for InMemoryStore {
    async fn grant_lease(&self, ttl: i64) -> Result<LeaseId, StoreError> {
        let mut state = self.enter(StoreCall::Grant { ttl }).await?;

        state.next_lease += 1;
        let id = LeaseId(state.next_lease);
        state.leases.insert(
            id,
            LeaseEntry {
                ttl,
                streams: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn revoke_lease(&self, lease: LeaseId) -> Result<(), StoreError> {
        let mut state = self.enter(StoreCall::Revoke(lease)).await?;

        if state.drop_lease(lease) {
            Ok(())
        } else {
            Err(StoreError::LeaseNotFound(lease))
        }
    }

    async fn keep_alive(&self, lease: LeaseId) -> Result<KeepAliveStream, StoreError> {
        let mut state = self.enter(StoreCall::KeepAlive(lease)).await?;

        let entry = state
            .leases
            .get_mut(&lease)
            .ok_or(StoreError::LeaseNotFound(lease))?;

        let (tx, stream) = KeepAliveStream::channel(lease);
        entry.streams.push(tx);
        Ok(stream)
    }

    async fn update(
        &self,
        target: &str,
        update: &Update,
        lease: Option<LeaseId>,
    ) -> Result<(), StoreError> {
        let mut state = self
            .enter(StoreCall::Update {
                target: target.to_string(),
                op: update.op,
                addr: update.addr.clone(),
                lease,
            })
            .await?;

        let key = update.key(target);
        match update.op {
            Operation::Add => {
                if let Some(lease) = lease {
                    if !state.leases.contains_key(&lease) {
                        return Err(StoreError::LeaseNotFound(lease));
                    }
                }
                let value = serde_json::to_string(update)?;
                state.records.insert(key, Record { value, lease });
            }
            Operation::Delete => {
                state.records.remove(&key);
            }
        }
        Ok(())
    }
}
