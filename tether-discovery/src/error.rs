//! Registration and store errors

use crate::store::LeaseId;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a coordination store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[cfg(feature = "etcd")]
    #[error("etcd error: {0}")]
    Etcd(#[from] etcd_client::Error),

    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Lease {0} not found")]
    LeaseNotFound(LeaseId),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Deadline exceeded after {0:?}")]
    Timeout(Duration),
}

/// Registrar errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery: KeepAlive can't be called twice for one registrar")]
    InvalidCall,

    #[error("discovery: registrar is closed")]
    Closed,

    #[error("discovery: execution scope cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl DiscoveryError {
    /// Whether the error stems from shutdown rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DiscoveryError::Cancelled | DiscoveryError::Closed)
    }
}
