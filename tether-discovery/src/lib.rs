//! Service Registration for Tether
//!
//! This crate advertises a service address in a coordination store (etcd)
//! under a time-bounded lease, keeps the lease alive, and retracts the
//! address on shutdown.
//!
//! ## Features
//!
//! - **Lease-backed registration** - The address disappears if renewal stops
//! - **Automatic re-registration** - A fresh lease when the old one lapses
//! - **Graceful shutdown** - Bounded-time deregistration and lease revoke
//! - **Pluggable stores** - etcd, or in-memory for tests
//!
//! ## Quick Start
//!
//! ### In-Memory Store (Testing)
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tether_discovery::*;
//! use tether_log::{LogConfig, Logger};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = InMemoryStore::new();
//!     let logger = Arc::new(Logger::new(LogConfig::default()));
//!
//!     let registrar = Arc::new(Registrar::new(
//!         store.clone(),
//!         "api",
//!         Address::new("localhost:8080").with_metadata("v1"),
//!         5,
//!         logger,
//!     ));
//!
//!     let keeper = tokio::spawn({
//!         let registrar = registrar.clone();
//!         async move { registrar.keep_alive().await }
//!     });
//!
//!     registrar.close().await?;
//!     assert!(keeper.await?.unwrap_err().is_cancelled());
//!     Ok(())
//! }
//! ```
//!
//! ### etcd Store
//!
//! ```rust,ignore
//! use tether_discovery::*;
//!
//! let config = EtcdConfig::from_env()?;
//! let store = EtcdStore::connect(&config).await?;
//! let registrar = Registrar::new(store, "api", Address::new("10.0.0.1:9000"), config.ttl, logger);
//! ```

pub mod config;
pub mod error;
#[cfg(feature = "etcd")]
pub mod etcd;
pub mod memory;
pub mod naming;
pub mod registrar;
pub mod store;

pub use config::EtcdConfig;
pub use error::{DiscoveryError, StoreError};
#[cfg(feature = "etcd")]
pub use etcd::EtcdStore;
pub use memory::{Fault, InMemoryStore, StoreCall, StoreOp};
pub use naming::{Address, Operation, Update};
pub use registrar::{Registrar, MIN_TTL_SECS};
pub use store::{CoordinationStore, KeepAliveEvent, KeepAliveStream, LeaseId, LeaseKeepAlive};
