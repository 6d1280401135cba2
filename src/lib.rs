// Tether - lease-backed service registration and leveled logging
//
// This library re-exports the member crates: `tether-log` for logging and,
// with the `discovery` feature, `tether-discovery` for registering a service
// into etcd under a kept-alive lease.

pub use tether_log;

#[cfg(feature = "discovery")]
pub use tether_discovery;

// Prelude for common imports
pub mod prelude {
    pub use tether_log::{Level, LogConfig, Logger, ParseLevelError};

    #[cfg(feature = "discovery")]
    pub use tether_discovery::{
        Address, CoordinationStore, DiscoveryError, EtcdConfig, InMemoryStore, LeaseId,
        Registrar, StoreError,
    };

    #[cfg(feature = "etcd")]
    pub use tether_discovery::EtcdStore;
}
