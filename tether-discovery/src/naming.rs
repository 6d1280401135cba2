//! Name records published for a service
//!
//! Records follow the gRPC naming layout used by etcd resolvers: the key is
//! `<service>/<addr>` and the value is a JSON object
//! `{"Op":0,"Addr":"10.0.0.1:9000","Metadata":""}`.

use serde::{Deserialize, Serialize};

/// Advertised endpoint of a service instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Connection string, e.g. `10.0.0.1:9000`
    pub addr: String,

    /// Opaque metadata published with the address
    #[serde(default)]
    pub metadata: String,
}

impl Address {
    /// Create new address without metadata
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            metadata: String::new(),
        }
    }

    /// Set metadata
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }
}

/// Kind of mapping update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Operation {
    /// Publish the address
    Add,
    /// Retract the address
    Delete,
}

impl From<Operation> for u8 {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Add => 0,
            Operation::Delete => 1,
        }
    }
}

impl TryFrom<u8> for Operation {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Operation::Add),
            1 => Ok(Operation::Delete),
            other => Err(format!("unknown naming operation {}", other)),
        }
    }
}

/// A single name-mapping update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    #[serde(rename = "Op")]
    pub op: Operation,

    #[serde(rename = "Addr")]
    pub addr: String,

    #[serde(rename = "Metadata", default)]
    pub metadata: String,
}

impl Update {
    /// Publish `address` with its metadata
    pub fn add(address: &Address) -> Self {
        Self {
            op: Operation::Add,
            addr: address.addr.clone(),
            metadata: address.metadata.clone(),
        }
    }

    /// Retract `address`; metadata is not needed
    pub fn delete(address: &Address) -> Self {
        Self {
            op: Operation::Delete,
            addr: address.addr.clone(),
            metadata: String::new(),
        }
    }

    /// Store key for this update under `target`
    pub fn key(&self, target: &str) -> String {
        record_key(target, &self.addr)
    }
}

/// Store key of `addr` under service `target`
pub fn record_key(target: &str, addr: &str) -> String {
    format!("{}/{}", target, addr)
}
