//! Error types for the subscription index.
//!
//! Mirrors the error kinds enumerated for the index: invalid input, durable
//! store failures, cluster broadcast/inbound failures, and cold-start reload
//! failure. No rollback is attempted here — callers are expected to follow
//! the ordering described alongside each operation so that a single-step
//! failure leaves the index in a consistent state.

use std::fmt;

/// Errors surfaced by `SubscriptionService` operations.
#[derive(Debug)]
pub enum IndexError {
    /// Malformed filter, empty clientId, clientId containing the subscriber
    /// key separator, or a non-terminal `#`. Nothing was mutated.
    InvalidInput(String),
    /// The durable store failed; the ephemeral tier was not touched and no
    /// broadcast was sent. Retrying is the caller's responsibility.
    Durable(DurableStoreError),
    /// Cluster broadcast failed. Never surfaced to the operation's caller —
    /// present here only so the service can log it with full context.
    ClusterBroadcast(String),
    /// A cluster-inbound event was malformed and was dropped.
    ClusterInbound(String),
    /// Cold-start reload of the durable-tier cache failed; fatal.
    ColdStartReload(String),
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::Durable(e) => write!(f, "durable store error: {e}"),
            Self::ClusterBroadcast(msg) => write!(f, "cluster broadcast failed: {msg}"),
            Self::ClusterInbound(msg) => write!(f, "malformed cluster event: {msg}"),
            Self::ColdStartReload(msg) => write!(f, "cold-start reload failed: {msg}"),
        }
    }
}

impl std::error::Error for IndexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Durable(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DurableStoreError> for IndexError {
    fn from(err: DurableStoreError) -> Self {
        Self::Durable(err)
    }
}

/// Errors from the `DurableStore` adapter and the cluster-bus codec.
#[derive(Debug)]
pub enum DurableStoreError {
    Io(std::io::Error),
    Codec(String),
    Backend(String),
}

impl fmt::Display for DurableStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {e}"),
            Self::Codec(e) => write!(f, "codec error: {e}"),
            Self::Backend(e) => write!(f, "backend error: {e}"),
        }
    }
}

impl std::error::Error for DurableStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DurableStoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for DurableStoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for DurableStoreError {
    fn from(err: bincode::error::EncodeError) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for DurableStoreError {
    fn from(err: bincode::error::DecodeError) -> Self {
        Self::Codec(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
pub type DurableResult<T> = std::result::Result<T, DurableStoreError>;
