//! Clustered subscription index for an MQTT broker.
//!
//! Tracks which clients are subscribed to which topic filters across an
//! ephemeral (in-memory) tier, a durable tier backed by an external
//! key/value store, and a separate `$SYS` tier, with optional cluster-wide
//! propagation of subscribe/unsubscribe events.

pub mod cluster_bus;
pub mod config;
pub mod durable;
pub mod error;
pub mod index;
pub mod qos;
pub mod record;
pub mod service;
pub mod topic;

pub use cluster_bus::{ClientSubOrUnsubMsg, ClusterBus, ClusterEnvelope, InProcessClusterBus};
pub use config::IndexConfig;
pub use durable::{DurableStore, InMemoryDurableStore};
pub use error::{DurableStoreError, IndexError};
pub use index::InMemoryIndex;
pub use qos::QoS;
pub use record::{SubscriberKey, SubscriptionRecord};
pub use service::SubscriptionService;
