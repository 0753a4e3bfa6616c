//! Configuration Module
//!
//! Provides TOML-based configuration for the subscription index: durable
//! store key layout, inner-cache toggle, cluster channel and wire codec.

pub use index::{ClusterCodec, IndexConfig, SUBKEY_SEPARATOR, SUB_UNSUB_CHANNEL};

mod index;
