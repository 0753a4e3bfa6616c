//! `InMemoryIndex`: the ephemeral tier, the durable-cache tier, and the
//! system-topic tier, plus the ephemeral tier's `clientId -> filters` map.

mod sys;
mod tier;

pub use sys::SysTier;
pub use tier::{FilterTier, RemovalTarget};

use std::sync::Arc;

use dashmap::{DashMap, DashSet};

use crate::record::SubscriptionRecord;

pub struct InMemoryIndex {
    pub ephemeral: FilterTier,
    pub client_to_filters: DashMap<Arc<str>, DashSet<Arc<str>>>,
    pub durable_cache: FilterTier,
    pub sys: SysTier,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            ephemeral: FilterTier::new(),
            client_to_filters: DashMap::new(),
            durable_cache: FilterTier::new(),
            sys: SysTier::new(),
        }
    }

    /// Union of matching records across the ephemeral tier and, when the
    /// inner cache is enabled, the durable-tier cache. Callers are
    /// responsible for the live durable-store path when the cache is
    /// disabled — this only ever touches in-memory state.
    pub fn search_local(&self, topic: &str, include_durable_cache: bool) -> Vec<SubscriptionRecord> {
        let mut out = Vec::new();
        self.ephemeral.matching(topic, &mut out);
        if include_durable_cache {
            self.durable_cache.matching(topic, &mut out);
        }
        out
    }

    pub fn client_filters(&self, client_id: &str) -> Vec<Arc<str>> {
        self.client_to_filters
            .get(client_id)
            .map(|s| s.iter().map(|e| e.key().clone()).collect())
            .unwrap_or_default()
    }

    /// Remove and take ownership of a client's ephemeral filter set.
    pub fn take_client_filters(&self, client_id: &str) -> Vec<Arc<str>> {
        self.client_to_filters
            .remove(client_id)
            .map(|(_, set)| set.into_iter().collect())
            .unwrap_or_default()
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}
