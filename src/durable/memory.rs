//! In-process `DurableStore`: a `DashMap`-backed store guarded the same way
//! as the rest of the index, sufficient for single-node operation and for
//! exercising the contract in tests.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use crate::error::DurableResult;

use super::DurableStore;

#[derive(Default)]
pub struct InMemoryDurableStore {
    hashes: DashMap<String, DashMap<String, String>>,
    sets: DashMap<String, DashSet<String>>,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn hash_put(&self, key: &str, field: &str, value: &str) -> DurableResult<()> {
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_remove(&self, key: &str, field: &str) -> DurableResult<()> {
        if let Some(hash) = self.hashes.get(key) {
            hash.remove(field);
        }
        Ok(())
    }

    async fn hash_entries(&self, key: &str) -> DurableResult<Vec<(String, String)>> {
        Ok(self
            .hashes
            .get(key)
            .map(|hash| {
                hash.iter()
                    .map(|e| (e.key().clone(), e.value().clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_add(&self, key: &str, member: &str) -> DurableResult<()> {
        self.sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, members: &[&str]) -> DurableResult<()> {
        if let Some(set) = self.sets.get(key) {
            for member in members {
                set.remove(*member);
            }
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> DurableResult<Vec<String>> {
        Ok(self
            .sets
            .get(key)
            .map(|set| set.iter().map(|e| e.key().clone()).collect())
            .unwrap_or_default())
    }

    async fn delete(&self, key: &str) -> DurableResult<()> {
        self.hashes.remove(key);
        self.sets.remove(key);
        Ok(())
    }
}
