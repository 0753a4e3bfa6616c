//! Abstract contract over the external durable store: hash and set
//! operations the service composes to persist the durable subscription tier.

mod memory;

pub use memory::InMemoryDurableStore;

use async_trait::async_trait;

use crate::error::DurableResult;

/// Hash-field and set-member operations over an external KV/set store.
///
/// Object-safe so callers hold `Arc<dyn DurableStore>` and can swap in any
/// concrete backend (an external networked KV such as Redis or etcd is a
/// drop-in alternative behind this trait) without touching the service.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn hash_put(&self, key: &str, field: &str, value: &str) -> DurableResult<()>;

    async fn hash_remove(&self, key: &str, field: &str) -> DurableResult<()>;

    async fn hash_entries(&self, key: &str) -> DurableResult<Vec<(String, String)>>;

    async fn set_add(&self, key: &str, member: &str) -> DurableResult<()>;

    async fn set_remove(&self, key: &str, members: &[&str]) -> DurableResult<()>;

    async fn set_members(&self, key: &str) -> DurableResult<Vec<String>>;

    async fn delete(&self, key: &str) -> DurableResult<()>;
}
