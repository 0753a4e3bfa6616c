//! One filter bucket + wildcard/concrete classification. Shared shape for
//! the ephemeral tier and the durable-cache tier (§3 of the design: two
//! mirrored tables, each `wildcardFilters`/`concreteFilters`/`filterToSubs`).

use std::sync::Arc;

use dashmap::{DashMap, DashSet};

use crate::record::{SubscriberKey, SubscriptionRecord};
use crate::topic;

/// Which subscriber slot(s) within a filter bucket a removal targets.
///
/// `Exact` is used by the ordinary subscribe/unsubscribe path, where the
/// caller already unwrapped a `$share/<group>/<filter>` topic and knows the
/// precise share group. `AnyForClient` is used by the client-wide cleanup
/// paths (`clearClientSubscriptions`, `clearUnauthorized`), which only know
/// bare filters — `clientToFilters` / the durable `clientSet` do not encode
/// the share group — and so must remove every subscriber slot for that
/// client under the filter regardless of share group.
pub enum RemovalTarget<'a> {
    Exact(&'a SubscriberKey),
    AnyForClient(&'a str),
}

#[derive(Default)]
pub struct FilterTier {
    wildcard_filters: DashSet<Arc<str>>,
    concrete_filters: DashSet<Arc<str>>,
    filter_to_subs: DashMap<Arc<str>, DashMap<SubscriberKey, SubscriptionRecord>>,
}

impl FilterTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record. Returns `true` if this created a brand
    /// new filter bucket (used by the durable subscribe path to decide
    /// whether a retained message must be reconsidered, and by callers that
    /// track filter-set membership transitions).
    pub fn insert(&self, filter: Arc<str>, record: SubscriptionRecord) -> bool {
        let bucket = self.filter_to_subs.entry(filter.clone()).or_default();
        let is_new_bucket = bucket.is_empty();
        bucket.insert(record.key(), record);
        drop(bucket);
        if is_new_bucket {
            if topic::is_wildcard(&filter) {
                self.wildcard_filters.insert(filter);
            } else {
                self.concrete_filters.insert(filter);
            }
        }
        is_new_bucket
    }

    /// Remove subscriber slot(s) matching `target` from `filter`'s bucket.
    /// Returns `(removed, bucket_now_empty)`.
    pub fn remove(&self, filter: &str, target: RemovalTarget<'_>) -> (bool, bool) {
        let (removed, bucket_now_empty) = match self.filter_to_subs.get(filter) {
            Some(bucket) => {
                let removed = match target {
                    RemovalTarget::Exact(key) => bucket.remove(key).is_some(),
                    RemovalTarget::AnyForClient(client_id) => {
                        let keys: Vec<SubscriberKey> = bucket
                            .iter()
                            .filter(|e| e.key().client_id.as_ref() == client_id)
                            .map(|e| e.key().clone())
                            .collect();
                        let mut any = false;
                        for key in keys {
                            if bucket.remove(&key).is_some() {
                                any = true;
                            }
                        }
                        any
                    }
                };
                (removed, bucket.is_empty())
            }
            None => (false, true),
        };
        if removed && bucket_now_empty {
            self.filter_to_subs.remove(filter);
            self.wildcard_filters.remove(filter);
            self.concrete_filters.remove(filter);
        }
        (removed, bucket_now_empty)
    }

    /// Append every record whose filter matches `topic_name` into `out`.
    pub fn matching(&self, topic_name: &str, out: &mut Vec<SubscriptionRecord>) {
        if self.concrete_filters.contains(topic_name) {
            if let Some(bucket) = self.filter_to_subs.get(topic_name) {
                out.extend(bucket.iter().map(|e| e.value().clone()));
            }
        }
        for entry in self.wildcard_filters.iter() {
            let filter = entry.key();
            if topic::matches(topic_name, filter) {
                if let Some(bucket) = self.filter_to_subs.get(filter.as_ref()) {
                    out.extend(bucket.iter().map(|e| e.value().clone()));
                }
            }
        }
    }

    pub fn contains_filter(&self, filter: &str) -> bool {
        self.wildcard_filters.contains(filter) || self.concrete_filters.contains(filter)
    }

    /// The share group (if any) of every subscriber slot `client_id` holds
    /// under `filter`. A client ordinarily holds one slot per filter, but a
    /// plain and a shared subscription to the same filter occupy distinct
    /// slots (distinct `SubscriberKey`s), so this can return more than one
    /// entry. Used by client-wide cleanup to rewrap each removed slot back
    /// into its `$share/<group>/<filter>` wire form before broadcasting.
    pub fn client_share_groups(&self, filter: &str, client_id: &str) -> Vec<Option<Arc<str>>> {
        match self.filter_to_subs.get(filter) {
            Some(bucket) => bucket
                .iter()
                .filter(|e| e.key().client_id.as_ref() == client_id)
                .map(|e| e.key().share_group.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Every filter currently holding at least one subscriber, across both
    /// the wildcard and concrete sets. Used by `clearUnauthorized`.
    pub fn all_filters(&self) -> Vec<Arc<str>> {
        self.wildcard_filters
            .iter()
            .map(|e| e.key().clone())
            .chain(self.concrete_filters.iter().map(|e| e.key().clone()))
            .collect()
    }

    #[cfg(test)]
    pub fn bucket_len(&self, filter: &str) -> usize {
        self.filter_to_subs.get(filter).map(|b| b.len()).unwrap_or(0)
    }
}
