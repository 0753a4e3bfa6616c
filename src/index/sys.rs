//! System-topic (`$SYS/...`) subscription tier: a single map, every filter
//! treated as potentially wildcard, no durable mirror, no cluster fan-out.

use std::sync::Arc;

use dashmap::DashMap;

use crate::record::{SubscriberKey, SubscriptionRecord};
use crate::topic;

#[derive(Default)]
pub struct SysTier {
    filter_to_subs: DashMap<Arc<str>, DashMap<SubscriberKey, SubscriptionRecord>>,
}

impl SysTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, filter: Arc<str>, record: SubscriptionRecord) {
        self.filter_to_subs
            .entry(filter)
            .or_default()
            .insert(record.key(), record);
    }

    pub fn remove(&self, filter: &str, key: &SubscriberKey) -> bool {
        let removed = match self.filter_to_subs.get(filter) {
            Some(bucket) => bucket.remove(key).is_some(),
            None => false,
        };
        if removed {
            let now_empty = self
                .filter_to_subs
                .get(filter)
                .map(|b| b.is_empty())
                .unwrap_or(true);
            if now_empty {
                self.filter_to_subs.remove(filter);
            }
        }
        removed
    }

    pub fn remove_client(&self, client_id: &str) {
        self.filter_to_subs.retain(|_, bucket| {
            bucket.retain(|key, _| key.client_id.as_ref() != client_id);
            !bucket.is_empty()
        });
    }

    pub fn matching(&self, topic_name: &str) -> Vec<SubscriptionRecord> {
        let mut out = Vec::new();
        for entry in self.filter_to_subs.iter() {
            if topic::matches(topic_name, entry.key()) {
                out.extend(entry.value().iter().map(|e| e.value().clone()));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qos::QoS;

    fn rec(client_id: &str, filter: &str) -> SubscriptionRecord {
        SubscriptionRecord::new(client_id, QoS::AtMostOnce, filter, true, None)
    }

    #[test]
    fn matches_scan_every_filter() {
        let tier = SysTier::new();
        tier.insert(Arc::from("$SYS/broker/+"), rec("c1", "$SYS/broker/+"));
        let matches = tier.matching("$SYS/broker/uptime");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].client_id.as_ref(), "c1");
    }

    #[test]
    fn remove_client_clears_every_bucket() {
        let tier = SysTier::new();
        tier.insert(Arc::from("$SYS/a"), rec("c1", "$SYS/a"));
        tier.insert(Arc::from("$SYS/b"), rec("c1", "$SYS/b"));
        tier.insert(Arc::from("$SYS/a"), rec("c2", "$SYS/a"));
        tier.remove_client("c1");
        assert_eq!(tier.matching("$SYS/a").len(), 1);
        assert!(tier.matching("$SYS/b").is_empty());
    }
}
