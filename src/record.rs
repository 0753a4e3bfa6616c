//! The subscription record value type.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::config::SUBKEY_SEPARATOR;
use crate::qos::QoS;

/// One subscription: `(clientId, qos, filter, cleanSession, shareGroup?)`.
///
/// Equality and hashing consider only `(clientId, filter, shareGroup)` — a
/// re-subscribe with a different `qos` replaces the prior record in place
/// rather than coexisting alongside it.
#[derive(Debug, Clone)]
pub struct SubscriptionRecord {
    pub client_id: Arc<str>,
    pub qos: QoS,
    pub filter: Arc<str>,
    pub clean_session: bool,
    pub share_group: Option<Arc<str>>,
}

impl SubscriptionRecord {
    pub fn new(
        client_id: impl Into<Arc<str>>,
        qos: QoS,
        filter: impl Into<Arc<str>>,
        clean_session: bool,
        share_group: Option<Arc<str>>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            qos,
            filter: filter.into(),
            clean_session,
            share_group,
        }
    }

    /// `subKey(clientId, shareGroup)`: `clientId` alone, or
    /// `clientId<!>shareGroup` for a shared subscription.
    pub fn sub_key(&self) -> String {
        match &self.share_group {
            Some(group) => format!("{}{SUBKEY_SEPARATOR}{}", self.client_id, group),
            None => self.client_id.to_string(),
        }
    }

    pub fn key(&self) -> SubscriberKey {
        SubscriberKey {
            client_id: self.client_id.clone(),
            share_group: self.share_group.clone(),
        }
    }
}

impl PartialEq for SubscriptionRecord {
    fn eq(&self, other: &Self) -> bool {
        self.client_id == other.client_id
            && self.filter == other.filter
            && self.share_group == other.share_group
    }
}

impl Eq for SubscriptionRecord {}

impl Hash for SubscriptionRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.client_id.hash(state);
        self.filter.hash(state);
        self.share_group.hash(state);
    }
}

/// The `(clientId, shareGroup)` pair that identifies one subscriber slot
/// within a filter's bucket. Keying the bucket map on this explicitly (as
/// opposed to hashing the whole `SubscriptionRecord`) is what lets a
/// re-subscribe with a new `qos` replace the stored record in place via a
/// plain map insert, rather than requiring a manual lookup-then-replace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriberKey {
    pub client_id: Arc<str>,
    pub share_group: Option<Arc<str>>,
}

/// Parse a durable-store hash field back into `(clientId, shareGroup)`.
pub fn parse_sub_key(field: &str) -> (Arc<str>, Option<Arc<str>>) {
    match field.split_once(SUBKEY_SEPARATOR) {
        Some((client_id, group)) => (Arc::from(client_id), Some(Arc::from(group))),
        None => (Arc::from(field), None),
    }
}

/// Reject clientIds that would collide with the subscriber-key separator.
pub fn validate_client_id(client_id: &str) -> Result<(), &'static str> {
    if client_id.is_empty() {
        return Err("clientId cannot be empty");
    }
    if client_id.contains(SUBKEY_SEPARATOR) {
        return Err("clientId cannot contain the subscriber key separator");
    }
    Ok(())
}
