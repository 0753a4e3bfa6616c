//! Wire types for the cluster sub/unsub channel: `ClientSubOrUnsubMsg`
//! wrapped in a `{data, timestamp, brokerId}` envelope.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// `type` tag distinguishing a subscribe event from an unsubscribe event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[repr(u8)]
pub enum MsgKind {
    Sub = 1,
    Unsub = 2,
}

/// The cluster sub/unsub payload. `topic` carries the raw `$share/<group>/<filter>`
/// form when present, exactly as it appeared at the MQTT boundary — unwrapped
/// only once it reaches the receiving broker's index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct ClientSubOrUnsubMsg {
    pub kind: MsgKind,
    pub client_id: String,
    /// Meaningful only for `Sub`.
    pub qos: u8,
    /// Present for `Sub`; absent for `Unsub` (see `topics`).
    pub topic: Option<String>,
    pub clean_session: bool,
    /// Present for `Unsub`.
    pub topics: Vec<String>,
}

impl ClientSubOrUnsubMsg {
    pub fn sub(client_id: impl Into<String>, qos: u8, topic: impl Into<String>, clean_session: bool) -> Self {
        Self {
            kind: MsgKind::Sub,
            client_id: client_id.into(),
            qos,
            topic: Some(topic.into()),
            clean_session,
            topics: Vec::new(),
        }
    }

    pub fn unsub(client_id: impl Into<String>, clean_session: bool, topics: Vec<String>) -> Self {
        Self {
            kind: MsgKind::Unsub,
            client_id: client_id.into(),
            qos: 0,
            topic: None,
            clean_session,
            topics,
        }
    }
}

/// Transport envelope every cluster message is wrapped in.
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct ClusterEnvelope {
    pub data: ClientSubOrUnsubMsg,
    pub timestamp: u64,
    pub broker_id: String,
}

impl ClusterEnvelope {
    pub fn new(data: ClientSubOrUnsubMsg, timestamp: u64, broker_id: impl Into<String>) -> Self {
        Self {
            data,
            timestamp,
            broker_id: broker_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_message_carries_topic_and_qos() {
        let msg = ClientSubOrUnsubMsg::sub("c1", 1, "a/b", true);
        assert_eq!(msg.kind, MsgKind::Sub);
        assert_eq!(msg.topic.as_deref(), Some("a/b"));
        assert!(msg.topics.is_empty());
    }

    #[test]
    fn unsub_message_carries_topic_list() {
        let msg = ClientSubOrUnsubMsg::unsub("c1", false, vec!["a/b".into(), "c/d".into()]);
        assert_eq!(msg.kind, MsgKind::Unsub);
        assert!(msg.topic.is_none());
        assert_eq!(msg.topics.len(), 2);
    }
}
