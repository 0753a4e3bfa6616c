//! `ClusterBus`: a narrow publish/subscribe trait over raw envelope bytes,
//! decoupled from any particular peer transport.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::error::DurableStoreError;

use super::message::ClusterEnvelope;

/// Publish/subscribe over the fixed `"sub/unsub"` channel. Analogous in
/// shape to this codebase's peer-to-peer cluster transport, but narrowed to
/// the one operation the subscription index needs and decoupled from any
/// particular peer set or framing — an in-process broadcast channel backs
/// it in tests, a real networked bus in production.
#[async_trait]
pub trait ClusterBus: Send + Sync {
    async fn publish(&self, envelope: ClusterEnvelope) -> Result<(), DurableStoreError>;

    /// A stream of envelopes from peers. Each subscriber receives every
    /// envelope published after it subscribed; this does not replay history.
    fn subscribe(&self) -> Box<dyn Stream<Item = ClusterEnvelope> + Send + Unpin>;
}

/// In-process fan-out bus backed by `tokio::sync::broadcast`, sufficient for
/// single-process tests and for exercising multi-broker scenarios in-proc.
pub struct InProcessClusterBus {
    sender: broadcast::Sender<ClusterEnvelope>,
}

impl InProcessClusterBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for InProcessClusterBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl ClusterBus for InProcessClusterBus {
    async fn publish(&self, envelope: ClusterEnvelope) -> Result<(), DurableStoreError> {
        // No active subscribers is not an error — a single-node deployment
        // with clustering enabled simply has no peers listening yet.
        let _ = self.sender.send(envelope);
        Ok(())
    }

    fn subscribe(&self) -> Box<dyn Stream<Item = ClusterEnvelope> + Send + Unpin> {
        let stream = BroadcastStream::new(self.sender.subscribe()).filter_map(|r| r.ok());
        Box::new(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster_bus::message::ClientSubOrUnsubMsg;
    use tokio_stream::StreamExt as _;

    #[tokio::test]
    async fn published_envelope_reaches_subscriber() {
        let bus = InProcessClusterBus::new(16);
        let mut rx = bus.subscribe();
        let envelope = ClusterEnvelope::new(ClientSubOrUnsubMsg::sub("c1", 0, "a/b", true), 1, "broker-1");
        bus.publish(envelope.clone()).await.unwrap();
        let received = rx.next().await.unwrap();
        assert_eq!(received.broker_id, "broker-1");
        assert_eq!(received.data, envelope.data);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_not_an_error() {
        let bus = InProcessClusterBus::new(16);
        let envelope = ClusterEnvelope::new(ClientSubOrUnsubMsg::sub("c1", 0, "a/b", true), 1, "broker-1");
        assert!(bus.publish(envelope).await.is_ok());
    }
}
