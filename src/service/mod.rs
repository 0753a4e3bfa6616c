//! `SubscriptionService`: orchestrates subscribe/unsubscribe, the fan-out
//! query, durable-cache coherence, cluster broadcast, cold-start reload, and
//! system-topic handling.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::future::join_all;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::cluster_bus::{self, ClientSubOrUnsubMsg, ClusterBus, ClusterEnvelope, MsgKind};
use crate::config::{IndexConfig, SUBKEY_SEPARATOR};
use crate::durable::DurableStore;
use crate::error::{DurableResult, IndexError, Result};
use crate::index::{InMemoryIndex, RemovalTarget};
use crate::qos::QoS;
use crate::record::{parse_sub_key, validate_client_id, SubscriberKey, SubscriptionRecord};
use crate::topic;

pub struct SubscriptionService {
    index: InMemoryIndex,
    durable: Arc<dyn DurableStore>,
    cluster: Option<Arc<dyn ClusterBus>>,
    config: IndexConfig,
    broker_id: Arc<str>,
}

impl SubscriptionService {
    /// Constructs the service and, if the inner cache is enabled, performs
    /// the cold-start reload synchronously before returning — the broker
    /// must not accept traffic until the durable-tier cache is coherent.
    pub async fn new(
        durable: Arc<dyn DurableStore>,
        cluster: Option<Arc<dyn ClusterBus>>,
        config: IndexConfig,
        broker_id: impl Into<Arc<str>>,
    ) -> Result<Self> {
        let broker_id = broker_id.into();
        let service = Self {
            index: InMemoryIndex::new(),
            durable,
            cluster,
            config,
            broker_id,
        };
        if service.config.inner_cache_enabled {
            service
                .reload_durable_cache()
                .await
                .map_err(|e| IndexError::ColdStartReload(e.to_string()))?;
        }
        info!(broker_id = %service.broker_id, "subscription index ready");
        Ok(service)
    }

    async fn reload_durable_cache(&self) -> DurableResult<()> {
        let filters = self.durable.set_members(&self.config.filter_set_key).await?;
        for filter in filters {
            let hash_key = format!("{}{}", self.config.topic_prefix, filter);
            let entries = self.durable.hash_entries(&hash_key).await?;
            for (field, qos_str) in entries {
                let (client_id, share_group) = parse_sub_key(&field);
                let qos = qos_str.parse::<u8>().ok().and_then(QoS::from_u8).unwrap_or_default();
                let rec = SubscriptionRecord::new(client_id, qos, filter.as_str(), false, share_group);
                self.index.durable_cache.insert(rec.filter.clone(), rec);
            }
        }
        info!(
            filters = self.index.durable_cache.all_filters().len(),
            "durable-tier cache reload complete"
        );
        Ok(())
    }

    /// Spawns the background task that drains the cluster bus and applies
    /// peer events to the local index. Returns `None` when clustering is
    /// not configured.
    pub fn spawn_cluster_listener(self: Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        let bus = self.cluster.clone()?;
        let mut stream = bus.subscribe();
        Some(tokio::spawn(async move {
            while let Some(envelope) = stream.next().await {
                if let Err(e) = self.handle_envelope(envelope).await {
                    warn!(error = %e, "dropping malformed cluster event");
                }
            }
        }))
    }

    pub async fn subscribe(&self, rec: SubscriptionRecord) -> Result<()> {
        validate_client_id(&rec.client_id).map_err(|e| IndexError::InvalidInput(e.to_string()))?;
        topic::validate_topic_filter(&rec.filter).map_err(|e| IndexError::InvalidInput(e.to_string()))?;
        debug!(client_id = %rec.client_id, filter = %rec.filter, clean_session = rec.clean_session, "subscribe");

        if rec.clean_session {
            self.index.ephemeral.insert(rec.filter.clone(), rec.clone());
            self.index
                .client_to_filters
                .entry(rec.client_id.clone())
                .or_default()
                .insert(rec.filter.clone());
        } else {
            let hash_key = format!("{}{}", self.config.topic_prefix, rec.filter);
            let client_set_key = format!("{}{}", self.config.client_topics_prefix, rec.client_id);
            let sub_key = rec.sub_key();
            let qos_str = rec.qos.as_u8().to_string();

            tokio::try_join!(
                self.durable.hash_put(&hash_key, &sub_key, &qos_str),
                self.durable.set_add(&self.config.filter_set_key, &rec.filter),
                self.durable.set_add(&client_set_key, &rec.filter),
            )?;

            if self.config.inner_cache_enabled {
                self.index.durable_cache.insert(rec.filter.clone(), rec.clone());
            }
        }

        if self.config.clustered {
            let topic = topic::rewrap_shared(&rec.filter, rec.share_group.as_deref());
            self.broadcast(ClientSubOrUnsubMsg::sub(
                rec.client_id.to_string(),
                rec.qos.as_u8(),
                topic,
                rec.clean_session,
            ))
            .await;
        }
        Ok(())
    }

    /// `topics` may carry a `$share/<group>/<filter>` prefix per element.
    pub async fn unsubscribe(
        &self,
        client_id: &str,
        clean_session: bool,
        topics: &[String],
        from_cluster: bool,
    ) -> Result<()> {
        if topics.is_empty() {
            return Ok(());
        }
        validate_client_id(client_id).map_err(|e| IndexError::InvalidInput(e.to_string()))?;
        let mut parsed: Vec<(Arc<str>, Option<Arc<str>>)> = Vec::with_capacity(topics.len());
        for t in topics {
            let (filter, group) = topic::unwrap_shared(t).map_err(|e| IndexError::InvalidInput(e.to_string()))?;
            topic::validate_topic_filter(filter).map_err(|e| IndexError::InvalidInput(e.to_string()))?;
            parsed.push((Arc::from(filter), group.map(Arc::from)));
        }
        debug!(client_id, clean_session, count = parsed.len(), from_cluster, "unsubscribe");

        if clean_session {
            for (filter, group) in &parsed {
                let key = SubscriberKey {
                    client_id: Arc::from(client_id),
                    share_group: group.clone(),
                };
                self.index.ephemeral.remove(filter, RemovalTarget::Exact(&key));
            }
            if let Some(set) = self.index.client_to_filters.get(client_id) {
                for (filter, _) in &parsed {
                    set.remove(filter.as_ref());
                }
            }
        } else {
            if !from_cluster {
                let hash_removes = parsed.iter().map(|(filter, group)| {
                    let hash_key = format!("{}{}", self.config.topic_prefix, filter);
                    let sub_key = match group {
                        Some(g) => format!("{client_id}{SUBKEY_SEPARATOR}{g}"),
                        None => client_id.to_string(),
                    };
                    async move { self.durable.hash_remove(&hash_key, &sub_key).await }
                });
                for result in join_all(hash_removes).await {
                    result?;
                }
                let client_set_key = format!("{}{}", self.config.client_topics_prefix, client_id);
                let filter_refs: Vec<&str> = parsed.iter().map(|(f, _)| f.as_ref()).collect();
                self.durable.set_remove(&client_set_key, &filter_refs).await?;
            }

            if self.config.inner_cache_enabled {
                for (filter, group) in &parsed {
                    let key = SubscriberKey {
                        client_id: Arc::from(client_id),
                        share_group: group.clone(),
                    };
                    let (removed, emptied) = self.index.durable_cache.remove(filter, RemovalTarget::Exact(&key));
                    if removed && emptied && !from_cluster {
                        self.durable
                            .set_remove(&self.config.filter_set_key, &[filter.as_ref()])
                            .await?;
                    }
                }
            }
        }

        if self.config.clustered && !from_cluster {
            self.broadcast(ClientSubOrUnsubMsg::unsub(client_id, clean_session, topics.to_vec()))
                .await;
        }
        Ok(())
    }

    /// Union of matching records across every active tier for `topic`.
    pub async fn search_subscribers(&self, topic_name: &str) -> Result<Vec<SubscriptionRecord>> {
        let mut out = self.index.search_local(topic_name, self.config.inner_cache_enabled);
        if !self.config.inner_cache_enabled {
            let filters = self.durable.set_members(&self.config.filter_set_key).await?;
            for filter in filters {
                if !topic::matches(topic_name, &filter) {
                    continue;
                }
                let hash_key = format!("{}{}", self.config.topic_prefix, filter);
                for (field, qos_str) in self.durable.hash_entries(&hash_key).await? {
                    let (client_id, share_group) = parse_sub_key(&field);
                    let qos = qos_str.parse::<u8>().ok().and_then(QoS::from_u8).unwrap_or_default();
                    out.push(SubscriptionRecord::new(client_id, qos, filter.as_str(), false, share_group));
                }
            }
        }
        Ok(out)
    }

    pub async fn clear_client_subscriptions(&self, client_id: &str, clean_session: bool) -> Result<()> {
        if clean_session {
            let filters = self.index.take_client_filters(client_id);
            let mut topics = Vec::new();
            for filter in &filters {
                for group in self.index.ephemeral.client_share_groups(filter, client_id) {
                    topics.push(topic::rewrap_shared(filter, group.as_deref()));
                }
                self.index.ephemeral.remove(filter, RemovalTarget::AnyForClient(client_id));
            }
            if self.config.clustered && !topics.is_empty() {
                self.broadcast(ClientSubOrUnsubMsg::unsub(client_id, true, topics)).await;
            }
        } else {
            let client_set_key = format!("{}{}", self.config.client_topics_prefix, client_id);
            let filters = self.durable.set_members(&client_set_key).await?;
            self.durable.delete(&client_set_key).await?;
            let mut topics = Vec::new();
            for filter in &filters {
                for group in self.remove_client_from_durable_filter(client_id, filter).await? {
                    topics.push(topic::rewrap_shared(filter, group.as_deref()));
                }
            }
            if self.config.clustered && !topics.is_empty() {
                self.broadcast(ClientSubOrUnsubMsg::unsub(client_id, false, topics)).await;
            }
        }
        Ok(())
    }

    /// Scans every wildcard/concrete filter across both tiers and removes
    /// this client from any filter not in `authorized_filters`, against the
    /// ephemeral tier and the durable tier unconditionally — a client
    /// revoked mid-session may hold either kind of subscription and the
    /// revoking call site does not know which. Each removed slot is
    /// rewrapped back into its `$share/<group>/<filter>` wire form before
    /// broadcasting, so a peer's `unsubscribe(fromCluster=true)` parses out
    /// the same share group and can find the matching record.
    pub async fn clear_unauthorized(&self, client_id: &str, authorized_filters: &[String]) -> Result<()> {
        let authorized: HashSet<&str> = authorized_filters.iter().map(String::as_str).collect();
        let mut to_remove: Vec<Arc<str>> = self.index.ephemeral.all_filters();
        to_remove.extend(self.index.durable_cache.all_filters());
        to_remove.sort();
        to_remove.dedup();
        to_remove.retain(|f| !authorized.contains(f.as_ref()));

        let mut ephemeral_topics = Vec::new();
        for filter in &to_remove {
            for group in self.index.ephemeral.client_share_groups(filter, client_id) {
                ephemeral_topics.push(topic::rewrap_shared(filter, group.as_deref()));
            }
            self.index.ephemeral.remove(filter, RemovalTarget::AnyForClient(client_id));
        }
        let mut durable_topics = Vec::new();
        for filter in &to_remove {
            for group in self.remove_client_from_durable_filter(client_id, filter).await? {
                durable_topics.push(topic::rewrap_shared(filter, group.as_deref()));
            }
        }

        if self.config.clustered {
            if !ephemeral_topics.is_empty() {
                self.broadcast(ClientSubOrUnsubMsg::unsub(client_id, true, ephemeral_topics)).await;
            }
            if !durable_topics.is_empty() {
                self.broadcast(ClientSubOrUnsubMsg::unsub(client_id, false, durable_topics)).await;
            }
        }
        Ok(())
    }

    /// Removes every durable-hash field belonging to `client_id` under
    /// `filter`, then mirrors the removal into the durable-tier cache and,
    /// if the bucket is now empty, the external `filterSet`. Returns the
    /// share group (if any) carried by each removed field, so callers can
    /// rewrap the bare filter back into wire form before broadcasting.
    async fn remove_client_from_durable_filter(
        &self,
        client_id: &str,
        filter: &str,
    ) -> Result<Vec<Option<Arc<str>>>> {
        let hash_key = format!("{}{}", self.config.topic_prefix, filter);
        let mut removed_groups = Vec::new();
        for (field, _) in self.durable.hash_entries(&hash_key).await? {
            let (entry_client, share_group) = parse_sub_key(&field);
            if entry_client.as_ref() == client_id {
                self.durable.hash_remove(&hash_key, &field).await?;
                removed_groups.push(share_group);
            }
        }
        if self.config.inner_cache_enabled {
            let (removed, emptied) = self
                .index
                .durable_cache
                .remove(filter, RemovalTarget::AnyForClient(client_id));
            if removed && emptied {
                self.durable
                    .set_remove(&self.config.filter_set_key, &[filter])
                    .await?;
            }
        }
        Ok(removed_groups)
    }

    pub fn subscribe_sys(&self, rec: SubscriptionRecord) -> Result<()> {
        validate_client_id(&rec.client_id).map_err(|e| IndexError::InvalidInput(e.to_string()))?;
        self.index.sys.insert(rec.filter.clone(), rec);
        Ok(())
    }

    pub fn unsubscribe_sys(&self, client_id: &str, topics: &[String]) -> Result<()> {
        validate_client_id(client_id).map_err(|e| IndexError::InvalidInput(e.to_string()))?;
        for t in topics {
            let (filter, group) = topic::unwrap_shared(t).map_err(|e| IndexError::InvalidInput(e.to_string()))?;
            topic::validate_topic_filter(filter).map_err(|e| IndexError::InvalidInput(e.to_string()))?;
            let key = SubscriberKey {
                client_id: Arc::from(client_id),
                share_group: group.map(Arc::from),
            };
            self.index.sys.remove(filter, &key);
        }
        Ok(())
    }

    pub fn clear_client_sys(&self, client_id: &str) {
        self.index.sys.remove_client(client_id);
    }

    pub fn search_sys_subscribers(&self, topic_name: &str) -> Vec<SubscriptionRecord> {
        self.index.sys.matching(topic_name)
    }

    /// Applies a decoded peer event — mirrors a `SUB` into the relevant
    /// in-memory tier, or runs `unsubscribe` with `from_cluster = true` for
    /// an `UNSUB`. Never re-broadcasts and never writes to the durable
    /// store.
    async fn handle_envelope(&self, envelope: ClusterEnvelope) -> Result<()> {
        if envelope.broker_id.as_str() == self.broker_id.as_ref() {
            return Ok(());
        }
        match envelope.data.kind {
            MsgKind::Sub => {
                let topic_str = envelope
                    .data
                    .topic
                    .as_deref()
                    .ok_or_else(|| IndexError::ClusterInbound("SUB event missing topic".to_string()))?;
                let (filter, group) =
                    topic::unwrap_shared(topic_str).map_err(|e| IndexError::ClusterInbound(e.to_string()))?;
                let qos = QoS::from_u8(envelope.data.qos).unwrap_or_default();
                let rec = SubscriptionRecord::new(
                    envelope.data.client_id.clone(),
                    qos,
                    filter,
                    envelope.data.clean_session,
                    group.map(Arc::from),
                );
                if rec.clean_session {
                    self.index.ephemeral.insert(rec.filter.clone(), rec.clone());
                    self.index
                        .client_to_filters
                        .entry(rec.client_id.clone())
                        .or_default()
                        .insert(rec.filter.clone());
                } else if self.config.inner_cache_enabled {
                    self.index.durable_cache.insert(rec.filter.clone(), rec);
                }
                Ok(())
            }
            MsgKind::Unsub => {
                self.unsubscribe(
                    &envelope.data.client_id,
                    envelope.data.clean_session,
                    &envelope.data.topics,
                    true,
                )
                .await
            }
        }
    }

    /// Decodes a raw cluster envelope with the configured wire codec and
    /// applies it. The public entry point named in the external interface.
    pub async fn apply_cluster_event(&self, bytes: &[u8]) -> Result<()> {
        let envelope = cluster_bus::decode(self.config.codec, bytes)
            .map_err(|e| IndexError::ClusterInbound(e.to_string()))?;
        self.handle_envelope(envelope).await
    }

    async fn broadcast(&self, msg: ClientSubOrUnsubMsg) {
        let Some(bus) = &self.cluster else { return };
        let envelope = ClusterEnvelope::new(msg, now_millis(), self.broker_id.to_string());
        if let Err(e) = bus.publish(envelope).await {
            warn!(error = %e, "cluster broadcast failed");
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster_bus::InProcessClusterBus;
    use crate::durable::InMemoryDurableStore;

    async fn service(config: IndexConfig) -> SubscriptionService {
        SubscriptionService::new(Arc::new(InMemoryDurableStore::new()), None, config, "broker-1")
            .await
            .unwrap()
    }

    fn rec(client_id: &str, filter: &str, clean_session: bool) -> SubscriptionRecord {
        SubscriptionRecord::new(client_id, QoS::AtMostOnce, filter, clean_session, None)
    }

    #[tokio::test]
    async fn ephemeral_subscribe_then_search() {
        let svc = service(IndexConfig::default()).await;
        svc.subscribe(rec("c1", "a/b", true)).await.unwrap();
        let matches = svc.search_subscribers("a/b").await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].client_id.as_ref(), "c1");
    }

    #[tokio::test]
    async fn durable_subscribe_persists_and_is_searchable() {
        let svc = service(IndexConfig::default()).await;
        svc.subscribe(rec("c1", "a/+", false)).await.unwrap();
        let matches = svc.search_subscribers("a/b").await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].client_id.as_ref(), "c1");
    }

    #[tokio::test]
    async fn unsubscribe_removes_ephemeral_subscriber() {
        let svc = service(IndexConfig::default()).await;
        svc.subscribe(rec("c1", "a/b", true)).await.unwrap();
        svc.unsubscribe("c1", true, &["a/b".to_string()], false).await.unwrap();
        assert!(svc.search_subscribers("a/b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_client_subscriptions_removes_every_ephemeral_filter() {
        let svc = service(IndexConfig::default()).await;
        svc.subscribe(rec("c1", "a/b", true)).await.unwrap();
        svc.subscribe(rec("c1", "c/d", true)).await.unwrap();
        svc.clear_client_subscriptions("c1", true).await.unwrap();
        assert!(svc.search_subscribers("a/b").await.unwrap().is_empty());
        assert!(svc.search_subscribers("c/d").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_client_subscriptions_removes_shared_group_regardless() {
        let svc = service(IndexConfig::default()).await;
        let shared = SubscriptionRecord::new("c1", QoS::AtMostOnce, "a/b", true, Some(Arc::from("g1")));
        svc.subscribe(shared).await.unwrap();
        svc.clear_client_subscriptions("c1", true).await.unwrap();
        assert!(svc.search_subscribers("a/b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_unauthorized_keeps_authorized_filter() {
        let svc = service(IndexConfig::default()).await;
        svc.subscribe(rec("c1", "a/b", true)).await.unwrap();
        svc.subscribe(rec("c1", "c/d", true)).await.unwrap();
        svc.clear_unauthorized("c1", &["a/b".to_string()]).await.unwrap();
        assert_eq!(svc.search_subscribers("a/b").await.unwrap().len(), 1);
        assert!(svc.search_subscribers("c/d").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn shared_subscribers_are_never_deduplicated() {
        let svc = service(IndexConfig::default()).await;
        svc.subscribe(SubscriptionRecord::new("c1", QoS::AtMostOnce, "a/b", true, Some(Arc::from("g"))))
            .await
            .unwrap();
        svc.subscribe(SubscriptionRecord::new("c2", QoS::AtMostOnce, "a/b", true, Some(Arc::from("g"))))
            .await
            .unwrap();
        assert_eq!(svc.search_subscribers("a/b").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn re_subscribe_replaces_qos_not_duplicates() {
        let svc = service(IndexConfig::default()).await;
        svc.subscribe(rec("c1", "a/b", true)).await.unwrap();
        let mut upgraded = rec("c1", "a/b", true);
        upgraded.qos = QoS::ExactlyOnce;
        svc.subscribe(upgraded).await.unwrap();
        let matches = svc.search_subscribers("a/b").await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].qos, QoS::ExactlyOnce);
    }

    #[tokio::test]
    async fn cluster_event_from_own_broker_is_ignored() {
        let svc = service(IndexConfig {
            clustered: true,
            ..IndexConfig::default()
        })
        .await;
        let msg = ClientSubOrUnsubMsg::sub("c1", 0, "a/b", true);
        let envelope = ClusterEnvelope::new(msg, 1, "broker-1");
        svc.handle_envelope(envelope).await.unwrap();
        assert!(svc.search_subscribers("a/b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cluster_sub_event_from_peer_mirrors_into_ephemeral_tier() {
        let svc = service(IndexConfig {
            clustered: true,
            ..IndexConfig::default()
        })
        .await;
        let msg = ClientSubOrUnsubMsg::sub("c1", 0, "a/b", true);
        let envelope = ClusterEnvelope::new(msg, 1, "broker-2");
        svc.handle_envelope(envelope).await.unwrap();
        assert_eq!(svc.search_subscribers("a/b").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cold_start_reload_restores_durable_subscriptions() {
        let store = Arc::new(InMemoryDurableStore::new());
        {
            let bootstrap = SubscriptionService::new(store.clone(), None, IndexConfig::default(), "broker-1")
                .await
                .unwrap();
            bootstrap.subscribe(rec("c1", "a/b", false)).await.unwrap();
        }
        let reloaded = SubscriptionService::new(store, None, IndexConfig::default(), "broker-1")
            .await
            .unwrap();
        let matches = reloaded.search_subscribers("a/b").await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].client_id.as_ref(), "c1");
    }

    #[tokio::test]
    async fn cluster_broadcast_reaches_peer_service_over_in_process_bus() {
        let bus = Arc::new(InProcessClusterBus::new(16));
        let cfg = IndexConfig {
            clustered: true,
            ..IndexConfig::default()
        };
        let svc_a = Arc::new(
            SubscriptionService::new(Arc::new(InMemoryDurableStore::new()), Some(bus.clone() as Arc<dyn ClusterBus>), cfg.clone(), "broker-a")
                .await
                .unwrap(),
        );
        let svc_b = Arc::new(
            SubscriptionService::new(Arc::new(InMemoryDurableStore::new()), Some(bus as Arc<dyn ClusterBus>), cfg, "broker-b")
                .await
                .unwrap(),
        );
        let listener = svc_b.clone().spawn_cluster_listener().unwrap();

        svc_a.subscribe(rec("c1", "a/b", true)).await.unwrap();

        for _ in 0..50 {
            if !svc_b.search_subscribers("a/b").await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(svc_b.search_subscribers("a/b").await.unwrap().len(), 1);
        listener.abort();
    }
}
