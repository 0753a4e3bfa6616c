//! Configuration for the subscription index.
//!
//! Loadable from TOML the same way the rest of this codebase assembles its
//! configuration: a `#[serde(default)]` struct with per-field `default_*()`
//! helpers.

use serde::Deserialize;

/// The subscriber-key separator is a build-time constant, not configurable —
/// changing it would change the external store's observable keying.
pub const SUBKEY_SEPARATOR: &str = "<!>";

/// The cluster sub/unsub channel name is fixed.
pub const SUB_UNSUB_CHANNEL: &str = "sub/unsub";

/// Which wire codec is injected for cluster envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterCodec {
    #[default]
    Json,
    Binary,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Whether the durable-tier inner cache is enabled. When false, reads
    /// against durable (`cleanSession=false`) subscriptions go live to the
    /// durable store on every `searchSubscribers` call.
    pub inner_cache_enabled: bool,

    /// Whether subscribe/unsubscribe events are broadcast to cluster peers.
    pub clustered: bool,

    /// Key under which the set of all durable filters is stored.
    #[serde(default = "default_filter_set_key")]
    pub filter_set_key: String,

    /// Prefix for the per-filter subscriber hash: `{topic_prefix}{filter}`.
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    /// Prefix for the per-client filter set: `{client_topics_prefix}{clientId}`.
    #[serde(default = "default_client_topics_prefix")]
    pub client_topics_prefix: String,

    /// Serialization format injected into the cluster bus codec.
    #[serde(default)]
    pub codec: ClusterCodec,
}

fn default_filter_set_key() -> String {
    "subs:filters".to_string()
}

fn default_topic_prefix() -> String {
    "subs:topic:".to_string()
}

fn default_client_topics_prefix() -> String {
    "subs:client:".to_string()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            inner_cache_enabled: true,
            clustered: false,
            filter_set_key: default_filter_set_key(),
            topic_prefix: default_topic_prefix(),
            client_topics_prefix: default_client_topics_prefix(),
            codec: ClusterCodec::default(),
        }
    }
}
