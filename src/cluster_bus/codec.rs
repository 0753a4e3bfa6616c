//! Encode/decode `ClusterEnvelope` under either injected wire format.

use crate::config::ClusterCodec;
use crate::error::DurableStoreError;

use super::message::ClusterEnvelope;

pub fn encode(codec: ClusterCodec, envelope: &ClusterEnvelope) -> Result<Vec<u8>, DurableStoreError> {
    match codec {
        ClusterCodec::Json => Ok(serde_json::to_vec(envelope)?),
        ClusterCodec::Binary => Ok(bincode::encode_to_vec(envelope, bincode::config::standard())?),
    }
}

pub fn decode(codec: ClusterCodec, bytes: &[u8]) -> Result<ClusterEnvelope, DurableStoreError> {
    match codec {
        ClusterCodec::Json => Ok(serde_json::from_slice(bytes)?),
        ClusterCodec::Binary => {
            let (envelope, _) = bincode::decode_from_slice(bytes, bincode::config::standard())?;
            Ok(envelope)
        }
    }
}
