//! The cluster sub/unsub channel: wire types, the injected codec, and the
//! `ClusterBus` publish/subscribe abstraction.

mod bus;
mod codec;
mod message;

pub use bus::{ClusterBus, InProcessClusterBus};
pub use codec::{decode, encode};
pub use message::{ClientSubOrUnsubMsg, ClusterEnvelope, MsgKind};
