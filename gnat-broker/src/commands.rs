use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use bytes::Bytes;
use gnat_core::qos::QosLevel;
use gnat_core::topic::{TopicFilter, TopicName};
use gnat_core::Will;
use tokio::sync::{mpsc, oneshot};

use crate::router::StatusSnapshot;

/// Stable handle for a connected client. The router's subscription index
/// stores these ids, never references into the session registry, so a
/// registry insertion can never invalidate an index entry.
pub type SessionId = u64;

#[derive(Debug)]
pub enum SessionToRouterCmd {
    /// CONNACK has been sent; register the session with the router.
    Connected {
        id: SessionId,
        client_id: String,
        sender: mpsc::Sender<RouterToSessionCmd>,
        last_seen_ms: Arc<AtomicU64>,
    },

    /// A message ready for routing: QoS 0/1 on arrival, QoS 2 once its
    /// PUBREL lands, and the Will on an ungraceful close.
    Publish {
        topic: TopicName,
        payload: Bytes,
        qos: QosLevel,
        retain: bool,
    },

    /// Filters with their granted QoS, in SUBSCRIBE order.
    Subscribe {
        id: SessionId,
        filters: Vec<(TopicFilter, QosLevel)>,
    },

    Unsubscribe {
        id: SessionId,
        filters: Vec<String>,
    },

    /// The session task is ending. `will` is present only on an ungraceful
    /// close; a clean DISCONNECT already discarded it.
    Disconnected {
        id: SessionId,
        will: Option<Will>,
    },
}

#[derive(Debug, Clone)]
pub enum RouterToSessionCmd {
    /// Write this message to the client at the given (already capped) QoS.
    /// `retain` is set only on retained-store replays.
    Deliver {
        topic: TopicName,
        payload: Bytes,
        qos: QosLevel,
        retain: bool,
    },
}

#[derive(Debug)]
pub enum StatusToRouterCmd {
    Snapshot(oneshot::Sender<StatusSnapshot>),
}
