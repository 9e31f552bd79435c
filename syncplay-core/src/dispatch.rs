//! Outbound message fan-out (spec §4.5, §6)
//!
//! A `GroupController` composes an [`Envelope`] while holding the group lock,
//! then hands it to a `MessageSink` after releasing the lock — dispatch never
//! happens while a group is locked, since a slow subscriber must never stall
//! a concurrent request against the same group.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::messages::{BroadcastAudience, Envelope, OutboundMessage};

/// A resolved outbound delivery: the message plus the set of sessions that
/// should receive it. An SSE stream keeps only the deliveries addressed to
/// its own session.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub recipients: Vec<Uuid>,
    pub message: OutboundMessage,
}

impl Delivery {
    pub fn is_for(&self, session_id: Uuid) -> bool {
        self.recipients.contains(&session_id)
    }
}

fn resolve_recipients(envelope: &Envelope, group_members: &[Uuid]) -> Vec<Uuid> {
    match envelope.audience {
        BroadcastAudience::CurrentSession => vec![envelope.from_session],
        BroadcastAudience::AllGroup => group_members.to_vec(),
        BroadcastAudience::AllExceptCurrentSession => group_members
            .iter()
            .copied()
            .filter(|&s| s != envelope.from_session)
            .collect(),
        // `AllReady` (non-buffering members) needs per-member buffering state the
        // envelope doesn't carry; callers that need it pre-filter `group_members`
        // before building the envelope and use `AllGroup` here.
        BroadcastAudience::AllReady => group_members.to_vec(),
    }
}

/// Delivers composed outbound messages to connected clients.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn dispatch(&self, envelope: Envelope, group_members: &[Uuid]);
}

/// A `MessageSink` backed by a `tokio::sync::broadcast` channel, the same
/// pattern the HTTP layer uses for its SSE stream.
#[derive(Clone)]
pub struct ChannelMessageSink {
    tx: broadcast::Sender<Delivery>,
}

impl ChannelMessageSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Delivery> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl MessageSink for ChannelMessageSink {
    async fn dispatch(&self, envelope: Envelope, group_members: &[Uuid]) {
        let recipients = resolve_recipients(&envelope, group_members);
        if recipients.is_empty() {
            return;
        }
        let delivery = Delivery {
            recipients,
            message: envelope.message,
        };
        // No subscribers is routine (no one connected to SSE yet); not an error.
        if self.tx.send(delivery).is_err() {
            debug!("message sink has no subscribers");
        }
    }
}
