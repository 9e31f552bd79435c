//! Test doubles shared by the scenario tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use syncplay_core::dispatch::{Delivery, MessageSink};
use syncplay_core::messages::Envelope;
use syncplay_core::session::{SessionDirectory, UserCatalog};

/// Captures every dispatched envelope for assertions, instead of delivering
/// it anywhere.
#[derive(Default)]
pub struct RecordingMessageSink {
    deliveries: Mutex<Vec<Delivery>>,
}

impl RecordingMessageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn deliveries_for(&self, session_id: Uuid) -> Vec<Delivery> {
        self.deliveries()
            .into_iter()
            .filter(|d| d.is_for(session_id))
            .collect()
    }
}

#[async_trait]
impl MessageSink for RecordingMessageSink {
    async fn dispatch(&self, envelope: Envelope, group_members: &[Uuid]) {
        let recipients = match envelope.audience {
            syncplay_core::messages::BroadcastAudience::CurrentSession => vec![envelope.from_session],
            syncplay_core::messages::BroadcastAudience::AllGroup
            | syncplay_core::messages::BroadcastAudience::AllReady => group_members.to_vec(),
            syncplay_core::messages::BroadcastAudience::AllExceptCurrentSession => group_members
                .iter()
                .copied()
                .filter(|&s| s != envelope.from_session)
                .collect(),
        };
        if recipients.is_empty() {
            return;
        }
        self.deliveries.lock().unwrap().push(Delivery {
            recipients,
            message: envelope.message,
        });
    }
}

/// A fixed user<->session map with a configurable access allowlist.
#[derive(Default)]
pub struct FakeDirectory {
    users: Mutex<HashMap<Uuid, Uuid>>,
    syncplay_access: Mutex<HashMap<Uuid, bool>>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session_id: Uuid, user_id: Uuid) {
        self.users.lock().unwrap().insert(session_id, user_id);
        self.syncplay_access.lock().unwrap().entry(user_id).or_insert(true);
    }

    pub fn deny_syncplay_access(&self, user_id: Uuid) {
        self.syncplay_access.lock().unwrap().insert(user_id, false);
    }
}

#[async_trait]
impl SessionDirectory for FakeDirectory {
    async fn user_for_session(&self, session_id: Uuid) -> Option<Uuid> {
        self.users.lock().unwrap().get(&session_id).copied()
    }

    async fn connected_users(&self) -> Vec<Uuid> {
        self.users.lock().unwrap().values().copied().collect()
    }

    async fn has_syncplay_access(&self, user_id: Uuid) -> bool {
        self.syncplay_access.lock().unwrap().get(&user_id).copied().unwrap_or(true)
    }
}

/// A catalog where each user has an explicit denylist of items, a fixed
/// runtime for every item.
#[derive(Default)]
pub struct FakeCatalog {
    denied: Mutex<HashMap<Uuid, Vec<Uuid>>>,
    runtime_ticks: i64,
}

impl FakeCatalog {
    pub fn new(runtime_ticks: i64) -> Self {
        Self {
            denied: Mutex::new(HashMap::new()),
            runtime_ticks,
        }
    }

    pub fn deny(&self, user_id: Uuid, item_id: Uuid) {
        self.denied.lock().unwrap().entry(user_id).or_default().push(item_id);
    }
}

#[async_trait]
impl UserCatalog for FakeCatalog {
    async fn can_access(&self, user_id: Uuid, item_id: Uuid) -> bool {
        !self
            .denied
            .lock()
            .unwrap()
            .get(&user_id)
            .map(|items| items.contains(&item_id))
            .unwrap_or(false)
    }

    async fn runtime_ticks(&self, _item_id: Uuid) -> Option<i64> {
        Some(self.runtime_ticks)
    }
}
