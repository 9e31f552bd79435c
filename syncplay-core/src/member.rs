//! Per-session presence record (spec §3, §4.5)

use uuid::Uuid;

/// A single connected client device within a group (spec Glossary: Member / Session)
#[derive(Debug, Clone)]
pub struct GroupMember {
    pub session_id: Uuid,
    pub user_id: Uuid,
    /// Round-trip latency estimate in milliseconds, initial value 500 (spec §3)
    pub ping_ms: f64,
    pub is_buffering: bool,
    /// Opts the member out of being a readiness blocker (spec Glossary: Ignore-wait)
    pub ignore_wait: bool,
}

impl GroupMember {
    pub fn new(session_id: Uuid, user_id: Uuid) -> Self {
        Self {
            session_id,
            user_id,
            ping_ms: 500.0,
            is_buffering: false,
            ignore_wait: false,
        }
    }

    /// Whether this member can block the group's readiness
    pub fn blocks_readiness(&self) -> bool {
        self.is_buffering && !self.ignore_wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_member_has_default_ping_and_is_ready() {
        let m = GroupMember::new(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(m.ping_ms, 500.0);
        assert!(!m.blocks_readiness());
    }

    #[test]
    fn ignore_wait_member_never_blocks() {
        let mut m = GroupMember::new(Uuid::new_v4(), Uuid::new_v4());
        m.is_buffering = true;
        assert!(m.blocks_readiness());
        m.ignore_wait = true;
        assert!(!m.blocks_readiness());
    }
}
