use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::property::PropertyId;
use crate::domain::requirements::RequirementSet;
use crate::flows::ConversationStage;
use crate::pagination::Pagination;
use crate::search::{Relaxation, SearchTier};

const PROCESSED_TURN_WINDOW: usize = 64;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;
pub const MAX_SESSION_TTL_SECS: u64 = 366 * 24 * 60 * 60;

/// Idle time after which a session expires. Saturates instead of overflowing.
pub fn session_ttl(ttl_secs: u64) -> TimeDelta {
    i64::try_from(ttl_secs).ok().and_then(TimeDelta::try_seconds).unwrap_or(TimeDelta::MAX)
}

/// Identifies one user's conversation on one channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub channel: String,
    pub user_id: String,
}

impl SessionKey {
    pub fn new(channel: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self { channel: channel.into(), user_id: user_id.into() }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel, self.user_id)
    }
}

/// Transport-level message id. Redelivered messages carry the same id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub String);

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub key: SessionKey,
    pub stage: ConversationStage,
    pub requirements: RequirementSet,
    pub active_property_reference: Option<PropertyId>,
    pub pagination: Pagination,
    pub last_search_tier: Option<SearchTier>,
    #[serde(default)]
    pub last_relaxations: Vec<Relaxation>,
    #[serde(default)]
    processed_turns: VecDeque<TurnId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationSession {
    pub fn new(key: SessionKey, batch_size: usize) -> Self {
        let now = Utc::now();
        Self {
            key,
            stage: ConversationStage::Initiated,
            requirements: RequirementSet::default(),
            active_property_reference: None,
            pagination: Pagination::new(batch_size),
            last_search_tier: None,
            last_relaxations: Vec::new(),
            processed_turns: VecDeque::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_processed(&self, turn_id: &TurnId) -> bool {
        self.processed_turns.contains(turn_id)
    }

    pub fn record_turn(&mut self, turn_id: TurnId) {
        if self.has_processed(&turn_id) {
            return;
        }
        if self.processed_turns.len() == PROCESSED_TURN_WINDOW {
            self.processed_turns.pop_front();
        }
        self.processed_turns.push_back(turn_id);
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_expired(&self, ttl_secs: u64, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.updated_at) > session_ttl(ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeDelta, Utc};

    use super::{session_ttl, ConversationSession, SessionKey, TurnId, PROCESSED_TURN_WINDOW};
    use crate::flows::ConversationStage;

    #[test]
    fn new_session_starts_initiated_and_empty() {
        let session = ConversationSession::new(SessionKey::new("slack", "U1"), 10);
        assert_eq!(session.stage, ConversationStage::Initiated);
        assert!(session.requirements.is_empty());
        assert_eq!(session.pagination.batch_size(), 10);
        assert_eq!(session.key.to_string(), "slack:U1");
    }

    #[test]
    fn processed_turns_are_remembered_within_window() {
        let mut session = ConversationSession::new(SessionKey::new("slack", "U1"), 10);
        session.record_turn(TurnId("m-1".to_owned()));
        assert!(session.has_processed(&TurnId("m-1".to_owned())));

        for index in 0..PROCESSED_TURN_WINDOW {
            session.record_turn(TurnId(format!("m-{}", index + 2)));
        }
        assert!(!session.has_processed(&TurnId("m-1".to_owned())));
    }

    #[test]
    fn expiry_is_measured_from_last_update() {
        let mut session = ConversationSession::new(SessionKey::new("cli", "local"), 10);
        session.updated_at = Utc::now() - Duration::hours(25);
        assert!(session.is_expired(24 * 60 * 60, Utc::now()));
        session.touch();
        assert!(!session.is_expired(24 * 60 * 60, Utc::now()));
    }

    #[test]
    fn huge_ttl_saturates_instead_of_panicking() {
        let mut session = ConversationSession::new(SessionKey::new("cli", "local"), 10);
        session.updated_at = Utc::now() - Duration::days(3_650);

        assert!(!session.is_expired(10_000_000_000_000_000, Utc::now()));
        assert!(!session.is_expired(u64::MAX, Utc::now()));
        assert_eq!(session_ttl(u64::MAX), TimeDelta::MAX);
        assert_eq!(session_ttl(90), TimeDelta::seconds(90));
    }

    #[test]
    fn session_survives_json_round_trip() {
        let mut session = ConversationSession::new(SessionKey::new("slack", "U9"), 5);
        session.record_turn(TurnId("m-1".to_owned()));
        let encoded = serde_json::to_string(&session).expect("encode");
        let decoded: ConversationSession = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, session);
    }
}
