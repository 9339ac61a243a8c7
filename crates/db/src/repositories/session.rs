use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::{debug, warn};

use proptalk_core::domain::session::{
    session_ttl, ConversationSession, SessionKey, DEFAULT_SESSION_TTL_SECS,
};
use proptalk_core::errors::SessionStoreError;
use proptalk_core::ports::SessionStore;

use super::RepositoryError;
use crate::DbPool;

/// Sessions stored as JSON documents keyed by `channel:user`.
///
/// Expiry is enforced on read: a session idle for longer than the TTL is
/// deleted and reported as absent.
pub struct SqlSessionStore {
    pool: DbPool,
    ttl_secs: u64,
}

impl SqlSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, ttl_secs: DEFAULT_SESSION_TTL_SECS }
    }

    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Deletes every session idle since before `now - ttl`. Returns the number removed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let Some(cutoff) = now.checked_sub_signed(session_ttl(self.ttl_secs)) else {
            return Ok(0);
        };
        let result = sqlx::query("DELETE FROM conversation_session WHERE updated_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn load_session(
        &self,
        key: &SessionKey,
    ) -> Result<Option<ConversationSession>, RepositoryError> {
        let row = sqlx::query("SELECT payload_json FROM conversation_session WHERE session_key = ?")
            .bind(key.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let payload = row.try_get::<String, _>("payload_json")?;
        let session: ConversationSession = serde_json::from_str(&payload)?;
        if session.is_expired(self.ttl_secs, Utc::now()) {
            debug!(
                event_name = "session.expired",
                session_key = %key,
                "discarding expired session"
            );
            self.delete(key).await?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM conversation_session WHERE session_key = ?")
            .bind(key.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStore for SqlSessionStore {
    async fn load(&self, key: &SessionKey) -> Result<Option<ConversationSession>, SessionStoreError> {
        match self.load_session(key).await {
            Ok(session) => Ok(session),
            Err(error @ (RepositoryError::Decode(_) | RepositoryError::Serialization(_))) => {
                warn!(
                    event_name = "session.corrupt",
                    session_key = %key,
                    error = %error,
                    "stored session could not be decoded"
                );
                Err(error.into())
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn save(&self, session: &ConversationSession) -> Result<(), SessionStoreError> {
        let payload = serde_json::to_string(session).map_err(RepositoryError::from)?;
        sqlx::query(
            "INSERT INTO conversation_session (
                session_key,
                channel,
                user_id,
                stage,
                payload_json,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(session_key) DO UPDATE SET
                stage = excluded.stage,
                payload_json = excluded.payload_json,
                updated_at = excluded.updated_at",
        )
        .bind(session.key.to_string())
        .bind(&session.key.channel)
        .bind(&session.key.user_id)
        .bind(session.stage.as_str())
        .bind(payload)
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use proptalk_core::domain::requirements::{RequirementField, TransactionType};
    use proptalk_core::domain::session::{ConversationSession, SessionKey, TurnId};
    use proptalk_core::errors::SessionStoreError;
    use proptalk_core::flows::ConversationStage;
    use proptalk_core::ports::SessionStore;

    use super::SqlSessionStore;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn session_round_trips_through_json_payload() {
        let pool = setup_pool().await;
        let store = SqlSessionStore::new(pool.clone());
        let key = SessionKey::new("C1", "U1");

        let mut session = ConversationSession::new(key.clone(), 10);
        session.stage = ConversationStage::CollectingRequirements;
        session.requirements.transaction_type =
            Some(RequirementField::new(TransactionType::Rent, 0.9));
        session.record_turn(TurnId("1700000000.000100".to_string()));

        store.save(&session).await.expect("save");
        let loaded = store.load(&key).await.expect("load").expect("session present");

        assert_eq!(loaded, session);
        assert!(loaded.has_processed(&TurnId("1700000000.000100".to_string())));
        assert_eq!(store.load(&SessionKey::new("C1", "U2")).await.expect("load"), None);
        pool.close().await;
    }

    #[tokio::test]
    async fn expired_sessions_are_dropped_on_load() {
        let pool = setup_pool().await;
        let store = SqlSessionStore::new(pool.clone()).with_ttl(60);
        let key = SessionKey::new("C1", "U1");

        let mut session = ConversationSession::new(key.clone(), 10);
        session.updated_at = Utc::now() - Duration::seconds(120);
        store.save(&session).await.expect("save");

        assert_eq!(store.load(&key).await.expect("load"), None);
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversation_session")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(remaining, 0);
        pool.close().await;
    }

    #[tokio::test]
    async fn purge_removes_only_idle_sessions() {
        let pool = setup_pool().await;
        let store = SqlSessionStore::new(pool.clone()).with_ttl(60);

        let mut idle = ConversationSession::new(SessionKey::new("C1", "idle"), 10);
        idle.updated_at = Utc::now() - Duration::seconds(600);
        let fresh = ConversationSession::new(SessionKey::new("C1", "fresh"), 10);
        store.save(&idle).await.expect("save idle");
        store.save(&fresh).await.expect("save fresh");

        assert_eq!(store.purge_expired(Utc::now()).await.expect("purge"), 1);
        assert!(store.load(&fresh.key).await.expect("load").is_some());
        pool.close().await;
    }

    #[tokio::test]
    async fn oversized_ttl_keeps_sessions_without_panicking() {
        let pool = setup_pool().await;
        let store = SqlSessionStore::new(pool.clone()).with_ttl(10_000_000_000_000_000);

        let mut old = ConversationSession::new(SessionKey::new("C1", "old"), 10);
        old.updated_at = Utc::now() - Duration::days(3_650);
        store.save(&old).await.expect("save");

        assert_eq!(store.purge_expired(Utc::now()).await.expect("purge"), 0);
        assert!(store.load(&old.key).await.expect("load").is_some());
        pool.close().await;
    }

    #[tokio::test]
    async fn garbage_payload_is_reported_as_corrupt() {
        let pool = setup_pool().await;
        sqlx::query(
            "INSERT INTO conversation_session (session_key, channel, user_id, stage, payload_json, updated_at)
             VALUES ('C1:U1', 'C1', 'U1', 'initiated', '{not json', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert garbage");

        let store = SqlSessionStore::new(pool.clone());
        let error = store.load(&SessionKey::new("C1", "U1")).await.expect_err("corrupt");
        assert!(matches!(error, SessionStoreError::Corrupt(_)));
        pool.close().await;
    }
}
