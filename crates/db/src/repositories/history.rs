use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use proptalk_core::domain::session::{SessionKey, TurnId};
use proptalk_core::errors::HistoryError;
use proptalk_core::flows::ConversationStage;
use proptalk_core::ports::{ConversationHistory, HistoryEntry};

use super::RepositoryError;
use crate::DbPool;

pub struct SqlConversationHistory {
    pool: DbPool,
}

impl SqlConversationHistory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Turns for one session, oldest first.
    pub async fn list_for_session(
        &self,
        key: &SessionKey,
    ) -> Result<Vec<HistoryEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT turn_id, user_text, reply_text, stage, intent, recorded_at
             FROM conversation_turn
             WHERE session_key = ?
             ORDER BY recorded_at ASC, rowid ASC",
        )
        .bind(key.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| entry_from_row(key, row)).collect()
    }
}

#[async_trait::async_trait]
impl ConversationHistory for SqlConversationHistory {
    async fn record(&self, entry: HistoryEntry) -> Result<(), HistoryError> {
        sqlx::query(
            "INSERT INTO conversation_turn (
                id,
                session_key,
                turn_id,
                user_text,
                reply_text,
                stage,
                intent,
                recorded_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(entry.session_key.to_string())
        .bind(&entry.turn_id.0)
        .bind(&entry.user_text)
        .bind(&entry.reply_text)
        .bind(entry.stage.as_str())
        .bind(&entry.intent)
        .bind(entry.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }
}

fn entry_from_row(key: &SessionKey, row: SqliteRow) -> Result<HistoryEntry, RepositoryError> {
    let stage_raw = row.try_get::<String, _>("stage")?;
    let stage = ConversationStage::parse(&stage_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown conversation stage `{stage_raw}`")))?;
    let recorded_raw = row.try_get::<String, _>("recorded_at")?;
    let recorded_at = DateTime::parse_from_rfc3339(&recorded_raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| {
            RepositoryError::Decode(format!("invalid timestamp in `recorded_at`: `{recorded_raw}` ({error})"))
        })?;

    Ok(HistoryEntry {
        session_key: key.clone(),
        turn_id: TurnId(row.try_get("turn_id")?),
        user_text: row.try_get("user_text")?,
        reply_text: row.try_get("reply_text")?,
        stage,
        intent: row.try_get("intent")?,
        recorded_at,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use proptalk_core::domain::session::{SessionKey, TurnId};
    use proptalk_core::flows::ConversationStage;
    use proptalk_core::ports::{ConversationHistory, HistoryEntry};

    use super::SqlConversationHistory;
    use crate::{connect_with_settings, migrations};

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("timestamp").with_timezone(&Utc)
    }

    #[tokio::test]
    async fn records_are_listed_per_session_in_order() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let history = SqlConversationHistory::new(pool.clone());
        let key = SessionKey::new("C1", "U1");

        let first = HistoryEntry {
            session_key: key.clone(),
            turn_id: TurnId("t-1".to_string()),
            user_text: "rent in marina".to_string(),
            reply_text: "What's your budget?".to_string(),
            stage: ConversationStage::CollectingRequirements,
            intent: "refinement".to_string(),
            recorded_at: parse_ts("2026-03-01T10:00:00Z"),
        };
        let second = HistoryEntry {
            turn_id: TurnId("t-2".to_string()),
            user_text: "show more".to_string(),
            stage: ConversationStage::ShowingResults,
            intent: "pagination_request".to_string(),
            recorded_at: parse_ts("2026-03-01T10:01:00Z"),
            ..first.clone()
        };
        let other = HistoryEntry {
            session_key: SessionKey::new("C1", "U2"),
            turn_id: TurnId("t-9".to_string()),
            ..first.clone()
        };

        history.record(second.clone()).await.expect("record second");
        history.record(first.clone()).await.expect("record first");
        history.record(other).await.expect("record other");

        let entries = history.list_for_session(&key).await.expect("list");
        assert_eq!(entries, vec![first, second]);
        pool.close().await;
    }
}
