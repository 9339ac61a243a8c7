//! Seams between the conversation core and its collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::property::{AggregateGroup, Property, PropertyAggregate, PropertyFilter, PropertyId};
use crate::domain::requirements::{PartialRequirementSet, RequirementSet};
use crate::domain::session::{ConversationSession, SessionKey, TurnId};
use crate::errors::{CatalogError, DeliveryError, ExtractionError, HistoryError, SessionStoreError};
use crate::flows::ConversationStage;
use crate::pagination::PropertyBatch;

/// Turns free text into candidate requirement fields with confidences.
#[async_trait]
pub trait RequirementExtractor: Send + Sync {
    async fn extract(
        &self,
        text: &str,
        current: &RequirementSet,
    ) -> Result<PartialRequirementSet, ExtractionError>;
}

#[async_trait]
pub trait PropertyCatalog: Send + Sync {
    async fn query_properties(&self, filter: &PropertyFilter)
        -> Result<Vec<Property>, CatalogError>;

    async fn query_aggregates(
        &self,
        filter: &PropertyFilter,
        group: AggregateGroup,
    ) -> Result<Vec<PropertyAggregate>, CatalogError>;

    async fn find_property(&self, id: &PropertyId) -> Result<Option<Property>, CatalogError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns `None` for unknown or expired sessions.
    async fn load(&self, key: &SessionKey) -> Result<Option<ConversationSession>, SessionStoreError>;
    async fn save(&self, session: &ConversationSession) -> Result<(), SessionStoreError>;
}

#[async_trait]
pub trait ResponseSink: Send + Sync {
    async fn deliver(
        &self,
        session: &SessionKey,
        text: &str,
        batch: Option<&PropertyBatch>,
    ) -> Result<(), DeliveryError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub session_key: SessionKey,
    pub turn_id: TurnId,
    pub user_text: String,
    pub reply_text: String,
    pub stage: ConversationStage,
    pub intent: String,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only log of turns. Writes are best-effort.
#[async_trait]
pub trait ConversationHistory: Send + Sync {
    async fn record(&self, entry: HistoryEntry) -> Result<(), HistoryError>;
}
