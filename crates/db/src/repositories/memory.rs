use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use tokio::sync::RwLock;

use proptalk_core::domain::property::{
    AggregateGroup, Property, PropertyAggregate, PropertyFilter, PropertyId,
};
use proptalk_core::domain::session::{ConversationSession, SessionKey, DEFAULT_SESSION_TTL_SECS};
use proptalk_core::errors::{CatalogError, HistoryError, SessionStoreError};
use proptalk_core::ports::{ConversationHistory, HistoryEntry, PropertyCatalog, SessionStore};

use super::{PropertyRepository, RepositoryError};

/// Inventory held in a map keyed by id. Query semantics match the SQL repository.
#[derive(Default)]
pub struct InMemoryPropertyRepository {
    properties: RwLock<BTreeMap<String, Property>>,
}

impl InMemoryPropertyRepository {
    pub fn with_properties(properties: impl IntoIterator<Item = Property>) -> Self {
        let properties =
            properties.into_iter().map(|property| (property.id.0.clone(), property)).collect();
        Self { properties: RwLock::new(properties) }
    }
}

#[async_trait::async_trait]
impl PropertyCatalog for InMemoryPropertyRepository {
    async fn query_properties(
        &self,
        filter: &PropertyFilter,
    ) -> Result<Vec<Property>, CatalogError> {
        let properties = self.properties.read().await;
        let mut matching: Vec<Property> =
            properties.values().filter(|property| filter.matches(property)).cloned().collect();
        matching.sort_by(|left, right| left.price.cmp(&right.price).then(left.id.cmp(&right.id)));
        if let Some(limit) = filter.limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }

    async fn query_aggregates(
        &self,
        filter: &PropertyFilter,
        group: AggregateGroup,
    ) -> Result<Vec<PropertyAggregate>, CatalogError> {
        let properties = self.properties.read().await;
        let mut buckets: BTreeMap<String, PropertyAggregate> = BTreeMap::new();
        if group == AggregateGroup::All {
            buckets.insert("all".to_string(), empty_bucket("all"));
        }

        for property in properties.values().filter(|property| filter.matches(property)) {
            let key = match group {
                AggregateGroup::All => "all".to_string(),
                AggregateGroup::Location => property.location.clone(),
                AggregateGroup::PropertyType => property.property_type.as_str().to_string(),
                AggregateGroup::Bedrooms => property.bedrooms.to_string(),
            };
            let bucket = buckets.entry(key.clone()).or_insert_with(|| empty_bucket(&key));
            bucket.count += 1;
            bucket.min_price = Some(bucket.min_price.map_or(property.price, |p| p.min(property.price)));
            bucket.max_price = Some(bucket.max_price.map_or(property.price, |p| p.max(property.price)));
        }

        let mut rows: Vec<PropertyAggregate> = buckets.into_values().collect();
        rows.sort_by(|left, right| right.count.cmp(&left.count).then(left.bucket.cmp(&right.bucket)));
        Ok(rows)
    }

    async fn find_property(&self, id: &PropertyId) -> Result<Option<Property>, CatalogError> {
        let properties = self.properties.read().await;
        Ok(properties.get(&id.0).cloned())
    }
}

#[async_trait::async_trait]
impl PropertyRepository for InMemoryPropertyRepository {
    async fn save(&self, property: Property) -> Result<(), RepositoryError> {
        let mut properties = self.properties.write().await;
        properties.insert(property.id.0.clone(), property);
        Ok(())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let properties = self.properties.read().await;
        Ok(properties.len() as u64)
    }

    async fn clear(&self) -> Result<(), RepositoryError> {
        self.properties.write().await.clear();
        Ok(())
    }
}

fn empty_bucket(bucket: &str) -> PropertyAggregate {
    PropertyAggregate { bucket: bucket.to_string(), count: 0, min_price: None, max_price: None }
}

pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionKey, ConversationSession>>,
    ttl_secs: u64,
}

impl InMemorySessionStore {
    pub fn with_ttl(ttl_secs: u64) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), ttl_secs }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_SESSION_TTL_SECS)
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, key: &SessionKey) -> Result<Option<ConversationSession>, SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        let expired = sessions
            .get(key)
            .is_some_and(|session| session.is_expired(self.ttl_secs, Utc::now()));
        if expired {
            sessions.remove(key);
            return Ok(None);
        }
        Ok(sessions.get(key).cloned())
    }

    async fn save(&self, session: &ConversationSession) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.key.clone(), session.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryConversationHistory {
    entries: RwLock<Vec<HistoryEntry>>,
}

impl InMemoryConversationHistory {
    pub async fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait::async_trait]
impl ConversationHistory for InMemoryConversationHistory {
    async fn record(&self, entry: HistoryEntry) -> Result<(), HistoryError> {
        self.entries.write().await.push(entry);
        Ok(())
    }
}
