use async_trait::async_trait;
use thiserror::Error;

use proptalk_core::domain::property::Property;
use proptalk_core::errors::{CatalogError, HistoryError, SessionStoreError};
use proptalk_core::ports::PropertyCatalog;

pub mod history;
pub mod memory;
pub mod property;
pub mod session;

pub use history::SqlConversationHistory;
pub use memory::{InMemoryConversationHistory, InMemoryPropertyRepository, InMemorySessionStore};
pub use property::SqlPropertyRepository;
pub use session::SqlSessionStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Write side of the property inventory. Reads go through [`PropertyCatalog`].
#[async_trait]
pub trait PropertyRepository: PropertyCatalog {
    async fn save(&self, property: Property) -> Result<(), RepositoryError>;
    async fn count(&self) -> Result<u64, RepositoryError>;
    async fn clear(&self) -> Result<(), RepositoryError>;
}

impl From<RepositoryError> for CatalogError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(sqlx::Error::PoolTimedOut)
            | RepositoryError::Database(sqlx::Error::PoolClosed)
            | RepositoryError::Database(sqlx::Error::Io(_)) => {
                CatalogError::Unavailable(error.to_string())
            }
            other => CatalogError::Query(other.to_string()),
        }
    }
}

impl From<RepositoryError> for SessionStoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(_) => SessionStoreError::Unavailable(error.to_string()),
            RepositoryError::Decode(_) | RepositoryError::Serialization(_) => {
                SessionStoreError::Corrupt(error.to_string())
            }
        }
    }
}

impl From<RepositoryError> for HistoryError {
    fn from(error: RepositoryError) -> Self {
        HistoryError::Write(error.to_string())
    }
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_u64(column: &str, value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative integer): {value}"
        ))
    })
}

pub(crate) fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use proptalk_core::errors::{CatalogError, SessionStoreError};

    use super::RepositoryError;

    #[test]
    fn pool_exhaustion_maps_to_unavailable_catalog() {
        let error: CatalogError = RepositoryError::Database(sqlx::Error::PoolTimedOut).into();
        assert!(matches!(error, CatalogError::Unavailable(_)));

        let error: CatalogError = RepositoryError::Decode("bad row".to_string()).into();
        assert!(matches!(error, CatalogError::Query(_)));
    }

    #[test]
    fn undecodable_session_maps_to_corrupt() {
        let error: SessionStoreError = RepositoryError::Decode("bad json".to_string()).into();
        assert!(matches!(error, SessionStoreError::Corrupt(_)));
    }
}
