use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Serialize;
use tracing::info;

use proptalk_core::domain::property::Property;
use proptalk_core::domain::requirements::TransactionType;

use crate::repositories::{PropertyRepository, RepositoryError};

/// Demo inventory of Dubai listings used by `seed`, the local chat client and tests.
pub struct DemoInventory;

impl DemoInventory {
    pub const JSON: &str = include_str!("../../../config/fixtures/demo_inventory.json");

    pub fn properties() -> Result<Vec<Property>, RepositoryError> {
        Self::parse(Self::JSON)
    }

    pub fn parse(json: &str) -> Result<Vec<Property>, RepositoryError> {
        let properties: Vec<Property> = serde_json::from_str(json)?;
        let mut seen = BTreeSet::new();
        for property in &properties {
            if !seen.insert(property.id.0.as_str()) {
                return Err(RepositoryError::Decode(format!(
                    "duplicate property id `{}` in inventory",
                    property.id
                )));
            }
            if property.price == 0 {
                return Err(RepositoryError::Decode(format!(
                    "property `{}` has a zero price",
                    property.id
                )));
            }
        }
        Ok(properties)
    }

    pub fn read_file(path: &Path) -> Result<Vec<Property>, RepositoryError> {
        let raw = std::fs::read_to_string(path).map_err(|error| {
            RepositoryError::Decode(format!("could not read `{}`: {error}", path.display()))
        })?;
        Self::parse(&raw)
    }

    /// Upserts the built-in inventory.
    pub async fn load(repo: &dyn PropertyRepository) -> Result<SeedResult, RepositoryError> {
        Self::load_properties(repo, Self::properties()?).await
    }

    pub async fn load_properties(
        repo: &dyn PropertyRepository,
        properties: Vec<Property>,
    ) -> Result<SeedResult, RepositoryError> {
        let mut locations = BTreeSet::new();
        let mut by_transaction: BTreeMap<String, usize> = BTreeMap::new();
        let inserted = properties.len();

        for property in properties {
            locations.insert(property.location.clone());
            *by_transaction.entry(property.transaction_type.as_str().to_string()).or_default() += 1;
            repo.save(property).await?;
        }

        info!(
            event_name = "db.seed.loaded",
            inserted,
            locations = locations.len(),
            "property inventory seeded"
        );
        Ok(SeedResult { inserted, locations: locations.into_iter().collect(), by_transaction })
    }

    /// Checks that the repository holds every built-in listing.
    pub async fn verify(repo: &dyn PropertyRepository) -> Result<VerificationResult, RepositoryError> {
        let expected = Self::properties()?;
        let mut checks = Vec::new();

        let stored = repo.count().await?;
        checks.push(VerificationCheck {
            name: "inventory_count".to_string(),
            passed: stored >= expected.len() as u64,
            detail: format!("{stored} stored, {} expected", expected.len()),
        });

        let mut missing = Vec::new();
        for property in &expected {
            let found = repo
                .find_property(&property.id)
                .await
                .map_err(|error| RepositoryError::Decode(error.to_string()))?;
            if found.as_ref() != Some(property) {
                missing.push(property.id.0.clone());
            }
        }
        checks.push(VerificationCheck {
            name: "listings_match".to_string(),
            passed: missing.is_empty(),
            detail: if missing.is_empty() {
                "all listings present".to_string()
            } else {
                format!("missing or changed: {}", missing.join(", "))
            },
        });

        for transaction_type in [TransactionType::Rent, TransactionType::Buy] {
            let present = expected.iter().any(|property| property.transaction_type == transaction_type);
            checks.push(VerificationCheck {
                name: format!("{transaction_type}_inventory"),
                passed: present,
                detail: format!("{transaction_type} listings present: {present}"),
            });
        }

        let all_passed = checks.iter().all(|check| check.passed);
        Ok(VerificationResult { all_passed, checks })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeedResult {
    pub inserted: usize,
    pub locations: Vec<String>,
    pub by_transaction: BTreeMap<String, usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerificationCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub all_passed: bool,
    pub checks: Vec<VerificationCheck>,
}
