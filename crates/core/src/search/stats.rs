//! Direct answers to market questions such as "cheapest 2BR in Marina" or
//! "average price in JVC".
//!
//! Unlike a search, a market question never touches pagination or the
//! stored requirements. Budget is ignored so the answer describes the market
//! rather than the user's price window.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::property::{AggregateGroup, Property, PropertyFilter};
use crate::domain::requirements::{PartialRequirementSet, RequirementSet, TransactionType};
use crate::errors::CatalogError;
use crate::ports::PropertyCatalog;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatistic {
    Cheapest,
    MostExpensive,
    Largest,
    Smallest,
    AveragePrice,
    Count,
}

impl MarketStatistic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cheapest => "cheapest",
            Self::MostExpensive => "most_expensive",
            Self::Largest => "largest",
            Self::Smallest => "smallest",
            Self::AveragePrice => "average_price",
            Self::Count => "count",
        }
    }

    /// How many listings the answer names.
    pub fn highlight_count(&self) -> usize {
        match self {
            Self::Cheapest => 5,
            Self::MostExpensive | Self::Largest | Self::Smallest => 1,
            Self::AveragePrice | Self::Count => 0,
        }
    }
}

/// A statistic plus the slice of the market it is asked about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketQuestion {
    pub statistic: MarketStatistic,
    pub scope: PropertyFilter,
}

impl MarketQuestion {
    /// Fields named in the turn win over stored ones. Without either, the
    /// question is about the sales market.
    pub fn scoped(
        statistic: MarketStatistic,
        turn: &PartialRequirementSet,
        stored: &RequirementSet,
    ) -> Self {
        let scope = PropertyFilter {
            transaction_type: Some(
                turn.transaction_type()
                    .or_else(|| stored.transaction_type())
                    .unwrap_or(TransactionType::Buy),
            ),
            location: turn.location().or_else(|| stored.location()).map(str::to_owned),
            property_type: turn.property_type().or_else(|| stored.property_type()),
            bedrooms: turn.bedrooms().or_else(|| stored.bedrooms()),
            ..PropertyFilter::default()
        };
        Self { statistic, scope }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketAnswer {
    pub question: MarketQuestion,
    pub matching: u64,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub average_price: Option<u64>,
    /// Listings that answer the question, best first.
    pub highlights: Vec<Property>,
}

pub struct MarketStatistics {
    catalog: Arc<dyn PropertyCatalog>,
    query_timeout: Duration,
}

impl MarketStatistics {
    pub fn new(catalog: Arc<dyn PropertyCatalog>, query_timeout: Duration) -> Self {
        Self { catalog, query_timeout }
    }

    pub async fn answer(&self, question: &MarketQuestion) -> Result<MarketAnswer, CatalogError> {
        let answer = match question.statistic {
            MarketStatistic::Count => self.count(question).await?,
            _ => self.summarise(question).await?,
        };
        info!(
            event_name = "market.question_answered",
            statistic = question.statistic.as_str(),
            matching = answer.matching,
            "market question answered"
        );
        Ok(answer)
    }

    async fn count(&self, question: &MarketQuestion) -> Result<MarketAnswer, CatalogError> {
        let pending = self.catalog.query_aggregates(&question.scope, AggregateGroup::All);
        let buckets = tokio::time::timeout(self.query_timeout, pending)
            .await
            .map_err(|_| CatalogError::Unavailable("aggregate query timed out".to_owned()))??;

        let matching = buckets.iter().map(|bucket| bucket.count).sum();
        Ok(MarketAnswer {
            question: question.clone(),
            matching,
            min_price: buckets.iter().filter_map(|bucket| bucket.min_price).min(),
            max_price: buckets.iter().filter_map(|bucket| bucket.max_price).max(),
            average_price: None,
            highlights: Vec::new(),
        })
    }

    async fn summarise(&self, question: &MarketQuestion) -> Result<MarketAnswer, CatalogError> {
        let pending = self.catalog.query_properties(&question.scope);
        let mut properties = tokio::time::timeout(self.query_timeout, pending)
            .await
            .map_err(|_| CatalogError::Unavailable("property query timed out".to_owned()))??;

        let matching = properties.len() as u64;
        let min_price = properties.iter().map(|property| property.price).min();
        let max_price = properties.iter().map(|property| property.price).max();
        let average_price = (matching > 0).then(|| {
            let total: u128 = properties.iter().map(|property| u128::from(property.price)).sum();
            u64::try_from(total / u128::from(matching)).unwrap_or(u64::MAX)
        });

        match question.statistic {
            MarketStatistic::Cheapest => properties.sort_by_key(|property| property.price),
            MarketStatistic::MostExpensive => {
                properties.sort_by(|left, right| right.price.cmp(&left.price))
            }
            MarketStatistic::Largest | MarketStatistic::Smallest => {
                // Listings without a size cannot rank by size.
                properties.retain(|property| property.size_sqft.is_some());
                properties.sort_by_key(|property| property.size_sqft);
                if question.statistic == MarketStatistic::Largest {
                    properties.reverse();
                }
            }
            MarketStatistic::AveragePrice | MarketStatistic::Count => properties.clear(),
        }
        properties.truncate(question.statistic.highlight_count());

        Ok(MarketAnswer {
            question: question.clone(),
            matching,
            min_price,
            max_price,
            average_price,
            highlights: properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{MarketQuestion, MarketStatistic, MarketStatistics};
    use crate::domain::property::{
        AggregateGroup, Property, PropertyAggregate, PropertyFilter, PropertyId,
    };
    use crate::domain::requirements::{
        PropertyType, RequirementField, RequirementSet, TransactionType,
    };
    use crate::errors::CatalogError;
    use crate::ports::PropertyCatalog;

    struct FixedCatalog {
        inventory: Vec<Property>,
        failing: bool,
    }

    #[async_trait]
    impl PropertyCatalog for FixedCatalog {
        async fn query_properties(
            &self,
            filter: &PropertyFilter,
        ) -> Result<Vec<Property>, CatalogError> {
            if self.failing {
                return Err(CatalogError::Unavailable("offline".to_owned()));
            }
            Ok(self.inventory.iter().filter(|p| filter.matches(p)).cloned().collect())
        }

        async fn query_aggregates(
            &self,
            filter: &PropertyFilter,
            _group: AggregateGroup,
        ) -> Result<Vec<PropertyAggregate>, CatalogError> {
            let matching: Vec<&Property> =
                self.inventory.iter().filter(|p| filter.matches(p)).collect();
            Ok(vec![PropertyAggregate {
                bucket: "all".to_owned(),
                count: matching.len() as u64,
                min_price: matching.iter().map(|p| p.price).min(),
                max_price: matching.iter().map(|p| p.price).max(),
            }])
        }

        async fn find_property(&self, _id: &PropertyId) -> Result<Option<Property>, CatalogError> {
            Ok(None)
        }
    }

    fn listing(id: &str, location: &str, bedrooms: u32, price: u64, size: Option<u32>) -> Property {
        Property {
            id: PropertyId(id.to_owned()),
            transaction_type: TransactionType::Rent,
            location: location.to_owned(),
            property_type: PropertyType::Apartment,
            bedrooms,
            price,
            building_name: None,
            size_sqft: size,
        }
    }

    fn statistics(inventory: Vec<Property>) -> MarketStatistics {
        MarketStatistics::new(
            Arc::new(FixedCatalog { inventory, failing: false }),
            Duration::from_secs(1),
        )
    }

    fn marina_rentals() -> Vec<Property> {
        vec![
            listing("M-1", "Dubai Marina", 2, 120_000, Some(1_300)),
            listing("M-2", "Dubai Marina", 2, 90_000, None),
            listing("M-3", "Dubai Marina", 2, 105_000, Some(1_100)),
            listing("M-4", "Dubai Marina", 1, 70_000, Some(800)),
            listing("J-1", "JVC", 2, 60_000, Some(1_000)),
        ]
    }

    fn marina_two_beds(statistic: MarketStatistic) -> MarketQuestion {
        let turn = RequirementSet {
            transaction_type: Some(RequirementField::new(TransactionType::Rent, 0.9)),
            location: Some(RequirementField::new("Dubai Marina".to_owned(), 0.9)),
            bedrooms: Some(RequirementField::new(2, 0.9)),
            ..RequirementSet::default()
        };
        MarketQuestion::scoped(statistic, &turn, &RequirementSet::default())
    }

    #[test]
    fn scope_prefers_the_turn_then_the_session_and_ignores_budget() {
        let stored = RequirementSet {
            location: Some(RequirementField::new("JVC".to_owned(), 0.9)),
            property_type: Some(RequirementField::new(PropertyType::Villa, 0.9)),
            budget_max: Some(RequirementField::new(2_000_000, 0.9)),
            ..RequirementSet::default()
        };
        let turn = RequirementSet {
            location: Some(RequirementField::new("Dubai Marina".to_owned(), 0.9)),
            ..RequirementSet::default()
        };

        let question = MarketQuestion::scoped(MarketStatistic::Cheapest, &turn, &stored);
        assert_eq!(question.scope.location.as_deref(), Some("Dubai Marina"));
        assert_eq!(question.scope.property_type, Some(PropertyType::Villa));
        assert_eq!(question.scope.transaction_type, Some(TransactionType::Buy));
        assert_eq!(question.scope.price_max, None);
    }

    #[tokio::test]
    async fn cheapest_lists_matches_in_price_order() {
        let answer = statistics(marina_rentals())
            .answer(&marina_two_beds(MarketStatistic::Cheapest))
            .await
            .expect("answer");

        assert_eq!(answer.matching, 3);
        let ids: Vec<&str> = answer.highlights.iter().map(|p| p.id.0.as_str()).collect();
        assert_eq!(ids, ["M-2", "M-3", "M-1"]);
        assert_eq!(answer.average_price, Some(105_000));
        assert_eq!((answer.min_price, answer.max_price), (Some(90_000), Some(120_000)));
    }

    #[tokio::test]
    async fn largest_skips_listings_without_a_size() {
        let answer = statistics(marina_rentals())
            .answer(&marina_two_beds(MarketStatistic::Largest))
            .await
            .expect("answer");

        assert_eq!(answer.highlights.len(), 1);
        assert_eq!(answer.highlights[0].id.0, "M-1");
    }

    #[tokio::test]
    async fn count_uses_aggregates_and_names_no_listing() {
        let answer = statistics(marina_rentals())
            .answer(&marina_two_beds(MarketStatistic::Count))
            .await
            .expect("answer");

        assert_eq!(answer.matching, 3);
        assert!(answer.highlights.is_empty());
        assert_eq!(answer.min_price, Some(90_000));
    }

    #[tokio::test]
    async fn empty_market_has_no_average() {
        let answer = statistics(Vec::new())
            .answer(&marina_two_beds(MarketStatistic::AveragePrice))
            .await
            .expect("answer");

        assert_eq!(answer.matching, 0);
        assert_eq!(answer.average_price, None);
    }

    #[tokio::test]
    async fn catalog_failure_is_reported() {
        let stats = MarketStatistics::new(
            Arc::new(FixedCatalog { inventory: Vec::new(), failing: true }),
            Duration::from_secs(1),
        );
        let error = stats
            .answer(&marina_two_beds(MarketStatistic::MostExpensive))
            .await
            .expect_err("catalog is down");
        assert!(matches!(error, CatalogError::Unavailable(_)));
    }
}
