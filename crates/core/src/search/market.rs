use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::budget::format_money;
use crate::domain::property::{AggregateGroup, PropertyAggregate, PropertyFilter};
use crate::domain::requirements::{PropertyType, TransactionType};
use crate::ports::PropertyCatalog;
use crate::search::engine::QueryLedger;
use crate::search::relaxation::AreaDirectory;

const MAX_ALTERNATIVE_AREAS: usize = 3;

/// Why the catalog cannot satisfy the criteria, derived from aggregates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarketDiagnostic {
    NoInventory {
        transaction_type: Option<TransactionType>,
    },
    LocationUnlisted {
        location: String,
        alternatives: Vec<String>,
    },
    PropertyTypeAbsent {
        property_type: PropertyType,
        location: Option<String>,
        available: Vec<String>,
    },
    BedroomsAbsent {
        bedrooms: u32,
        location: Option<String>,
        available: Vec<u32>,
    },
    PriceAboveBudget {
        budget_max: u64,
        cheapest: u64,
        matching: u64,
    },
    PriceBelowMinimum {
        budget_min: u64,
        highest: u64,
        matching: u64,
    },
    NoPriceInRange {
        cheapest: u64,
        highest: u64,
        matching: u64,
    },
}

impl MarketDiagnostic {
    pub fn suggestion(&self, currency: &str) -> String {
        match self {
            Self::NoInventory { transaction_type } => {
                let scope = match transaction_type {
                    Some(TransactionType::Rent) => "rental ",
                    Some(TransactionType::Buy) => "for-sale ",
                    None => "",
                };
                format!(
                    "There are no {scope}listings available right now. \
                     Try switching between renting and buying, or check back soon."
                )
            }
            Self::LocationUnlisted { location, alternatives } if alternatives.is_empty() => {
                format!("We don't have any listings in {location} at the moment.")
            }
            Self::LocationUnlisted { location, alternatives } => format!(
                "We don't have any listings in {location} at the moment. \
                 Areas with availability: {}.",
                alternatives.join(", ")
            ),
            Self::PropertyTypeAbsent { property_type, location, available } => {
                let place = location.as_deref().map(|l| format!(" in {l}")).unwrap_or_default();
                if available.is_empty() {
                    format!("There are no {}{place} right now.", property_type.plural())
                } else {
                    format!(
                        "There are no {}{place}, but you could consider: {}.",
                        property_type.plural(),
                        available.join(", ")
                    )
                }
            }
            Self::BedroomsAbsent { bedrooms, location, available } => {
                let place = location.as_deref().map(|l| format!(" in {l}")).unwrap_or_default();
                let counts =
                    available.iter().map(u32::to_string).collect::<Vec<_>>().join(", ");
                format!(
                    "Nothing with {bedrooms} bedrooms{place}. Available bedroom counts: {counts}."
                )
            }
            Self::PriceAboveBudget { budget_max, cheapest, matching } => format!(
                "{matching} matching listings exist, but the cheapest is {} {currency}, \
                 above your {} {currency} budget. Raising your budget to {} {currency} \
                 would open them up.",
                format_money(*cheapest),
                format_money(*budget_max),
                format_money(*cheapest)
            ),
            Self::PriceBelowMinimum { budget_min, highest, matching } => format!(
                "{matching} matching listings exist, but the highest is {} {currency}, \
                 below your {} {currency} minimum. Lowering your minimum would include them.",
                format_money(*highest),
                format_money(*budget_min)
            ),
            Self::NoPriceInRange { cheapest, highest, matching } => format!(
                "{matching} matching listings range from {} to {} {currency}, \
                 but none fall inside your budget. Try widening the range.",
                format_money(*cheapest),
                format_money(*highest)
            ),
        }
    }
}

/// Narrows the catalog one criterion at a time and reports the first one
/// that empties it.
pub(crate) async fn diagnose(
    catalog: &dyn PropertyCatalog,
    requested: &PropertyFilter,
    areas: &AreaDirectory,
    timeout: Duration,
    ledger: &mut QueryLedger,
) -> Vec<MarketDiagnostic> {
    let mut scope =
        PropertyFilter { transaction_type: requested.transaction_type, ..PropertyFilter::default() };

    if let Some(rows) = aggregate(catalog, &scope, AggregateGroup::Location, timeout, ledger).await
    {
        if rows.iter().all(|row| row.count == 0) {
            return vec![MarketDiagnostic::NoInventory {
                transaction_type: requested.transaction_type,
            }];
        }
        if let Some(location) = requested.location.as_deref() {
            if !has_bucket(&rows, location) {
                return vec![MarketDiagnostic::LocationUnlisted {
                    location: location.to_owned(),
                    alternatives: alternative_areas(&rows, location, areas),
                }];
            }
        }
    }
    scope.location = requested.location.clone();

    if let Some(property_type) = requested.property_type {
        let rows = aggregate(catalog, &scope, AggregateGroup::PropertyType, timeout, ledger).await;
        if let Some(rows) = rows {
            if !has_bucket(&rows, property_type.as_str()) {
                return vec![MarketDiagnostic::PropertyTypeAbsent {
                    property_type,
                    location: requested.location.clone(),
                    available: stocked_buckets(&rows),
                }];
            }
        }
    }
    scope.property_type = requested.property_type;

    if let Some(bedrooms) = requested.bedrooms {
        let rows = aggregate(catalog, &scope, AggregateGroup::Bedrooms, timeout, ledger).await;
        if let Some(rows) = rows {
            if !has_bucket(&rows, &bedrooms.to_string()) {
                let mut available: Vec<u32> = stocked_buckets(&rows)
                    .iter()
                    .filter_map(|bucket| bucket.parse().ok())
                    .collect();
                available.sort_unstable();
                return vec![MarketDiagnostic::BedroomsAbsent {
                    bedrooms,
                    location: requested.location.clone(),
                    available,
                }];
            }
        }
    }
    scope.bedrooms = requested.bedrooms;

    if requested.price_min.is_none() && requested.price_max.is_none() {
        return Vec::new();
    }
    let Some(rows) = aggregate(catalog, &scope, AggregateGroup::All, timeout, ledger).await else {
        return Vec::new();
    };
    let Some(row) = rows.into_iter().find(|row| row.count > 0) else {
        return Vec::new();
    };
    price_diagnostics(requested, &row)
}

fn price_diagnostics(requested: &PropertyFilter, row: &PropertyAggregate) -> Vec<MarketDiagnostic> {
    let mut diagnostics = Vec::new();
    if let (Some(budget_max), Some(cheapest)) = (requested.price_max, row.min_price) {
        if cheapest > budget_max {
            diagnostics.push(MarketDiagnostic::PriceAboveBudget {
                budget_max,
                cheapest,
                matching: row.count,
            });
        }
    }
    if let (Some(budget_min), Some(highest)) = (requested.price_min, row.max_price) {
        if highest < budget_min {
            diagnostics.push(MarketDiagnostic::PriceBelowMinimum {
                budget_min,
                highest,
                matching: row.count,
            });
        }
    }
    if diagnostics.is_empty() {
        if let (Some(cheapest), Some(highest)) = (row.min_price, row.max_price) {
            diagnostics.push(MarketDiagnostic::NoPriceInRange { cheapest, highest, matching: row.count });
        }
    }
    diagnostics
}

async fn aggregate(
    catalog: &dyn PropertyCatalog,
    filter: &PropertyFilter,
    group: AggregateGroup,
    timeout: Duration,
    ledger: &mut QueryLedger,
) -> Option<Vec<PropertyAggregate>> {
    ledger.record_attempt();
    match tokio::time::timeout(timeout, catalog.query_aggregates(filter, group)).await {
        Ok(Ok(rows)) => Some(rows),
        Ok(Err(error)) => {
            warn!(
                event_name = "search.aggregate_failed",
                group = ?group,
                error = %error,
                "market aggregate query failed"
            );
            ledger.record_failure();
            None
        }
        Err(_) => {
            warn!(
                event_name = "search.aggregate_failed",
                group = ?group,
                timeout_ms = timeout.as_millis() as u64,
                "market aggregate query timed out"
            );
            ledger.record_failure();
            None
        }
    }
}

fn has_bucket(rows: &[PropertyAggregate], bucket: &str) -> bool {
    rows.iter().any(|row| row.count > 0 && row.bucket.eq_ignore_ascii_case(bucket))
}

fn stocked_buckets(rows: &[PropertyAggregate]) -> Vec<String> {
    let mut stocked: Vec<&PropertyAggregate> = rows.iter().filter(|row| row.count > 0).collect();
    stocked.sort_by(|left, right| right.count.cmp(&left.count).then(left.bucket.cmp(&right.bucket)));
    stocked.into_iter().map(|row| row.bucket.clone()).collect()
}

/// Stocked neighbours first, then the busiest areas overall.
fn alternative_areas(
    rows: &[PropertyAggregate],
    location: &str,
    areas: &AreaDirectory,
) -> Vec<String> {
    let mut alternatives: Vec<String> =
        areas.nearby(location).into_iter().filter(|area| has_bucket(rows, area)).collect();
    for bucket in stocked_buckets(rows) {
        if alternatives.len() >= MAX_ALTERNATIVE_AREAS {
            break;
        }
        if !alternatives.iter().any(|area| area.eq_ignore_ascii_case(&bucket)) {
            alternatives.push(bucket);
        }
    }
    alternatives.truncate(MAX_ALTERNATIVE_AREAS);
    alternatives
}
