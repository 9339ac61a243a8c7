use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::budget::format_money;
use crate::domain::requirements::{PropertyType, RequirementSet, TransactionType};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyId(pub String);

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub transaction_type: TransactionType,
    pub location: String,
    pub property_type: PropertyType,
    pub bedrooms: u32,
    pub price: u64,
    pub building_name: Option<String>,
    pub size_sqft: Option<u32>,
}

impl Property {
    /// One-line listing label, e.g. `2BR apartment in Dubai Marina · 95,000 AED/yr`.
    pub fn headline(&self, currency: &str) -> String {
        let layout = if self.bedrooms == 0 {
            "Studio".to_owned()
        } else {
            format!("{}BR", self.bedrooms)
        };
        let period = match self.transaction_type {
            TransactionType::Rent => "/yr",
            TransactionType::Buy => "",
        };
        let building = self
            .building_name
            .as_deref()
            .map(|name| format!("{name}, "))
            .unwrap_or_default();
        format!(
            "{layout} {} in {building}{} · {} {currency}{period}",
            self.property_type,
            self.location,
            format_money(self.price)
        )
    }
}

/// Criteria handed to the catalog. Every `None` is unconstrained.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFilter {
    pub transaction_type: Option<TransactionType>,
    pub location: Option<String>,
    pub property_type: Option<PropertyType>,
    pub bedrooms: Option<u32>,
    pub price_min: Option<u64>,
    pub price_max: Option<u64>,
    pub limit: Option<usize>,
}

impl PropertyFilter {
    pub fn from_requirements(requirements: &RequirementSet) -> Self {
        Self {
            transaction_type: requirements.transaction_type(),
            location: requirements.location().map(str::to_owned),
            property_type: requirements.property_type(),
            bedrooms: requirements.bedrooms(),
            price_min: requirements.budget_min(),
            price_max: requirements.budget_max(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, property: &Property) -> bool {
        self.transaction_type.map_or(true, |value| value == property.transaction_type)
            && self
                .location
                .as_deref()
                .map_or(true, |value| value.eq_ignore_ascii_case(&property.location))
            && self.property_type.map_or(true, |value| value == property.property_type)
            && self.bedrooms.map_or(true, |value| value == property.bedrooms)
            && self.price_min.map_or(true, |value| property.price >= value)
            && self.price_max.map_or(true, |value| property.price <= value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateGroup {
    All,
    Location,
    PropertyType,
    Bedrooms,
}

/// One bucket of a catalog aggregate query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyAggregate {
    pub bucket: String,
    pub count: u64,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
}
