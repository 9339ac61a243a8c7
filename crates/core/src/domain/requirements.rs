use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::budget::{format_compact, BudgetRange};
use crate::errors::DomainError;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Buy,
    Rent,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Rent => "rent",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "buy" | "purchase" | "sale" | "sell" | "own" => Ok(Self::Buy),
            "rent" | "rental" | "lease" | "let" => Ok(Self::Rent),
            other => Err(DomainError::InvalidValue {
                field: "transaction_type",
                value: other.to_owned(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Apartment,
    Penthouse,
    Studio,
    Villa,
    Townhouse,
    Duplex,
}

impl PropertyType {
    pub const ALL: [PropertyType; 6] = [
        Self::Apartment,
        Self::Penthouse,
        Self::Studio,
        Self::Villa,
        Self::Townhouse,
        Self::Duplex,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apartment => "apartment",
            Self::Penthouse => "penthouse",
            Self::Studio => "studio",
            Self::Villa => "villa",
            Self::Townhouse => "townhouse",
            Self::Duplex => "duplex",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            Self::Apartment => "apartments",
            Self::Penthouse => "penthouses",
            Self::Studio => "studios",
            Self::Villa => "villas",
            Self::Townhouse => "townhouses",
            Self::Duplex => "duplexes",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        let singular = normalized.strip_suffix("es").filter(|stem| stem.ends_with('x'));
        let singular = singular.or_else(|| normalized.strip_suffix('s')).unwrap_or(&normalized);

        match singular {
            "apartment" | "flat" | "apt" => Ok(Self::Apartment),
            "penthouse" => Ok(Self::Penthouse),
            "studio" => Ok(Self::Studio),
            "villa" => Ok(Self::Villa),
            "townhouse" | "town house" => Ok(Self::Townhouse),
            "duplex" => Ok(Self::Duplex),
            _ => Err(DomainError::InvalidValue { field: "property_type", value: normalized }),
        }
    }
}

/// A value plus the extractor's confidence in it. Confidence is clamped to `[0, 1]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequirementField<T> {
    pub value: T,
    pub confidence: f64,
}

impl<T> RequirementField<T> {
    pub fn new(value: T, confidence: f64) -> Self {
        let confidence = if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 };
        Self { value, confidence }
    }

    pub fn meets(&self, threshold: f64) -> bool {
        self.confidence >= threshold
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKey {
    TransactionType,
    Location,
    BudgetMin,
    BudgetMax,
    PropertyType,
    Bedrooms,
}

impl RequirementKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransactionType => "transaction_type",
            Self::Location => "location",
            Self::BudgetMin => "budget_min",
            Self::BudgetMax => "budget_max",
            Self::PropertyType => "property_type",
            Self::Bedrooms => "bedrooms",
        }
    }
}

/// The four inputs the completeness predicate looks at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredField {
    TransactionType,
    Location,
    Budget,
    PropertyType,
}

impl RequiredField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransactionType => "transaction_type",
            Self::Location => "location",
            Self::Budget => "budget",
            Self::PropertyType => "property_type",
        }
    }
}

/// Cumulative search criteria for one conversation.
///
/// Unset fields are `None`; there is no textual sentinel for "unknown".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementSet {
    pub transaction_type: Option<RequirementField<TransactionType>>,
    pub location: Option<RequirementField<String>>,
    pub budget_min: Option<RequirementField<u64>>,
    pub budget_max: Option<RequirementField<u64>>,
    pub property_type: Option<RequirementField<PropertyType>>,
    pub bedrooms: Option<RequirementField<u32>>,
}

/// What an extractor returns for a single turn: any subset of the fields.
pub type PartialRequirementSet = RequirementSet;

const LOCATION_SENTINELS: &[&str] =
    &["null", "none", "nil", "unknown", "n/a", "na", "undefined", "any", "-"];

impl RequirementSet {
    pub fn is_empty(&self) -> bool {
        self.transaction_type.is_none()
            && self.location.is_none()
            && self.budget_min.is_none()
            && self.budget_max.is_none()
            && self.property_type.is_none()
            && self.bedrooms.is_none()
    }

    pub fn is_ready(&self, threshold: f64) -> bool {
        self.missing_fields(threshold).is_empty()
    }

    pub fn missing_fields(&self, threshold: f64) -> Vec<RequiredField> {
        let mut missing = Vec::new();
        if !self.transaction_type.as_ref().is_some_and(|field| field.meets(threshold)) {
            missing.push(RequiredField::TransactionType);
        }
        if !self.location.as_ref().is_some_and(|field| field.meets(threshold)) {
            missing.push(RequiredField::Location);
        }
        let has_budget = self.budget_min.as_ref().is_some_and(|field| field.meets(threshold))
            || self.budget_max.as_ref().is_some_and(|field| field.meets(threshold));
        if !has_budget {
            missing.push(RequiredField::Budget);
        }
        if !self.property_type.as_ref().is_some_and(|field| field.meets(threshold)) {
            missing.push(RequiredField::PropertyType);
        }
        missing
    }

    pub fn set_budget(&mut self, range: BudgetRange, confidence: f64) {
        if let Some(min) = range.min {
            self.budget_min = Some(RequirementField::new(min, confidence));
        }
        if let Some(max) = range.max {
            self.budget_max = Some(RequirementField::new(max, confidence));
        }
    }

    pub fn transaction_type(&self) -> Option<TransactionType> {
        self.transaction_type.as_ref().map(|field| field.value)
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_ref().map(|field| field.value.as_str())
    }

    pub fn budget_min(&self) -> Option<u64> {
        self.budget_min.as_ref().map(|field| field.value)
    }

    pub fn budget_max(&self) -> Option<u64> {
        self.budget_max.as_ref().map(|field| field.value)
    }

    pub fn property_type(&self) -> Option<PropertyType> {
        self.property_type.as_ref().map(|field| field.value)
    }

    pub fn bedrooms(&self) -> Option<u32> {
        self.bedrooms.as_ref().map(|field| field.value)
    }

    /// Boundary normalisation for extractor output: blank or sentinel locations
    /// become absent, confidences are re-clamped and an inverted budget keeps
    /// only its ceiling.
    pub fn sanitized(mut self) -> Self {
        self.location = self.location.take().and_then(|field| {
            let trimmed = field.value.trim();
            let lowered = trimmed.to_ascii_lowercase();
            if trimmed.is_empty() || LOCATION_SENTINELS.contains(&lowered.as_str()) {
                None
            } else {
                Some(RequirementField::new(trimmed.to_owned(), field.confidence))
            }
        });
        self.transaction_type =
            self.transaction_type.take().map(|f| RequirementField::new(f.value, f.confidence));
        self.budget_min = self
            .budget_min
            .take()
            .filter(|f| f.value > 0)
            .map(|f| RequirementField::new(f.value, f.confidence));
        self.budget_max = self
            .budget_max
            .take()
            .filter(|f| f.value > 0)
            .map(|f| RequirementField::new(f.value, f.confidence));
        self.property_type =
            self.property_type.take().map(|f| RequirementField::new(f.value, f.confidence));
        self.bedrooms = self.bedrooms.take().map(|f| RequirementField::new(f.value, f.confidence));

        if let (Some(min), Some(max)) = (self.budget_min(), self.budget_max()) {
            if min > max {
                self.budget_min = None;
            }
        }
        self
    }

    /// Short human summary, e.g. `rent · Dubai Marina · 80k-100k · apartment · 2 bedrooms`.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(transaction_type) = self.transaction_type() {
            parts.push(transaction_type.as_str().to_owned());
        }
        if let Some(location) = self.location() {
            parts.push(location.to_owned());
        }
        match (self.budget_min(), self.budget_max()) {
            (Some(min), Some(max)) => {
                parts.push(format!("{}-{}", format_compact(min), format_compact(max)))
            }
            (None, Some(max)) => parts.push(format!("up to {}", format_compact(max))),
            (Some(min), None) => parts.push(format!("from {}", format_compact(min))),
            (None, None) => {}
        }
        if let Some(property_type) = self.property_type() {
            parts.push(property_type.as_str().to_owned());
        }
        if let Some(bedrooms) = self.bedrooms() {
            parts.push(match bedrooms {
                0 => "studio layout".to_owned(),
                1 => "1 bedroom".to_owned(),
                n => format!("{n} bedrooms"),
            });
        }
        parts.join(" · ")
    }
}
