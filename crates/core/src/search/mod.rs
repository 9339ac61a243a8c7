//! Tiered search resolution.
//!
//! A search never comes back empty-handed: it returns exact matches, matches
//! for relaxed criteria, or market diagnostics explaining why nothing fits.

pub mod engine;
pub mod market;
pub mod relaxation;
pub mod stats;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::property::Property;

pub use engine::{SearchResolutionEngine, SearchSettings};
pub use market::MarketDiagnostic;
pub use relaxation::{AreaDirectory, RelaxedField, Relaxation, TypeAffinity, BUDGET_STEPS_PCT};
pub use stats::{MarketAnswer, MarketQuestion, MarketStatistic, MarketStatistics};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchTier {
    Exact,
    SingleRelax,
    MultiRelax,
    MarketIntel,
}

impl SearchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::SingleRelax => "single_relax",
            Self::MultiRelax => "multi_relax",
            Self::MarketIntel => "market_intel",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub tier: SearchTier,
    pub properties: Vec<Property>,
    pub suggestions: Vec<String>,
    pub relaxed_fields: BTreeSet<RelaxedField>,
    pub relaxations: Vec<Relaxation>,
    pub diagnostics: Vec<MarketDiagnostic>,
}

impl SearchResult {
    pub fn exact(properties: Vec<Property>) -> Self {
        Self {
            tier: SearchTier::Exact,
            properties,
            suggestions: Vec::new(),
            relaxed_fields: BTreeSet::new(),
            relaxations: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn has_properties(&self) -> bool {
        !self.properties.is_empty()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("property catalog unavailable: all {attempts} queries failed")]
    Unavailable { attempts: usize },
}
