use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::budget::format_money;
use crate::domain::requirements::PropertyType;

/// Budget ceiling escalation steps, as percentages of the original ceiling.
pub const BUDGET_STEPS_PCT: [u32; 4] = [115, 130, 150, 200];

pub fn expanded_ceiling(ceiling: u64, pct: u32) -> u64 {
    ceiling.saturating_mul(u64::from(pct)) / 100
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelaxedField {
    Budget,
    Location,
    PropertyType,
    Bedrooms,
}

impl RelaxedField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Budget => "budget",
            Self::Location => "location",
            Self::PropertyType => "property_type",
            Self::Bedrooms => "bedrooms",
        }
    }
}

/// One substitution applied to the user's criteria to produce results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Relaxation {
    BudgetExpanded { pct: u32, original_ceiling: u64, new_ceiling: u64 },
    LocationSubstituted { requested: String, substitute: String },
    PropertyTypeSubstituted { requested: PropertyType, substitute: PropertyType },
    BedroomsAdjusted { requested: u32, substitute: u32 },
}

impl Relaxation {
    pub fn field(&self) -> RelaxedField {
        match self {
            Self::BudgetExpanded { .. } => RelaxedField::Budget,
            Self::LocationSubstituted { .. } => RelaxedField::Location,
            Self::PropertyTypeSubstituted { .. } => RelaxedField::PropertyType,
            Self::BedroomsAdjusted { .. } => RelaxedField::Bedrooms,
        }
    }

    pub fn describe(&self, currency: &str) -> String {
        match self {
            Self::BudgetExpanded { pct, original_ceiling, new_ceiling } => format!(
                "stretched the budget by {}% from {} to {} {currency}",
                pct.saturating_sub(100),
                format_money(*original_ceiling),
                format_money(*new_ceiling)
            ),
            Self::LocationSubstituted { requested, substitute } => {
                format!("looked in {substitute}, close to {requested}")
            }
            Self::PropertyTypeSubstituted { requested, substitute } => {
                format!("included {} instead of {}", substitute.plural(), requested.plural())
            }
            Self::BedroomsAdjusted { requested, substitute } => {
                format!("showed {substitute}-bedroom homes instead of {requested}-bedroom")
            }
        }
    }
}

/// Canonical area names, their aliases, and the neighbouring areas tried, in
/// order, when a location yields nothing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaDirectory {
    canonical: BTreeMap<String, String>,
    aliases: BTreeMap<String, String>,
    nearby: BTreeMap<String, Vec<String>>,
}

impl AreaDirectory {
    pub fn new() -> Self {
        Self { canonical: BTreeMap::new(), aliases: BTreeMap::new(), nearby: BTreeMap::new() }
    }

    pub fn with_alias(mut self, alias: &str, area: &str) -> Self {
        self.aliases.insert(alias.to_ascii_lowercase(), area.to_owned());
        self
    }

    /// Canonical spelling of a known area or alias.
    pub fn canonicalize(&self, name: &str) -> Option<String> {
        let key = name.trim().to_ascii_lowercase();
        self.canonical.get(&key).or_else(|| self.aliases.get(&key)).cloned()
    }

    /// Finds the longest area name or alias mentioned in `text`. The flag is
    /// `true` when the match came through an alias.
    pub fn find_in_text(&self, text: &str) -> Option<(String, bool)> {
        let haystack = format!(" {} ", normalize_words(text));
        let canonical = self.canonical.iter().map(|(key, area)| (key, area, false));
        let aliases = self.aliases.iter().map(|(key, area)| (key, area, true));

        canonical
            .chain(aliases)
            .filter(|(key, _, _)| haystack.contains(&format!(" {} ", normalize_words(key))))
            .max_by_key(|(key, _, is_alias)| (key.len(), !*is_alias))
            .map(|(_, area, is_alias)| (area.clone(), is_alias))
    }

    pub fn areas(&self) -> impl Iterator<Item = &str> {
        self.canonical.values().map(String::as_str)
    }

    pub fn with_area<I, S>(mut self, area: &str, neighbours: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let neighbours: Vec<String> = neighbours.into_iter().map(Into::into).collect();
        for name in std::iter::once(area).chain(neighbours.iter().map(String::as_str)) {
            self.canonical.entry(name.to_ascii_lowercase()).or_insert_with(|| name.to_owned());
        }
        self.nearby.insert(area.to_ascii_lowercase(), neighbours);
        self
    }

    /// Ordered alternatives for `area`, never including `area` itself.
    pub fn nearby(&self, area: &str) -> Vec<String> {
        self.nearby
            .get(&area.trim().to_ascii_lowercase())
            .map(|neighbours| {
                neighbours
                    .iter()
                    .filter(|candidate| !candidate.eq_ignore_ascii_case(area.trim()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn knows(&self, area: &str) -> bool {
        self.canonicalize(area).is_some()
    }

    pub fn dubai() -> Self {
        Self::new()
            .with_area("Dubai Marina", ["JBR", "Emaar Beachfront", "Al Sufouh", "Palm Jumeirah"])
            .with_area("JBR", ["Dubai Marina", "Emaar Beachfront", "Al Sufouh"])
            .with_area("Emaar Beachfront", ["Dubai Marina", "JBR", "Palm Jumeirah"])
            .with_area("Palm Jumeirah", ["Dubai Marina", "JBR", "Al Sufouh"])
            .with_area("Al Sufouh", ["Dubai Marina", "Palm Jumeirah", "Al Barsha"])
            .with_area("Downtown Dubai", ["Business Bay", "DIFC", "City Walk"])
            .with_area("Business Bay", ["Downtown Dubai", "DIFC", "City Walk"])
            .with_area("DIFC", ["Downtown Dubai", "Business Bay"])
            .with_area("City Walk", ["Downtown Dubai", "Business Bay", "Al Safa"])
            .with_area("JVC", ["Sports City", "Motor City", "Al Barsha"])
            .with_area("Sports City", ["JVC", "Motor City"])
            .with_area("Motor City", ["Sports City", "JVC", "Arabian Ranches"])
            .with_area("Al Barsha", ["JVC", "Al Sufouh", "Dubai Hills Estate"])
            .with_area("Dubai Hills Estate", ["Al Barsha", "Arabian Ranches", "Motor City"])
            .with_area("Arabian Ranches", ["Motor City", "Dubai Hills Estate"])
            .with_area("Al Safa", ["City Walk", "Jumeirah"])
            .with_area("Jumeirah", ["Al Safa", "City Walk"])
            .with_alias("marina", "Dubai Marina")
            .with_alias("jumeirah beach residence", "JBR")
            .with_alias("the palm", "Palm Jumeirah")
            .with_alias("palm", "Palm Jumeirah")
            .with_alias("downtown", "Downtown Dubai")
            .with_alias("dubai downtown", "Downtown Dubai")
            .with_alias("jumeirah village circle", "JVC")
            .with_alias("dubai sports city", "Sports City")
            .with_alias("dubai hills", "Dubai Hills Estate")
            .with_alias("barsha", "Al Barsha")
            .with_alias("citywalk", "City Walk")
            .with_alias("beachfront", "Emaar Beachfront")
            .with_alias("ranches", "Arabian Ranches")
    }
}

impl Default for AreaDirectory {
    fn default() -> Self {
        Self::dubai()
    }
}

fn normalize_words(text: &str) -> String {
    text.to_ascii_lowercase()
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Property types considered acceptable stand-ins for one another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeAffinity {
    alternatives: BTreeMap<PropertyType, Vec<PropertyType>>,
}

impl TypeAffinity {
    pub fn new() -> Self {
        Self { alternatives: BTreeMap::new() }
    }

    pub fn with_alternatives(
        mut self,
        property_type: PropertyType,
        alternatives: impl IntoIterator<Item = PropertyType>,
    ) -> Self {
        self.alternatives.insert(property_type, alternatives.into_iter().collect());
        self
    }

    pub fn alternatives(&self, property_type: PropertyType) -> Vec<PropertyType> {
        self.alternatives
            .get(&property_type)
            .map(|alternatives| {
                alternatives.iter().copied().filter(|alt| *alt != property_type).collect()
            })
            .unwrap_or_default()
    }

    pub fn standard() -> Self {
        use PropertyType::{Apartment, Duplex, Penthouse, Studio, Townhouse, Villa};

        Self::new()
            .with_alternatives(Apartment, [Penthouse, Studio])
            .with_alternatives(Penthouse, [Apartment])
            .with_alternatives(Studio, [Apartment])
            .with_alternatives(Villa, [Townhouse])
            .with_alternatives(Townhouse, [Villa])
            .with_alternatives(Duplex, [Townhouse, Apartment])
    }
}

impl Default for TypeAffinity {
    fn default() -> Self {
        Self::standard()
    }
}
