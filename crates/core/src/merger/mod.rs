//! Folds one turn's extraction into the session's cumulative requirements and
//! classifies what the turn was trying to do.

pub mod phrases;

use serde::{Deserialize, Serialize};

use crate::domain::property::PropertyId;
use crate::domain::requirements::{
    PartialRequirementSet, RequirementField, RequirementKey, RequirementSet,
    DEFAULT_CONFIDENCE_THRESHOLD,
};
use crate::pagination::Pagination;
use crate::search::MarketStatistic;

pub use phrases::{is_pagination_request, parse_market_question, parse_property_reference};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum TurnIntent {
    Refinement,
    FreshSearchFieldConflict,
    PaginationRequest,
    /// `property` is `None` when the ordinal is outside the shown batch.
    PropertyReference { ordinal: usize, property: Option<PropertyId> },
    /// A question about the market; stored criteria are left alone.
    MarketQuestion { statistic: MarketStatistic },
    Generic,
}

impl TurnIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refinement => "refinement",
            Self::FreshSearchFieldConflict => "fresh_search_field_conflict",
            Self::PaginationRequest => "pagination_request",
            Self::PropertyReference { .. } => "property_reference",
            Self::MarketQuestion { .. } => "market_question",
            Self::Generic => "generic",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MergeOutcome {
    pub requirements: RequirementSet,
    pub intent: TurnIntent,
    /// Confident values that replaced a different stored value.
    pub overwritten: Vec<RequirementKey>,
    /// Previously unset fields.
    pub filled: Vec<RequirementKey>,
    /// Stored fields replaced by a higher-confidence reading.
    pub refined: Vec<RequirementKey>,
}

impl MergeOutcome {
    fn unchanged(current: &RequirementSet, intent: TurnIntent) -> Self {
        Self {
            requirements: current.clone(),
            intent,
            overwritten: Vec::new(),
            filled: Vec::new(),
            refined: Vec::new(),
        }
    }

    pub fn changed(&self) -> bool {
        !(self.overwritten.is_empty() && self.filled.is_empty() && self.refined.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RequirementMerger {
    threshold: f64,
}

impl Default for RequirementMerger {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

#[derive(Default)]
struct MergeLog {
    overwritten: Vec<RequirementKey>,
    filled: Vec<RequirementKey>,
    refined: Vec<RequirementKey>,
}

impl MergeLog {
    fn touched(&self, key: RequirementKey) -> bool {
        self.overwritten.contains(&key) || self.filled.contains(&key) || self.refined.contains(&key)
    }
}

fn same_value<T: PartialEq>(left: &T, right: &T) -> bool {
    left == right
}

impl RequirementMerger {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Rules apply in order: property reference (only while a batch is
    /// shown), pagination phrase, confident field conflict, refinement.
    pub fn merge(
        &self,
        current: &RequirementSet,
        extracted: &PartialRequirementSet,
        turn_text: &str,
        pagination: &Pagination,
    ) -> MergeOutcome {
        if !pagination.current_batch().is_empty() {
            if let Some(ordinal) = parse_property_reference(turn_text) {
                let property =
                    pagination.resolve_ordinal(ordinal).map(|property| property.id.clone());
                return MergeOutcome::unchanged(
                    current,
                    TurnIntent::PropertyReference { ordinal, property },
                );
            }
        }
        if is_pagination_request(turn_text) {
            return MergeOutcome::unchanged(current, TurnIntent::PaginationRequest);
        }
        if let Some(statistic) = parse_market_question(turn_text) {
            return MergeOutcome::unchanged(current, TurnIntent::MarketQuestion { statistic });
        }

        let mut merged = current.clone();
        let mut log = MergeLog::default();

        self.reconcile(
            &mut merged.transaction_type,
            &extracted.transaction_type,
            RequirementKey::TransactionType,
            same_value,
            &mut log,
        );
        self.reconcile(
            &mut merged.location,
            &extracted.location,
            RequirementKey::Location,
            |left: &String, right: &String| left.eq_ignore_ascii_case(right),
            &mut log,
        );
        self.reconcile(
            &mut merged.budget_min,
            &extracted.budget_min,
            RequirementKey::BudgetMin,
            same_value,
            &mut log,
        );
        self.reconcile(
            &mut merged.budget_max,
            &extracted.budget_max,
            RequirementKey::BudgetMax,
            same_value,
            &mut log,
        );
        self.reconcile(
            &mut merged.property_type,
            &extracted.property_type,
            RequirementKey::PropertyType,
            same_value,
            &mut log,
        );
        self.reconcile(
            &mut merged.bedrooms,
            &extracted.bedrooms,
            RequirementKey::Bedrooms,
            same_value,
            &mut log,
        );

        if let (Some(min), Some(max)) = (merged.budget_min(), merged.budget_max()) {
            if min > max {
                let floor_is_newer = log.touched(RequirementKey::BudgetMin)
                    && !log.touched(RequirementKey::BudgetMax);
                let (dropped_key, dropped) = if floor_is_newer {
                    (RequirementKey::BudgetMax, merged.budget_max.take())
                } else {
                    (RequirementKey::BudgetMin, merged.budget_min.take())
                };
                // Losing a confident stored bound counts as a conflict, never a silent drop.
                let was_stored = !log.touched(dropped_key);
                if was_stored && dropped.is_some_and(|field| field.meets(self.threshold)) {
                    log.overwritten.push(dropped_key);
                }
            }
        }

        let intent = if !log.overwritten.is_empty() {
            TurnIntent::FreshSearchFieldConflict
        } else if extracted.is_empty() {
            TurnIntent::Generic
        } else {
            TurnIntent::Refinement
        };

        MergeOutcome {
            requirements: merged,
            intent,
            overwritten: log.overwritten,
            filled: log.filled,
            refined: log.refined,
        }
    }

    fn reconcile<T, F>(
        &self,
        stored: &mut Option<RequirementField<T>>,
        incoming: &Option<RequirementField<T>>,
        key: RequirementKey,
        same: F,
        log: &mut MergeLog,
    ) where
        T: Clone,
        F: Fn(&T, &T) -> bool,
    {
        let Some(incoming) = incoming else {
            return;
        };
        match stored {
            None => {
                *stored = Some(incoming.clone());
                log.filled.push(key);
            }
            Some(existing) if !same(&existing.value, &incoming.value) && incoming.meets(self.threshold) => {
                *existing = incoming.clone();
                log.overwritten.push(key);
            }
            Some(existing) if incoming.confidence > existing.confidence => {
                *existing = incoming.clone();
                log.refined.push(key);
            }
            Some(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RequirementMerger, TurnIntent};
    use crate::domain::property::{Property, PropertyId};
    use crate::domain::requirements::{
        PropertyType, RequirementField, RequirementKey, RequirementSet, TransactionType,
    };
    use crate::pagination::Pagination;
    use crate::search::MarketStatistic;

    fn stored() -> RequirementSet {
        RequirementSet {
            transaction_type: Some(RequirementField::new(TransactionType::Rent, 0.9)),
            location: Some(RequirementField::new("Dubai Marina".to_owned(), 0.9)),
            budget_min: None,
            budget_max: Some(RequirementField::new(100_000, 0.9)),
            property_type: Some(RequirementField::new(PropertyType::Apartment, 0.9)),
            bedrooms: None,
        }
    }

    fn nothing_shown() -> Pagination {
        Pagination::default()
    }

    /// Pagination with the first batch of `count` listings already released.
    fn shown(count: usize) -> Pagination {
        let mut pagination = Pagination::default();
        pagination.store(batch(count));
        pagination.next_batch();
        pagination
    }

    fn batch(count: usize) -> Vec<Property> {
        (1..=count)
            .map(|index| Property {
                id: PropertyId(format!("P-{index}")),
                transaction_type: TransactionType::Rent,
                location: "Dubai Marina".to_owned(),
                property_type: PropertyType::Apartment,
                bedrooms: 1,
                price: 90_000,
                building_name: None,
                size_sqft: None,
            })
            .collect()
    }

    #[test]
    fn empty_extraction_keeps_every_confident_field() {
        let merger = RequirementMerger::default();
        let outcome =
            merger.merge(&stored(), &RequirementSet::default(), "hmm let me think", &nothing_shown());

        assert_eq!(outcome.requirements, stored());
        assert_eq!(outcome.intent, TurnIntent::Generic);
        assert!(!outcome.changed());
    }

    #[test]
    fn new_bedrooms_refine_without_touching_other_fields() {
        let merger = RequirementMerger::default();
        let extracted = RequirementSet {
            bedrooms: Some(RequirementField::new(2, 0.9)),
            ..RequirementSet::default()
        };
        let outcome = merger.merge(&stored(), &extracted, "2 bedrooms", &nothing_shown());

        assert_eq!(outcome.intent, TurnIntent::Refinement);
        assert_eq!(outcome.filled, vec![RequirementKey::Bedrooms]);
        assert_eq!(outcome.requirements.location(), Some("Dubai Marina"));
        assert_eq!(outcome.requirements.budget_max(), Some(100_000));
    }

    #[test]
    fn confident_location_change_is_a_fresh_search() {
        let merger = RequirementMerger::default();
        let extracted = RequirementSet {
            location: Some(RequirementField::new("JBR".to_owned(), 0.9)),
            ..RequirementSet::default()
        };
        let outcome = merger.merge(&stored(), &extracted, "actually JBR instead", &shown(3));

        assert_eq!(outcome.intent, TurnIntent::FreshSearchFieldConflict);
        assert_eq!(outcome.overwritten, vec![RequirementKey::Location]);
        assert_eq!(outcome.requirements.location(), Some("JBR"));
        assert_eq!(outcome.requirements.property_type(), Some(PropertyType::Apartment));
        assert_eq!(outcome.requirements.budget_max(), Some(100_000));
    }

    #[test]
    fn low_confidence_disagreement_does_not_overwrite_confident_value() {
        let merger = RequirementMerger::default();
        let extracted = RequirementSet {
            location: Some(RequirementField::new("JVC".to_owned(), 0.4)),
            ..RequirementSet::default()
        };
        let outcome = merger.merge(&stored(), &extracted, "maybe jvc?", &nothing_shown());

        assert_eq!(outcome.intent, TurnIntent::Refinement);
        assert_eq!(outcome.requirements.location(), Some("Dubai Marina"));
        assert!(!outcome.changed());
    }

    #[test]
    fn location_case_difference_is_not_a_conflict() {
        let merger = RequirementMerger::default();
        let extracted = RequirementSet {
            location: Some(RequirementField::new("dubai marina".to_owned(), 0.9)),
            ..RequirementSet::default()
        };
        let outcome = merger.merge(&stored(), &extracted, "in dubai marina", &nothing_shown());
        assert_ne!(outcome.intent, TurnIntent::FreshSearchFieldConflict);
    }

    #[test]
    fn ordinal_resolves_against_the_shown_batch() {
        let merger = RequirementMerger::default();
        let outcome =
            merger.merge(&stored(), &RequirementSet::default(), "tell me about the second one", &shown(10));

        assert_eq!(
            outcome.intent,
            TurnIntent::PropertyReference { ordinal: 2, property: Some(PropertyId("P-2".to_owned())) }
        );
    }

    #[test]
    fn ordinal_beyond_batch_is_unresolved() {
        let merger = RequirementMerger::default();
        let outcome =
            merger.merge(&stored(), &RequirementSet::default(), "property 7", &shown(3));

        assert_eq!(outcome.intent, TurnIntent::PropertyReference { ordinal: 7, property: None });
    }

    #[test]
    fn references_are_ignored_without_a_shown_batch() {
        let merger = RequirementMerger::default();
        let outcome = merger.merge(&stored(), &RequirementSet::default(), "property 2", &nothing_shown());
        assert!(!matches!(outcome.intent, TurnIntent::PropertyReference { .. }));
    }

    #[test]
    fn pagination_phrase_wins_over_extraction() {
        let merger = RequirementMerger::default();
        let extracted = RequirementSet {
            location: Some(RequirementField::new("JBR".to_owned(), 0.9)),
            ..RequirementSet::default()
        };
        let outcome = merger.merge(&stored(), &extracted, "show more", &shown(10));

        assert_eq!(outcome.intent, TurnIntent::PaginationRequest);
        assert_eq!(outcome.requirements, stored());
    }

    #[test]
    fn market_question_leaves_stored_criteria_alone() {
        let merger = RequirementMerger::default();
        let extracted = RequirementSet {
            location: Some(RequirementField::new("JVC".to_owned(), 0.9)),
            ..RequirementSet::default()
        };
        let outcome =
            merger.merge(&stored(), &extracted, "what's the average price in JVC?", &shown(3));

        assert_eq!(
            outcome.intent,
            TurnIntent::MarketQuestion { statistic: MarketStatistic::AveragePrice }
        );
        assert_eq!(outcome.requirements, stored());
        assert!(!outcome.changed());
    }

    #[test]
    fn lower_ceiling_below_stored_floor_drops_the_floor() {
        let merger = RequirementMerger::default();
        let mut current = stored();
        current.budget_min = Some(RequirementField::new(80_000, 0.9));
        let extracted = RequirementSet {
            budget_max: Some(RequirementField::new(60_000, 0.9)),
            ..RequirementSet::default()
        };
        let outcome = merger.merge(&current, &extracted, "up to 60k", &nothing_shown());

        assert_eq!(outcome.requirements.budget_min(), None);
        assert_eq!(outcome.requirements.budget_max(), Some(60_000));
    }

    #[test]
    fn ceiling_below_stored_floor_is_a_fresh_search() {
        let merger = RequirementMerger::default();
        let mut current = stored();
        current.budget_max = None;
        current.budget_min = Some(RequirementField::new(80_000, 0.9));
        let extracted = RequirementSet {
            budget_max: Some(RequirementField::new(60_000, 0.9)),
            ..RequirementSet::default()
        };
        let outcome = merger.merge(&current, &extracted, "up to 60k", &nothing_shown());

        assert_eq!(outcome.intent, TurnIntent::FreshSearchFieldConflict);
        assert_eq!(outcome.overwritten, vec![RequirementKey::BudgetMin]);
        assert_eq!(outcome.filled, vec![RequirementKey::BudgetMax]);
        assert_eq!(outcome.requirements.budget_min(), None);
        assert_eq!(outcome.requirements.budget_max(), Some(60_000));
    }

    #[test]
    fn inverted_range_within_one_turn_is_not_a_conflict() {
        let merger = RequirementMerger::default();
        let mut current = stored();
        current.budget_max = None;
        let extracted = RequirementSet {
            budget_min: Some(RequirementField::new(120_000, 0.9)),
            budget_max: Some(RequirementField::new(90_000, 0.9)),
            ..RequirementSet::default()
        };
        let outcome = merger.merge(&current, &extracted, "120k to 90k", &nothing_shown());

        assert_eq!(outcome.intent, TurnIntent::Refinement);
        assert!(outcome.overwritten.is_empty());
        assert_eq!(outcome.requirements.budget_max(), Some(90_000));
    }

    #[test]
    fn higher_confidence_reading_refines_stored_value() {
        let merger = RequirementMerger::default();
        let mut current = stored();
        current.location = Some(RequirementField::new("Dubai Marina".to_owned(), 0.5));
        let extracted = RequirementSet {
            location: Some(RequirementField::new("Dubai Marina".to_owned(), 0.9)),
            ..RequirementSet::default()
        };
        let outcome = merger.merge(&current, &extracted, "yes, Dubai Marina", &nothing_shown());

        assert_eq!(outcome.refined, vec![RequirementKey::Location]);
        assert!(outcome.requirements.is_ready(merger.threshold()));
    }
}
