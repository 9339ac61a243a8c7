use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::domain::property::{Property, PropertyFilter};
use crate::domain::requirements::RequirementSet;
use crate::ports::PropertyCatalog;
use crate::search::market::{self, MarketDiagnostic};
use crate::search::relaxation::{
    expanded_ceiling, AreaDirectory, Relaxation, TypeAffinity, BUDGET_STEPS_PCT,
};
use crate::search::{SearchError, SearchResult, SearchTier};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchSettings {
    pub max_results: usize,
    pub query_timeout: Duration,
    pub parallel_relaxation: bool,
    pub currency: String,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_results: 100,
            query_timeout: Duration::from_millis(3_000),
            parallel_relaxation: true,
            currency: "AED".to_owned(),
        }
    }
}

/// Counts issued and failed catalog queries for one resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct QueryLedger {
    attempts: usize,
    failures: usize,
}

impl QueryLedger {
    pub(crate) fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    pub(crate) fn record_failure(&mut self) {
        self.failures += 1;
    }

    fn all_failed(&self) -> bool {
        self.attempts > 0 && self.failures == self.attempts
    }
}

#[derive(Clone, Debug)]
enum QueryOutcome {
    Found(Vec<Property>),
    Empty,
    Failed,
}

#[derive(Clone, Debug)]
struct Candidate {
    filter: PropertyFilter,
    relaxations: Vec<Relaxation>,
}

pub struct SearchResolutionEngine {
    catalog: Arc<dyn PropertyCatalog>,
    areas: AreaDirectory,
    affinity: TypeAffinity,
    settings: SearchSettings,
}

impl SearchResolutionEngine {
    pub fn new(catalog: Arc<dyn PropertyCatalog>) -> Self {
        Self {
            catalog,
            areas: AreaDirectory::default(),
            affinity: TypeAffinity::default(),
            settings: SearchSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: SearchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub async fn resolve(&self, requirements: &RequirementSet) -> Result<SearchResult, SearchError> {
        let base = PropertyFilter::from_requirements(requirements).with_limit(self.settings.max_results);
        let mut ledger = QueryLedger::default();

        ledger.record_attempt();
        match run_query(Arc::clone(&self.catalog), base.clone(), self.settings.query_timeout).await {
            QueryOutcome::Found(properties) => {
                info!(
                    event_name = "search.tier_resolved",
                    tier = SearchTier::Exact.as_str(),
                    result_count = properties.len(),
                    "exact search matched"
                );
                return Ok(SearchResult::exact(properties));
            }
            QueryOutcome::Empty => {}
            QueryOutcome::Failed => ledger.record_failure(),
        }
        debug!(event_name = "search.tier_failed", tier = SearchTier::Exact.as_str());

        let single = self.single_relaxations(&base);
        if let Some((candidate, properties)) = self.first_success(single, &mut ledger).await {
            return Ok(self.relaxed_result(SearchTier::SingleRelax, candidate, properties));
        }
        debug!(event_name = "search.tier_failed", tier = SearchTier::SingleRelax.as_str());

        let multi = self.multi_relaxations(&base);
        if let Some((candidate, properties)) = self.first_success(multi, &mut ledger).await {
            return Ok(self.relaxed_result(SearchTier::MultiRelax, candidate, properties));
        }
        debug!(event_name = "search.tier_failed", tier = SearchTier::MultiRelax.as_str());

        let diagnostics = market::diagnose(
            self.catalog.as_ref(),
            &base,
            &self.areas,
            self.settings.query_timeout,
            &mut ledger,
        )
        .await;

        if ledger.all_failed() {
            warn!(
                event_name = "search.unavailable",
                attempts = ledger.attempts,
                "every catalog query failed"
            );
            return Err(SearchError::Unavailable { attempts: ledger.attempts });
        }

        info!(
            event_name = "search.tier_resolved",
            tier = SearchTier::MarketIntel.as_str(),
            diagnostics = diagnostics.len(),
            "no listings fit; returning market guidance"
        );
        Ok(self.market_result(requirements, diagnostics))
    }

    /// Budget, then location, then property type, then bedrooms.
    fn single_relaxations(&self, base: &PropertyFilter) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        if let Some(ceiling) = base.price_max {
            for (filter, relaxation) in self.budget_steps(base, ceiling) {
                candidates.push(Candidate { filter, relaxations: vec![relaxation] });
            }
        }
        if let Some(location) = base.location.as_deref() {
            for (filter, relaxation) in self.location_steps(base, location) {
                candidates.push(Candidate { filter, relaxations: vec![relaxation] });
            }
        }
        if let Some(property_type) = base.property_type {
            for substitute in self.affinity.alternatives(property_type) {
                let filter = PropertyFilter { property_type: Some(substitute), ..base.clone() };
                let relaxation =
                    Relaxation::PropertyTypeSubstituted { requested: property_type, substitute };
                candidates.push(Candidate { filter, relaxations: vec![relaxation] });
            }
        }
        if let Some(bedrooms) = base.bedrooms {
            let adjusted = [bedrooms.checked_sub(1), bedrooms.checked_add(1)];
            for substitute in adjusted.into_iter().flatten() {
                let filter = PropertyFilter { bedrooms: Some(substitute), ..base.clone() };
                let relaxation = Relaxation::BedroomsAdjusted { requested: bedrooms, substitute };
                candidates.push(Candidate { filter, relaxations: vec![relaxation] });
            }
        }

        candidates
    }

    /// Budget with location, then property type with budget.
    fn multi_relaxations(&self, base: &PropertyFilter) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        let Some(ceiling) = base.price_max else {
            return candidates;
        };

        if let Some(location) = base.location.as_deref() {
            for (budget_filter, budget) in self.budget_steps(base, ceiling) {
                for (filter, moved) in self.location_steps(&budget_filter, location) {
                    candidates.push(Candidate { filter, relaxations: vec![budget.clone(), moved] });
                }
            }
        }
        if let Some(property_type) = base.property_type {
            for substitute in self.affinity.alternatives(property_type) {
                for (filter, budget) in self.budget_steps(base, ceiling) {
                    let filter = PropertyFilter { property_type: Some(substitute), ..filter };
                    let swapped =
                        Relaxation::PropertyTypeSubstituted { requested: property_type, substitute };
                    candidates.push(Candidate { filter, relaxations: vec![swapped, budget] });
                }
            }
        }

        candidates
    }

    fn budget_steps(&self, base: &PropertyFilter, ceiling: u64) -> Vec<(PropertyFilter, Relaxation)> {
        BUDGET_STEPS_PCT
            .iter()
            .map(|pct| {
                let new_ceiling = expanded_ceiling(ceiling, *pct);
                (
                    PropertyFilter { price_max: Some(new_ceiling), ..base.clone() },
                    Relaxation::BudgetExpanded {
                        pct: *pct,
                        original_ceiling: ceiling,
                        new_ceiling,
                    },
                )
            })
            .collect()
    }

    fn location_steps(
        &self,
        base: &PropertyFilter,
        location: &str,
    ) -> Vec<(PropertyFilter, Relaxation)> {
        self.areas
            .nearby(location)
            .into_iter()
            .map(|substitute| {
                (
                    PropertyFilter { location: Some(substitute.clone()), ..base.clone() },
                    Relaxation::LocationSubstituted {
                        requested: location.to_owned(),
                        substitute,
                    },
                )
            })
            .collect()
    }

    /// The winner is the first successful candidate in priority order,
    /// regardless of which query finished first.
    async fn first_success(
        &self,
        candidates: Vec<Candidate>,
        ledger: &mut QueryLedger,
    ) -> Option<(Candidate, Vec<Property>)> {
        if candidates.is_empty() {
            return None;
        }
        if !self.settings.parallel_relaxation {
            for candidate in candidates {
                ledger.record_attempt();
                let outcome = run_query(
                    Arc::clone(&self.catalog),
                    candidate.filter.clone(),
                    self.settings.query_timeout,
                )
                .await;
                match outcome {
                    QueryOutcome::Found(properties) => return Some((candidate, properties)),
                    QueryOutcome::Empty => {}
                    QueryOutcome::Failed => ledger.record_failure(),
                }
            }
            return None;
        }

        let mut tasks = JoinSet::new();
        for (index, candidate) in candidates.iter().enumerate() {
            let catalog = Arc::clone(&self.catalog);
            let filter = candidate.filter.clone();
            let timeout = self.settings.query_timeout;
            tasks.spawn(async move { (index, run_query(catalog, filter, timeout).await) });
        }

        let mut outcomes: Vec<Option<QueryOutcome>> = vec![None; candidates.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(error) => warn!(
                    event_name = "search.query_aborted",
                    error = %error,
                    "relaxation query task did not complete"
                ),
            }
        }

        let mut winner = None;
        for (candidate, outcome) in candidates.into_iter().zip(outcomes) {
            ledger.record_attempt();
            match outcome {
                Some(QueryOutcome::Found(properties)) if winner.is_none() => {
                    winner = Some((candidate, properties));
                }
                Some(QueryOutcome::Found(_)) | Some(QueryOutcome::Empty) => {}
                Some(QueryOutcome::Failed) | None => ledger.record_failure(),
            }
        }
        winner
    }

    fn relaxed_result(
        &self,
        tier: SearchTier,
        candidate: Candidate,
        properties: Vec<Property>,
    ) -> SearchResult {
        let relaxed_fields: BTreeSet<_> =
            candidate.relaxations.iter().map(Relaxation::field).collect();
        let described: Vec<String> = candidate
            .relaxations
            .iter()
            .map(|relaxation| relaxation.describe(&self.settings.currency))
            .collect();

        info!(
            event_name = "search.tier_resolved",
            tier = tier.as_str(),
            relaxed = ?relaxed_fields,
            result_count = properties.len(),
            "relaxed search matched"
        );

        SearchResult {
            tier,
            properties,
            suggestions: vec![format!(
                "No exact matches for your criteria, so I {}.",
                described.join(" and ")
            )],
            relaxed_fields,
            relaxations: candidate.relaxations,
            diagnostics: Vec::new(),
        }
    }

    fn market_result(
        &self,
        requirements: &RequirementSet,
        diagnostics: Vec<MarketDiagnostic>,
    ) -> SearchResult {
        let mut suggestions: Vec<String> = diagnostics
            .iter()
            .map(|diagnostic| diagnostic.suggestion(&self.settings.currency))
            .collect();
        if suggestions.is_empty() {
            let summary = requirements.summary();
            let criteria = if summary.is_empty() { "your criteria".to_owned() } else { summary };
            suggestions.push(format!(
                "I couldn't find anything matching {criteria}. \
                 Try adjusting the budget, area or property type."
            ));
        }

        SearchResult {
            tier: SearchTier::MarketIntel,
            properties: Vec::new(),
            suggestions,
            relaxed_fields: BTreeSet::new(),
            relaxations: Vec::new(),
            diagnostics,
        }
    }
}

async fn run_query(
    catalog: Arc<dyn PropertyCatalog>,
    filter: PropertyFilter,
    timeout: Duration,
) -> QueryOutcome {
    match tokio::time::timeout(timeout, catalog.query_properties(&filter)).await {
        Ok(Ok(properties)) if properties.is_empty() => QueryOutcome::Empty,
        Ok(Ok(properties)) => QueryOutcome::Found(properties),
        Ok(Err(error)) => {
            warn!(event_name = "search.query_failed", error = %error, "catalog query failed");
            QueryOutcome::Failed
        }
        Err(_) => {
            warn!(
                event_name = "search.query_failed",
                timeout_ms = timeout.as_millis() as u64,
                "catalog query timed out"
            );
            QueryOutcome::Failed
        }
    }
}
