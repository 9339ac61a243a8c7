use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use proptalk_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink,
};
use proptalk_core::config::AppConfig;
use proptalk_core::domain::property::Property;
use proptalk_core::domain::requirements::DEFAULT_CONFIDENCE_THRESHOLD;
use proptalk_core::domain::session::{ConversationSession, SessionKey, TurnId};
use proptalk_core::errors::ApplicationError;
use proptalk_core::flows::{
    ConversationContext, ConversationEvent, ConversationStage, FlowAction, FlowEngine,
    PropertySearchFlow,
};
use proptalk_core::merger::{is_pagination_request, RequirementMerger, TurnIntent};
use proptalk_core::pagination::{BatchRelease, PropertyBatch, DEFAULT_BATCH_SIZE};
use proptalk_core::ports::{
    ConversationHistory, HistoryEntry, PropertyCatalog, RequirementExtractor, ResponseSink,
    SessionStore,
};
use proptalk_core::search::{
    MarketQuestion, MarketStatistics, SearchResolutionEngine, SearchResult, SearchSettings,
    SearchTier,
};
use proptalk_core::PartialRequirementSet;

use crate::responses;

const EXTRACTION_FAILED_INTENT: &str = "extraction_failed";

#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeSettings {
    pub confidence_threshold: f64,
    pub batch_size: usize,
    pub extraction_timeout: Duration,
    pub currency: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            batch_size: DEFAULT_BATCH_SIZE,
            extraction_timeout: Duration::from_secs(10),
            currency: "AED".to_string(),
        }
    }
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            confidence_threshold: config.conversation.confidence_threshold,
            batch_size: config.conversation.batch_size,
            extraction_timeout: config.conversation.extraction_timeout(),
            currency: config.search.currency.clone(),
        }
    }
}

/// One inbound user message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundTurn {
    pub turn_id: TurnId,
    pub session_key: SessionKey,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TurnReply {
    pub text: String,
    pub batch: Option<PropertyBatch>,
    pub stage: ConversationStage,
    pub intent: String,
    pub search_tier: Option<SearchTier>,
    pub delivered: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TurnOutcome {
    Replied(TurnReply),
    /// The turn id was already processed for this session; nothing happened.
    Duplicate,
}

/// Mutable scratch state for one turn.
#[derive(Default)]
struct TurnWork {
    lines: Vec<String>,
    batch: Option<PropertyBatch>,
    pending_result: Option<SearchResult>,
    reference_ordinal: Option<usize>,
    market_question: Option<MarketQuestion>,
}

impl TurnWork {
    fn say(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }
}

/// Processes conversation turns end to end.
///
/// Turns for one session are serialised behind a per-session lock; different
/// sessions proceed in parallel. The session is mutated as a local copy and
/// saved only once the whole turn has been worked out, so a turn that is
/// dropped part-way leaves the stored session untouched.
pub struct AgentRuntime {
    extractor: Arc<dyn RequirementExtractor>,
    catalog: Arc<dyn PropertyCatalog>,
    search: SearchResolutionEngine,
    statistics: MarketStatistics,
    sessions: Arc<dyn SessionStore>,
    sink: Arc<dyn ResponseSink>,
    history: Option<Arc<dyn ConversationHistory>>,
    audit: Arc<dyn AuditSink>,
    flow: FlowEngine<PropertySearchFlow>,
    merger: RequirementMerger,
    settings: RuntimeSettings,
    locks: Mutex<HashMap<SessionKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl AgentRuntime {
    pub fn new(
        extractor: Arc<dyn RequirementExtractor>,
        catalog: Arc<dyn PropertyCatalog>,
        sessions: Arc<dyn SessionStore>,
        sink: Arc<dyn ResponseSink>,
    ) -> Self {
        let settings = RuntimeSettings::default();
        Self {
            extractor,
            search: SearchResolutionEngine::new(Arc::clone(&catalog)),
            statistics: MarketStatistics::new(
                Arc::clone(&catalog),
                SearchSettings::default().query_timeout,
            ),
            catalog,
            sessions,
            sink,
            history: None,
            audit: Arc::new(NoopAuditSink),
            flow: FlowEngine::default(),
            merger: RequirementMerger::new(settings.confidence_threshold),
            settings,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_settings(mut self, settings: RuntimeSettings) -> Self {
        self.merger = RequirementMerger::new(settings.confidence_threshold);
        self.settings = settings;
        self
    }

    pub fn with_search_engine(mut self, search: SearchResolutionEngine) -> Self {
        self.statistics =
            MarketStatistics::new(Arc::clone(&self.catalog), search.settings().query_timeout);
        self.search = search;
        self
    }

    pub fn with_search_settings(mut self, settings: SearchSettings) -> Self {
        let search = SearchResolutionEngine::new(Arc::clone(&self.catalog)).with_settings(settings);
        self.with_search_engine(search)
    }

    pub fn with_history(mut self, history: Arc<dyn ConversationHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub async fn handle_turn(&self, turn: InboundTurn) -> Result<TurnOutcome, ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();
        info!(
            event_name = "ingress.turn.received",
            correlation_id = %correlation_id,
            session_key = %turn.session_key,
            turn_id = %turn.turn_id,
            "turn received"
        );

        let key = turn.session_key.clone();
        let lock = self.session_lock(&key);
        let outcome = {
            let _guard = lock.lock().await;
            self.process(turn, &correlation_id).await
        };
        self.release_session_lock(&key, lock);
        outcome
    }

    fn session_lock(&self, key: &SessionKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Drops the map entry once no other turn for the session holds or waits on it.
    fn release_session_lock(&self, key: &SessionKey, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    fn tracked_sessions(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn process(
        &self,
        turn: InboundTurn,
        correlation_id: &str,
    ) -> Result<TurnOutcome, ApplicationError> {
        let key = turn.session_key.clone();
        let mut session = self
            .sessions
            .load(&key)
            .await?
            .unwrap_or_else(|| ConversationSession::new(key.clone(), self.settings.batch_size));

        if session.has_processed(&turn.turn_id) {
            info!(
                event_name = "ingress.turn.duplicate",
                correlation_id,
                session_key = %key,
                turn_id = %turn.turn_id,
                "duplicate delivery ignored"
            );
            return Ok(TurnOutcome::Duplicate);
        }

        let audit = AuditContext::new(
            Some(key.to_string()),
            Some(turn.turn_id.to_string()),
            correlation_id,
            "agent-runtime",
        );
        let mut work = TurnWork::default();

        // Paging needs no criteria, so the extractor is not consulted.
        let extracted = if session.stage.has_results() && is_pagination_request(&turn.text) {
            debug!(
                event_name = "conversation.extraction_skipped",
                correlation_id,
                session_key = %key,
                "pagination phrase while browsing"
            );
            Some(PartialRequirementSet::default())
        } else {
            self.extract(&turn, &session, correlation_id).await
        };

        let intent = match extracted {
            Some(extracted) => {
                let merged = self.merger.merge(
                    &session.requirements,
                    &extracted,
                    &turn.text,
                    &session.pagination,
                );
                debug!(
                    event_name = "conversation.intent_classified",
                    correlation_id,
                    intent = merged.intent.as_str(),
                    overwritten = ?merged.overwritten,
                    filled = ?merged.filled,
                    "turn classified"
                );
                if let TurnIntent::MarketQuestion { statistic } = &merged.intent {
                    work.market_question =
                        Some(MarketQuestion::scoped(*statistic, &extracted, &session.requirements));
                }
                let events = self.events_for(&mut session, &merged.intent, merged.changed(), &mut work);
                session.requirements = merged.requirements;
                self.drive(&mut session, events, &mut work, &audit).await;
                merged.intent.as_str().to_string()
            }
            None => {
                self.drive(
                    &mut session,
                    VecDeque::from([ConversationEvent::ExtractionFailed]),
                    &mut work,
                    &audit,
                )
                .await;
                EXTRACTION_FAILED_INTENT.to_string()
            }
        };

        if work.lines.is_empty() {
            work.say(responses::REPROMPT);
        }
        let text = work.lines.join("\n\n");

        session.record_turn(turn.turn_id.clone());
        session.touch();
        self.sessions.save(&session).await?;

        let delivered = match self.sink.deliver(&key, &text, work.batch.as_ref()).await {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    event_name = "delivery.failed",
                    correlation_id,
                    session_key = %key,
                    error = %error,
                    "reply delivery failed"
                );
                false
            }
        };

        self.record_history(HistoryEntry {
            session_key: key.clone(),
            turn_id: turn.turn_id,
            user_text: turn.text,
            reply_text: text.clone(),
            stage: session.stage,
            intent: intent.clone(),
            recorded_at: Utc::now(),
        });

        info!(
            event_name = "conversation.turn_completed",
            correlation_id,
            session_key = %key,
            stage = session.stage.as_str(),
            intent = intent.as_str(),
            "turn completed"
        );

        Ok(TurnOutcome::Replied(TurnReply {
            text,
            batch: work.batch,
            stage: session.stage,
            intent,
            search_tier: session.last_search_tier,
            delivered,
        }))
    }

    /// `None` when the extractor failed or timed out.
    async fn extract(
        &self,
        turn: &InboundTurn,
        session: &ConversationSession,
        correlation_id: &str,
    ) -> Option<PartialRequirementSet> {
        let pending = self.extractor.extract(&turn.text, &session.requirements);
        match tokio::time::timeout(self.settings.extraction_timeout, pending).await {
            Ok(Ok(extracted)) => Some(extracted.sanitized()),
            Ok(Err(error)) => {
                warn!(
                    event_name = "conversation.extraction_failed",
                    correlation_id,
                    session_key = %turn.session_key,
                    error = %error,
                    "requirement extraction failed"
                );
                None
            }
            Err(_) => {
                warn!(
                    event_name = "conversation.extraction_failed",
                    correlation_id,
                    session_key = %turn.session_key,
                    error = "timeout",
                    "requirement extraction timed out"
                );
                None
            }
        }
    }

    /// Maps a classified turn onto the state-machine events it triggers.
    fn events_for(
        &self,
        session: &mut ConversationSession,
        intent: &TurnIntent,
        changed: bool,
        work: &mut TurnWork,
    ) -> VecDeque<ConversationEvent> {
        use ConversationEvent::{
            FreshSearchSignal, GeneralMessage, MarketQuestionAsked, PaginationRequested,
            PropertyReferenced, ReferenceUnresolved, RequirementsEvaluated, RequirementsUpdated,
        };

        let browsing = session.stage.has_results();
        match intent {
            TurnIntent::PropertyReference { ordinal, property } => {
                work.reference_ordinal = Some(*ordinal);
                match property {
                    Some(id) => {
                        session.active_property_reference = Some(id.clone());
                        VecDeque::from([PropertyReferenced])
                    }
                    None => VecDeque::from([ReferenceUnresolved]),
                }
            }
            TurnIntent::PaginationRequest => VecDeque::from([PaginationRequested]),
            TurnIntent::MarketQuestion { .. } => VecDeque::from([MarketQuestionAsked]),
            TurnIntent::FreshSearchFieldConflict => {
                VecDeque::from([FreshSearchSignal, RequirementsEvaluated])
            }
            TurnIntent::Refinement if changed || !browsing => {
                VecDeque::from([RequirementsUpdated, RequirementsEvaluated])
            }
            TurnIntent::Refinement | TurnIntent::Generic if browsing => {
                VecDeque::from([GeneralMessage])
            }
            TurnIntent::Refinement | TurnIntent::Generic => {
                VecDeque::from([RequirementsUpdated, RequirementsEvaluated])
            }
        }
    }

    async fn drive(
        &self,
        session: &mut ConversationSession,
        mut events: VecDeque<ConversationEvent>,
        work: &mut TurnWork,
        audit: &AuditContext,
    ) {
        while let Some(event) = events.pop_front() {
            let context = ConversationContext {
                missing_required_fields: session
                    .requirements
                    .missing_fields(self.merger.threshold()),
            };
            let outcome = match self.flow.apply_with_audit(
                &session.stage,
                &event,
                &context,
                self.audit.as_ref(),
                audit,
            ) {
                Ok(outcome) => outcome,
                Err(error) => {
                    warn!(
                        event_name = "conversation.transition_rejected",
                        correlation_id = %audit.correlation_id,
                        error = %error,
                        "state machine rejected event"
                    );
                    if work.lines.is_empty() {
                        work.say(responses::next_steps(session.pagination.remaining()));
                    }
                    return;
                }
            };
            info!(
                event_name = "conversation.stage_transition",
                correlation_id = %audit.correlation_id,
                from = outcome.from.as_str(),
                to = outcome.to.as_str(),
                event = ?outcome.event,
                "stage transition"
            );
            session.stage = outcome.to;

            for action in &outcome.actions {
                if let Some(follow_up) = self.perform(action, session, work, audit).await {
                    events.push_front(follow_up);
                }
            }
        }
    }

    /// Runs one action. Returns an event the machine must handle next.
    async fn perform(
        &self,
        action: &FlowAction,
        session: &mut ConversationSession,
        work: &mut TurnWork,
        audit: &AuditContext,
    ) -> Option<ConversationEvent> {
        match action {
            FlowAction::ClearPagination => {
                session.pagination.clear();
                session.last_search_tier = None;
                session.last_relaxations.clear();
            }
            FlowAction::ClearActiveProperty => session.active_property_reference = None,
            FlowAction::PromptForMissingFields => {
                let missing = session.requirements.missing_fields(self.merger.threshold());
                work.say(responses::missing_fields(&session.requirements, &missing));
            }
            FlowAction::RunSearch => return Some(self.run_search(session, work, audit).await),
            FlowAction::StoreResults => {
                if let Some(result) = work.pending_result.take() {
                    work.say(responses::results_intro(&result, &session.requirements));
                    session.last_search_tier = Some(result.tier);
                    session.last_relaxations = result.relaxations;
                    session.pagination.store(result.properties);
                }
            }
            FlowAction::ReleaseNextBatch => self.release_batch(session, work, audit),
            FlowAction::ReportSearchUnavailable => work.say(responses::SEARCH_UNAVAILABLE),
            FlowAction::DescribeActiveProperty => {
                return self.describe_active(session, work, audit).await;
            }
            FlowAction::ClarifyPropertyReference => {
                let ordinal = work.reference_ordinal.unwrap_or_default();
                work.say(responses::clarify_reference(
                    ordinal,
                    session.pagination.current_batch().len(),
                ));
            }
            FlowAction::SuggestNextSteps => {
                work.say(responses::next_steps(session.pagination.remaining()));
            }
            FlowAction::AnswerMarketQuestion => {
                if let Some(question) = work.market_question.take() {
                    self.answer_market_question(&question, work, audit).await;
                }
            }
            FlowAction::RepromptGeneric => work.say(responses::REPROMPT),
        }
        None
    }

    async fn run_search(
        &self,
        session: &ConversationSession,
        work: &mut TurnWork,
        audit: &AuditContext,
    ) -> ConversationEvent {
        match self.search.resolve(&session.requirements).await {
            Ok(result) => {
                self.audit.emit(
                    AuditEvent::from_context(
                        audit,
                        "search.resolved",
                        AuditCategory::Search,
                        AuditOutcome::Success,
                    )
                    .with_metadata("tier", result.tier.as_str())
                    .with_metadata("result_count", result.properties.len().to_string()),
                );
                work.pending_result = Some(result);
                ConversationEvent::SearchCompleted
            }
            Err(error) => {
                warn!(
                    event_name = "search.unavailable",
                    correlation_id = %audit.correlation_id,
                    error = %error,
                    "search could not reach the catalog"
                );
                self.audit.emit(
                    AuditEvent::from_context(
                        audit,
                        "search.unavailable",
                        AuditCategory::Search,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", error.to_string()),
                );
                ConversationEvent::SearchUnavailable
            }
        }
    }

    async fn answer_market_question(
        &self,
        question: &MarketQuestion,
        work: &mut TurnWork,
        audit: &AuditContext,
    ) {
        match self.statistics.answer(question).await {
            Ok(answer) => {
                self.audit.emit(
                    AuditEvent::from_context(
                        audit,
                        "market.question_answered",
                        AuditCategory::Search,
                        AuditOutcome::Success,
                    )
                    .with_metadata("statistic", question.statistic.as_str())
                    .with_metadata("matching", answer.matching.to_string()),
                );
                work.say(responses::market_answer(&answer, &self.settings.currency));
            }
            Err(error) => {
                warn!(
                    event_name = "market.question_failed",
                    correlation_id = %audit.correlation_id,
                    statistic = question.statistic.as_str(),
                    error = %error,
                    "market question could not reach the catalog"
                );
                work.say(responses::MARKET_UNAVAILABLE);
            }
        }
    }

    fn release_batch(
        &self,
        session: &mut ConversationSession,
        work: &mut TurnWork,
        audit: &AuditContext,
    ) {
        match session.pagination.next_batch() {
            BatchRelease::Batch(batch) => {
                info!(
                    event_name = "pagination.batch_released",
                    correlation_id = %audit.correlation_id,
                    first_position = batch.first_position,
                    size = batch.properties.len(),
                    remaining = batch.remaining,
                    "batch released"
                );
                self.audit.emit(
                    AuditEvent::from_context(
                        audit,
                        "pagination.batch_released",
                        AuditCategory::Pagination,
                        AuditOutcome::Success,
                    )
                    .with_metadata("size", batch.properties.len().to_string())
                    .with_metadata("remaining", batch.remaining.to_string()),
                );
                work.say(responses::batch_listing(&batch, &self.settings.currency));
                work.batch = Some(batch);
            }
            BatchRelease::Exhausted { total } => {
                info!(
                    event_name = "pagination.exhausted",
                    correlation_id = %audit.correlation_id,
                    total,
                    "all results already shown"
                );
                work.say(responses::exhausted(total));
            }
            BatchRelease::Empty => {
                if work.lines.is_empty() {
                    work.say(responses::nothing_to_page());
                }
            }
        }
    }

    /// Re-reads the focused listing so the description reflects the catalog.
    async fn describe_active(
        &self,
        session: &mut ConversationSession,
        work: &mut TurnWork,
        audit: &AuditContext,
    ) -> Option<ConversationEvent> {
        let Some(id) = session.active_property_reference.clone() else {
            return Some(ConversationEvent::ActivePropertyStale);
        };
        let currency = self.settings.currency.as_str();

        match self.catalog.find_property(&id).await {
            Ok(Some(property)) => {
                work.say(responses::describe_property(&property, currency));
                None
            }
            Ok(None) => {
                info!(
                    event_name = "conversation.active_property_stale",
                    correlation_id = %audit.correlation_id,
                    property_id = %id,
                    "active property no longer listed"
                );
                work.say(responses::stale_property());
                Some(ConversationEvent::ActivePropertyStale)
            }
            Err(error) => {
                warn!(
                    event_name = "catalog.lookup_failed",
                    correlation_id = %audit.correlation_id,
                    property_id = %id,
                    error = %error,
                    "falling back to the stored listing"
                );
                let stored: Option<&Property> =
                    session.pagination.current_batch().iter().find(|property| property.id == id);
                match stored {
                    Some(property) => work.say(responses::describe_property(property, currency)),
                    None => work.say(responses::SEARCH_UNAVAILABLE),
                }
                None
            }
        }
    }

    fn record_history(&self, entry: HistoryEntry) {
        let Some(history) = self.history.clone() else {
            return;
        };
        tokio::spawn(async move {
            let session_key = entry.session_key.to_string();
            if let Err(error) = history.record(entry).await {
                warn!(
                    event_name = "history.record_failed",
                    session_key = %session_key,
                    error = %error,
                    "turn history write failed"
                );
            }
        });
    }
}
