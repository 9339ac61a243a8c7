use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{
    ConversationContext, ConversationEvent, ConversationStage, FlowAction, TransitionOutcome,
};

pub trait FlowDefinition {
    fn name(&self) -> &'static str;
    fn initial_stage(&self) -> ConversationStage;
    fn transition(
        &self,
        current: &ConversationStage,
        event: &ConversationEvent,
        context: &ConversationContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

#[derive(Clone, Debug, Default)]
pub struct PropertySearchFlow;

impl FlowDefinition for PropertySearchFlow {
    fn name(&self) -> &'static str {
        "property_search"
    }

    fn initial_stage(&self) -> ConversationStage {
        ConversationStage::Initiated
    }

    fn transition(
        &self,
        current: &ConversationStage,
        event: &ConversationEvent,
        context: &ConversationContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_property_search(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn name(&self) -> &'static str {
        self.flow.name()
    }

    pub fn initial_stage(&self) -> ConversationStage {
        self.flow.initial_stage()
    }

    pub fn apply(
        &self,
        current: &ConversationStage,
        event: &ConversationEvent,
        context: &ConversationContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &ConversationStage,
        event: &ConversationEvent,
        context: &ConversationContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "flow.transition_applied",
                        AuditCategory::Conversation,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "flow.transition_rejected",
                        AuditCategory::Conversation,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<PropertySearchFlow> {
    fn default() -> Self {
        Self::new(PropertySearchFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {stage:?} using event {event:?}")]
    InvalidTransition { stage: ConversationStage, event: ConversationEvent },
}

fn transition_property_search(
    current: &ConversationStage,
    event: &ConversationEvent,
    context: &ConversationContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use ConversationEvent::{
        ActivePropertyStale, ExtractionFailed, FreshSearchSignal, GeneralMessage,
        MarketQuestionAsked, PaginationRequested, PropertyReferenced, ReferenceUnresolved,
        RequirementsEvaluated, RequirementsUpdated, SearchCompleted, SearchUnavailable,
    };
    use ConversationStage::{
        CollectingRequirements, FollowUp, Initiated, ReadyForSearch, ShowingResults,
    };
    use FlowAction::{
        AnswerMarketQuestion, ClarifyPropertyReference, ClearActiveProperty, ClearPagination,
        DescribeActiveProperty, PromptForMissingFields, ReleaseNextBatch, RepromptGeneric,
        ReportSearchUnavailable, RunSearch, StoreResults, SuggestNextSteps,
    };

    let (to, actions) = match (current, event) {
        (Initiated | CollectingRequirements | ReadyForSearch, RequirementsUpdated) => {
            (CollectingRequirements, Vec::new())
        }
        (ShowingResults | FollowUp, RequirementsUpdated) | (_, FreshSearchSignal) => {
            (CollectingRequirements, vec![ClearPagination, ClearActiveProperty])
        }
        (CollectingRequirements, RequirementsEvaluated) => {
            if context.missing_required_fields.is_empty() {
                (ReadyForSearch, vec![RunSearch])
            } else {
                (CollectingRequirements, vec![PromptForMissingFields])
            }
        }
        (ReadyForSearch, SearchCompleted) => (ShowingResults, vec![StoreResults, ReleaseNextBatch]),
        (ReadyForSearch, SearchUnavailable) => {
            (CollectingRequirements, vec![ReportSearchUnavailable])
        }
        (ShowingResults, PaginationRequested) => (ShowingResults, vec![ReleaseNextBatch]),
        (FollowUp, PaginationRequested) => {
            (ShowingResults, vec![ClearActiveProperty, ReleaseNextBatch])
        }
        (Initiated | CollectingRequirements, PaginationRequested) => {
            (CollectingRequirements, vec![PromptForMissingFields])
        }
        (ShowingResults | FollowUp, PropertyReferenced) => (FollowUp, vec![DescribeActiveProperty]),
        (ShowingResults | FollowUp, ReferenceUnresolved) => {
            (*current, vec![ClarifyPropertyReference])
        }
        (FollowUp, ActivePropertyStale) => {
            (ShowingResults, vec![ClearActiveProperty, SuggestNextSteps])
        }
        (ShowingResults, GeneralMessage) => (ShowingResults, vec![SuggestNextSteps]),
        (FollowUp, GeneralMessage) => (FollowUp, vec![DescribeActiveProperty]),
        (Initiated, MarketQuestionAsked) => (CollectingRequirements, vec![AnswerMarketQuestion]),
        (_, MarketQuestionAsked) => (*current, vec![AnswerMarketQuestion]),
        (_, ExtractionFailed) => (*current, vec![RepromptGeneric]),
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                stage: *current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}
