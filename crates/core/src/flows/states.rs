use serde::{Deserialize, Serialize};

use crate::domain::requirements::RequiredField;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStage {
    Initiated,
    CollectingRequirements,
    ReadyForSearch,
    ShowingResults,
    FollowUp,
}

impl ConversationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::CollectingRequirements => "collecting_requirements",
            Self::ReadyForSearch => "ready_for_search",
            Self::ShowingResults => "showing_results",
            Self::FollowUp => "follow_up",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "initiated" => Some(Self::Initiated),
            "collecting_requirements" => Some(Self::CollectingRequirements),
            "ready_for_search" => Some(Self::ReadyForSearch),
            "showing_results" => Some(Self::ShowingResults),
            "follow_up" => Some(Self::FollowUp),
            _ => None,
        }
    }

    pub fn has_results(&self) -> bool {
        matches!(self, Self::ShowingResults | Self::FollowUp)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationEvent {
    /// A turn merged new or refined criteria into the session.
    RequirementsUpdated,
    /// A confident extraction contradicted a stored field.
    FreshSearchSignal,
    RequirementsEvaluated,
    SearchCompleted,
    SearchUnavailable,
    PaginationRequested,
    PropertyReferenced,
    ReferenceUnresolved,
    ActivePropertyStale,
    GeneralMessage,
    /// A direct question about the market ("cheapest 2BR in Marina").
    MarketQuestionAsked,
    ExtractionFailed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConversationContext {
    pub missing_required_fields: Vec<RequiredField>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    ClearPagination,
    ClearActiveProperty,
    PromptForMissingFields,
    RunSearch,
    StoreResults,
    ReleaseNextBatch,
    ReportSearchUnavailable,
    DescribeActiveProperty,
    ClarifyPropertyReference,
    SuggestNextSteps,
    AnswerMarketQuestion,
    RepromptGeneric,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: ConversationStage,
    pub to: ConversationStage,
    pub event: ConversationEvent,
    pub actions: Vec<FlowAction>,
}

impl TransitionOutcome {
    pub fn requires(&self, action: &FlowAction) -> bool {
        self.actions.contains(action)
    }
}
