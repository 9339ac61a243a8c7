pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod merger;
pub mod pagination;
pub mod ports;
pub mod search;

pub use domain::budget::{parse_budget, BudgetRange};
pub use domain::property::{
    AggregateGroup, Property, PropertyAggregate, PropertyFilter, PropertyId,
};
pub use domain::requirements::{
    PartialRequirementSet, PropertyType, RequiredField, RequirementField, RequirementSet,
    TransactionType,
};
pub use domain::session::{ConversationSession, SessionKey, TurnId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{ConversationEvent, ConversationStage, FlowAction, FlowEngine, PropertySearchFlow};
pub use merger::{MergeOutcome, RequirementMerger, TurnIntent};
pub use pagination::{BatchRelease, Pagination, PropertyBatch};
pub use search::{SearchError, SearchResolutionEngine, SearchResult, SearchTier};
