pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, PropertySearchFlow};
pub use states::{
    ConversationContext, ConversationEvent, ConversationStage, FlowAction, TransitionOutcome,
};
