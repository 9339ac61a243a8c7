//! Turn processing for the property search assistant.
//!
//! - `extractor` / `llm` turn a message into candidate requirement fields
//!   (deterministic keyword rules, or a chat model behind `reqwest`).
//! - `runtime` runs one turn: extract, merge, drive the conversation state
//!   machine, search, page, persist and reply.
//! - `responses` holds the reply wording.
//!
//! The language model is only ever a translator. Which listings are shown,
//! and what was relaxed to find them, is decided by `proptalk-core`.

pub mod extractor;
pub mod llm;
pub mod responses;
pub mod runtime;

pub use extractor::RuleBasedExtractor;
pub use llm::{HttpLlmClient, LlmClient, LlmError, LlmRequirementExtractor};
pub use runtime::{AgentRuntime, InboundTurn, RuntimeSettings, TurnOutcome, TurnReply};
