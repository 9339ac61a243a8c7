//! Slack transport for the property-search conversation.
//!
//! - **Socket Mode** (`socket`) - envelope loop with reconnect backoff
//! - **Events** (`events`) - payload parsing, dispatch, turn handlers
//! - **Block Kit** (`blocks`) - reply and property batch rendering
//! - **Delivery** (`delivery`) - `ResponseSink` that posts replies back to Slack
//!
//! ```text
//! Slack envelope → EventDispatcher → ThreadMessageHandler → AgentRuntime
//!                                                              ↓
//!                     SlackPoster ← blocks ← SlackDelivery ← reply
//! ```

pub mod blocks;
pub mod delivery;
pub mod events;
pub mod socket;

pub use delivery::{NoopSlackPoster, PostError, SlackDelivery, SlackPoster, WebApiPoster};
pub use events::{conversation_dispatcher, ConversationService, EventDispatcher, SlackEnvelope};
pub use socket::{NoopSocketTransport, ReconnectPolicy, SocketModeRunner, SocketTransport};
