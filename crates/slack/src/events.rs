use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use proptalk_agent::{AgentRuntime, InboundTurn, TurnOutcome};
use proptalk_core::domain::session::{SessionKey, TurnId};
use proptalk_core::errors::ApplicationError;

use crate::blocks::{PROPERTY_DETAILS_ACTION, SHOW_MORE_ACTION};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

impl SlackEnvelope {
    /// Reads a Socket Mode frame. Frames without an envelope id (`hello`,
    /// `disconnect`) carry nothing to acknowledge and yield `None`.
    pub fn from_socket_frame(frame: &Value) -> Option<Self> {
        let envelope_id = frame.get("envelope_id")?.as_str()?.to_owned();
        let payload = frame.get("payload").unwrap_or(&Value::Null);
        let frame_type = str_field(frame, "type").unwrap_or_default();

        let event = match frame_type.as_str() {
            "events_api" => parse_events_api(payload),
            "interactive" => parse_interactive(payload),
            other => SlackEvent::Unsupported { event_type: other.to_owned() },
        };
        Some(Self { envelope_id, event })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    Message(MessageEvent),
    BlockAction(BlockActionEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::Message(_) => SlackEventType::Message,
            Self::BlockAction(_) => SlackEventType::BlockAction,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    pub fn session_key(&self) -> Option<SessionKey> {
        match self {
            Self::Message(event) => Some(SessionKey::new(&event.channel_id, &event.user_id)),
            Self::BlockAction(event) => Some(SessionKey::new(&event.channel_id, &event.user_id)),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    Message,
    BlockAction,
    Unsupported,
}

/// A channel, DM or thread message.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct MessageEvent {
    pub channel_id: String,
    pub user_id: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    pub text: String,
    pub bot_id: Option<String>,
    pub subtype: Option<String>,
}

impl MessageEvent {
    /// Bot echoes and edits/deletes never start a turn.
    pub fn is_user_authored(&self) -> bool {
        self.bot_id.is_none() && self.subtype.is_none() && !self.user_id.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockActionEvent {
    pub channel_id: String,
    pub user_id: String,
    pub action_id: String,
    pub action_ts: String,
    pub value: Option<String>,
}

impl BlockActionEvent {
    /// The utterance a button stands for, so it flows through the same
    /// conversation path as typed text.
    pub fn as_utterance(&self) -> Option<String> {
        match self.action_id.as_str() {
            SHOW_MORE_ACTION => Some("show more".to_owned()),
            PROPERTY_DETAILS_ACTION => {
                let ordinal = self.value.as_deref()?.split('|').next()?.trim();
                ordinal.parse::<usize>().ok().map(|ordinal| format!("tell me about #{ordinal}"))
            }
            _ => None,
        }
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn parse_events_api(payload: &Value) -> SlackEvent {
    let event = payload.get("event").unwrap_or(&Value::Null);
    let event_type = str_field(event, "type").unwrap_or_default();
    if event_type != "message" {
        return SlackEvent::Unsupported { event_type };
    }
    SlackEvent::Message(MessageEvent {
        channel_id: str_field(event, "channel").unwrap_or_default(),
        user_id: str_field(event, "user").unwrap_or_default(),
        ts: str_field(event, "ts").unwrap_or_default(),
        thread_ts: str_field(event, "thread_ts"),
        text: str_field(event, "text").unwrap_or_default(),
        bot_id: str_field(event, "bot_id"),
        subtype: str_field(event, "subtype"),
    })
}

fn parse_interactive(payload: &Value) -> SlackEvent {
    let payload_type = str_field(payload, "type").unwrap_or_default();
    let action = payload.get("actions").and_then(|actions| actions.get(0));
    let (Some(action), "block_actions") = (action, payload_type.as_str()) else {
        return SlackEvent::Unsupported { event_type: payload_type };
    };
    let nested_id = |key: &str| payload.get(key).and_then(|inner| str_field(inner, "id"));

    SlackEvent::BlockAction(BlockActionEvent {
        channel_id: nested_id("channel").unwrap_or_default(),
        user_id: nested_id("user").unwrap_or_default(),
        action_id: str_field(action, "action_id").unwrap_or_default(),
        action_ts: str_field(action, "action_ts").unwrap_or_default(),
        value: str_field(action, "value"),
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    /// A turn ran and its reply went through the response sink.
    Processed,
    /// Slack redelivered a message that was already handled.
    Duplicate,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("conversation turn failed: {0}")]
    Conversation(String),
}

impl From<ApplicationError> for EventHandlerError {
    fn from(error: ApplicationError) -> Self {
        Self::Conversation(error.to_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Whatever runs a conversation turn. Implemented by [`AgentRuntime`].
#[async_trait]
pub trait ConversationService: Send + Sync {
    async fn converse(&self, turn: InboundTurn) -> Result<TurnOutcome, ApplicationError>;
}

#[async_trait]
impl ConversationService for AgentRuntime {
    async fn converse(&self, turn: InboundTurn) -> Result<TurnOutcome, ApplicationError> {
        self.handle_turn(turn).await
    }
}

/// Dispatcher wired for conversation traffic: typed messages and the
/// buttons on result batches.
pub fn conversation_dispatcher<S>(service: Arc<S>) -> EventDispatcher
where
    S: ConversationService + ?Sized + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageHandler::new(service.clone()));
    dispatcher.register(BlockActionHandler::new(service));
    dispatcher
}

async fn run_turn<S>(
    service: &S,
    turn: InboundTurn,
    ctx: &EventContext,
) -> Result<HandlerResult, EventHandlerError>
where
    S: ConversationService + ?Sized,
{
    let session_key = turn.session_key.clone();
    let turn_id = turn.turn_id.clone();
    match service.converse(turn).await? {
        TurnOutcome::Replied(reply) => {
            info!(
                event_name = "ingress.slack.turn_handled",
                correlation_id = %ctx.correlation_id,
                session_key = %session_key,
                turn_id = %turn_id,
                stage = reply.stage.as_str(),
                intent = %reply.intent,
                delivered = reply.delivered,
                "slack turn handled"
            );
            Ok(HandlerResult::Processed)
        }
        TurnOutcome::Duplicate => Ok(HandlerResult::Duplicate),
    }
}

/// Maps `(channel, user)` to the session and the message ts to the turn id,
/// so Slack retries of the same message are recognised as duplicates.
pub struct MessageHandler<S: ?Sized> {
    service: Arc<S>,
}

impl<S> MessageHandler<S>
where
    S: ConversationService + ?Sized,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for MessageHandler<S>
where
    S: ConversationService + ?Sized + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Message
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if !event.is_user_authored() || event.text.trim().is_empty() {
            debug!(
                correlation_id = %ctx.correlation_id,
                channel_id = %event.channel_id,
                "ignoring non-user message"
            );
            return Ok(HandlerResult::Ignored);
        }

        let turn = InboundTurn {
            turn_id: TurnId(event.ts.clone()),
            session_key: SessionKey::new(&event.channel_id, &event.user_id),
            text: event.text.clone(),
        };
        run_turn(self.service.as_ref(), turn, ctx).await
    }
}

pub struct BlockActionHandler<S: ?Sized> {
    service: Arc<S>,
}

impl<S> BlockActionHandler<S>
where
    S: ConversationService + ?Sized,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for BlockActionHandler<S>
where
    S: ConversationService + ?Sized + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::BlockAction
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::BlockAction(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let Some(text) = event.as_utterance() else {
            debug!(
                correlation_id = %ctx.correlation_id,
                action_id = %event.action_id,
                "ignoring unknown block action"
            );
            return Ok(HandlerResult::Ignored);
        };

        let turn = InboundTurn {
            turn_id: TurnId(format!("action-{}", event.action_ts)),
            session_key: SessionKey::new(&event.channel_id, &event.user_id),
            text,
        };
        run_turn(self.service.as_ref(), turn, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;

    use proptalk_agent::{InboundTurn, TurnOutcome, TurnReply};
    use proptalk_core::errors::{ApplicationError, SessionStoreError};
    use proptalk_core::flows::ConversationStage;

    use super::{
        conversation_dispatcher, BlockActionEvent, ConversationService, EventContext,
        EventDispatcher, HandlerResult, MessageEvent, SlackEnvelope, SlackEvent,
    };

    #[derive(Default)]
    struct RecordingService {
        turns: Mutex<Vec<InboundTurn>>,
        fail: bool,
    }

    impl RecordingService {
        fn turns(&self) -> Vec<InboundTurn> {
            self.turns.lock().expect("turns").clone()
        }
    }

    #[async_trait]
    impl ConversationService for RecordingService {
        async fn converse(&self, turn: InboundTurn) -> Result<TurnOutcome, ApplicationError> {
            if self.fail {
                return Err(SessionStoreError::Unavailable("locked".to_owned()).into());
            }
            let mut turns = self.turns.lock().expect("turns");
            if turns.iter().any(|seen| seen.turn_id == turn.turn_id) {
                return Ok(TurnOutcome::Duplicate);
            }
            turns.push(turn);
            Ok(TurnOutcome::Replied(TurnReply {
                text: "ok".to_owned(),
                batch: None,
                stage: ConversationStage::CollectingRequirements,
                intent: "refinement".to_owned(),
                search_tier: None,
                delivered: true,
            }))
        }
    }

    fn message(ts: &str, text: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: format!("env-{ts}"),
            event: SlackEvent::Message(MessageEvent {
                channel_id: "D1".to_owned(),
                user_id: "U1".to_owned(),
                ts: ts.to_owned(),
                text: text.to_owned(),
                ..MessageEvent::default()
            }),
        }
    }

    #[tokio::test]
    async fn message_becomes_turn_keyed_by_channel_and_user() {
        let service = Arc::new(RecordingService::default());
        let dispatcher = conversation_dispatcher(service.clone());

        let result = dispatcher
            .dispatch(&message("1730000000.100", "2 bed in Marina"), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Processed);
        let turns = service.turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].session_key.to_string(), "D1:U1");
        assert_eq!(turns[0].turn_id.0, "1730000000.100");
        assert_eq!(turns[0].text, "2 bed in Marina");
    }

    #[tokio::test]
    async fn redelivered_message_reports_duplicate() {
        let service = Arc::new(RecordingService::default());
        let dispatcher = conversation_dispatcher(service.clone());
        let envelope = message("1730000000.200", "rent in JVC");

        dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("first");
        let second = dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("second");

        assert_eq!(second, HandlerResult::Duplicate);
        assert_eq!(service.turns().len(), 1);
    }

    #[tokio::test]
    async fn bot_echoes_and_edits_are_ignored() {
        let service = Arc::new(RecordingService::default());
        let dispatcher = conversation_dispatcher(service.clone());

        let mut echo = message("1.1", "I found 3 properties");
        if let SlackEvent::Message(event) = &mut echo.event {
            event.bot_id = Some("B1".to_owned());
        }
        let mut edit = message("1.2", "edited");
        if let SlackEvent::Message(event) = &mut edit.event {
            event.subtype = Some("message_changed".to_owned());
        }

        for envelope in [echo, edit, message("1.3", "   ")] {
            let result = dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("dispatch");
            assert_eq!(result, HandlerResult::Ignored);
        }
        assert!(service.turns().is_empty());
    }

    #[tokio::test]
    async fn buttons_replay_as_utterances() {
        let service = Arc::new(RecordingService::default());
        let dispatcher = conversation_dispatcher(service.clone());

        for (action_id, value, ts) in
            [("show_more", None, "9.1"), ("property_details", Some("3|P-13"), "9.2")]
        {
            let envelope = SlackEnvelope {
                envelope_id: format!("env-{ts}"),
                event: SlackEvent::BlockAction(BlockActionEvent {
                    channel_id: "D1".to_owned(),
                    user_id: "U1".to_owned(),
                    action_id: action_id.to_owned(),
                    action_ts: ts.to_owned(),
                    value: value.map(str::to_owned),
                }),
            };
            dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("dispatch");
        }

        let texts: Vec<String> = service.turns().into_iter().map(|turn| turn.text).collect();
        assert_eq!(texts, vec!["show more", "tell me about #3"]);
    }

    #[tokio::test]
    async fn runtime_failure_surfaces_as_dispatch_error() {
        let service = Arc::new(RecordingService { fail: true, ..RecordingService::default() });
        let dispatcher = conversation_dispatcher(service);

        let error = dispatcher
            .dispatch(&message("2.1", "hello"), &EventContext::default())
            .await
            .expect_err("should fail");
        assert!(error.to_string().contains("locked"));
    }

    #[tokio::test]
    async fn empty_dispatcher_ignores_everything() {
        let dispatcher = EventDispatcher::default();
        assert_eq!(dispatcher.handler_count(), 0);
        let result = dispatcher
            .dispatch(&message("3.1", "hello"), &EventContext::default())
            .await
            .expect("dispatch");
        assert_eq!(result, HandlerResult::Ignored);
    }

    #[test]
    fn parses_socket_mode_frames() {
        let message_frame = json!({
            "envelope_id": "e-1",
            "type": "events_api",
            "payload": {"event": {
                "type": "message", "channel": "D9", "user": "U9",
                "text": "villa in Arabian Ranches", "ts": "1730.5", "thread_ts": "1730.1"
            }}
        });
        let envelope = SlackEnvelope::from_socket_frame(&message_frame).expect("envelope");
        let SlackEvent::Message(event) = &envelope.event else {
            panic!("expected message, got {:?}", envelope.event);
        };
        assert_eq!(event.thread_ts.as_deref(), Some("1730.1"));
        assert!(event.is_user_authored());

        let action_frame = json!({
            "envelope_id": "e-2",
            "type": "interactive",
            "payload": {
                "type": "block_actions",
                "user": {"id": "U9"},
                "channel": {"id": "D9"},
                "actions": [{"action_id": "show_more", "action_ts": "1731.2"}]
            }
        });
        let envelope = SlackEnvelope::from_socket_frame(&action_frame).expect("envelope");
        assert_eq!(envelope.event.session_key().map(|key| key.to_string()).as_deref(), Some("D9:U9"));

        let reaction = json!({
            "envelope_id": "e-3",
            "type": "events_api",
            "payload": {"event": {"type": "reaction_added"}}
        });
        let envelope = SlackEnvelope::from_socket_frame(&reaction).expect("envelope");
        assert_eq!(envelope.event, SlackEvent::Unsupported { event_type: "reaction_added".to_owned() });

        assert!(SlackEnvelope::from_socket_frame(&json!({"type": "hello"})).is_none());
    }
}
