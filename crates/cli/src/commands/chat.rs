use std::io::{self, BufRead, Write};
use std::sync::Arc;

use async_trait::async_trait;
use proptalk_agent::{extractor, AgentRuntime, InboundTurn, RuntimeSettings, TurnOutcome, TurnReply};
use proptalk_core::config::LoadOptions;
use proptalk_core::domain::session::{SessionKey, TurnId};
use proptalk_core::errors::{ApplicationError, DeliveryError};
use proptalk_core::pagination::PropertyBatch;
use proptalk_core::ports::ResponseSink;
use proptalk_core::search::AreaDirectory;
use proptalk_db::repositories::{SqlConversationHistory, SqlPropertyRepository, SqlSessionStore};
use uuid::Uuid;

use crate::commands::{block_on, exit, load_config, open_database, CommandResult};

const CHAT_CHANNEL: &str = "cli";
const QUIT_WORDS: &[&str] = &["quit", "exit", "bye"];

/// Prints replies to the terminal.
pub struct ConsoleSink;

#[async_trait]
impl ResponseSink for ConsoleSink {
    async fn deliver(
        &self,
        _session: &SessionKey,
        text: &str,
        _batch: Option<&PropertyBatch>,
    ) -> Result<(), DeliveryError> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "\n{text}\n").map_err(|error| DeliveryError::Transport(error.to_string()))
    }
}

pub fn run(options: &LoadOptions, user: &str) -> CommandResult {
    let config = match load_config("chat", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let result = block_on("chat", async {
        let pool = open_database(&config).await?;
        let extractor = extractor::from_config(&config, AreaDirectory::default())
            .map_err(|error| ("extractor_setup", error.to_string(), exit::CONFIG))?;
        let runtime = AgentRuntime::new(
            extractor,
            Arc::new(SqlPropertyRepository::new(pool.clone())),
            Arc::new(
                SqlSessionStore::new(pool.clone()).with_ttl(config.conversation.session_ttl_secs),
            ),
            Arc::new(ConsoleSink),
        )
        .with_settings(RuntimeSettings::from_config(&config))
        .with_search_settings(config.search.settings())
        .with_history(Arc::new(SqlConversationHistory::new(pool.clone())));

        println!("Chatting as `{user}`. Type `quit` to leave.");
        let replies = converse(&runtime, SessionKey::new(CHAT_CHANNEL, user), io::stdin().lock())
            .await
            .map_err(|error| ("chat_turn", error.to_string(), exit::CHECK_FAILED))?;

        pool.close().await;
        Ok(replies.len())
    });

    match result {
        Ok(turns) => CommandResult::success("chat", format!("chat ended after {turns} turns")),
        Err(failure) => failure,
    }
}

/// Runs one turn per non-empty input line until EOF or a quit word.
pub async fn converse<R: BufRead>(
    runtime: &AgentRuntime,
    session_key: SessionKey,
    input: R,
) -> Result<Vec<TurnReply>, ApplicationError> {
    let mut replies = Vec::new();
    for line in input.lines() {
        let Ok(line) = line else { break };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if QUIT_WORDS.contains(&text.to_ascii_lowercase().as_str()) {
            break;
        }

        let turn = InboundTurn {
            turn_id: TurnId(Uuid::new_v4().to_string()),
            session_key: session_key.clone(),
            text: text.to_string(),
        };
        match runtime.handle_turn(turn).await? {
            TurnOutcome::Replied(reply) => {
                tracing::debug!(
                    event_name = "cli.chat.turn",
                    stage = reply.stage.as_str(),
                    delivered = reply.delivered,
                    "chat turn handled"
                );
                replies.push(reply);
            }
            TurnOutcome::Duplicate => {}
        }
    }
    Ok(replies)
}
