//! The conversation loop: a two-node state machine.
//!
//! ```text
//! START -> chatbot
//! chatbot -> tools      (last message requests a tool)
//! chatbot -> END        (otherwise)
//! tools   -> chatbot
//! ```
//!
//! Every node execution appends exactly one message to the session's
//! [`ConversationState`]; the chatbot node always sends the whole history.

use std::fmt;
use std::sync::Arc;

use futures::stream::{self, Stream, TryStreamExt};
use serde::Serialize;

use crate::checkpoint::CheckpointStore;
use crate::error::{ChatError, Result};
use crate::llm::ModelClient;
use crate::message::Message;
use crate::state::ConversationState;
use crate::tool::ToolRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Chat,
    Tool,
}

impl Node {
    pub fn label(self) -> &'static str {
        match self {
            Node::Chat => "chatbot",
            Node::Tool => "tools",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a streamed message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepSource {
    Input,
    Node(Node),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepUpdate {
    pub source: StepSource,
    pub message: Message,
}

/// Read-only view of a session, as printed by the `state` command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub session_id: String,
    pub values: ConversationState,
    pub next: Option<Node>,
}

/// The conditional edge out of the chatbot node.
pub fn route(message: &Message) -> Option<Node> {
    if message.has_tool_calls() {
        Some(Node::Tool)
    } else {
        None
    }
}

/// Mermaid flowchart of the node/edge structure.
pub fn draw_mermaid() -> String {
    [
        "graph TD;",
        "\t__start__([<p>__start__</p>]):::first",
        "\tchatbot(chatbot)",
        "\ttools(tools)",
        "\t__end__([<p>__end__</p>]):::last",
        "\t__start__ --> chatbot;",
        "\tchatbot -.-> __end__;",
        "\tchatbot -.-> tools;",
        "\ttools --> chatbot;",
        "\tclassDef default fill:#f2f0ff,line-height:1.2",
        "\tclassDef first fill-opacity:0",
        "\tclassDef last fill:#bfb6fc",
    ]
    .join("\n")
}

enum Cursor {
    Start(Message),
    At { node: Node, steps: usize },
    Done,
}

pub struct ConversationGraph {
    model: ModelClient,
    tools: ToolRegistry,
    store: Arc<dyn CheckpointStore>,
    recursion_limit: usize,
}

impl ConversationGraph {
    pub fn new(model: ModelClient, tools: ToolRegistry, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            model,
            tools,
            store,
            recursion_limit: 25,
        }
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit.max(1);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Runs one turn, yielding the accepted input and then every message the
    /// nodes produce. The stream ends after the first reply without a tool
    /// call, or after the first error.
    pub fn stream<'a>(
        &'a self,
        session_id: &'a str,
        input: Message,
    ) -> impl Stream<Item = Result<StepUpdate>> + 'a {
        stream::try_unfold(Cursor::Start(input), move |cursor| self.advance(session_id, cursor))
    }

    async fn advance(&self, session_id: &str, cursor: Cursor) -> Result<Option<(StepUpdate, Cursor)>> {
        let (node, steps) = match cursor {
            Cursor::Start(message) => {
                tracing::info!(session = session_id, "turn started");
                self.store.append(session_id, message.clone()).await?;
                let update = StepUpdate {
                    source: StepSource::Input,
                    message,
                };
                return Ok(Some((update, Cursor::At { node: Node::Chat, steps: 0 })));
            }
            Cursor::At { node, steps } => (node, steps),
            Cursor::Done => return Ok(None),
        };

        if steps >= self.recursion_limit {
            return Err(ChatError::RecursionLimit(self.recursion_limit));
        }
        let (message, next) = match node {
            Node::Chat => {
                let reply = self.chat_step(session_id).await?;
                let next = route(&reply);
                (reply, next)
            }
            Node::Tool => (self.tool_step(session_id).await?, Some(Node::Chat)),
        };
        tracing::debug!(session = session_id, %node, next = ?next, "step complete");

        let cursor = match next {
            Some(node) => Cursor::At {
                node,
                steps: steps + 1,
            },
            None => {
                tracing::info!(session = session_id, steps = steps + 1, "turn complete");
                Cursor::Done
            }
        };
        let update = StepUpdate {
            source: StepSource::Node(node),
            message,
        };
        Ok(Some((update, cursor)))
    }

    /// Runs one turn to completion and returns the final assistant reply.
    pub async fn invoke(&self, session_id: &str, input: Message) -> Result<Message> {
        let updates: Vec<StepUpdate> = self.stream(session_id, input).try_collect().await?;
        updates
            .into_iter()
            .last()
            .map(|update| update.message)
            .ok_or_else(|| ChatError::ProtocolViolation("turn produced no messages".into()))
    }

    pub async fn get_state(&self, session_id: &str) -> Result<StateSnapshot> {
        let values = self.store.get_state(session_id).await?.unwrap_or_default();
        Ok(StateSnapshot {
            session_id: session_id.to_string(),
            values,
            next: None,
        })
    }

    async fn chat_step(&self, session_id: &str) -> Result<Message> {
        let state = self.store.get_or_create(session_id).await?;
        let reply = self.model.invoke(&state.messages).await?;
        if reply.tool_calls.len() > 1 {
            return Err(ChatError::ProtocolViolation(format!(
                "model requested {} tool calls at once; only sequential calls are supported",
                reply.tool_calls.len()
            )));
        }
        self.store.append(session_id, reply.clone()).await?;
        Ok(reply)
    }

    async fn tool_step(&self, session_id: &str) -> Result<Message> {
        let state = self.store.get_or_create(session_id).await?;
        let call = state
            .last()
            .and_then(|message| message.tool_calls.first())
            .cloned()
            .ok_or_else(|| {
                ChatError::ProtocolViolation("tool node reached without a pending tool call".into())
            })?;
        tracing::debug!(session = session_id, tool = %call.name, call_id = %call.id, "running tool");
        let result = self.tools.execute(&call).await;
        self.store.append(session_id, result.clone()).await?;
        Ok(result)
    }
}
