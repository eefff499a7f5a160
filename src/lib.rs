//! A terminal chat agent that alternates between a hosted language model and
//! local tools.
//!
//! The crate provides:
//! - A language model abstraction (`LanguageModel`) with an OpenAI/Azure
//!   chat-completions client and a scripted `StubModel`.
//! - A tool interface (`Tool` and `ToolRegistry`) with `search` and
//!   `calculator` tools.
//! - A `ConversationGraph` that loops between the model and tools, one tool
//!   call at a time, over per-session state held in a `CheckpointStore`.
//! - An interactive `Shell` driving the graph from any reader/writer pair.

mod checkpoint;
mod config;
mod error;
mod graph;
mod llm;
mod message;
mod shell;
mod state;
mod telemetry;
mod tool;
mod toolkit;
pub mod tools;

pub use checkpoint::{CheckpointStore, MemoryCheckpointStore};
pub use config::{AppConfig, ModelConfig, ModelProvider, SearchConfig, SessionConfig};
pub use error::{ChatError, Result};
pub use graph::{draw_mermaid, route, ConversationGraph, Node, StateSnapshot, StepSource, StepUpdate};
pub use llm::{build_model_client, LanguageModel, ModelClient, ModelCompletion, OpenAiChatClient, StubModel};
pub use message::{Message, Role, ToolCall};
pub use shell::{Command, Shell};
pub use state::ConversationState;
pub use telemetry::init_tracing;
pub use tool::{Tool, ToolDescription, ToolRegistry};
pub use toolkit::{default_toolkit, toolkit_with_provider};
