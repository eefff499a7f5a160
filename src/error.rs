use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("tool `{0}` not found")]
    ToolNotFound(String),

    #[error("tool `{name}` invocation failed: {source}")]
    ToolInvocation {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("language model error: {0}")]
    LanguageModel(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("recursion limit of {0} steps reached without a final answer")]
    RecursionLimit(usize),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl ChatError {
    /// Wraps a provider-side failure message as a tool invocation error.
    pub fn tool(name: impl Into<String>, message: impl Into<String>) -> Self {
        let message: String = message.into();
        ChatError::ToolInvocation {
            name: name.into(),
            source: message.into(),
        }
    }
}
