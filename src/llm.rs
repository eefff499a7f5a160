//! Language model abstraction, the chat-completions client, and the
//! tool-bound [`ModelClient`] used by the conversation graph.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::{ModelConfig, ModelProvider};
use crate::error::{ChatError, Result};
use crate::message::{generate_call_id, Message, Role, ToolCall};
use crate::tool::{ToolDescription, ToolRegistry};

/// Result of a chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// Minimal abstraction around a chat completion provider.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescription],
    ) -> Result<ModelCompletion>;
}

/// A model with the tool descriptors bound once, at construction.
#[derive(Clone)]
pub struct ModelClient {
    model: Arc<dyn LanguageModel>,
    tools: Vec<ToolDescription>,
}

impl ModelClient {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            tools: Vec::new(),
        }
    }

    pub fn bind_tools(mut self, tools: &ToolRegistry) -> Self {
        self.tools = tools.describe();
        self
    }

    pub fn tools(&self) -> &[ToolDescription] {
        &self.tools
    }

    /// Sends the full history and returns the assistant's reply.
    pub async fn invoke(&self, messages: &[Message]) -> Result<Message> {
        let completion = self.model.complete_chat(messages, &self.tools).await?;
        Ok(Message::assistant_with_calls(
            completion.content.unwrap_or_default(),
            completion.tool_calls,
        ))
    }
}

/// Builds the configured provider client and binds `tools` to it.
pub fn build_model_client(cfg: &ModelConfig, tools: &ToolRegistry) -> Result<ModelClient> {
    let client = OpenAiChatClient::from_config(cfg)?;
    tracing::info!(provider = ?cfg.provider, model = %cfg.model, "model client ready");
    Ok(ModelClient::new(Arc::new(client)).bind_tools(tools))
}

fn coalesce_error(status: reqwest::StatusCode, body: &str, provider: &str) -> ChatError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return ChatError::LanguageModel(format!("{provider} rate limit exceeded: {body}"));
    }
    ChatError::LanguageModel(format!("{provider} request failed with {status}: {body}"))
}

fn serialize_tool_arguments(args: &Value) -> String {
    serde_json::to_string(args).unwrap_or_else(|_| args.to_string())
}

/// Chat-completions client for OpenAI and Azure OpenAI deployments.
///
/// Credentials are not checked here; a request made without them fails.
#[derive(Clone)]
pub struct OpenAiChatClient {
    http: reqwest::Client,
    provider: ModelProvider,
    model: String,
    deployment: Option<String>,
    api_version: Option<String>,
    endpoint: Option<String>,
    api_key: Option<String>,
}

impl OpenAiChatClient {
    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = cfg.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            http: builder
                .build()
                .map_err(|err| ChatError::Config(format!("http client error: {err}")))?,
            provider: cfg.provider,
            model: cfg.model.clone(),
            deployment: cfg.deployment.clone(),
            api_version: cfg.api_version.clone(),
            endpoint: cfg.endpoint.clone(),
            api_key: cfg.api_key.clone(),
        })
    }

    fn provider_label(&self) -> &'static str {
        match self.provider {
            ModelProvider::AzureOpenai => "azure_openai",
            ModelProvider::Openai => "openai",
        }
    }

    fn completions_url(&self) -> Result<String> {
        match self.provider {
            ModelProvider::AzureOpenai => {
                let endpoint = self.endpoint.as_deref().ok_or_else(|| {
                    ChatError::LanguageModel("AZURE_OPENAI_ENDPOINT is not set".into())
                })?;
                let deployment = self.deployment.as_deref().ok_or_else(|| {
                    ChatError::LanguageModel("AZURE_OPENAI_DEPLOYMENT_NAME is not set".into())
                })?;
                let api_version = self.api_version.as_deref().ok_or_else(|| {
                    ChatError::LanguageModel("AZURE_OPENAI_API_VERSION is not set".into())
                })?;
                Ok(format!(
                    "{}/openai/deployments/{deployment}/chat/completions?api-version={api_version}",
                    endpoint.trim_end_matches('/')
                ))
            }
            ModelProvider::Openai => {
                let base = self
                    .endpoint
                    .as_deref()
                    .unwrap_or("https://api.openai.com/v1")
                    .trim_end_matches('/');
                Ok(format!("{base}/chat/completions"))
            }
        }
    }

    fn to_openai_messages(&self, messages: &[Message]) -> Vec<OpenAiMessage> {
        messages
            .iter()
            .map(|message| {
                let role = match message.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                }
                .to_string();

                let tool_calls = if message.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        message
                            .tool_calls
                            .iter()
                            .map(|call| OpenAiToolCall {
                                id: Some(call.id.clone()),
                                r#type: "function".to_string(),
                                function: OpenAiFunctionCall {
                                    name: call.name.clone(),
                                    arguments: serialize_tool_arguments(&call.arguments),
                                },
                            })
                            .collect(),
                    )
                };

                // An assistant turn that only requests tools carries no text.
                let content = if message.content.is_empty() && tool_calls.is_some() {
                    None
                } else {
                    Some(message.content.clone())
                };

                OpenAiMessage {
                    role,
                    content,
                    tool_call_id: message.tool_call_id.clone(),
                    tool_calls,
                }
            })
            .collect()
    }

    fn to_openai_tools(&self, tools: &[ToolDescription]) -> Option<Vec<OpenAiTool>> {
        if tools.is_empty() {
            return None;
        }

        Some(
            tools
                .iter()
                .map(|tool| OpenAiTool {
                    r#type: "function".to_string(),
                    function: OpenAiFunction {
                        name: tool.name.clone(),
                        description: Some(tool.description.clone()),
                        parameters: tool.parameters.clone(),
                    },
                })
                .collect(),
        )
    }

    fn build_payload(&self, messages: &[Message], tools: &[ToolDescription]) -> Value {
        let mut payload = json!({
            "messages": self.to_openai_messages(messages),
        });
        if self.provider == ModelProvider::Openai {
            payload["model"] = Value::String(self.model.clone());
        }
        if let Some(tools) = self.to_openai_tools(tools) {
            payload["tools"] = json!(tools);
            payload["tool_choice"] = Value::String("auto".into());
            // One call at a time keeps the tool node strictly sequential.
            payload["parallel_tool_calls"] = Value::Bool(false);
        }
        payload
    }
}

fn completion_from_response(body: OpenAiResponse, provider: &str) -> Result<ModelCompletion> {
    let first = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ChatError::LanguageModel(format!("{provider} returned no choices")))?;

    let tool_calls = first
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let arguments = serde_json::from_str(&call.function.arguments)
                .unwrap_or_else(|_| Value::String(call.function.arguments.clone()));
            ToolCall {
                id: call.id.unwrap_or_else(generate_call_id),
                name: call.function.name,
                arguments,
            }
        })
        .collect();

    Ok(ModelCompletion {
        content: first.message.content,
        tool_calls,
    })
}

#[async_trait]
impl LanguageModel for OpenAiChatClient {
    async fn complete_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescription],
    ) -> Result<ModelCompletion> {
        let provider = self.provider_label();
        let url = self.completions_url()?;
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ChatError::LanguageModel(format!("missing API key for provider `{provider}`"))
        })?;
        let payload = self.build_payload(messages, tools);

        tracing::debug!(provider, messages = messages.len(), tools = tools.len(), "chat completion request");
        let builder = self.http.post(&url);
        let builder = match self.provider {
            ModelProvider::AzureOpenai => builder.header("api-key", api_key),
            ModelProvider::Openai => builder.bearer_auth(api_key),
        };
        let resp = builder
            .json(&payload)
            .send()
            .await
            .map_err(|err| ChatError::LanguageModel(format!("{provider} request error: {err}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body, provider));
        }

        let body: OpenAiResponse = resp.json().await.map_err(|err| {
            ChatError::LanguageModel(format!("{provider} response parse error: {err}"))
        })?;
        completion_from_response(body, provider)
    }
}

/// A deterministic model used for tests and demos.
///
/// Each scripted response is either a JSON directive
/// (`{"action":"respond","content":...}` or
/// `{"action":"call_tool","name":...,"arguments":{...}}`) or plain text,
/// which is returned as the reply verbatim.
pub struct StubModel {
    responses: Mutex<VecDeque<ModelCompletion>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum StubDirective {
    Respond {
        content: String,
    },
    CallTool {
        name: String,
        arguments: Value,
        #[serde(default)]
        id: Option<String>,
    },
}

impl StubModel {
    pub fn new(responses: Vec<String>) -> Arc<Self> {
        Self::from_completions(responses.iter().map(|raw| Self::parse(raw)).collect())
    }

    pub fn from_completions(completions: Vec<ModelCompletion>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(completions.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Every message list the model has been asked to complete, in order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn parse(raw: &str) -> ModelCompletion {
        match serde_json::from_str::<StubDirective>(raw) {
            Ok(StubDirective::Respond { content }) => ModelCompletion {
                content: Some(content),
                tool_calls: Vec::new(),
            },
            Ok(StubDirective::CallTool {
                name,
                arguments,
                id,
            }) => ModelCompletion {
                content: None,
                tool_calls: vec![ToolCall {
                    id: id.unwrap_or_else(generate_call_id),
                    name,
                    arguments,
                }],
            },
            Err(_) => ModelCompletion {
                content: Some(raw.to_string()),
                tool_calls: Vec::new(),
            },
        }
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn complete_chat(
        &self,
        messages: &[Message],
        _tools: &[ToolDescription],
    ) -> Result<ModelCompletion> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        let mut locked = self
            .responses
            .lock()
            .map_err(|_| ChatError::LanguageModel("StubModel poisoned".into()))?;
        locked
            .pop_front()
            .ok_or_else(|| ChatError::LanguageModel("StubModel ran out of scripted responses".into()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    r#type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiTool {
    r#type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}
