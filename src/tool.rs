use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ChatError, Result};
use crate::message::{Message, ToolCall};

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// JSON Schema object describing the expected arguments.
    fn parameters(&self) -> Option<Value> {
        None
    }

    async fn call(&self, input: Value) -> Result<Value>;
}

/// Static description of a tool, bound to the model so it can request calls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    pub parameters: Option<Value>,
}

/// Tools in registration order. Registering a name twice replaces the
/// earlier tool without moving it.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let tool: Arc<dyn Tool> = Arc::new(tool);
        match self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(existing) => *existing = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn describe(&self) -> Vec<ToolDescription> {
        self.tools
            .iter()
            .map(|tool| ToolDescription {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    pub async fn call(&self, name: &str, input: Value) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| ChatError::ToolNotFound(name.to_string()))?;
        tool.call(input).await.map_err(|err| match err {
            err @ ChatError::ToolInvocation { .. } => err,
            other => ChatError::ToolInvocation {
                name: name.to_string(),
                source: Box::new(other),
            },
        })
    }

    /// Runs one requested call and packages the outcome as a `tool` message.
    ///
    /// Failures never escape: they are rendered as `Error: ...` text so the
    /// model can see what went wrong and re-plan.
    pub async fn execute(&self, call: &ToolCall) -> Message {
        let content = match self.call(&call.name, call.arguments.clone()).await {
            Ok(Value::String(text)) => text,
            Ok(value) => value.to_string(),
            Err(ChatError::ToolNotFound(name)) => {
                tracing::warn!(tool = %name, "model requested an unknown tool");
                format!(
                    "Error: {name} is not a valid tool, try one of [{}].",
                    self.names().join(", ")
                )
            }
            Err(err) => {
                tracing::warn!(tool = %call.name, error = %err, "tool call failed");
                format!("Error: {err}")
            }
        };
        Message::tool(call, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::message::Role;

    struct First;
    struct Second;
    struct Broken;

    #[async_trait]
    impl Tool for First {
        fn name(&self) -> &str {
            "z_first"
        }

        fn description(&self) -> &str {
            "First tool"
        }

        async fn call(&self, input: Value) -> Result<Value> {
            Ok(input)
        }
    }

    #[async_trait]
    impl Tool for Second {
        fn name(&self) -> &str {
            "a_second"
        }

        fn description(&self) -> &str {
            "Second tool"
        }

        async fn call(&self, _input: Value) -> Result<Value> {
            Ok(Value::String("plain text".into()))
        }
    }

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        async fn call(&self, _input: Value) -> Result<Value> {
            Err(ChatError::tool("broken", "upstream unavailable"))
        }
    }

    #[test]
    fn keeps_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(First);
        registry.register(Second);

        let names: Vec<String> = registry.describe().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["z_first", "a_second"]);
    }

    #[tokio::test]
    async fn execute_answers_the_call_id() {
        let mut registry = ToolRegistry::new();
        registry.register(First);
        registry.register(Second);

        let call = ToolCall::new("a_second", json!({})).with_id("call_7");
        let reply = registry.execute(&call).await;

        assert_eq!(reply.role, Role::Tool);
        assert_eq!(reply.tool_call_id.as_deref(), Some("call_7"));
        assert_eq!(reply.content, "plain text");

        let call = ToolCall::new("z_first", json!({"k": 1}));
        assert_eq!(registry.execute(&call).await.content, r#"{"k":1}"#);
    }

    #[tokio::test]
    async fn failures_become_error_text() {
        let mut registry = ToolRegistry::new();
        registry.register(First);
        registry.register(Broken);

        let reply = registry.execute(&ToolCall::new("broken", json!({}))).await;
        assert!(reply.content.starts_with("Error: "));
        assert!(reply.content.contains("upstream unavailable"));

        let reply = registry.execute(&ToolCall::new("nope", json!({}))).await;
        assert_eq!(
            reply.content,
            "Error: nope is not a valid tool, try one of [z_first, broken]."
        );
    }
}
