use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl Role {
    fn title(self) -> &'static str {
        match self {
            Role::User => "Human",
            Role::Assistant => "Ai",
            Role::Tool => "Tool",
        }
    }
}

/// A structured request from the model to run a named tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: generate_call_id(),
            name: name.into(),
            arguments,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

pub(crate) fn generate_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// One turn's content in a conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set on `tool` messages: the call this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Set on `tool` messages: the tool that produced the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn assistant_with_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Assistant, content)
        }
    }

    pub fn tool(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call.id.clone()),
            name: Some(call.name.clone()),
            ..Self::new(Role::Tool, content)
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Renders a message the way the shell prints it: a title bar, then the body.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = format!(" {} Message ", self.role.title());
        writeln!(f, "{title:=^80}")?;
        if let Some(name) = &self.name {
            writeln!(f, "Name: {name}")?;
        }
        writeln!(f)?;
        if !self.content.is_empty() {
            writeln!(f, "{}", self.content)?;
        }
        if !self.tool_calls.is_empty() {
            writeln!(f, "Tool Calls:")?;
            for call in &self.tool_calls {
                writeln!(f, "  {} ({})", call.name, call.id)?;
                writeln!(f, " Call ID: {}", call.id)?;
                writeln!(f, "  Args:")?;
                match &call.arguments {
                    Value::Object(map) => {
                        for (key, value) in map {
                            match value {
                                Value::String(s) => writeln!(f, "    {key}: {s}")?,
                                other => writeln!(f, "    {key}: {other}")?,
                            }
                        }
                    }
                    other => writeln!(f, "    {other}")?,
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn title_bar_is_eighty_columns() {
        let rendered = Message::user("hello").to_string();
        let first = rendered.lines().next().unwrap();
        assert_eq!(first.chars().count(), 80);
        assert!(first.contains(" Human Message "));
        assert!(rendered.contains("hello"));
    }

    #[test]
    fn tool_message_references_call() {
        let call = ToolCall::new("calculator", json!({"expression": "2+3"}));
        let reply = Message::tool(&call, "5");

        assert_eq!(reply.role, Role::Tool);
        assert_eq!(reply.tool_call_id.as_deref(), Some(call.id.as_str()));
        assert!(reply.to_string().contains("Name: calculator"));
    }

    #[test]
    fn renders_requested_calls() {
        let call = ToolCall::new("search", json!({"query": "rust"})).with_id("call_1");
        let rendered = Message::assistant_with_calls("", vec![call]).to_string();

        assert!(rendered.contains("search (call_1)"));
        assert!(rendered.contains("query: rust"));
    }

    #[test]
    fn fresh_messages_get_distinct_ids() {
        assert_ne!(Message::user("a").id, Message::user("a").id);
    }
}
