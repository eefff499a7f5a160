//! Line-oriented front end over a [`ConversationGraph`].

use std::io::{BufRead, Write};
use std::pin::pin;
use std::sync::Arc;

use futures::StreamExt;

use crate::error::Result;
use crate::graph::{draw_mermaid, ConversationGraph};
use crate::message::Message;

const PROMPT: &str = "User: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Graph,
    State,
    /// Anything else, including an empty line, is sent to the model as
    /// typed, minus the line ending.
    Message(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        match line.trim().to_ascii_lowercase().as_str() {
            "quit" | "exit" | "q" => Command::Quit,
            "graph" => Command::Graph,
            "state" => Command::State,
            _ => Command::Message(line.trim_end_matches(|c: char| c == '\r' || c == '\n').to_string()),
        }
    }
}

pub struct Shell {
    graph: Arc<ConversationGraph>,
    session_id: String,
}

impl Shell {
    pub fn new(graph: Arc<ConversationGraph>, session_id: impl Into<String>) -> Self {
        Self {
            graph,
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Reads commands until `quit` or end of input.
    ///
    /// A failed turn is reported on `output` and the loop keeps going; only
    /// I/O errors on the streams themselves end it early.
    pub async fn run<R: BufRead, W: Write>(&self, mut input: R, mut output: W) -> Result<()> {
        let mut line = String::new();
        loop {
            write!(output, "{PROMPT}")?;
            output.flush()?;

            line.clear();
            if input.read_line(&mut line)? == 0 {
                writeln!(output)?;
                return Ok(());
            }

            match Command::parse(&line) {
                Command::Quit => {
                    writeln!(output, "Goodbye!")?;
                    return Ok(());
                }
                Command::Graph => {
                    writeln!(output, "Graph structure:")?;
                    writeln!(output, "{}", draw_mermaid())?;
                }
                Command::State => {
                    let snapshot = self.graph.get_state(&self.session_id).await?;
                    writeln!(output, "Current state:")?;
                    writeln!(output, "{}", serde_json::to_string_pretty(&snapshot)?)?;
                }
                Command::Message(text) => self.turn(text, &mut output).await?,
            }
        }
    }

    async fn turn<W: Write>(&self, text: String, output: &mut W) -> Result<()> {
        let mut updates = pin!(self.graph.stream(&self.session_id, Message::user(text)));
        while let Some(update) = updates.next().await {
            match update {
                Ok(update) => write!(output, "{}", update.message)?,
                Err(err) => {
                    tracing::error!(session = %self.session_id, error = %err, "turn failed");
                    writeln!(output, "An error occurred. Please try again. Error: {err}")?;
                }
            }
        }
        output.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::checkpoint::MemoryCheckpointStore;
    use crate::llm::{ModelClient, StubModel};
    use crate::tool::ToolRegistry;
    use crate::tools::CalculatorTool;

    fn shell_with(responses: Vec<String>) -> Shell {
        let mut tools = ToolRegistry::new();
        tools.register(CalculatorTool);
        let model = ModelClient::new(StubModel::new(responses)).bind_tools(&tools);
        let graph = ConversationGraph::new(model, tools, Arc::new(MemoryCheckpointStore::new()));
        Shell::new(Arc::new(graph), "test-session")
    }

    async fn transcript(shell: &Shell, input: &str) -> String {
        let mut output = Vec::new();
        shell.run(Cursor::new(input), &mut output).await.unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("  QUIT \n"), Command::Quit);
        assert_eq!(Command::parse("exit"), Command::Quit);
        assert_eq!(Command::parse("q"), Command::Quit);
        assert_eq!(Command::parse("Graph"), Command::Graph);
        assert_eq!(Command::parse("state\n"), Command::State);
        assert_eq!(Command::parse("\n"), Command::Message(String::new()));
        assert_eq!(
            Command::parse("what is 2+2?\n"),
            Command::Message("what is 2+2?".into())
        );
        assert_eq!(
            Command::parse("  indented text \r\n"),
            Command::Message("  indented text ".into())
        );
    }

    #[tokio::test]
    async fn messages_keep_their_whitespace() {
        let shell = shell_with(vec!["ok".into()]);
        transcript(&shell, "  spaced out  \n").await;

        let history = shell.graph.get_state("test-session").await.unwrap().values;
        assert_eq!(history.messages[0].content, "  spaced out  ");
    }

    #[tokio::test]
    async fn quit_says_goodbye_and_stops_reading() {
        let shell = shell_with(Vec::new());
        let out = transcript(&shell, "quit\nhello\n").await;
        assert!(out.ends_with("Goodbye!\n"));
        assert!(shell.graph.get_state("test-session").await.unwrap().values.is_empty());
    }

    #[tokio::test]
    async fn introspection_does_not_touch_history() {
        let shell = shell_with(Vec::new());
        let out = transcript(&shell, "graph\nstate\n").await;

        assert!(out.contains("Graph structure:"));
        assert!(out.contains("tools --> chatbot;"));
        assert!(out.contains("Current state:"));
        assert!(out.contains("\"session_id\": \"test-session\""));
        assert!(shell.graph.get_state("test-session").await.unwrap().values.is_empty());
    }

    #[tokio::test]
    async fn prints_every_step_of_a_turn() {
        let shell = shell_with(vec![
            r#"{"action":"call_tool","name":"calculator","arguments":{"expression":"6*7"},"id":"call_a"}"#.into(),
            r#"{"action":"respond","content":"The answer is 42."}"#.into(),
        ]);
        let out = transcript(&shell, "what is 6*7?\n").await;

        assert!(out.contains("Human Message"));
        assert!(out.contains("calculator (call_a)"));
        assert!(out.contains("Tool Message"));
        assert!(out.contains("\n42\n"));
        assert!(out.contains("The answer is 42."));
    }

    #[tokio::test]
    async fn failed_turn_keeps_the_session_alive() {
        // One scripted reply: the first turn succeeds, the second runs dry.
        let shell = shell_with(vec!["first".into()]);
        let out = transcript(&shell, "one\ntwo\nstate\nquit\n").await;

        assert!(out.contains("An error occurred. Please try again. Error: language model error"));
        assert!(out.contains("Current state:"));
        assert!(out.ends_with("Goodbye!\n"));

        let history = shell.graph.get_state("test-session").await.unwrap().values;
        assert_eq!(history.len(), 3);
    }
}
