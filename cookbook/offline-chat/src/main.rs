//! Runs one scripted turn through the conversation graph without touching
//! the network: a stub model asks for a search and a calculation, then
//! answers.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;

use chatloop::tools::{SearchProvider, SearchResult};
use chatloop::{
    toolkit_with_provider, ConversationGraph, MemoryCheckpointStore, Message, ModelClient,
    StubModel,
};

struct CannedSearch;

#[async_trait]
impl SearchProvider for CannedSearch {
    async fn search(&self, query: &str, max_results: usize) -> chatloop::Result<Vec<SearchResult>> {
        Ok(vec![SearchResult {
            title: format!("Results for {query}"),
            url: "https://example.org/eiffel".into(),
            content: "The Eiffel Tower is 330 metres tall.".into(),
            score: Some(0.97),
        }]
        .into_iter()
        .take(max_results)
        .collect())
    }
}

#[tokio::main]
async fn main() -> chatloop::Result<()> {
    let tools = toolkit_with_provider(Arc::new(CannedSearch), 2);
    let stub = StubModel::new(vec![
        serde_json::json!({
            "action": "call_tool",
            "name": "search",
            "arguments": {"query": "Eiffel Tower height"}
        })
        .to_string(),
        serde_json::json!({
            "action": "call_tool",
            "name": "calculator",
            "arguments": {"expression": "330 / 3"}
        })
        .to_string(),
        "The tower is 330 m tall, so a third of it is 110 m.".to_string(),
    ]);
    let model = ModelClient::new(stub).bind_tools(&tools);
    let graph = ConversationGraph::new(model, tools, Arc::new(MemoryCheckpointStore::new()));

    let mut updates = Box::pin(graph.stream(
        "demo",
        Message::user("How tall is the Eiffel Tower, and what is a third of that?"),
    ));
    while let Some(update) = updates.next().await {
        print!("{}", update?.message);
    }

    let snapshot = graph.get_state("demo").await?;
    println!("\n{} messages in session `{}`", snapshot.values.len(), snapshot.session_id);
    Ok(())
}
