use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::json;

use chatloop::tools::{calculate, SearchProvider, SearchResult};
use chatloop::{
    toolkit_with_provider, ChatError, ConversationGraph, MemoryCheckpointStore, Message,
    ModelClient, Role, StepUpdate, StubModel,
};

struct OneHit;

#[async_trait]
impl SearchProvider for OneHit {
    async fn search(&self, query: &str, _max_results: usize) -> chatloop::Result<Vec<SearchResult>> {
        Ok(vec![SearchResult {
            title: query.to_string(),
            url: "https://example.org".into(),
            content: "found it".into(),
            score: None,
        }])
    }
}

struct Offline;

#[async_trait]
impl SearchProvider for Offline {
    async fn search(&self, _query: &str, _max_results: usize) -> chatloop::Result<Vec<SearchResult>> {
        Err(ChatError::tool("search", "connection refused"))
    }
}

fn graph(provider: Arc<dyn SearchProvider>, stub: Arc<StubModel>) -> ConversationGraph {
    let tools = toolkit_with_provider(provider, 2);
    let model = ModelClient::new(stub).bind_tools(&tools);
    ConversationGraph::new(model, tools, Arc::new(MemoryCheckpointStore::new()))
}

fn respond(text: &str) -> String {
    json!({"action": "respond", "content": text}).to_string()
}

fn call(name: &str, arguments: serde_json::Value, id: &str) -> String {
    json!({"action": "call_tool", "name": name, "arguments": arguments, "id": id}).to_string()
}

#[tokio::test]
async fn plain_turns_grow_history_by_two() {
    let stub = StubModel::new(vec![respond("one"), respond("two"), respond("three")]);
    let graph = graph(Arc::new(OneHit), stub);

    for (i, question) in ["a", "b", "c"].into_iter().enumerate() {
        graph.invoke("s", Message::user(question)).await.unwrap();
        let state = graph.get_state("s").await.unwrap().values;
        assert_eq!(state.len(), 2 * (i + 1));
    }

    let roles: Vec<Role> = graph
        .get_state("s")
        .await
        .unwrap()
        .values
        .iter()
        .map(|m| m.role)
        .collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
}

#[tokio::test]
async fn tool_call_adds_a_call_and_its_result() {
    let stub = StubModel::new(vec![
        call("search", json!({"query": "rust 2024 edition"}), "call_s"),
        respond("It shipped with Rust 1.85."),
    ]);
    let graph = graph(Arc::new(OneHit), stub);

    let updates: Vec<StepUpdate> = graph
        .stream("s", Message::user("when did the 2024 edition ship?"))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(updates.len(), 4);

    let history = graph.get_state("s").await.unwrap().values;
    assert_eq!(history.len(), 4);
    let request = &history.messages[1];
    let result = &history.messages[2];
    assert_eq!(request.tool_calls.len(), 1);
    assert_eq!(result.role, Role::Tool);
    assert_eq!(result.tool_call_id.as_deref(), Some(request.tool_calls[0].id.as_str()));
    assert!(result.content.contains("found it"));
    assert_eq!(history.messages[3].content, "It shipped with Rust 1.85.");
}

#[tokio::test]
async fn sessions_do_not_share_history() {
    let stub = StubModel::new(vec![respond("hi a"), respond("hi b"), respond("again a")]);
    let graph = graph(Arc::new(OneHit), stub.clone());

    graph.invoke("a", Message::user("from a")).await.unwrap();
    graph.invoke("b", Message::user("from b")).await.unwrap();
    graph.invoke("a", Message::user("a again")).await.unwrap();

    assert_eq!(graph.get_state("a").await.unwrap().values.len(), 4);
    assert_eq!(graph.get_state("b").await.unwrap().values.len(), 2);

    // Session b's first request carried none of a's messages.
    let requests = stub.requests();
    assert_eq!(requests[1].len(), 1);
    assert_eq!(requests[1][0].content, "from b");
}

#[tokio::test]
async fn search_failure_is_reported_to_the_model() {
    let stub = StubModel::new(vec![
        call("search", json!({"query": "news"}), "call_n"),
        respond("Search is unavailable right now."),
    ]);
    let graph = graph(Arc::new(Offline), stub.clone());

    let reply = graph.invoke("s", Message::user("any news?")).await.unwrap();
    assert_eq!(reply.content, "Search is unavailable right now.");

    let tool_message = &stub.requests()[1][2];
    assert_eq!(tool_message.role, Role::Tool);
    assert!(tool_message.content.starts_with("Error:"));
    assert!(tool_message.content.contains("connection refused"));
}

#[tokio::test]
async fn unknown_tool_lists_the_valid_ones() {
    let stub = StubModel::new(vec![
        call("weather", json!({"city": "Oslo"}), "call_w"),
        respond("I cannot check the weather."),
    ]);
    let graph = graph(Arc::new(OneHit), stub);

    graph.invoke("s", Message::user("weather?")).await.unwrap();
    let history = graph.get_state("s").await.unwrap().values;
    assert_eq!(
        history.messages[2].content,
        "Error: weather is not a valid tool, try one of [search, calculator]."
    );
}

#[test]
fn calculator_matches_expected_outputs() {
    assert_eq!(calculate("2 + 3"), "5");
    assert_eq!(calculate("sqrt(16)"), "4.0");
    assert_eq!(calculate("10 / 4"), "2.5");
    assert_eq!(calculate("2 ** 10"), "1024");
    assert!(calculate("1/0").starts_with("Error:"));
    assert!(calculate("1/0").ends_with("Please check your mathematical expression."));
}
