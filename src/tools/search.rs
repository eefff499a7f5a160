//! Web search tool backed by the Tavily search API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::SearchConfig;
use crate::error::{ChatError, Result};
use crate::tool::Tool;

const TOOL_NAME: &str = "search";

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// External search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

#[derive(Clone)]
pub struct TavilyClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl TavilyClient {
    pub fn from_config(cfg: &SearchConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = cfg.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            http: builder
                .build()
                .map_err(|err| ChatError::Config(format!("http client error: {err}")))?,
            endpoint: cfg.endpoint.clone(),
            api_key: cfg.api_key.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_depth: &'static str,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[async_trait]
impl SearchProvider for TavilyClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ChatError::tool(TOOL_NAME, "TAVILY_API_KEY is not set"))?;

        tracing::debug!(query, max_results, "tavily search");
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&TavilyRequest {
                query,
                max_results,
                search_depth: "basic",
            })
            .send()
            .await
            .map_err(|err| ChatError::ToolInvocation {
                name: TOOL_NAME.into(),
                source: Box::new(err),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ChatError::tool(
                TOOL_NAME,
                format!("tavily request failed with {status}: {body}"),
            ));
        }

        let body: TavilyResponse = resp.json().await.map_err(|err| ChatError::ToolInvocation {
            name: TOOL_NAME.into(),
            source: Box::new(err),
        })?;
        Ok(body.results.into_iter().take(max_results).collect())
    }
}

/// The `search` tool: at most `max_results` hits per call, whatever the
/// model asks for.
pub struct SearchTool {
    provider: Arc<dyn SearchProvider>,
    max_results: usize,
}

impl SearchTool {
    pub fn new(provider: Arc<dyn SearchProvider>, max_results: usize) -> Self {
        Self {
            provider,
            max_results: max_results.max(1),
        }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "A search engine optimized for comprehensive, accurate, and trusted results. Useful \
         for when you need to answer questions about current events. Input should be a \
         search query."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query to look up"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return",
                    "minimum": 1,
                    "maximum": self.max_results
                }
            },
            "required": ["query"]
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let query = input
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ChatError::tool(TOOL_NAME, "missing `query` argument"))?;

        let max_results = input
            .get("max_results")
            .and_then(Value::as_u64)
            .map(|n| (n as usize).clamp(1, self.max_results))
            .unwrap_or(self.max_results);

        let results = self.provider.search(query, max_results).await?;
        Ok(json!({ "query": query, "results": results }))
    }
}
