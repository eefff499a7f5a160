use std::sync::Arc;

use crate::config::SearchConfig;
use crate::error::Result;
use crate::tool::ToolRegistry;
use crate::tools::{CalculatorTool, SearchProvider, SearchTool, TavilyClient};

/// The fixed tool list bound to the model: `search`, then `calculator`.
pub fn default_toolkit(search: &SearchConfig) -> Result<ToolRegistry> {
    let provider = Arc::new(TavilyClient::from_config(search)?);
    Ok(toolkit_with_provider(provider, search.max_results))
}

/// Same tool list with a caller-supplied search backend.
pub fn toolkit_with_provider(provider: Arc<dyn SearchProvider>, max_results: usize) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(SearchTool::new(provider, max_results));
    registry.register(CalculatorTool);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_search_then_calculator() {
        let registry = default_toolkit(&SearchConfig::default()).unwrap();
        assert_eq!(registry.names(), vec!["search", "calculator"]);
        assert!(registry
            .describe()
            .iter()
            .all(|tool| tool.parameters.is_some()));
    }
}
