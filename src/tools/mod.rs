//! Tools exposed to the model: a web search lookup and an arithmetic evaluator.

pub mod calculator;
pub mod search;

pub use calculator::{calculate, CalculatorTool};
pub use search::{SearchProvider, SearchResult, SearchTool, TavilyClient};
