//! chatloop - interactive chat agent entry point.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use chatloop::{
    build_model_client, default_toolkit, init_tracing, AppConfig, ConversationGraph,
    MemoryCheckpointStore, Shell,
};

#[derive(Debug, Parser)]
#[command(name = "chatloop", version, about = "Chat with a model that can search the web and do arithmetic")]
struct Cli {
    /// TOML configuration file; environment variables override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Session identifier. Defaults to the local start time.
    #[arg(long)]
    session: Option<String>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, env = "CHATLOOP_LOG", default_value = "warn")]
    log: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log);

    let config = match &cli.config {
        Some(path) => AppConfig::from_env_or_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => AppConfig::from_env()?,
    };
    info!(
        provider = ?config.model.provider,
        model = %config.model.model,
        "loaded configuration"
    );

    let tools = default_toolkit(&config.search)?;
    let model = build_model_client(&config.model, &tools)?;
    let store = Arc::new(MemoryCheckpointStore::with_capacity(config.session.max_sessions));
    let graph = ConversationGraph::new(model, tools, store)
        .with_recursion_limit(config.session.recursion_limit);

    let session_id = cli
        .session
        .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d-%H:%M:%S").to_string());
    info!(session = %session_id, "starting shell");

    let shell = Shell::new(Arc::new(graph), session_id);
    shell.run(io::stdin().lock(), io::stdout().lock()).await?;
    Ok(())
}
