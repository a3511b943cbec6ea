use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sumo_search_mcp::client::SumoClient;
use sumo_search_mcp::config::{Config, ServerMode};
use sumo_search_mcp::http::serve_http;
use sumo_search_mcp::masking::PatternMasker;
use sumo_search_mcp::mcp::run_stdio;
use sumo_search_mcp::search::SearchEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout 留给 stdio JSON-RPC
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match env::args().nth(1) {
        Some(path) => {
            let path = Path::new(&path);
            info!("loading config from {}", path.display());
            Config::load_from_path(path)?
        }
        None => Config::from_env()?,
    };
    if config.sumo.access_id.is_empty() || config.sumo.access_key.is_empty() {
        tracing::warn!("SUMO_ACCESS_ID / SUMO_ACCESS_KEY not set; backend calls will be rejected");
    }

    let backend = SumoClient::new(&config.sumo).context("failed to build Sumo Logic client")?;
    let masker = PatternMasker::from_config(&config.masking)?;
    info!("masking rules: {:?}", masker.rule_names());
    let engine = Arc::new(SearchEngine::new(
        Arc::new(backend),
        Arc::new(masker),
        config.search.clone(),
    ));

    match config.server.mode {
        ServerMode::Stdio => run_stdio(engine).await?,
        ServerMode::Http => serve_http(engine, &config.server).await?,
        ServerMode::Both => {
            let http_engine = engine.clone();
            let server = config.server.clone();
            let http_task = tokio::spawn(async move { serve_http(http_engine, &server).await });
            let stdio_task = tokio::spawn(async move { run_stdio(engine).await });
            http_task.await.context("http task panicked")??;
            stdio_task.await.context("stdio task panicked")??;
        }
    }

    Ok(())
}
