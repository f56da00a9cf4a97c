//! Image Search MCP Server
//!
//! Reverse image search over Yandex, SauceNAO or a headless browser.
//!
//! # Configuration
//! Set `IMAGE_SEARCH_BACKEND` / `IMAGE_SEARCH_PROXY` or configure in
//! `~/.binks/image-search.toml`

use rmcp::{transport::stdio, ServiceExt};

use image_search_mcp::{init_tracing, Config, ImageSearchMcpServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("image_search_mcp")?;

    tracing::info!("Starting Image Search MCP Server");

    let config = Config::load()?;
    tracing::info!("Backend: {}", config.search.backend);

    let server = ImageSearchMcpServer::new(config).await?;
    let service = server.clone().serve(stdio()).await?;

    tracing::info!("Server running, waiting for requests...");
    let result = service.waiting().await;

    tracing::info!("Server shutting down");
    server.shutdown().await;
    result?;
    Ok(())
}
