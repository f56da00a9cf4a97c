//! MCP Server implementation for reverse image search
//!
//! Exposes the search pipeline as tools. A search never fails at the protocol
//! level once its arguments are valid; backend trouble comes back as the
//! fallback text.

use anyhow::Result;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::SearchPipeline;
use crate::types::{InboundImage, Reply, ReplyPart};

/// The main Image Search MCP Server
#[derive(Clone)]
pub struct ImageSearchMcpServer {
    pipeline: Arc<SearchPipeline>,
    config: Config,
    tool_router: ToolRouter<Self>,
}

// ============================================================================
// Parameter Types
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct ReverseImageSearchParams {
    /// Inline image data
    #[schemars(description = "Base64 image data, with or without a data: URI header")]
    pub image_base64: Option<String>,
    /// Remote image location
    #[schemars(description = "Publicly reachable image URL (used when no base64 data is given)")]
    pub image_url: Option<String>,
    /// Optional format hint for inline data
    #[schemars(description = "MIME type or extension of the inline data, e.g. image/png")]
    pub mime_hint: Option<String>,
}

impl ReverseImageSearchParams {
    /// Inline data wins over a URL when both are supplied
    fn into_inbound(self) -> Option<InboundImage> {
        let present = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        match (present(self.image_base64), present(self.image_url)) {
            (Some(payload), _) => Some(InboundImage::Base64 {
                mime_hint: self.mime_hint,
                payload,
            }),
            (None, Some(url)) => Some(InboundImage::Url { url }),
            (None, None) => None,
        }
    }
}

// ============================================================================
// Tool Router Implementation
// ============================================================================

#[tool_router]
impl ImageSearchMcpServer {
    pub async fn new(config: Config) -> Result<Self> {
        let pipeline = SearchPipeline::from_config(&config).await?;
        tracing::info!(
            "Using {} backend (timeout: {}s)",
            pipeline.backend_name(),
            config.search.timeout_seconds
        );
        Ok(Self::with_pipeline(Arc::new(pipeline), config))
    }

    /// Wrap an already built pipeline
    pub fn with_pipeline(pipeline: Arc<SearchPipeline>, config: Config) -> Self {
        Self {
            pipeline,
            config,
            tool_router: Self::tool_router(),
        }
    }

    pub fn pipeline(&self) -> &Arc<SearchPipeline> {
        &self.pipeline
    }

    /// Release backend resources; call once the transport has closed
    pub async fn shutdown(&self) {
        self.pipeline.shutdown().await;
    }

    // ========================================================================
    // Search Tools
    // ========================================================================

    #[tool(
        description = "Reverse image search. Give an image as base64 data or a URL; returns the best matching source, title, author and a thumbnail link."
    )]
    async fn reverse_image_search(
        &self,
        Parameters(params): Parameters<ReverseImageSearchParams>,
    ) -> Result<CallToolResult, McpError> {
        let image = params.into_inbound().ok_or_else(|| {
            McpError::invalid_params("Either image_base64 or image_url is required", None)
        })?;

        match &image {
            InboundImage::Base64 { payload, .. } => {
                tracing::info!("Reverse searching inline image ({} chars)", payload.len())
            }
            InboundImage::Url { url } => tracing::info!("Reverse searching {}", url),
        }

        let reply = self.pipeline.run(&image).await;
        Ok(CallToolResult::success(reply_contents(&reply)))
    }

    #[tool(description = "Get the active reverse image search backend and its settings.")]
    async fn search_status(&self) -> Result<CallToolResult, McpError> {
        #[derive(Serialize)]
        struct SearchStatus {
            backend: String,
            timeout_seconds: u64,
            proxy_configured: bool,
        }

        let status = SearchStatus {
            backend: self.pipeline.backend_name().to_string(),
            timeout_seconds: self.config.search.timeout_seconds,
            proxy_configured: self.config.network.proxy.is_some(),
        };

        let json = serde_json::to_string_pretty(&status)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}

fn reply_contents(reply: &Reply) -> Vec<Content> {
    reply
        .parts()
        .iter()
        .map(|part| match part {
            ReplyPart::Text { value } => Content::text(value.clone()),
            ReplyPart::Image { url } => Content::text(format!("![thumbnail]({url})")),
        })
        .collect()
}

// ============================================================================
// Server Handler Implementation
// ============================================================================

#[tool_handler]
impl rmcp::ServerHandler for ImageSearchMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Image Search MCP Server - finds where an image comes from. Pass the image \
                 as base64 or a URL to reverse_image_search; the result lists the best match \
                 with its source, author and a thumbnail. Backends: Yandex, SauceNAO, or a \
                 headless browser."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
