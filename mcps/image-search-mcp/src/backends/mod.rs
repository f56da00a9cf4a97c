//! Search backend implementations
//!
//! This module provides a trait-based abstraction for reverse image search
//! backends. Each backend returns its own [`RawSearchResponse`] variant, and
//! the same tag selects the parser in [`crate::parsers`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{BackendKind, Config, NetworkConfig};
use crate::error::SearchResult;
use crate::stager::StagedImage;

pub mod browser;
pub mod saucenao;
pub mod yandex;

pub use browser::{BrowserBackend, DomFields};
pub use saucenao::{HtmlDocument, SauceNaoBackend};
pub use yandex::{YandexBackend, YandexResponse};

/// Backend-specific payload, consumed only by the matching parser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawSearchResponse {
    /// Structured model decoded from the metasearch service
    Metasearch(YandexResponse),
    /// Result page fetched from a scraped search engine
    Html(HtmlDocument),
    /// Field strings read off a live page
    Dom(DomFields),
}

/// Trait for reverse image search backends
///
/// Implementations must be usable from many concurrent invocations; any
/// internal single-writer resource is serialized by the backend itself.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Get the name of this backend
    fn name(&self) -> &str;

    /// Run one search for the staged image
    async fn search(&self, staged: &StagedImage) -> SearchResult<RawSearchResponse>;

    /// Release long-lived resources. Called once when the host shuts down.
    async fn shutdown(&self) {}
}

/// Build the backend selected in the configuration
///
/// The browser backend launches its browser here, once.
pub async fn build_backend(config: &Config) -> SearchResult<Arc<dyn SearchBackend>> {
    let backend: Arc<dyn SearchBackend> = match config.search.backend {
        BackendKind::Yandex => Arc::new(YandexBackend::new(
            config.yandex.clone(),
            &config.network,
            config.search.timeout(),
        )?),
        BackendKind::Saucenao => Arc::new(SauceNaoBackend::new(
            config.saucenao.clone(),
            &config.network,
            config.search.timeout(),
        )?),
        BackendKind::Browser => Arc::new(BrowserBackend::open(config.browser.clone()).await?),
    };
    tracing::info!("Using {} backend", backend.name());
    Ok(backend)
}

/// Shared, pooled HTTP client for the HTTP backends
///
/// Sends a browser-like header set plus any configured extra headers, and
/// goes through the configured proxy when there is one.
pub(crate) fn http_client(network: &NetworkConfig, timeout: Duration) -> SearchResult<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        reqwest::header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );

    for (name, value) in &network.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!("Skipping invalid custom header: {}", name),
        }
    }

    let mut builder = Client::builder()
        .user_agent(&network.user_agent)
        .default_headers(headers)
        .timeout(timeout);

    if let Some(proxy) = &network.proxy {
        tracing::debug!("Routing search traffic through proxy {}", proxy);
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }

    Ok(builder.build()?)
}
