//! Yandex backend
//!
//! Implements the SearchBackend trait against Yandex's "search by image"
//! page. Remote images are submitted by URL, staged files as a multipart
//! upload. The result page embeds the similar-sites list as JSON in the
//! `data-state` attribute of the sites section, which is decoded into
//! [`YandexResponse`].

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use super::{http_client, RawSearchResponse, SearchBackend};
use crate::config::{NetworkConfig, YandexConfig};
use crate::error::{SearchError, SearchResult};
use crate::stager::{ImageRef, StagedImage};

const SEARCH_PARAMS: [(&str, &str); 2] = [("rpt", "imageview"), ("cbir_page", "sites")];

static SITES_STATE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.cbir-section.cbir-section_name_sites > div[data-state]").unwrap()
});

/// Decoded Yandex result model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YandexResponse {
    /// Where the user can see the full result page
    pub search_page_url: Option<String>,
    /// Similar sites, in Yandex's own order
    pub sites: Vec<YandexSite>,
}

/// One "sites with this image" entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YandexSite {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumb: Option<YandexThumb>,
    #[serde(default)]
    pub original_image: Option<YandexImageSize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YandexThumb {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YandexImageSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize)]
struct SitesState {
    #[serde(default)]
    sites: Vec<YandexSite>,
}

impl YandexResponse {
    /// Pull the embedded sites model out of a result page
    pub fn from_html(html: &str, search_page_url: Option<String>) -> SearchResult<Self> {
        let document = Html::parse_document(html);
        let state = document
            .select(&SITES_STATE)
            .find_map(|el| el.value().attr("data-state"))
            .ok_or(SearchError::EmptyResponse)?;

        let state: SitesState = serde_json::from_str(state).map_err(|e| {
            tracing::debug!("Undecodable Yandex sites state: {}", e);
            SearchError::EmptyResponse
        })?;

        Ok(Self {
            search_page_url,
            sites: state.sites,
        })
    }
}

/// Yandex backend
pub struct YandexBackend {
    client: Client,
    config: YandexConfig,
}

impl YandexBackend {
    pub fn new(
        config: YandexConfig,
        network: &NetworkConfig,
        timeout: Duration,
    ) -> SearchResult<Self> {
        Ok(Self {
            client: http_client(network, timeout)?,
            config,
        })
    }

    async fn request(&self, staged: &StagedImage) -> SearchResult<reqwest::RequestBuilder> {
        let base = self.config.base_url.as_str();
        let request = match staged.image_ref() {
            ImageRef::Url(url) => self
                .client
                .get(base)
                .query(&SEARCH_PARAMS)
                .query(&[("url", url)]),
            ImageRef::File(path) => {
                let bytes = tokio::fs::read(path).await?;
                let part = Part::bytes(bytes)
                    .file_name(staged.file_name())
                    .mime_str(staged.format().mime_type())?;
                let form = Form::new().text("prg", "1").part("upfile", part);
                self.client
                    .post(base)
                    .query(&SEARCH_PARAMS)
                    .multipart(form)
            }
        };
        Ok(request)
    }
}

#[async_trait]
impl SearchBackend for YandexBackend {
    fn name(&self) -> &str {
        "yandex"
    }

    async fn search(&self, staged: &StagedImage) -> SearchResult<RawSearchResponse> {
        tracing::debug!("Submitting image to Yandex at {}", self.config.base_url);

        let response = self.request(staged).await?.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::HttpStatus(status.as_u16()));
        }

        let page_url = response.url().to_string();
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(SearchError::EmptyResponse);
        }

        let model = YandexResponse::from_html(&body, Some(page_url))?;
        tracing::debug!("Yandex returned {} similar sites", model.sites.len());

        Ok(RawSearchResponse::Metasearch(model))
    }
}
