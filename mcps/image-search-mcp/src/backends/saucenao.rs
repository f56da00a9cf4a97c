//! SauceNAO backend
//!
//! Submits the image through SauceNAO's public search form and returns the
//! HTML result page untouched; see [`crate::parsers::html`] for the parsing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{http_client, RawSearchResponse, SearchBackend};
use crate::config::{NetworkConfig, SauceNaoConfig};
use crate::error::{SearchError, SearchResult};
use crate::stager::{ImageRef, StagedImage};

/// A fetched result page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlDocument {
    /// Final URL of the result page, after redirects
    pub page_url: Option<String>,
    pub body: String,
}

/// SauceNAO backend
pub struct SauceNaoBackend {
    client: Client,
    config: SauceNaoConfig,
    origin: Option<String>,
}

impl SauceNaoBackend {
    pub fn new(
        config: SauceNaoConfig,
        network: &NetworkConfig,
        timeout: Duration,
    ) -> SearchResult<Self> {
        let origin = url::Url::parse(&config.endpoint)
            .ok()
            .map(|u| u.origin().ascii_serialization())
            .filter(|o| o != "null");

        Ok(Self {
            client: http_client(network, timeout)?,
            config,
            origin,
        })
    }

    /// Fixed form fields sent with every search
    fn form_fields(&self) -> [(&'static str, String); 3] {
        [
            ("frame", "1".to_string()),
            ("hide", "0".to_string()),
            ("database", self.config.database.to_string()),
        ]
    }

    async fn request(&self, staged: &StagedImage) -> SearchResult<reqwest::RequestBuilder> {
        let mut request = self.client.post(&self.config.endpoint);
        if let Some(origin) = &self.origin {
            request = request
                .header(reqwest::header::ORIGIN, origin)
                .header(reqwest::header::REFERER, format!("{origin}/"));
        }

        let request = match staged.image_ref() {
            ImageRef::Url(url) => {
                let mut fields = vec![("url", url.to_string())];
                fields.extend(self.form_fields());
                request.form(&fields)
            }
            ImageRef::File(path) => {
                let bytes = tokio::fs::read(path).await?;
                let part = Part::bytes(bytes)
                    .file_name(staged.file_name())
                    .mime_str(staged.format().mime_type())?;
                let form = self
                    .form_fields()
                    .into_iter()
                    .fold(Form::new(), |form, (name, value)| form.text(name, value))
                    .part("file", part);
                request.multipart(form)
            }
        };
        Ok(request)
    }
}

#[async_trait]
impl SearchBackend for SauceNaoBackend {
    fn name(&self) -> &str {
        "saucenao"
    }

    async fn search(&self, staged: &StagedImage) -> SearchResult<RawSearchResponse> {
        tracing::debug!("Submitting image to SauceNAO at {}", self.config.endpoint);

        let response = self.request(staged).await?.send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(SearchError::HttpStatus(status.as_u16()));
        }

        let page_url = response.url().to_string();
        let body = response.text().await?;
        tracing::debug!("SauceNAO returned {} bytes of HTML", body.len());

        Ok(RawSearchResponse::Html(HtmlDocument {
            page_url: Some(page_url),
            body,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_from_endpoint() {
        let backend = SauceNaoBackend::new(
            SauceNaoConfig::default(),
            &NetworkConfig::default(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(backend.origin.as_deref(), Some("https://saucenao.com"));
    }

    #[test]
    fn test_form_fields_use_configured_database() {
        let config = SauceNaoConfig {
            database: 5,
            ..Default::default()
        };
        let backend =
            SauceNaoBackend::new(config, &NetworkConfig::default(), Duration::from_secs(5))
                .unwrap();
        let fields = backend.form_fields();
        assert!(fields.contains(&("frame", "1".to_string())));
        assert!(fields.contains(&("hide", "0".to_string())));
        assert!(fields.contains(&("database", "5".to_string())));
    }
}
