//! Headless browser backend
//!
//! Drives a search page through Chromium over the DevTools protocol. The
//! browser process and its single page are launched once in
//! [`BrowserBackend::open`] and torn down once in `shutdown`; a search holds
//! the session lock for the whole navigate/inject/submit/read sequence, so
//! concurrent searches queue up behind each other.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as LaunchConfig};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::{Element, Page};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{RawSearchResponse, SearchBackend};
use crate::config::BrowserConfig;
use crate::error::{SearchError, SearchResult};
use crate::stager::{ImageRef, StagedImage};
use crate::types::non_empty;

/// Rendered text read from the first result
///
/// `columns` keep the line breaks of the page so each `Label: value` pair
/// stays on its own line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomFields {
    pub title: Option<String>,
    pub columns: Vec<String>,
    pub source_link: Option<String>,
    pub thumbnail: Option<String>,
    pub page_url: Option<String>,
}

impl DomFields {
    /// True when none of the result positions yielded anything
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.source_link.is_none() && self.columns.is_empty()
    }
}

struct BrowserSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

/// Browser automation backend
pub struct BrowserBackend {
    config: BrowserConfig,
    session: Mutex<Option<BrowserSession>>,
}

impl BrowserBackend {
    /// Launch the browser and open the page every search will reuse
    pub async fn open(config: BrowserConfig) -> SearchResult<Self> {
        let mut builder = LaunchConfig::builder().window_size(1366, 768).args([
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--disable-blink-features=AutomationControlled",
            "--no-first-run",
            "--disable-default-apps",
        ]);
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &config.executable {
            builder = builder.chrome_executable(executable);
        }
        let launch = builder.build().map_err(SearchError::Automation)?;

        let (mut browser, mut handler) = Browser::launch(launch).await?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                // Chrome emits messages chromiumoxide cannot decode; keep going
                if let Err(e) = event {
                    tracing::debug!("CDP message processing error (continuing): {}", e);
                }
            }
            tracing::debug!("CDP handler task completed");
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    tracing::debug!("Browser close error (ignored): {}", close_err);
                }
                handler.abort();
                return Err(e.into());
            }
        };

        tracing::info!("Browser ready for searches on {}", config.search_url);

        Ok(Self {
            config,
            session: Mutex::new(Some(BrowserSession {
                browser,
                page,
                handler,
            })),
        })
    }

    async fn inject_image(&self, page: &Page, staged: &StagedImage) -> SearchResult<()> {
        let selectors = &self.config.selectors;
        match staged.image_ref() {
            ImageRef::Url(url) => {
                let input = find_required(page, &selectors.url_input).await?;
                input.click().await?.type_str(url).await?;
            }
            ImageRef::File(path) => {
                let input = find_required(page, &selectors.file_input).await?;
                let mut params = SetFileInputFilesParams::new(vec![path.display().to_string()]);
                params.backend_node_id = Some(input.backend_node_id.clone());
                page.execute(params).await?;
            }
        }
        Ok(())
    }

    /// Poll for the result container until the wait deadline
    async fn wait_for_results(&self, page: &Page) -> SearchResult<Element> {
        let selector = self.config.selectors.result_container.as_str();
        let wait = self.config.wait();
        let deadline = Instant::now() + wait;

        loop {
            if let Ok(container) = page.find_element(selector).await {
                return Ok(container);
            }
            if Instant::now() >= deadline {
                tracing::debug!("No '{}' after {:?}", selector, wait);
                return Err(SearchError::Timeout(wait));
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    async fn read_fields(&self, page: &Page, container: &Element) -> DomFields {
        let selectors = &self.config.selectors;

        let thumbnail = match container.find_element(selectors.thumbnail.as_str()).await {
            Ok(img) => match attribute(&img, "data-src").await {
                Some(src) => Some(src),
                None => attribute(&img, "src").await,
            },
            Err(_) => None,
        };

        let source_link = match container.find_element(selectors.source_link.as_str()).await {
            Ok(link) => attribute(&link, "href").await,
            Err(_) => None,
        };

        let title = match container.find_element(selectors.title.as_str()).await {
            Ok(block) => rendered_text(&block).await,
            Err(_) => None,
        };

        let mut columns = Vec::new();
        if let Ok(blocks) = container.find_elements(selectors.columns.as_str()).await {
            for block in &blocks {
                columns.extend(rendered_text(block).await);
            }
        }

        DomFields {
            title,
            columns,
            source_link,
            thumbnail,
            page_url: page.url().await.ok().flatten(),
        }
    }
}

async fn find_required(page: &Page, selector: &str) -> SearchResult<Element> {
    page.find_element(selector)
        .await
        .map_err(|_| SearchError::ElementNotFound(selector.to_string()))
}

/// `innerText`, so `<br>` comes back as a line break
async fn rendered_text(element: &Element) -> Option<String> {
    element.inner_text().await.ok().flatten().and_then(non_empty)
}

async fn attribute(element: &Element, name: &str) -> Option<String> {
    element.attribute(name).await.ok().flatten().and_then(non_empty)
}

#[async_trait]
impl SearchBackend for BrowserBackend {
    fn name(&self) -> &str {
        "browser"
    }

    async fn search(&self, staged: &StagedImage) -> SearchResult<RawSearchResponse> {
        let session = self.session.lock().await;
        let session = session
            .as_ref()
            .ok_or_else(|| SearchError::Automation("browser is not open".to_string()))?;
        let page = &session.page;

        tracing::debug!("Navigating to {}", self.config.search_url);
        page.goto(self.config.search_url.as_str()).await?;

        self.inject_image(page, staged).await?;
        find_required(page, &self.config.selectors.submit)
            .await?
            .click()
            .await?;

        let container = self.wait_for_results(page).await?;
        let fields = self.read_fields(page, &container).await;
        if fields.is_empty() {
            return Err(SearchError::ElementNotFound(format!(
                "result fields inside '{}'",
                self.config.selectors.result_container
            )));
        }

        Ok(RawSearchResponse::Dom(fields))
    }

    async fn shutdown(&self) {
        let Some(mut session) = self.session.lock().await.take() else {
            return;
        };

        if let Err(e) = session.browser.close().await {
            tracing::debug!("Browser close error (ignored): {}", e);
        }
        match tokio::time::timeout(Duration::from_secs(5), session.browser.wait()).await {
            Ok(Err(e)) => tracing::debug!("Browser wait error (ignored): {}", e),
            Err(_) => tracing::warn!("Browser process did not exit in time"),
            Ok(Ok(_)) => {}
        }
        session.handler.abort();

        tracing::info!("Browser closed");
    }
}
