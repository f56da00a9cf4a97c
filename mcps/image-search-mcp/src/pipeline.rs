//! Search pipeline
//!
//! Stager → backend → parser → composer for one inbound image:
//!
//! ```text
//! Idle → Staged → Searching → Parsed → Composed
//!          └──────────┴──→ Failed
//! ```
//!
//! The backend call runs in its own task. Once dispatched it is not aborted
//! when the caller goes away, only by its own timeout, and the staged image
//! is released inside that task after the search settles. Nothing here
//! returns an error to the host: failures become a fallback reply.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::backends::{build_backend, RawSearchResponse, SearchBackend};
use crate::config::Config;
use crate::error::{PipelineError, SearchError, SearchResult};
use crate::parsers;
use crate::reply::ReplyComposer;
use crate::stager::{ImageStager, StagedImage};
use crate::types::{InboundImage, MatchOutcome, MessagePart, Reply};

/// Where an invocation currently is; used for log context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Staged,
    Searching,
    Parsed,
    Composed,
    Failed,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Staged => "staged",
            Self::Searching => "searching",
            Self::Parsed => "parsed",
            Self::Composed => "composed",
            Self::Failed => "failed",
        }
    }
}

/// Stateless orchestrator; share it behind an `Arc`
pub struct SearchPipeline {
    stager: ImageStager,
    backend: Arc<dyn SearchBackend>,
    timeout: Duration,
}

impl SearchPipeline {
    pub fn new(stager: ImageStager, backend: Arc<dyn SearchBackend>, timeout: Duration) -> Self {
        Self {
            stager,
            backend,
            timeout,
        }
    }

    /// Build the configured backend and a stager for the configured directory
    pub async fn from_config(config: &Config) -> SearchResult<Self> {
        let backend = build_backend(config).await?;
        let stager = config
            .search
            .staging_dir
            .clone()
            .map(ImageStager::new)
            .unwrap_or_default();
        Ok(Self::new(stager, backend, config.search.timeout()))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Search for one image and always come back with a reply
    #[instrument(skip_all, fields(backend = %self.backend.name()))]
    pub async fn run(&self, image: &InboundImage) -> Reply {
        match self.execute(image).await {
            Ok(outcome) => {
                if !outcome.is_match() {
                    info!("No match found");
                }
                let reply = ReplyComposer::compose(&outcome);
                debug!(
                    stage = PipelineStage::Composed.as_str(),
                    parts = reply.len(),
                    "Reply composed"
                );
                reply
            }
            Err(e) => {
                error!(stage = PipelineStage::Failed.as_str(), error = ?e, "Image search failed: {}", e);
                ReplyComposer::failure()
            }
        }
    }

    /// Same as [`run`](Self::run) but hands back the typed outcome
    pub async fn execute(&self, image: &InboundImage) -> Result<MatchOutcome, PipelineError> {
        debug!(stage = PipelineStage::Idle.as_str(), "Staging image");
        let staged = self.stager.stage(image)?;
        debug!(stage = PipelineStage::Staged.as_str(), "Image staged");

        let raw = self.search_shielded(staged).await?;

        let outcome = parsers::parse(&raw);
        debug!(
            stage = PipelineStage::Parsed.as_str(),
            matched = outcome.is_match(),
            "Response parsed"
        );
        Ok(outcome)
    }

    /// Run the backend call in a detached task bounded by `timeout`. The
    /// task owns the staged image and releases it however the call ends.
    async fn search_shielded(
        &self,
        staged: StagedImage,
    ) -> Result<RawSearchResponse, PipelineError> {
        let backend = Arc::clone(&self.backend);
        let timeout = self.timeout;

        debug!(stage = PipelineStage::Searching.as_str(), "Dispatching search");
        let task = tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, backend.search(&staged)).await {
                Ok(result) => result,
                Err(_) => Err(SearchError::Timeout(timeout)),
            };
            staged.release();
            result
        });

        Ok(task.await??)
    }

    /// Run every image part of one inbound message, in order
    ///
    /// An empty result means the message had nothing for us and the host
    /// should carry on with its default handling.
    pub async fn handle_event(&self, parts: &[MessagePart]) -> Vec<Reply> {
        let mut replies = Vec::new();
        for part in parts {
            match part {
                MessagePart::Image(image) => match image.to_inbound() {
                    Some(inbound) => replies.push(self.run(&inbound).await),
                    None => warn!("Image part has neither inline data nor a URL, skipping"),
                },
                MessagePart::Text(_) | MessagePart::Other => {}
            }
        }
        replies
    }

    /// Tear down backend resources (the browser process, if any)
    pub async fn shutdown(&self) {
        self.backend.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::yandex::{YandexSite, YandexThumb};
    use crate::backends::{HtmlDocument, YandexResponse};
    use crate::reply::{FAILURE_MESSAGE, NO_MATCH_MESSAGE};
    use crate::types::{ImagePart, ReplyPart};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    const JPEG_B64: &str = "data:image/jpeg;base64,/9j/4AAQSkZJRg==";

    enum Behavior {
        Respond(RawSearchResponse),
        Fail(u16),
        Hang,
        Panic,
        Gated {
            started: Arc<Notify>,
            gate: Arc<Notify>,
            finished: Arc<AtomicBool>,
        },
    }

    struct ScriptedBackend {
        behavior: Behavior,
        calls: AtomicUsize,
        staged_path: Mutex<Option<PathBuf>>,
    }

    impl ScriptedBackend {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicUsize::new(0),
                staged_path: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn staged_path(&self) -> Option<PathBuf> {
            self.staged_path.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SearchBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn search(&self, staged: &StagedImage) -> SearchResult<RawSearchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let path = staged.path().map(Path::to_path_buf);
            assert!(path.as_ref().map_or(true, |p| p.exists()));
            *self.staged_path.lock().unwrap() = path;

            match &self.behavior {
                Behavior::Respond(raw) => Ok(raw.clone()),
                Behavior::Fail(code) => Err(SearchError::HttpStatus(*code)),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Err(SearchError::EmptyResponse)
                }
                Behavior::Panic => panic!("backend blew up"),
                Behavior::Gated {
                    started,
                    gate,
                    finished,
                } => {
                    started.notify_one();
                    gate.notified().await;
                    finished.store(true, Ordering::SeqCst);
                    Ok(no_container_page())
                }
            }
        }
    }

    fn no_container_page() -> RawSearchResponse {
        RawSearchResponse::Html(HtmlDocument {
            page_url: None,
            body: "<html><body><p>No results</p></body></html>".to_string(),
        })
    }

    fn foo_model() -> RawSearchResponse {
        RawSearchResponse::Metasearch(YandexResponse {
            search_page_url: None,
            sites: vec![YandexSite {
                title: "Foo".to_string(),
                url: "https://x/1".to_string(),
                thumb: Some(YandexThumb {
                    url: "https://x/thumb.jpg".to_string(),
                }),
                ..Default::default()
            }],
        })
    }

    fn pipeline(
        dir: &Path,
        backend: Arc<ScriptedBackend>,
        timeout: Duration,
    ) -> SearchPipeline {
        SearchPipeline::new(ImageStager::new(dir), backend, timeout)
    }

    fn staged_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_metasearch_match_reply() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(Behavior::Respond(foo_model()));
        let pipeline = pipeline(dir.path(), backend.clone(), Duration::from_secs(5));

        let reply = pipeline.run(&InboundImage::base64(JPEG_B64)).await;

        assert_eq!(reply.len(), 2);
        let ReplyPart::Text { value } = &reply.parts()[0] else {
            panic!("text part must come first");
        };
        assert!(value.contains("Foo"));
        assert!(value.contains("https://x/1"));
        assert_eq!(reply.parts()[1], ReplyPart::image("https://x/thumb.jpg"));

        let staged = backend.staged_path().unwrap();
        assert!(!staged.exists());
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_container_gives_not_found_reply() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(Behavior::Respond(no_container_page()));
        let pipeline = pipeline(dir.path(), backend.clone(), Duration::from_secs(5));

        let reply = pipeline
            .run(&InboundImage::url("https://example.com/a.jpg"))
            .await;
        assert_eq!(reply.parts(), &[ReplyPart::text(NO_MATCH_MESSAGE)]);
        assert!(backend.staged_path().is_none());
    }

    #[tokio::test]
    async fn test_timeout_gives_fallback_and_releases_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(Behavior::Hang);
        let pipeline = pipeline(dir.path(), backend.clone(), Duration::from_millis(50));

        let err = pipeline
            .execute(&InboundImage::base64(JPEG_B64))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Search(SearchError::Timeout(_))
        ));
        assert!(!backend.staged_path().unwrap().exists());

        let reply = pipeline.run(&InboundImage::base64(JPEG_B64)).await;
        assert_eq!(reply.text(), FAILURE_MESSAGE);
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_malformed_base64_never_reaches_backend() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(Behavior::Respond(foo_model()));
        let pipeline = pipeline(dir.path(), backend.clone(), Duration::from_secs(5));

        let reply = pipeline.run(&InboundImage::base64("/9j/4AAQSkZJRg")).await;
        assert_eq!(reply.parts(), &[ReplyPart::text(FAILURE_MESSAGE)]);
        assert_eq!(backend.calls(), 0);
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_search_error_is_not_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(Behavior::Fail(503));
        let pipeline = pipeline(dir.path(), backend.clone(), Duration::from_secs(5));

        let reply = pipeline.run(&InboundImage::base64(JPEG_B64)).await;
        assert_eq!(reply.text(), FAILURE_MESSAGE);
        assert!(!reply.text().contains("503"));
        assert!(!backend.staged_path().unwrap().exists());
    }

    #[tokio::test]
    async fn test_backend_panic_still_releases_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(Behavior::Panic);
        let pipeline = pipeline(dir.path(), backend.clone(), Duration::from_secs(5));

        let err = pipeline
            .execute(&InboundImage::base64(JPEG_B64))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Task(_)));
        assert!(!backend.staged_path().unwrap().exists());
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_cancelled_caller_does_not_abort_search() {
        let dir = tempfile::tempdir().unwrap();
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let finished = Arc::new(AtomicBool::new(false));
        let backend = ScriptedBackend::new(Behavior::Gated {
            started: started.clone(),
            gate: gate.clone(),
            finished: finished.clone(),
        });
        let pipeline = Arc::new(pipeline(dir.path(), backend.clone(), Duration::from_secs(5)));

        let caller = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.run(&InboundImage::base64(JPEG_B64)).await })
        };

        started.notified().await;
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());

        let staged = backend.staged_path().unwrap();
        assert!(staged.exists(), "search still in flight");

        gate.notify_one();
        for _ in 0..200 {
            if !staged.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(finished.load(Ordering::SeqCst));
        assert!(!staged.exists());
    }

    #[tokio::test]
    async fn test_handle_event_runs_each_image_part() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(Behavior::Respond(foo_model()));
        let pipeline = pipeline(dir.path(), backend.clone(), Duration::from_secs(5));

        let parts = vec![
            MessagePart::Text("what is this?".to_string()),
            MessagePart::Image(ImagePart {
                base64: Some(JPEG_B64.to_string()),
                ..Default::default()
            }),
            MessagePart::Other,
            MessagePart::Image(ImagePart::default()),
            MessagePart::Image(ImagePart {
                url: Some("https://example.com/b.png".to_string()),
                ..Default::default()
            }),
        ];

        let replies = pipeline.handle_event(&parts).await;
        assert_eq!(replies.len(), 2);
        assert_eq!(backend.calls(), 2);

        let replies = pipeline
            .handle_event(&[MessagePart::Text("hi".to_string())])
            .await;
        assert!(replies.is_empty());
    }
}
