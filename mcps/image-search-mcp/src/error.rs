//! Error types for the image search pipeline
//!
//! Staging and search failures never reach the end user: the pipeline logs
//! them and answers with a fallback reply. "No match" is not an error and is
//! modeled as [`crate::types::MatchOutcome::NoMatch`].

use std::time::Duration;

use thiserror::Error;

/// Errors raised while turning an inbound image into a staged handle
#[derive(Error, Debug)]
pub enum StagingError {
    /// The payload is not valid base64
    #[error("base64 decode failed: {0}")]
    DecodeFailed(#[from] base64::DecodeError),

    /// The payload decoded to zero bytes
    #[error("image payload is empty")]
    EmptyPayload,

    /// The image URL could not be parsed
    #[error("invalid image url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Creating or writing the staging file failed
    #[error("failed to write staged image: {0}")]
    IoFailed(#[from] std::io::Error),
}

/// Errors raised by a search backend
#[derive(Error, Debug)]
pub enum SearchError {
    /// Transport-level failure talking to the search service
    #[error("network failure: {0}")]
    NetworkFailure(#[from] reqwest::Error),

    /// The service answered with an unexpected status code
    #[error("search service returned HTTP {0}")]
    HttpStatus(u16),

    /// The service answered but carried no usable payload
    #[error("search service returned no usable payload")]
    EmptyResponse,

    /// The search did not settle before its deadline
    #[error("search timed out after {0:?}")]
    Timeout(Duration),

    /// Expected DOM structure is missing from the page
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// Browser launch or DevTools protocol failure
    #[error("browser automation failed: {0}")]
    Automation(String),

    /// Reading the staged file back for upload failed
    #[error("failed to read staged image: {0}")]
    Io(#[from] std::io::Error),
}

impl From<chromiumoxide::error::CdpError> for SearchError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        SearchError::Automation(err.to_string())
    }
}

/// Why a pipeline invocation ended in the `Failed` state
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("staging failed: {0}")]
    Staging(#[from] StagingError),

    #[error("search failed: {0}")]
    Search(#[from] SearchError),

    /// The shielded search task panicked or was torn down by the runtime
    #[error("search task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type alias for backend calls
pub type SearchResult<T> = Result<T, SearchError>;
