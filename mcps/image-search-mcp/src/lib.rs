//! Image Search MCP Library
//!
//! Reverse image search: an inbound image is staged, sent to one backend,
//! the best match is parsed out of the response and composed into a reply.
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use image_search_mcp::{Config, InboundImage, SearchPipeline};
//!
//! let pipeline = SearchPipeline::from_config(&Config::load()?).await?;
//! let reply = pipeline.run(&InboundImage::url("https://example.com/a.jpg")).await;
//! println!("{}", reply.text());
//! ```
//!
//! # Configuration
//! Set `IMAGE_SEARCH_BACKEND` env var or configure in `~/.binks/image-search.toml`

pub mod backends;
pub mod config;
pub mod error;
pub mod logging;
pub mod parsers;
pub mod pipeline;
pub mod reply;
pub mod server;
pub mod stager;
pub mod types;

// Re-export main server type
pub use server::{ImageSearchMcpServer, ReverseImageSearchParams};

pub use backends::{RawSearchResponse, SearchBackend};
pub use config::{BackendKind, Config};
pub use error::{PipelineError, SearchError, StagingError};
pub use logging::init_tracing;
pub use pipeline::SearchPipeline;
pub use reply::ReplyComposer;
pub use stager::{ImageStager, StagedImage};
pub use types::{ImagePart, InboundImage, MatchOutcome, MessagePart, ParsedMatch, Reply, ReplyPart};
