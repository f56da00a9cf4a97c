//! Common types shared by the search pipeline
//!
//! Inbound images come from the host, every backend's output is normalized
//! into [`ParsedMatch`], and replies go back out as an ordered list of
//! [`ReplyPart`]s.

use serde::{Deserialize, Serialize};

/// An image handed to the pipeline by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "snake_case")]
pub enum InboundImage {
    /// Inline bytes, optionally prefixed with a `data:...;base64,` header
    Base64 {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_hint: Option<String>,
        payload: String,
    },
    /// A publicly fetchable image URL
    Url { url: String },
}

impl InboundImage {
    pub fn base64(payload: impl Into<String>) -> Self {
        Self::Base64 {
            mime_hint: None,
            payload: payload.into(),
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::Url { url: url.into() }
    }
}

/// One part of an inbound message, resolved once per event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePart {
    Text(String),
    Image(ImagePart),
    /// Anything the pipeline has no use for (voice, files, mentions, ...)
    Other,
}

/// Image part as delivered by the host; either field may be missing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImagePart {
    pub base64: Option<String>,
    pub url: Option<String>,
    pub mime_hint: Option<String>,
}

impl ImagePart {
    /// Inline data wins over a URL when both are present.
    pub fn to_inbound(&self) -> Option<InboundImage> {
        if let Some(payload) = self.base64.as_deref().filter(|p| !p.trim().is_empty()) {
            return Some(InboundImage::Base64 {
                mime_hint: self.mime_hint.clone(),
                payload: payload.to_string(),
            });
        }
        self.url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .map(InboundImage::url)
    }
}

/// Uniform, backend-agnostic description of the best match
///
/// Every field is optional because each backend only supplies a subset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_work: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub characters: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_page_url: Option<String>,
}

impl ParsedMatch {
    /// True when nothing describes the match itself; the search page link
    /// alone is only context
    pub fn is_empty(&self) -> bool {
        let Self {
            title,
            url,
            source,
            content,
            size,
            thumbnail_url,
            author,
            original_work,
            characters,
            search_page_url: _,
        } = self;
        [
            title,
            url,
            source,
            content,
            size,
            thumbnail_url,
            author,
            original_work,
            characters,
        ]
        .iter()
        .all(|field| field.is_none())
    }
}

/// Result of parsing one raw backend response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    Match(ParsedMatch),
    NoMatch,
}

impl MatchOutcome {
    /// Wraps a parsed record, collapsing an all-empty one into `NoMatch`.
    pub fn from_match(parsed: ParsedMatch) -> Self {
        if parsed.is_empty() {
            Self::NoMatch
        } else {
            Self::Match(parsed)
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match(_))
    }
}

/// One renderable piece of a reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyPart {
    Text { value: String },
    Image { url: String },
}

impl ReplyPart {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::Image { url: url.into() }
    }
}

/// Ordered reply; rendering order is significant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reply(pub Vec<ReplyPart>);

impl Reply {
    pub fn parts(&self) -> &[ReplyPart] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Concatenated text of all text parts
    pub fn text(&self) -> String {
        self.0
            .iter()
            .filter_map(|part| match part {
                ReplyPart::Text { value } => Some(value.as_str()),
                ReplyPart::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Trims a scraped value, dropping it entirely when nothing is left
pub(crate) fn non_empty(value: impl AsRef<str>) -> Option<String> {
    let trimmed = value.as_ref().trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
