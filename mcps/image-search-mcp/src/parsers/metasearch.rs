//! Parser for the structured metasearch model
//!
//! The service already ranks its results; the first entry is taken as the
//! best match without re-ranking.

use crate::backends::YandexResponse;
use crate::types::{non_empty, MatchOutcome, ParsedMatch};

pub fn parse(response: &YandexResponse) -> MatchOutcome {
    let Some(best) = response.sites.first() else {
        return MatchOutcome::NoMatch;
    };

    let thumbnail_url = best
        .thumb
        .as_ref()
        .and_then(|thumb| non_empty(&thumb.url))
        .map(|url| absolutize(&url));

    let size = best
        .original_image
        .as_ref()
        .filter(|image| image.width > 0 && image.height > 0)
        .map(|image| format!("{}x{}", image.width, image.height));

    MatchOutcome::from_match(ParsedMatch {
        title: non_empty(&best.title),
        url: non_empty(&best.url),
        source: non_empty(&best.domain),
        content: non_empty(&best.description),
        size,
        thumbnail_url,
        search_page_url: response.search_page_url.as_deref().and_then(non_empty),
        ..Default::default()
    })
}

/// Thumbnails come back protocol-relative (`//avatars...`)
fn absolutize(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url.to_string()
    }
}
