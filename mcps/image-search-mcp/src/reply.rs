//! Reply composition
//!
//! Turns a [`MatchOutcome`] into the parts handed back to the host: one text
//! part listing whatever fields are present, then the thumbnail.

use crate::types::{MatchOutcome, ParsedMatch, Reply, ReplyPart};

/// Sent when the backend found nothing
pub const NO_MATCH_MESSAGE: &str = "No matching image information found.";

/// Sent for any staging or search failure; details go to the log only
pub const FAILURE_MESSAGE: &str = "Image search failed, please try again later.";

const HEADER: &str = "🔍 Reverse image search result";

pub struct ReplyComposer;

impl ReplyComposer {
    pub fn compose(outcome: &MatchOutcome) -> Reply {
        match outcome {
            MatchOutcome::NoMatch => Reply(vec![ReplyPart::text(NO_MATCH_MESSAGE)]),
            MatchOutcome::Match(parsed) => Self::compose_match(parsed),
        }
    }

    /// Fallback reply; never carries error detail
    pub fn failure() -> Reply {
        Reply(vec![ReplyPart::text(FAILURE_MESSAGE)])
    }

    fn compose_match(parsed: &ParsedMatch) -> Reply {
        let fields = [
            ("🔎 Search page", &parsed.search_page_url),
            ("📌 Title", &parsed.title),
            ("🔗 Link", &parsed.url),
            ("📍 Source", &parsed.source),
            ("📄 Description", &parsed.content),
            ("📏 Size", &parsed.size),
            ("👤 Author", &parsed.author),
            ("📚 Original work", &parsed.original_work),
            ("🎭 Characters", &parsed.characters),
        ];

        let mut lines = vec![HEADER.to_string()];
        lines.extend(
            fields
                .into_iter()
                .filter_map(|(label, value)| value.as_ref().map(|v| format!("{label}: {v}"))),
        );

        let mut parts = vec![ReplyPart::text(lines.join("\n"))];
        if let Some(thumbnail) = &parsed.thumbnail_url {
            parts.push(ReplyPart::image(thumbnail.clone()));
        }
        Reply(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_match_is_single_text_part() {
        let reply = ReplyComposer::compose(&MatchOutcome::NoMatch);
        assert_eq!(reply, Reply(vec![ReplyPart::text(NO_MATCH_MESSAGE)]));
    }

    #[test]
    fn test_fields_in_fixed_order_with_thumbnail_last() {
        let parsed = ParsedMatch {
            title: Some("Foo".to_string()),
            url: Some("https://x/1".to_string()),
            characters: Some("rin".to_string()),
            search_page_url: Some("https://search/page".to_string()),
            author: Some("someone".to_string()),
            thumbnail_url: Some("https://x/thumb.jpg".to_string()),
            ..Default::default()
        };

        let reply = ReplyComposer::compose(&MatchOutcome::Match(parsed));
        assert_eq!(reply.len(), 2);
        assert_eq!(reply.parts()[1], ReplyPart::image("https://x/thumb.jpg"));

        let text = reply.text();
        let position = |needle: &str| text.find(needle).unwrap();
        assert!(position("Search page") < position("Title: Foo"));
        assert!(position("Title: Foo") < position("Link: https://x/1"));
        assert!(position("Link: https://x/1") < position("Author: someone"));
        assert!(position("Author: someone") < position("Characters: rin"));
    }

    #[test]
    fn test_absent_fields_are_omitted() {
        let parsed = ParsedMatch {
            title: Some("Foo".to_string()),
            ..Default::default()
        };

        let reply = ReplyComposer::compose(&MatchOutcome::Match(parsed));
        assert_eq!(reply.len(), 1);
        let text = reply.text();
        assert_eq!(text, format!("{HEADER}\n📌 Title: Foo"));
        for label in ["Link", "Source", "Description", "Size", "Author", "None"] {
            assert!(!text.contains(label), "unexpected {label} in {text}");
        }
    }

    #[test]
    fn test_failure_reply() {
        assert_eq!(ReplyComposer::failure().text(), FAILURE_MESSAGE);
    }
}
