//! Result parsers
//!
//! One parser per backend variant, all producing a [`MatchOutcome`]. The
//! [`RawSearchResponse`] tag picks the parser, so a response can never be
//! handed to the wrong one. Every parser is a pure function of its input.

use crate::backends::RawSearchResponse;
use crate::types::MatchOutcome;

pub mod dom;
pub mod html;
pub mod metasearch;

/// Normalize a raw backend response into the best match, if any
pub fn parse(raw: &RawSearchResponse) -> MatchOutcome {
    match raw {
        RawSearchResponse::Metasearch(response) => metasearch::parse(response),
        RawSearchResponse::Html(document) => html::parse(document),
        RawSearchResponse::Dom(fields) => dom::parse(fields),
    }
}
