//! Parser for fields read off a live page
//!
//! The page hands back rendered text, one `Label: value` pair per line
//! (`Member: painter`, `Characters: rin`). The label decides where the value
//! goes, using the same vocabulary as the HTML parser, so the order of the
//! columns on the page does not matter.

use url::Url;

use super::html::{apply_fields, resolve, FieldLabel, ScrapedField};
use crate::backends::DomFields;
use crate::types::{non_empty, MatchOutcome, ParsedMatch};

pub fn parse(fields: &DomFields) -> MatchOutcome {
    if fields.is_empty() {
        return MatchOutcome::NoMatch;
    }

    let base = fields
        .page_url
        .as_deref()
        .and_then(|url| Url::parse(url).ok());

    let mut scraped = Vec::new();
    let mut title = None;

    if let Some(block) = &fields.title {
        // A title may contain a colon of its own; only known labels count here
        let labeled: Vec<ScrapedField> = lines(block)
            .filter_map(|line| labeled_line(&line))
            .filter(|field| !matches!(field.label, Some(FieldLabel::Other(_))))
            .collect();
        if labeled.is_empty() {
            title = non_empty(flatten(block));
        } else {
            scraped.extend(labeled);
        }
    }

    for column in &fields.columns {
        for line in lines(column) {
            match labeled_line(&line) {
                Some(field) => scraped.push(field),
                None if split_label(&line).is_some() => {}
                None => scraped.push(ScrapedField {
                    label: None,
                    value: line,
                    link: None,
                }),
            }
        }
    }

    let mut parsed = ParsedMatch {
        title,
        url: fields
            .source_link
            .as_deref()
            .and_then(non_empty)
            .map(|link| resolve(base.as_ref(), &link)),
        thumbnail_url: fields
            .thumbnail
            .as_deref()
            .and_then(non_empty)
            .map(|src| resolve(base.as_ref(), &src)),
        search_page_url: fields.page_url.as_deref().and_then(non_empty),
        ..Default::default()
    };
    apply_fields(&mut parsed, scraped, base.as_ref());

    MatchOutcome::from_match(parsed)
}

/// Non-blank lines with inner whitespace collapsed
fn lines(text: &str) -> impl Iterator<Item = String> + '_ {
    text.lines().map(flatten).filter(|line| !line.is_empty())
}

fn flatten(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A `Label: value` line with a non-empty value
fn labeled_line(line: &str) -> Option<ScrapedField> {
    let (label, value) = split_label(line)?;
    Some(ScrapedField {
        label: Some(FieldLabel::from_token(label)),
        value: non_empty(value)?,
        link: None,
    })
}

/// `"Source: pixiv"` -> `("Source", " pixiv")`; URLs and times are not labels
fn split_label(line: &str) -> Option<(&str, &str)> {
    let (label, rest) = line.split_once(':')?;
    (is_label(label) && !rest.starts_with("//")).then_some((label, rest))
}

fn is_label(candidate: &str) -> bool {
    let candidate = candidate.trim();
    !candidate.is_empty()
        && candidate.chars().count() <= 24
        && candidate
            .chars()
            .all(|c| c.is_alphabetic() || c == ' ' || c == '(' || c == ')')
}
