//! Parser for SauceNAO result pages
//!
//! Only the first `.resulttablecontent` is read. Inside it, values sit next
//! to bold labels rather than inside them:
//!
//! ```html
//! <div class="resultcontentcolumn">
//!   <strong>Pixiv ID: </strong><a href="https://www.pixiv.net/...">12345</a><br/>
//!   <strong>Member: </strong><a href="https://www.pixiv.net/users/...">name</a>
//! </div>
//! ```
//!
//! so each label walks forward through its siblings and takes the first
//! non-empty text node or link. This follows SauceNAO's markup and is not
//! meant as a general rule for other sites.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use crate::backends::HtmlDocument;
use crate::types::{non_empty, MatchOutcome, ParsedMatch};

static RESULT_CONTENT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".resulttablecontent").unwrap());
static RESULT_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".resulttitle").unwrap());
static CONTENT_COLUMN: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".resultcontentcolumn").unwrap());
static THUMBNAIL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".resultimage img").unwrap());
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Label tokens translated into the reply vocabulary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldLabel {
    Source,
    Material,
    Characters,
    Author,
    Member,
    Other(String),
}

impl FieldLabel {
    pub fn from_token(token: &str) -> Self {
        let cleaned = token.trim().trim_end_matches(':').trim();
        match cleaned.to_ascii_lowercase().as_str() {
            "source" => Self::Source,
            "material" => Self::Material,
            "characters" | "character" => Self::Characters,
            "creator" | "creator(s)" | "author" | "artist" => Self::Author,
            "member" => Self::Member,
            _ => Self::Other(cleaned.to_string()),
        }
    }

    pub fn display(&self) -> &str {
        match self {
            Self::Source => "Source",
            Self::Material => "Original work",
            Self::Characters => "Characters",
            Self::Author => "Author",
            Self::Member => "Member",
            Self::Other(label) => label,
        }
    }
}

/// One value pulled out of the result block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedField {
    /// `None` for free text that had no label
    pub label: Option<FieldLabel>,
    pub value: String,
    pub link: Option<String>,
}

pub fn parse(document: &HtmlDocument) -> MatchOutcome {
    let html = Html::parse_document(&document.body);
    let Some(container) = html.select(&RESULT_CONTENT).next() else {
        return MatchOutcome::NoMatch;
    };

    let base = document
        .page_url
        .as_deref()
        .and_then(|url| Url::parse(url).ok());

    let (title, fields) = extract_fields(container);

    let mut parsed = ParsedMatch {
        title,
        thumbnail_url: result_block(container)
            .select(&THUMBNAIL)
            .next()
            .and_then(|img| img.value().attr("data-src").or(img.value().attr("src")))
            .and_then(non_empty)
            .map(|src| resolve(base.as_ref(), &src)),
        ..Default::default()
    };
    apply_fields(&mut parsed, fields, base.as_ref());

    MatchOutcome::from_match(parsed)
}

/// The `.resulttable` holding the content cell, so the thumbnail is taken
/// from the same result as the text
fn result_block(container: ElementRef<'_>) -> ElementRef<'_> {
    container
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().classes().any(|class| class == "resulttable"))
        .unwrap_or(container)
}

/// Returns the bare title (if the title block had no label) and every
/// labeled or free-text field, in document order
pub fn extract_fields(container: ElementRef<'_>) -> (Option<String>, Vec<ScrapedField>) {
    let mut title = None;
    let mut fields = Vec::new();

    if let Some(block) = container.select(&RESULT_TITLE).next() {
        let labeled: Vec<ScrapedField> = labels(block).filter_map(labeled_value).collect();
        if labeled.is_empty() {
            title = non_empty(flat_text(block));
        } else {
            fields.extend(labeled);
        }
    }

    for block in container.select(&CONTENT_COLUMN) {
        let mut block_labels = labels(block).peekable();
        if block_labels.peek().is_none() {
            if let Some(value) = non_empty(flat_text(block)) {
                let link = block
                    .select(&LINK)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .and_then(non_empty);
                fields.push(ScrapedField {
                    label: None,
                    value,
                    link,
                });
            }
        } else {
            fields.extend(block_labels.filter_map(labeled_value));
        }
    }

    (title, fields)
}

/// Direct `<strong>`/`<b>` children of a block
fn labels<'a>(block: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    block
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| is_label(el.value().name()))
}

fn is_label(tag: &str) -> bool {
    matches!(tag, "strong" | "b")
}

/// Walk forward from a label to its value: the first non-empty text node or
/// the first link. Reaching the next label means this one has no value.
fn labeled_value(label: ElementRef<'_>) -> Option<ScrapedField> {
    let token = flat_text(label);
    if token.is_empty() {
        return None;
    }

    for sibling in label.next_siblings() {
        match sibling.value() {
            Node::Text(text) => {
                if let Some(value) = non_empty(&**text) {
                    return Some(ScrapedField {
                        label: Some(FieldLabel::from_token(&token)),
                        value,
                        link: None,
                    });
                }
            }
            Node::Element(element) if element.name() == "a" => {
                let anchor = ElementRef::wrap(sibling)?;
                let link = anchor.value().attr("href").and_then(non_empty);
                let value = non_empty(flat_text(anchor)).or_else(|| link.clone())?;
                return Some(ScrapedField {
                    label: Some(FieldLabel::from_token(&token)),
                    value,
                    link,
                });
            }
            Node::Element(element) if is_label(element.name()) => return None,
            _ => {}
        }
    }
    None
}

pub(crate) fn apply_fields(
    parsed: &mut ParsedMatch,
    fields: Vec<ScrapedField>,
    base: Option<&Url>,
) {
    let mut extras = Vec::new();

    for field in fields {
        if parsed.url.is_none() {
            parsed.url = field.link.as_deref().map(|link| resolve(base, link));
        }

        let slot = match &field.label {
            Some(FieldLabel::Source) => &mut parsed.source,
            Some(FieldLabel::Material) => &mut parsed.original_work,
            Some(FieldLabel::Characters) => &mut parsed.characters,
            Some(FieldLabel::Author) | Some(FieldLabel::Member) => &mut parsed.author,
            Some(FieldLabel::Other(label)) => {
                extras.push(format!("{label}: {}", field.value));
                continue;
            }
            None => {
                extras.push(field.value);
                continue;
            }
        };

        if slot.is_none() {
            *slot = Some(field.value);
        } else if let Some(label) = &field.label {
            extras.push(format!("{}: {}", label.display(), field.value));
        }
    }

    if !extras.is_empty() {
        parsed.content = Some(extras.join("\n"));
    }
}

fn flat_text(element: ElementRef<'_>) -> String {
    element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

pub(crate) fn resolve(base: Option<&Url>, link: &str) -> String {
    base.and_then(|base| base.join(link).ok())
        .map(String::from)
        .unwrap_or_else(|| link.to_string())
}
