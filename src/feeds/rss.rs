//! Streaming reader for RSS / RDF / Atom documents.
//!
//! Built on `quick_xml`'s pull parser so a payload is walked exactly once and
//! items are produced on demand. Element names come from the source's
//! [`Selectors`](crate::models::Selectors), compared against the qualified
//! name as written in the document (`dc:date` matches `dc:date`).
//!
//! The link of an item is the `href` attribute of its link element when one
//! is present (Atom, preferring `rel="alternate"` or no `rel`), otherwise the
//! element's text (RSS).

use super::{ParsedItem, SkipReason};
use crate::dates::parse_feed_date;
use crate::error::ParseError;
use crate::models::{FeedRecord, Source};
use quick_xml::events::{BytesStart, Event};
use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::Reader;
use std::borrow::Cow;
use url::Url;

/// Root elements accepted as a feed document.
const FEED_ROOTS: &[&[u8]] = &[b"rss", b"feed", b"rdf:RDF", b"RDF"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Date,
    Link,
}

#[derive(Debug, Default)]
struct RawItem {
    title: Option<String>,
    date: Option<String>,
    link: Option<String>,
}

impl RawItem {
    fn has(&self, field: Field) -> bool {
        match field {
            Field::Title => self.title.is_some(),
            Field::Date => self.date.is_some(),
            Field::Link => self.link.is_some(),
        }
    }

    fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Title => &mut self.title,
            Field::Date => &mut self.date,
            Field::Link => &mut self.link,
        }
    }
}

/// Lazy iterator over the items of one payload.
///
/// Yields `Err` at most once; the iterator is fused afterwards.
pub struct FeedItems<'a> {
    reader: Reader<&'a [u8]>,
    buf: Vec<u8>,
    source: &'a Source,
    content_type: String,
    depth: usize,
    saw_root: bool,
    done: bool,
}

impl<'a> FeedItems<'a> {
    /// Parse `text`, which callers decode with [`super::encoding::decode`] first.
    pub fn new(source: &'a Source, text: &'a str, content_type: Option<&str>) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        Self {
            reader: Reader::from_reader(text.as_bytes()),
            buf: Vec::new(),
            source,
            content_type: content_type.unwrap_or("application/rss+xml").to_string(),
            depth: 0,
            saw_root: false,
            done: false,
        }
    }

    fn fail(&mut self, reason: impl Into<String>) -> ParseError {
        self.done = true;
        ParseError {
            source_name: self.source.name.clone(),
            content_type: self.content_type.clone(),
            reason: reason.into(),
        }
    }

    fn next_event(&mut self) -> Result<Event<'static>, ParseError> {
        self.buf.clear();
        let result = self
            .reader
            .read_event_into(&mut self.buf)
            .map(Event::into_owned);
        result.map_err(|e| {
            let position = self.reader.buffer_position();
            self.fail(format!("malformed XML near byte {position}: {e}"))
        })
    }

    fn check_root(&mut self, start: &BytesStart<'_>) -> Result<(), ParseError> {
        if self.depth == 0 && !self.saw_root {
            let name = start.name();
            if !FEED_ROOTS.iter().any(|root| *root == name.as_ref()) {
                let found = String::from_utf8_lossy(name.as_ref()).into_owned();
                return Err(self.fail(format!("root element <{found}> is not a feed document")));
            }
            self.saw_root = true;
        }
        Ok(())
    }

    fn field_for(&self, start: &BytesStart<'_>) -> Option<Field> {
        let name = start.name();
        let selectors = &self.source.selectors;
        if name.as_ref() == selectors.title.as_bytes() {
            Some(Field::Title)
        } else if name.as_ref() == selectors.date.as_bytes() {
            Some(Field::Date)
        } else if name.as_ref() == selectors.link.as_bytes() {
            Some(Field::Link)
        } else {
            None
        }
    }

    /// Consume events up to the end of the current item element.
    fn read_item(&mut self) -> Result<ParsedItem, ParseError> {
        let mut item = RawItem::default();
        let mut capture: Option<(Field, usize)> = None;
        let mut text = String::new();
        let mut inner_depth = 0usize;

        loop {
            match self.next_event()? {
                Event::Start(start) => {
                    inner_depth += 1;
                    if capture.is_some() {
                        continue;
                    }
                    match self.field_for(&start) {
                        Some(Field::Link) if item.link.is_none() => {
                            if let Some(href) = link_href(&start) {
                                item.link = Some(href);
                            } else {
                                capture = Some((Field::Link, inner_depth));
                                text.clear();
                            }
                        }
                        Some(field) if !item.has(field) => {
                            capture = Some((field, inner_depth));
                            text.clear();
                        }
                        _ => {}
                    }
                }
                Event::Empty(start) => {
                    if capture.is_none()
                        && item.link.is_none()
                        && self.field_for(&start) == Some(Field::Link)
                    {
                        item.link = link_href(&start);
                    }
                }
                Event::Text(t) => {
                    if capture.is_some() {
                        text.push_str(&String::from_utf8_lossy(&t));
                    }
                }
                Event::CData(c) => {
                    if capture.is_some() {
                        text.push_str(&String::from_utf8_lossy(&c));
                    }
                }
                Event::GeneralRef(r) => {
                    if capture.is_some() {
                        text.push_str(&resolve_reference(&r));
                    }
                }
                Event::End(_) => {
                    if inner_depth == 0 {
                        self.depth = self.depth.saturating_sub(1);
                        break;
                    }
                    if let Some((field, at)) = capture {
                        if at == inner_depth {
                            let value = collapse_whitespace(&text);
                            if !value.is_empty() {
                                *item.slot(field) = Some(value);
                            }
                            capture = None;
                        }
                    }
                    inner_depth -= 1;
                }
                Event::Eof => return Err(self.fail("document ended inside an item")),
                _ => {}
            }
        }

        Ok(self.build(item))
    }

    fn build(&self, item: RawItem) -> ParsedItem {
        let Some(title) = item.title else {
            return ParsedItem::Skipped(SkipReason::MissingTitle);
        };
        let Some(link) = item.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()) else {
            return ParsedItem::Skipped(SkipReason::MissingLink);
        };
        if !is_absolute_http(&link) {
            return ParsedItem::Skipped(SkipReason::InvalidLink(link));
        }
        let Some(raw_date) = item.date else {
            return ParsedItem::Skipped(SkipReason::MissingDate);
        };
        let Some(published_at) = parse_feed_date(&raw_date) else {
            return ParsedItem::Skipped(SkipReason::UnparsableDate(raw_date));
        };

        ParsedItem::Record(FeedRecord {
            source_name: self.source.name.clone(),
            published_at,
            title,
            link,
        })
    }
}

impl Iterator for FeedItems<'_> {
    type Item = Result<ParsedItem, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let event = match self.next_event() {
                Ok(event) => event,
                Err(e) => return Some(Err(e)),
            };
            match event {
                Event::Start(start) => {
                    if let Err(e) = self.check_root(&start) {
                        return Some(Err(e));
                    }
                    self.depth += 1;
                    if start.name().as_ref() == self.source.selectors.item.as_bytes() {
                        return Some(self.read_item());
                    }
                }
                Event::Empty(start) => {
                    if let Err(e) = self.check_root(&start) {
                        return Some(Err(e));
                    }
                }
                Event::End(_) => self.depth = self.depth.saturating_sub(1),
                Event::Text(t) if self.depth == 0 => {
                    if !t.iter().all(u8::is_ascii_whitespace) {
                        return Some(Err(self.fail("text content outside the root element")));
                    }
                }
                Event::Eof => {
                    if !self.saw_root {
                        return Some(Err(self.fail("payload contains no feed document")));
                    }
                    if self.depth > 0 {
                        return Some(Err(self.fail("document ended before its root element closed")));
                    }
                    self.done = true;
                    return None;
                }
                _ => {}
            }
        }
    }
}

fn link_href(start: &BytesStart<'_>) -> Option<String> {
    let rel = attribute(start, b"rel");
    if rel.as_deref().is_some_and(|r| r != "alternate") {
        return None;
    }
    attribute(start, b"href")
}

fn attribute(start: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    start
        .attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| {
            let raw = String::from_utf8_lossy(&a.value).into_owned();
            let unescaped = unescape(&raw).map(Cow::into_owned).ok();
            unescaped.unwrap_or(raw)
        })
}

/// Expand a character or predefined entity reference; unknown names are kept verbatim.
fn resolve_reference(reference: &[u8]) -> String {
    let name = String::from_utf8_lossy(reference);
    if let Some(code) = name.strip_prefix('#') {
        let value = match code.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse::<u32>().ok(),
        };
        return value
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default();
    }
    match resolve_predefined_entity(&name) {
        Some(resolved) => resolved.to_string(),
        None => format!("&{name};"),
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_absolute_http(link: &str) -> bool {
    Url::parse(link)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}
