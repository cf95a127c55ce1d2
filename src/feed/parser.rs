use feed_rs::model::{Entry, Link, Text};
use feed_rs::parser;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::feed::dates::RawDateFields;
use crate::util::html_to_text;

/// One article from a parsed feed, before date filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub dates: RawDateFields,
}

/// Parses RSS/Atom bytes into entries, in feed order.
///
/// Structured times come from feed-rs. The raw `pubDate`/`updated`/`published`
/// texts come from a second pass over the XML so that dates feed-rs rejects can
/// still be recovered by the date normalizer.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedEntry>, parser::ParseFeedError> {
    let feed = parser::parse(bytes)?;

    let mut raw_entries = scan_raw_entries(bytes).unwrap_or_default();
    if raw_entries.len() != feed.entries.len() {
        // Entry correlation is positional; a mismatch means the scan can't be trusted
        if !raw_entries.is_empty() {
            tracing::debug!(
                entries = feed.entries.len(),
                scanned = raw_entries.len(),
                "Raw date scan disagrees with parsed entries, using structured dates only"
            );
        }
        raw_entries = vec![RawEntry::default(); feed.entries.len()];
    }

    let entries = feed
        .entries
        .into_iter()
        .zip(raw_entries)
        .map(|(entry, raw)| to_feed_entry(entry, raw))
        .collect();

    Ok(entries)
}

fn to_feed_entry(entry: Entry, raw: RawEntry) -> FeedEntry {
    let link = pick_link(&entry.links).map(|l| l.href.trim().to_string());
    // feed-rs drops an empty <title></title>; it is still a title
    let title = match entry.title.as_ref() {
        Some(text) => Some(title_text(text)),
        None if raw.has_title => Some(String::new()),
        None => None,
    };

    FeedEntry {
        title,
        link: link.filter(|l| !l.is_empty()),
        dates: RawDateFields {
            published_parsed: entry.published,
            updated_parsed: entry.updated,
            ..raw.dates
        },
    }
}

/// Plain text of an entry title. Titles typed as HTML/XHTML are stripped and decoded.
fn title_text(title: &Text) -> String {
    match title.content_type.essence().to_string().as_str() {
        "text/html" | "application/xhtml+xml" => html_to_text(&title.content),
        _ => title.content.trim().to_string(),
    }
}

/// Prefers the `alternate` link (the article page) over self/enclosure links.
fn pick_link(links: &[Link]) -> Option<&Link> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
}

#[derive(Debug, Clone, Copy)]
enum DateField {
    PubDate,
    Updated,
    Published,
}

impl DateField {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"pubDate" => Some(Self::PubDate),
            b"updated" => Some(Self::Updated),
            b"published" => Some(Self::Published),
            _ => None,
        }
    }

    fn set(self, fields: &mut RawDateFields, value: String) {
        let slot = match self {
            Self::PubDate => &mut fields.pub_date,
            Self::Updated => &mut fields.updated,
            Self::Published => &mut fields.published,
        };
        // First occurrence wins
        if slot.is_none() {
            *slot = Some(value);
        }
    }
}

fn is_entry_element(name: &[u8]) -> bool {
    name == b"item" || name == b"entry"
}

/// What the raw scan saw inside one `<item>`/`<entry>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RawEntry {
    dates: RawDateFields,
    has_title: bool,
}

/// Collects the raw date texts of every `<item>`/`<entry>` in document order,
/// and whether each one carries a `<title>` element.
///
/// Only direct children of the entry element are considered. Returns `None`
/// if the XML cannot be read to the end.
fn scan_raw_entries(bytes: &[u8]) -> Option<Vec<RawEntry>> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut entries: Vec<RawEntry> = Vec::new();
    let mut buf = Vec::new();
    let mut depth: usize = 0;
    let mut entry_depth: Option<usize> = None;
    let mut capture: Option<DateField> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                depth += 1;
                let local = e.local_name();
                match entry_depth {
                    None if is_entry_element(local.as_ref()) => {
                        entry_depth = Some(depth);
                        entries.push(RawEntry::default());
                    }
                    Some(d) if depth == d + 1 => {
                        mark_title(&mut entries, local.as_ref());
                        capture = DateField::from_local_name(local.as_ref());
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                let local = e.local_name();
                match entry_depth {
                    None if is_entry_element(local.as_ref()) => entries.push(RawEntry::default()),
                    Some(d) if depth == d => mark_title(&mut entries, local.as_ref()),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                if entry_depth == Some(depth) {
                    entry_depth = None;
                }
                capture = None;
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Text(t)) => {
                if let (Some(field), Some(entry)) = (capture, entries.last_mut()) {
                    if let Ok(text) = t.unescape() {
                        field.set(&mut entry.dates, text.into_owned());
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if let (Some(field), Some(entry)) = (capture, entries.last_mut()) {
                    field.set(&mut entry.dates, String::from_utf8_lossy(&c).into_owned());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::trace!(error = %e, "Raw date scan aborted");
                return None;
            }
            _ => {}
        }
        buf.clear();
    }

    Some(entries)
}

fn mark_title(entries: &mut [RawEntry], name: &[u8]) {
    if name == b"title" {
        if let Some(entry) = entries.last_mut() {
            entry.has_title = true;
        }
    }
}
