//! Publication date normalization across RSS and Atom date fields.
//!
//! RSS items carry `pubDate`, Atom entries carry `published` and/or `updated`,
//! and some feeds mix them. feed-rs already parses the common cases into
//! structured times; the raw element text is kept as a fallback for the
//! formats it rejects.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Zoned formats tried after RFC 2822 and RFC 3339.
const ZONED_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%a, %d %b %Y %H:%M %z",
    "%d %b %Y %H:%M:%S %z",
];

/// Zone-less formats. Interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%a, %d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M:%S",
];

/// The date-bearing fields of one feed entry, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDateFields {
    /// Structured `published` time, as parsed by feed-rs.
    pub published_parsed: Option<DateTime<Utc>>,
    /// Structured `updated` time, as parsed by feed-rs.
    pub updated_parsed: Option<DateTime<Utc>>,
    /// Raw `<pubDate>` text (RSS).
    pub pub_date: Option<String>,
    /// Raw `<updated>` text (Atom).
    pub updated: Option<String>,
    /// Raw `<published>` text (Atom).
    pub published: Option<String>,
}

/// Extracts one publication timestamp from an entry's date fields.
///
/// Candidates are tried in a fixed order: structured published, structured
/// updated, raw `pubDate`, raw `updated`, raw `published`. The first present
/// field that parses wins; a field that is present but unparsable is skipped.
///
/// Returns `None` when nothing parses. Callers treat such entries as undated.
pub fn normalize(fields: &RawDateFields) -> Option<DateTime<Utc>> {
    fields
        .published_parsed
        .or(fields.updated_parsed)
        .or_else(|| {
            [&fields.pub_date, &fields.updated, &fields.published]
                .into_iter()
                .flatten()
                .find_map(|raw| parse_date_str(raw))
        })
}

/// Parses a free-form feed date string into UTC.
///
/// Accepts RFC 2822, RFC 3339 and a set of common ISO-8601 and RFC 822
/// variants seen in the wild. Zone-less values are taken as UTC; a bare
/// date is taken as midnight UTC.
pub fn parse_date_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
