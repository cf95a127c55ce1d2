use std::borrow::Cow;

use html_escape::{decode_html_entities, encode_quoted_attribute};

/// Escapes a string for use as HTML text or a single/double-quoted attribute value.
///
/// Entity encoding of `&`, `<`, `>`, `'` and `"` is done by `html_escape`.
/// C0 control characters other than tab, newline and carriage return are
/// dropped first. Feed titles routinely carry raw `&` and stray control bytes.
///
/// # Returns
///
/// - `Cow::Borrowed(s)` when nothing needs replacing (no allocation)
/// - `Cow::Owned` with the escaped text otherwise
///
/// # Examples
///
/// ```
/// use feed_digest::util::escape_html;
///
/// assert_eq!(escape_html("Plain title"), "Plain title");
/// assert_eq!(escape_html("Q&A <live>"), "Q&amp;A &lt;live&gt;");
/// assert!(!escape_html("it's").contains('\''));
/// ```
pub fn escape_html(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_dropped_control) {
        return encode_quoted_attribute(s);
    }

    let cleaned: String = s.chars().filter(|&c| !is_dropped_control(c)).collect();
    Cow::Owned(encode_quoted_attribute(&cleaned).into_owned())
}

/// Converts an HTML fragment (an Atom `type="html"` title, say) to plain text.
///
/// Tags are removed, entities decoded once, and runs of whitespace collapsed
/// to a single space. The result is unescaped text, ready for [`escape_html`].
///
/// # Examples
///
/// ```
/// use feed_digest::util::html_to_text;
///
/// assert_eq!(html_to_text("Tips &amp; <em>Tricks</em>"), "Tips & Tricks");
/// ```
pub fn html_to_text(html: &str) -> String {
    let mut stripped = String::with_capacity(html.len());
    let mut in_tag = false;

    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => stripped.push(c),
            _ => {}
        }
    }

    decode_html_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_dropped_control(c: char) -> bool {
    c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r')
}
