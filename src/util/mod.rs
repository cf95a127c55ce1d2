//! Utility functions for common operations.
//!
//! - **HTML escaping**: safe embedding of feed-supplied titles and links in the digest
//! - **HTML to text**: plain-text rendering of titles feeds mark as HTML
//!
//! # Examples
//!
//! ```
//! use feed_digest::util::escape_html;
//!
//! let safe = escape_html("Tips & tricks");
//! assert_eq!(safe, "Tips &amp; tricks");
//! ```

mod text;

pub use text::{escape_html, html_to_text};
