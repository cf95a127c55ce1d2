//! Feed list loading, RSS/Atom feed fetching and date filtering.
//!
//! - **Feed list**: load the OPML outline from S3 or a local file and flatten it
//! - **Fetching**: one HTTP attempt per feed, bounded by a timeout and a size limit
//! - **Parsing**: feed-rs for entries, plus the raw date texts of each entry
//! - **Dates**: pick one publication time per entry across `pubDate`/`published`/`updated`
//!
//! # Architecture
//!
//! - [`source`] - where the feed list lives
//! - [`opml`] - outline document parsing
//! - [`fetcher`] - HTTP retrieval, day filtering and list rendering
//! - [`parser`] - low-level feed parsing using the `feed-rs` crate
//! - [`dates`] - publication date normalization
//!
//! # Example
//!
//! ```ignore
//! use feed_digest::feed::{FeedFetcher, FeedListSource};
//!
//! let doc = FeedListSource::File("feeds.opml".into()).load().await?;
//! let fetcher = FeedFetcher::new(Duration::from_secs(30))?;
//! let result = fetcher.fetch_articles("https://blog.example/rss", yesterday).await;
//! ```

pub mod dates;
pub mod fetcher;
pub mod opml;
pub mod parser;
pub mod source;

pub use dates::{normalize, parse_date_str, RawDateFields};
pub use fetcher::{
    render_article_list, select_articles, ArticleListItem, FeedFetcher, FetchError, SourceResult,
};
pub use opml::{FeedListDocument, OpmlError, OutlineKind, OutlineNode};
pub use parser::{parse_feed, FeedEntry};
pub use source::{FeedListError, FeedListSource, S3FeedList};
