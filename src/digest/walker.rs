use chrono::NaiveDate;

use crate::feed::{FeedFetcher, FeedListDocument, OutlineKind, SourceResult};
use crate::util::escape_html;

/// A feed source whose fetch failed during the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedSource {
    pub title: String,
    pub url: String,
}

/// Everything the walk produced, in traversal order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Walk {
    /// Body fragments: folder headers and per-source article blocks.
    pub fragments: Vec<String>,
    /// Sources that could not be fetched or parsed.
    pub failures: Vec<FailedSource>,
    /// Total articles across all sources.
    pub articles: usize,
}

/// Visits every outline in document order, one fetch at a time.
///
/// - Folders emit `<hr><h1>TITLE</h1>` and are never fetched.
/// - Sources with articles emit `<h2>TITLE</h2>` followed by the list.
/// - Sources with nothing for `day` emit nothing.
/// - Failed sources emit nothing and are recorded in [`Walk::failures`].
///
/// Outlines that are neither folders nor carry a feed URL are grouping
/// labels from readers that don't set `type`; they are skipped.
pub async fn walk(doc: &FeedListDocument, fetcher: &FeedFetcher, day: NaiveDate) -> Walk {
    let mut walk = Walk::default();

    for node in &doc.nodes {
        match node.kind {
            OutlineKind::Folder => {
                tracing::info!(folder = %node.title, "Category");
                walk.fragments.push(folder_header(&node.title));
            }
            OutlineKind::Source => {
                let Some(url) = node.feed_url.as_deref() else {
                    tracing::debug!(title = %node.title, "Outline without feed URL, skipping");
                    continue;
                };

                tracing::info!(source = %node.title, feed = %url, "Source");
                match fetcher.fetch_articles(url, day).await {
                    SourceResult::Articles { html, count } => {
                        walk.articles += count;
                        walk.fragments.push(source_block(&node.title, &html));
                    }
                    SourceResult::NoArticles => {}
                    SourceResult::FetchFailed(_) => {
                        walk.failures.push(FailedSource {
                            title: node.title.clone(),
                            url: url.to_string(),
                        });
                    }
                }
            }
        }
    }

    walk
}

fn folder_header(title: &str) -> String {
    format!("<hr><h1>{}</h1>", escape_html(title))
}

fn source_block(title: &str, articles_html: &str) -> String {
    format!("<h2>{}</h2>{}", escape_html(title), articles_html)
}
