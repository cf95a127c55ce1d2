//! Turns a feed list into the HTML digest.
//!
//! [`walker`] drives the fetcher over the outline, [`report`] assembles the
//! body and the trailing error section.

pub mod report;
pub mod walker;

use chrono::NaiveDate;

use crate::feed::{FeedFetcher, FeedListDocument};

pub use report::{build_report, ERRORS_HEADER};
pub use walker::{walk, FailedSource, Walk};

/// A finished digest, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub day: NaiveDate,
    pub html: String,
    pub articles: usize,
    pub failures: Vec<FailedSource>,
}

/// Walks `doc` for articles published on `day` and builds the report.
pub async fn build_digest(doc: &FeedListDocument, fetcher: &FeedFetcher, day: NaiveDate) -> Digest {
    let walk = walk(doc, fetcher, day).await;
    let html = build_report(&walk);

    tracing::info!(
        day = %day,
        articles = walk.articles,
        failed_sources = walk.failures.len(),
        "Digest built"
    );

    Digest {
        day,
        html,
        articles: walk.articles,
        failures: walk.failures,
    }
}
