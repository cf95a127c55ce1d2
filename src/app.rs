//! One digest run: load the feed list, build the digest, deliver it.
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};

use crate::config::Config;
use crate::digest::{build_digest, Digest};
use crate::feed::{FeedFetcher, FeedListSource};
use crate::mail::{Envelope, ReportSender, SendOutcome};

/// What a completed run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub day: NaiveDate,
    pub articles: usize,
    pub failed_sources: usize,
    pub outcome: SendOutcome,
}

/// The day before `today`. The digest window is a whole UTC calendar day.
pub fn previous_day(today: NaiveDate) -> NaiveDate {
    today.pred_opt().unwrap_or(NaiveDate::MIN)
}

/// Yesterday's UTC calendar date.
pub fn yesterday_utc() -> NaiveDate {
    previous_day(Utc::now().date_naive())
}

/// Runs the whole pipeline once.
///
/// Only a feed list that can't be loaded aborts the run. Per-feed failures
/// end up in the report's error section, and a failed send is reported in
/// [`RunSummary::outcome`] rather than as an error.
pub async fn run<S: ReportSender>(
    config: &Config,
    source: &FeedListSource,
    sender: &S,
    envelope: &Envelope,
    day: NaiveDate,
) -> Result<RunSummary> {
    let doc = source
        .load()
        .await
        .with_context(|| format!("Failed to load the feed list from {}", source))?;

    if doc.source_count() == 0 {
        tracing::warn!(source = %source, "Feed list contains no feed sources");
    }

    let fetcher =
        FeedFetcher::new(config.fetch_timeout()).context("Failed to create HTTP client")?;
    let digest = build_digest(&doc, &fetcher, day).await;

    let outcome = deliver(sender, envelope, &digest).await;

    Ok(RunSummary {
        day,
        articles: digest.articles,
        failed_sources: digest.failures.len(),
        outcome,
    })
}

/// Sends the finished digest exactly once.
pub async fn deliver<S: ReportSender>(sender: &S, envelope: &Envelope, digest: &Digest) -> SendOutcome {
    let outcome = sender
        .send_report(&envelope.from, &envelope.to, &envelope.subject, &digest.html)
        .await;

    match &outcome {
        SendOutcome::Sent => tracing::info!(
            to = %envelope.to,
            day = %digest.day,
            articles = digest.articles,
            "Digest delivered"
        ),
        SendOutcome::Failed(reason) => tracing::error!(
            to = %envelope.to,
            reason = %reason,
            "Digest delivery failed"
        ),
    }

    outcome
}
