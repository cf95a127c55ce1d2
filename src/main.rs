use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

use feed_digest::app;
use feed_digest::config::Config;
use feed_digest::feed::{FeedListSource, S3FeedList};
use feed_digest::mail::{Envelope, SendOutcome, SmtpMailer, StdoutSender};

#[derive(Parser, Debug)]
#[command(
    name = "feed-digest",
    about = "Email a digest of yesterday's articles from an OPML feed list"
)]
struct Args {
    /// Optional TOML config file (environment variables take precedence)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Read the feed list from a local OPML file instead of S3
    #[arg(long, value_name = "FILE")]
    feed_list: Option<PathBuf>,

    /// Collect articles from this UTC day instead of yesterday
    #[arg(long, value_name = "YYYY-MM-DD")]
    date: Option<NaiveDate>,

    /// Print the digest to stdout instead of emailing it
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr) // keep stdout for --dry-run output
        .init();

    let args = Args::parse();

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    let source = match &args.feed_list {
        Some(path) => FeedListSource::File(path.clone()),
        None => {
            let (bucket, key) = config
                .feed_list_location()
                .context("No feed list configured (use --feed-list for a local file)")?;
            FeedListSource::S3(S3FeedList::from_env(bucket, key).await)
        }
    };

    let day = args.date.unwrap_or_else(app::yesterday_utc);
    tracing::info!(day = %day, source = %source, dry_run = args.dry_run, "Starting digest run");

    let summary = if args.dry_run {
        let envelope = config.envelope().unwrap_or_else(|_| Envelope {
            from: config.from_email.clone().unwrap_or_default(),
            to: config.to_email.clone().unwrap_or_default(),
            subject: config.subject.clone(),
        });
        app::run(&config, &source, &StdoutSender, &envelope, day).await?
    } else {
        // Fail fast on missing mail settings, before any feed is fetched
        let envelope = config.envelope().context("Email addresses not configured")?;
        let mailer = SmtpMailer::new(config.smtp().context("SMTP not configured")?);
        app::run(&config, &source, &mailer, &envelope, day).await?
    };

    match &summary.outcome {
        SendOutcome::Sent => tracing::info!(
            articles = summary.articles,
            failed_sources = summary.failed_sources,
            "Run complete"
        ),
        SendOutcome::Failed(reason) => tracing::error!(
            reason = %reason,
            articles = summary.articles,
            "Run complete, but the digest was not delivered"
        ),
    }

    Ok(())
}
