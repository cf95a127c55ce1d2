use crate::feed::dates::normalize;
use crate::feed::parser::{parse_feed, FeedEntry};
use crate::util::escape_html;
use chrono::NaiveDate;
use futures::StreamExt;
use std::fmt::Write as _;
use std::time::{Duration, Instant};
use thiserror::Error;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const USER_AGENT: &str = concat!("feed-digest/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur while fetching and parsing one feed.
///
/// Never escapes the fetcher: every variant is folded into
/// [`SourceResult::FetchFailed`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// The outline's `xmlUrl` is not a valid absolute URL
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Server reported the feed as gone (404/410)
    #[error("Feed not found: status {0}")]
    NotFound(u16),
    /// HTTP response with any other non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Feed XML could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
}

/// An article kept for the digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleListItem {
    pub title: String,
    pub link: String,
}

/// Outcome of processing one feed source for the target day.
#[derive(Debug)]
pub enum SourceResult {
    /// At least one article from the target day, rendered as an HTML list.
    Articles { html: String, count: usize },
    /// The feed was read but had nothing from the target day.
    NoArticles,
    /// The feed could not be fetched or parsed.
    FetchFailed(FetchError),
}

/// Fetches feeds one at a time and selects the target day's articles.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl FeedFetcher {
    /// Builds a fetcher with its own HTTP client.
    ///
    /// `timeout` bounds each feed end to end (connect, headers and body).
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self::with_client(client, timeout))
    }

    /// Uses an existing HTTP client (allows custom configuration).
    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Fetches `feed_url` and renders the articles published on `day` (UTC).
    ///
    /// One attempt, no retries. Any failure is returned as
    /// [`SourceResult::FetchFailed`]; this never panics or propagates.
    pub async fn fetch_articles(&self, feed_url: &str, day: NaiveDate) -> SourceResult {
        let started = Instant::now();

        let entries = match self.fetch_entries(feed_url).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    feed = %feed_url,
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Failed to fetch feed"
                );
                return SourceResult::FetchFailed(e);
            }
        };

        let total = entries.len();
        let items = select_articles(entries, day);
        tracing::info!(
            feed = %feed_url,
            entries = total,
            found = items.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetched feed"
        );

        if items.is_empty() {
            SourceResult::NoArticles
        } else {
            SourceResult::Articles {
                html: render_article_list(&items),
                count: items.len(),
            }
        }
    }

    async fn fetch_entries(&self, feed_url: &str) -> Result<Vec<FeedEntry>, FetchError> {
        let url = url::Url::parse(feed_url)?;

        let bytes = tokio::time::timeout(self.timeout, self.fetch_bytes(url))
            .await
            .map_err(|_| FetchError::Timeout)??;

        parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))
    }

    async fn fetch_bytes(&self, url: url::Url) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Network(e)
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            return Err(FetchError::NotFound(status.as_u16()));
        }
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        read_limited_bytes(response, MAX_FEED_SIZE).await
    }
}

/// Keeps entries dated on `day`, in feed order.
///
/// Entries without a title or link, or without any parseable date, are
/// dropped silently.
pub fn select_articles(entries: Vec<FeedEntry>, day: NaiveDate) -> Vec<ArticleListItem> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let (Some(title), Some(link)) = (entry.title, entry.link) else {
                tracing::trace!("Skipping entry without title or link");
                return None;
            };
            let published = normalize(&entry.dates)?;
            (published.date_naive() == day).then_some(ArticleListItem { title, link })
        })
        .collect()
}

/// Renders articles as `<ul><li><a href='LINK'>TITLE</a></li>...</ul>`.
pub fn render_article_list(items: &[ArticleListItem]) -> String {
    let mut html = String::from("<ul>");
    for item in items {
        let _ = write!(
            html,
            "<li><a href='{}'>{}</a></li>",
            escape_html(&item.link),
            escape_html(&item.title)
        );
    }
    html.push_str("</ul>");
    html
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    // EDGE-005: A dropped connection can end the stream short of Content-Length
    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::dates::RawDateFields;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DAY: (i32, u32, u32) = (2024, 10, 15);

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(DAY.0, DAY.1, DAY.2).unwrap()
    }

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>BlogX</title>
    <item>
        <title>Post A</title>
        <link>https://x.example/a</link>
        <pubDate>Tue, 15 Oct 2024 10:00:00 GMT</pubDate>
    </item>
    <item>
        <title>Post B</title>
        <link>https://x.example/b</link>
        <pubDate>Mon, 14 Oct 2024 10:00:00 GMT</pubDate>
    </item>
    <item>
        <title>Post C</title>
        <link>https://x.example/c</link>
        <pubDate>Tue, 15 Oct 2024 23:59:59 GMT</pubDate>
    </item>
    <item>
        <title>Tomorrow</title>
        <link>https://x.example/d</link>
        <pubDate>Wed, 16 Oct 2024 00:00:00 GMT</pubDate>
    </item>
</channel></rss>"#;

    fn fetcher() -> FeedFetcher {
        FeedFetcher::new(Duration::from_secs(5)).unwrap()
    }

    async fn serve(body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .insert_header("Content-Type", "application/rss+xml"),
            )
            .mount(&mock_server)
            .await;
        mock_server
    }

    fn entry(title: Option<&str>, link: Option<&str>, date: Option<&str>) -> FeedEntry {
        FeedEntry {
            title: title.map(str::to_string),
            link: link.map(str::to_string),
            dates: RawDateFields {
                pub_date: date.map(str::to_string),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_fetch_keeps_only_target_day_in_order() {
        let server = serve(RSS).await;

        let result = fetcher()
            .fetch_articles(&format!("{}/feed", server.uri()), day())
            .await;

        match result {
            SourceResult::Articles { html, count } => {
                assert_eq!(count, 2);
                assert_eq!(
                    html,
                    "<ul><li><a href='https://x.example/a'>Post A</a></li>\
                     <li><a href='https://x.example/c'>Post C</a></li></ul>"
                );
            }
            other => panic!("Expected Articles, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_no_articles_for_day() {
        let server = serve(RSS).await;
        let other_day = NaiveDate::from_ymd_opt(2024, 9, 1).unwrap();

        let result = fetcher()
            .fetch_articles(&format!("{}/feed", server.uri()), other_day)
            .await;
        assert!(matches!(result, SourceResult::NoArticles));
    }

    #[tokio::test]
    async fn test_fetch_empty_feed_is_no_articles() {
        let server = serve(r#"<?xml version="1.0"?><rss version="2.0"><channel></channel></rss>"#).await;

        let result = fetcher()
            .fetch_articles(&format!("{}/feed", server.uri()), day())
            .await;
        assert!(matches!(result, SourceResult::NoArticles));
    }

    #[tokio::test]
    async fn test_fetch_404_is_not_found() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1) // single attempt, no retry
            .mount(&mock_server)
            .await;

        let result = fetcher()
            .fetch_articles(&format!("{}/feed", mock_server.uri()), day())
            .await;
        match result {
            SourceResult::FetchFailed(FetchError::NotFound(404)) => {}
            other => panic!("Expected NotFound(404), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_500_fails_without_retry() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = fetcher()
            .fetch_articles(&format!("{}/feed", mock_server.uri()), day())
            .await;
        match result {
            SourceResult::FetchFailed(FetchError::HttpStatus(500)) => {}
            other => panic!("Expected HttpStatus(500), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_feed_is_parse_error() {
        let server = serve("<not valid xml").await;

        let result = fetcher()
            .fetch_articles(&format!("{}/feed", server.uri()), day())
            .await;
        match result {
            SourceResult::FetchFailed(FetchError::Parse(_)) => {}
            other => panic!("Expected Parse error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Bind then release a port so nothing is listening on it
        let uri = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            format!("http://{}", listener.local_addr().unwrap())
        };

        let result = fetcher().fetch_articles(&format!("{}/feed", uri), day()).await;
        assert!(matches!(result, SourceResult::FetchFailed(FetchError::Network(_))));
    }

    #[tokio::test]
    async fn test_invalid_url_is_failure() {
        let result = fetcher().fetch_articles("not a url", day()).await;
        match result {
            SourceResult::FetchFailed(FetchError::InvalidUrl(_)) => {}
            other => panic!("Expected InvalidUrl, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_feed_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(RSS)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let fetcher = FeedFetcher::new(Duration::from_millis(200)).unwrap();
        let result = fetcher
            .fetch_articles(&format!("{}/feed", mock_server.uri()), day())
            .await;
        match result {
            SourceResult::FetchFailed(FetchError::Timeout) => {}
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_select_skips_malformed_and_undated_entries() {
        let entries = vec![
            entry(None, Some("https://x.example/1"), Some("2024-10-15")),
            entry(Some("No link"), None, Some("2024-10-15")),
            entry(Some("Undated"), Some("https://x.example/3"), None),
            entry(Some("Bad date"), Some("https://x.example/4"), Some("soon")),
            entry(Some("Kept"), Some("https://x.example/5"), Some("2024-10-15T06:00:00Z")),
            entry(Some("Too old"), Some("https://x.example/6"), Some("2024-10-13")),
        ];

        let items = select_articles(entries, day());
        assert_eq!(
            items,
            vec![ArticleListItem {
                title: "Kept".to_string(),
                link: "https://x.example/5".to_string(),
            }]
        );
    }

    #[test]
    fn test_select_compares_utc_calendar_day() {
        // 23:30 at -02:00 is 01:30 UTC the next day
        let entries = vec![entry(
            Some("Late"),
            Some("https://x.example/late"),
            Some("2024-10-14T23:30:00-02:00"),
        )];
        assert_eq!(select_articles(entries, day()).len(), 1);
    }

    #[test]
    fn test_render_escapes_title_and_link() {
        let html = render_article_list(&[ArticleListItem {
            title: "Q&A <live>".to_string(),
            link: "https://x.example/?a=1&b=2".to_string(),
        }]);
        assert_eq!(
            html,
            "<ul><li><a href='https://x.example/?a=1&amp;b=2'>Q&amp;A &lt;live&gt;</a></li></ul>"
        );
    }

    #[tokio::test]
    async fn test_html_title_rendered_once_escaped() {
        let atom = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom"><id>urn:x</id><title>X</title>
    <updated>2024-10-15T12:00:00Z</updated>
    <entry>
        <id>urn:x:1</id>
        <title type="html">Tips &amp;amp; &lt;em&gt;Tricks&lt;/em&gt;</title>
        <link href="https://a.example/1"/>
        <updated>2024-10-15T09:00:00Z</updated>
    </entry>
</feed>"#;
        let server = serve(atom).await;

        let result = fetcher()
            .fetch_articles(&format!("{}/feed", server.uri()), day())
            .await;

        match result {
            SourceResult::Articles { html, count } => {
                assert_eq!(count, 1);
                assert_eq!(
                    html,
                    "<ul><li><a href='https://a.example/1'>Tips &amp; Tricks</a></li></ul>"
                );
            }
            other => panic!("Expected Articles, got {:?}", other),
        }
    }
}
