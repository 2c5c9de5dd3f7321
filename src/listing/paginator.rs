use std::collections::VecDeque;
use thiserror::Error;
use url::Url;

use super::parser::parse_listing;
use crate::http::{FetchError, Fetcher, RetryPolicy};
use crate::types::{PaginationCursor, SubmissionRecord};

#[derive(Debug, Error)]
pub enum PaginateError {
    /// The page parsed but carried no submission markers at all.
    #[error("no submissions on page {url}")]
    NoSubmissionsOnPage { url: String },

    #[error("listing page unavailable")]
    Fetch(#[source] FetchError),

    #[error("invalid feed URL {url}")]
    InvalidFeedUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Stateful cursor over a feed's listing pages.
///
/// Holds the feed target, the [`PaginationCursor`] and the records of the
/// most recently fetched page. Network access goes through the caller's
/// [`Fetcher`], so the HTTP session outlives any `reset`.
#[derive(Debug)]
pub struct ListingPaginator {
    root: Url,
    feed: String,
    page_size: usize,
    policy: RetryPolicy,
    cursor: PaginationCursor,
    pending: VecDeque<SubmissionRecord>,
}

impl ListingPaginator {
    pub fn new(root: Url, feed: impl Into<String>, page_size: usize, policy: RetryPolicy) -> Self {
        Self {
            root,
            feed: feed.into(),
            page_size,
            policy,
            cursor: PaginationCursor::default(),
            pending: VecDeque::new(),
        }
    }

    pub fn feed(&self) -> &str {
        &self.feed
    }

    pub fn cursor(&self) -> &PaginationCursor {
        &self.cursor
    }

    /// Records left on the current page.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// URL of the next listing page for the current cursor.
    pub fn page_url(&self) -> Result<Url, PaginateError> {
        let root = self.root.as_str().trim_end_matches('/');
        let mut url = format!("{root}/r/{}", self.feed);
        if !self.cursor.is_first_page() {
            url.push_str(&format!(
                "/?count={}&after={}",
                self.cursor.seen_count, self.cursor.after_id
            ));
        }
        Url::parse(&url).map_err(|source| PaginateError::InvalidFeedUrl { url, source })
    }

    /// Fetches and parses the next page, then advances the cursor.
    ///
    /// On any error the cursor and buffered records are left untouched, so
    /// a later call retries the same page.
    pub async fn next_page(&mut self, fetcher: &mut Fetcher) -> Result<usize, PaginateError> {
        let url = self.page_url()?;
        let referer = (!self.cursor.referer.is_empty()).then_some(self.cursor.referer.as_str());

        let page = fetcher
            .fetch_listing(&url, referer, &self.policy)
            .await
            .map_err(PaginateError::Fetch)?;

        let listing = parse_listing(&page.text(), &page.url);
        if listing.markers == 0 {
            return Err(PaginateError::NoSubmissionsOnPage {
                url: page.url.to_string(),
            });
        }

        let yielded = listing.records.len();
        self.pending.extend(listing.records);
        self.cursor.seen_count += self.page_size;
        self.cursor.after_id = listing.last_id.unwrap_or_default();
        self.cursor.referer = page.url.to_string();

        tracing::info!(
            feed = %self.feed,
            page = %page.url,
            markers = listing.markers,
            records = yielded,
            seen = self.cursor.seen_count,
            after = %self.cursor.after_id,
            "Fetched listing page"
        );
        Ok(yielded)
    }

    /// Next submission, fetching pages as the current one runs out.
    pub async fn next_record(
        &mut self,
        fetcher: &mut Fetcher,
    ) -> Result<SubmissionRecord, PaginateError> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(record);
            }
            self.next_page(fetcher).await?;
        }
    }

    /// Points the paginator at a new feed and zeroes the cursor.
    pub fn reset(&mut self, feed: impl Into<String>) {
        self.feed = feed.into();
        self.cursor = PaginationCursor::default();
        self.pending.clear();
        tracing::info!(feed = %self.feed, "Listing reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RateLimiter;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> Fetcher {
        Fetcher::new(reqwest::Client::new(), RateLimiter::new(Duration::ZERO))
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(5))
    }

    fn listing_html(ids: &[&str]) -> String {
        let markers: String = ids
            .iter()
            .map(|id| {
                format!(r#"<div class="thing" id="thing_{id}" data-url="https://i.example.com/{id}.jpg"></div>"#)
            })
            .collect();
        format!("<html><body><div id=\"siteTable\">{markers}</div></body></html>")
    }

    #[test]
    fn test_page_url_shapes() {
        let root = Url::parse("https://old.reddit.com").unwrap();
        let mut paginator = ListingPaginator::new(root, "pics", 25, policy());
        assert_eq!(
            paginator.page_url().unwrap().as_str(),
            "https://old.reddit.com/r/pics"
        );

        paginator.cursor = PaginationCursor {
            seen_count: 50,
            after_id: "t3_xyz".into(),
            referer: String::new(),
        };
        assert_eq!(
            paginator.page_url().unwrap().as_str(),
            "https://old.reddit.com/r/pics/?count=50&after=t3_xyz"
        );
    }

    #[tokio::test]
    async fn test_cursor_advances_by_page_size() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/r/pics"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(listing_html(&["t3_a", "t3_b"])),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/r/pics/"))
            .and(query_param("count", "25"))
            .and(query_param("after", "t3_b"))
            .and(header("referer", format!("{}/r/pics", server.uri()).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&["t3_c"])))
            .expect(1)
            .mount(&server)
            .await;

        let root = Url::parse(&server.uri()).unwrap();
        let mut paginator = ListingPaginator::new(root, "pics", 25, policy());
        let mut fetcher = fetcher();

        assert_eq!(paginator.next_page(&mut fetcher).await.unwrap(), 2);
        assert_eq!(paginator.cursor().seen_count, 25);
        assert_eq!(paginator.cursor().after_id, "t3_b");
        assert_eq!(paginator.cursor().referer, format!("{}/r/pics", server.uri()));

        let mut urls = Vec::new();
        for _ in 0..3 {
            urls.push(paginator.next_record(&mut fetcher).await.unwrap().url);
        }
        assert_eq!(
            urls,
            vec![
                "https://i.example.com/t3_a.jpg",
                "https://i.example.com/t3_b.jpg",
                "https://i.example.com/t3_c.jpg",
            ]
        );
        assert_eq!(paginator.cursor().seen_count, 50);
        assert_eq!(paginator.cursor().after_id, "t3_c");
    }

    #[tokio::test]
    async fn test_failure_leaves_cursor_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/r/pics"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&["t3_a"])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/r/pics/"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let root = Url::parse(&server.uri()).unwrap();
        let mut paginator = ListingPaginator::new(root, "pics", 25, policy());
        let mut fetcher = fetcher();

        paginator.next_page(&mut fetcher).await.unwrap();
        let before = paginator.cursor().clone();

        let err = paginator.next_page(&mut fetcher).await.unwrap_err();
        match err {
            PaginateError::Fetch(FetchError::RequestsFailed {
                attempts, status, ..
            }) => {
                assert_eq!(attempts, 2);
                assert_eq!(status, Some(500));
            }
            e => panic!("Expected RequestsFailed, got {:?}", e),
        }
        assert_eq!(paginator.cursor(), &before);
        assert_eq!(paginator.buffered(), 1);
    }

    #[tokio::test]
    async fn test_page_without_markers_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html><body>empty</body></html>"),
            )
            .mount(&server)
            .await;

        let root = Url::parse(&server.uri()).unwrap();
        let mut paginator = ListingPaginator::new(root, "nothing", 25, policy());
        let err = paginator.next_record(&mut fetcher()).await.unwrap_err();
        assert!(matches!(err, PaginateError::NoSubmissionsOnPage { .. }));
        assert!(paginator.cursor().is_first_page());
    }

    #[test]
    fn test_reset_zeroes_cursor() {
        let root = Url::parse("https://old.reddit.com").unwrap();
        let mut paginator = ListingPaginator::new(root, "pics", 25, policy());
        paginator.cursor = PaginationCursor {
            seen_count: 75,
            after_id: "t3_q".into(),
            referer: "https://old.reddit.com/r/pics/?count=50&after=t3_p".into(),
        };
        paginator
            .pending
            .push_back(SubmissionRecord::new("https://i.example.com/a.png", None));

        paginator.reset("aww");
        assert_eq!(paginator.feed(), "aww");
        assert_eq!(paginator.cursor(), &PaginationCursor::default());
        assert_eq!(paginator.buffered(), 0);
    }
}
