//! HTTP plumbing shared by every stage of the pipeline.
//!
//! - [`RateLimiter`]: minimum interval between requests per domain
//! - [`Fetcher`]: bounded retries, size-capped bodies, age confirmation
//! - [`build_client`]: the browser-like session all requests go through

mod fetcher;
mod limiter;

pub use fetcher::{FetchError, FetchRequest, FetchedPage, Fetcher, RetryPolicy, TransportError};
pub use limiter::RateLimiter;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, DNT, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::Client;

use crate::config::{Config, ConfigError};
use crate::util::domain_of;

/// Failure to assemble the HTTP session from a [`Config`].
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

const MAX_REDIRECTS: usize = 5;

fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("Too many redirects");
        }

        // Detect loops
        let url = attempt.url();
        for prev in attempt.previous() {
            if prev.as_str() == url.as_str() {
                return attempt.error("Redirect loop detected");
            }
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

/// Builds the HTTP session: browser-like default headers and a cookie jar
/// that survives for the life of the client, so resets keep the session.
pub fn build_client(config: &Config) -> reqwest::Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers.insert(DNT, HeaderValue::from_static("1"));
    headers.insert("upgrade-insecure-requests", HeaderValue::from_static("1"));
    match HeaderValue::from_str(&config.user_agent) {
        Ok(value) => {
            headers.insert(USER_AGENT, value);
        }
        Err(_) => {
            tracing::warn!(user_agent = %config.user_agent, "Invalid user agent, sending none");
        }
    }

    Client::builder()
        .default_headers(headers)
        .cookie_store(true)
        .redirect(create_redirect_policy())
        .pool_max_idle_per_host(4)
        .tcp_keepalive(std::time::Duration::from_secs(60))
        .build()
}

/// Builds a [`Fetcher`] whose limiter applies the listing period to the
/// listing domain and the media period everywhere else.
pub fn fetcher_from_config(config: &Config) -> Result<Fetcher, BuildError> {
    let root = config.listing_root_url()?;
    let mut limiter = RateLimiter::new(config.media_period());
    if let Some(domain) = domain_of(&root) {
        limiter = limiter.with_period(domain, config.listing_period());
    }
    let client = build_client(config)?;
    Ok(Fetcher::new(client, limiter)
        .with_timeout(config.request_timeout())
        .with_max_body(config.max_response_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_fetcher_from_config_sets_listing_period() {
        let config = Config::default();
        let fetcher = fetcher_from_config(&config).unwrap();
        assert_eq!(
            fetcher.limiter().period("old.reddit.com"),
            Duration::from_secs(2)
        );
        assert_eq!(fetcher.limiter().period("imgur.com"), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_client_sends_browser_headers() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("dnt", "1"))
            .and(header("accept-language", "en-US,en;q=0.5"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = build_client(&Config::default()).unwrap();
        let response = client.get(mock_server.uri()).send().await.unwrap();
        assert!(response.status().is_success());
    }

    #[tokio::test]
    async fn test_cookies_persist_across_requests() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("cookie", "over18=1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("with cookie"))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).insert_header("set-cookie", "over18=1; Path=/"),
            )
            .mount(&mock_server)
            .await;

        let client = build_client(&Config::default()).unwrap();
        client.get(mock_server.uri()).send().await.unwrap();
        let body = client
            .get(mock_server.uri())
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "with cookie");
    }
}
