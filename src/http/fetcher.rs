use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{CONTENT_TYPE, ORIGIN, REFERER};
use reqwest::{Client, Method, StatusCode};
use std::borrow::Cow;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::limiter::RateLimiter;
use crate::util::domain_of;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_BODY: usize = 64 * 1024 * 1024; // 64MB

/// Fixed form payload accepted by the feed host's age confirmation page.
const AGE_CONFIRMATION_FORM: &str = "over18=yes";

/// Transport-level failure of a single attempt.
///
/// Never returned on its own: it is carried as the source of
/// [`FetchError::RequestsFailed`] when it was the last attempt's outcome.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("response exceeds {0} bytes")]
    TooLarge(usize),
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// Every attempt failed. `status` is the last HTTP status seen, if any
    /// attempt got that far.
    #[error("requests to {url} failed after {attempts} attempt(s){}", describe_status(.status))]
    RequestsFailed {
        url: String,
        attempts: u32,
        status: Option<u16>,
        #[source]
        source: Option<TransportError>,
    },
    /// The URL has no host to rate limit against.
    #[error("cannot request {0}: URL has no host")]
    InvalidUrl(String),
}

fn describe_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(", last status {code}"),
        None => String::new(),
    }
}

impl FetchError {
    /// Last HTTP status of an exhausted request.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::RequestsFailed { status, .. } => *status,
            FetchError::InvalidUrl(_) => None,
        }
    }
}

/// Attempt count and inter-attempt delay for one class of request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// `attempts` includes the first try and is clamped to at least one.
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// A single attempt, no retries.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// A request description, independent of any client.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub referer: Option<String>,
    pub origin: Option<String>,
    pub form: Option<&'static str>,
}

impl FetchRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            referer: None,
            origin: None,
            form: None,
        }
    }

    /// URL-encoded form POST with a fixed body.
    pub fn post_form(url: Url, form: &'static str) -> Self {
        Self {
            method: Method::POST,
            url,
            referer: None,
            origin: None,
            form: Some(form),
        }
    }

    pub fn with_referer(mut self, referer: Option<&str>) -> Self {
        self.referer = referer.filter(|r| !r.is_empty()).map(str::to_owned);
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// A successful response, read to completion.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: Url,
    pub status: StatusCode,
    pub body: Bytes,
}

impl FetchedPage {
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// HTTP session with bounded retries and per-domain rate limiting.
///
/// Owns the client (and so its cookie jar) and the [`RateLimiter`]. Every
/// attempt first acquires the destination domain from the limiter.
pub struct Fetcher {
    client: Client,
    limiter: RateLimiter,
    timeout: Duration,
    max_body: usize,
    sent: u64,
}

impl Fetcher {
    pub fn new(client: Client, limiter: RateLimiter) -> Self {
        Self {
            client,
            limiter,
            timeout: DEFAULT_TIMEOUT,
            max_body: DEFAULT_MAX_BODY,
            sent: 0,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_body(mut self, max_body: usize) -> Self {
        self.max_body = max_body;
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Number of HTTP attempts issued so far, retries included.
    pub fn requests_sent(&self) -> u64 {
        self.sent
    }

    /// Convenience GET with an optional `Referer`.
    pub async fn get(
        &mut self,
        url: &Url,
        referer: Option<&str>,
        policy: &RetryPolicy,
    ) -> Result<FetchedPage, FetchError> {
        let request = FetchRequest::get(url.clone()).with_referer(referer);
        self.fetch(&request, policy).await
    }

    /// Issues `request` up to `policy.attempts()` times.
    ///
    /// Any non-2xx status or transport error counts as a failed attempt.
    /// Attempts are spaced by `policy.delay()` and each one is gated by the
    /// rate limiter for the request's domain.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] - the URL has no host
    /// - [`FetchError::RequestsFailed`] - every attempt failed
    pub async fn fetch(
        &mut self,
        request: &FetchRequest,
        policy: &RetryPolicy,
    ) -> Result<FetchedPage, FetchError> {
        let domain =
            domain_of(&request.url).ok_or_else(|| FetchError::InvalidUrl(request.url.to_string()))?;

        let mut last_status = None;
        let mut last_error = None;

        for attempt in 1..=policy.attempts() {
            if attempt > 1 {
                tokio::time::sleep(policy.delay()).await;
            }
            self.limiter.acquire(&domain).await;
            self.sent += 1;

            match self.send_once(request).await {
                Ok(page) if page.status.is_success() => {
                    tracing::debug!(
                        url = %request.url,
                        final_url = %page.url,
                        bytes = page.body.len(),
                        attempt = attempt,
                        "Request succeeded"
                    );
                    return Ok(page);
                }
                Ok(page) => {
                    tracing::warn!(
                        url = %request.url,
                        status = %page.status,
                        attempt = attempt,
                        attempts = policy.attempts(),
                        "Request returned non-success status"
                    );
                    last_status = Some(page.status.as_u16());
                    last_error = None;
                }
                Err(e) => {
                    tracing::warn!(
                        url = %request.url,
                        error = %e,
                        attempt = attempt,
                        attempts = policy.attempts(),
                        "Request failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(FetchError::RequestsFailed {
            url: request.url.to_string(),
            attempts: policy.attempts(),
            status: last_status,
            source: last_error,
        })
    }

    /// Fetches a listing page, passing through an age confirmation
    /// interstitial if the host redirects to one.
    ///
    /// The confirmation is a single form POST to the interstitial URL with
    /// `dest=<url>`. A failed confirmation is also `RequestsFailed`.
    pub async fn fetch_listing(
        &mut self,
        url: &Url,
        referer: Option<&str>,
        policy: &RetryPolicy,
    ) -> Result<FetchedPage, FetchError> {
        let page = self.get(url, referer, policy).await?;
        if !is_age_gate(&page.url) {
            return Ok(page);
        }

        tracing::info!(url = %url, gate = %page.url, "Age confirmation page, confirming");

        let mut confirm_url = page.url.clone();
        confirm_url
            .query_pairs_mut()
            .clear()
            .append_pair("dest", url.as_str());
        let origin = url.origin().ascii_serialization();
        let confirm = FetchRequest::post_form(confirm_url, AGE_CONFIRMATION_FORM)
            .with_referer(Some(origin.as_str()))
            .with_origin(origin);

        self.fetch(&confirm, &RetryPolicy::once()).await
    }

    async fn send_once(&self, request: &FetchRequest) -> Result<FetchedPage, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        if let Some(referer) = &request.referer {
            builder = builder.header(REFERER, referer);
        }
        if let Some(origin) = &request.origin {
            builder = builder.header(ORIGIN, origin);
        }
        if let Some(form) = request.form {
            builder = builder
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(form);
        }

        let response = tokio::time::timeout(self.timeout, builder.send())
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))??;

        let url = response.url().clone();
        let status = response.status();
        let body = if status.is_success() {
            read_limited_bytes(response, self.max_body).await?
        } else {
            Bytes::new()
        };

        Ok(FetchedPage { url, status, body })
    }
}

/// True if the final URL is the feed host's age confirmation page.
fn is_age_gate(url: &Url) -> bool {
    url.path().rsplit('/').next() == Some("over18")
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Bytes, TransportError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(TransportError::TooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(TransportError::TooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(Bytes::from(bytes))
}
