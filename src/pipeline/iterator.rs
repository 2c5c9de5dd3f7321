use async_trait::async_trait;
use url::Url;

use super::{EndOfFeed, MediaSource};
use crate::config::Config;
use crate::http::{fetcher_from_config, BuildError, FetchError, FetchedPage, Fetcher, RetryPolicy};
use crate::listing::ListingPaginator;
use crate::resolve::ResolverChain;
use crate::types::{MediaExtensions, MediaKind, MediaRecord, SubmissionRecord};
use crate::util::extension_of;

/// A submission that resolved to a classifiable media URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSubmission {
    pub record: SubmissionRecord,
    pub kind: MediaKind,
    /// URL whose body is the payload: the video itself, or the image bytes.
    pub media_url: String,
}

/// Running tallies across the iterator's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterStats {
    pub resolved: u64,
    pub unresolved: u64,
}

/// Lazy sequence of resolved media for one feed source.
///
/// Owns the [`Fetcher`] (HTTP session and rate limits), the
/// [`ListingPaginator`] and the [`ResolverChain`]. Nothing here is shared;
/// exactly one task drives it.
pub struct FeedIterator {
    fetcher: Fetcher,
    paginator: ListingPaginator,
    resolvers: ResolverChain,
    extensions: MediaExtensions,
    media_policy: RetryPolicy,
    unresolved_ceiling: usize,
    stats: IterStats,
}

impl FeedIterator {
    pub fn new(
        fetcher: Fetcher,
        paginator: ListingPaginator,
        resolvers: ResolverChain,
        extensions: MediaExtensions,
        media_policy: RetryPolicy,
        unresolved_ceiling: usize,
    ) -> Self {
        Self {
            fetcher,
            paginator,
            resolvers,
            extensions,
            media_policy,
            unresolved_ceiling,
            stats: IterStats::default(),
        }
    }

    pub fn from_config(config: &Config, feed: &str) -> Result<Self, BuildError> {
        let fetcher = fetcher_from_config(config)?;
        let paginator = ListingPaginator::new(
            config.listing_root_url()?,
            feed,
            config.page_size,
            config.listing_retry(),
        );
        Ok(Self::new(
            fetcher,
            paginator,
            ResolverChain::from_config(config),
            config.extensions(),
            config.media_retry(),
            config.unresolved_ceiling(),
        ))
    }

    /// Replaces the circuit breaker ceiling for subsequent calls.
    pub fn set_unresolved_ceiling(&mut self, ceiling: usize) {
        self.unresolved_ceiling = ceiling.max(1);
    }

    pub fn stats(&self) -> IterStats {
        self.stats
    }

    pub fn paginator(&self) -> &ListingPaginator {
        &self.paginator
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Next submission that resolves to image or video media.
    ///
    /// Unresolvable submissions are skipped. The circuit breaker counts them
    /// per call and gives up once the ceiling is reached without a success.
    pub async fn next_resolved(&mut self) -> Result<ResolvedSubmission, EndOfFeed> {
        let mut unresolved = 0;
        let resolved = self.resolve_next(&mut unresolved).await?;
        self.stats.resolved += 1;
        Ok(resolved)
    }

    /// Next media record with its payload downloaded.
    ///
    /// Images carry their bytes. Videos keep their URL for streaming and
    /// carry the preview image; a video without one counts as unresolved.
    pub async fn next_media(&mut self) -> Result<MediaRecord, EndOfFeed> {
        let mut unresolved = 0;
        loop {
            let resolved = self.resolve_next(&mut unresolved).await?;
            let referer = resolved.record.referer.as_deref();

            if resolved.kind != MediaKind::Video {
                let page = self
                    .download(&resolved.media_url, referer)
                    .await
                    .map_err(EndOfFeed::Download)?;
                self.stats.resolved += 1;
                return Ok(MediaRecord::Image {
                    url: resolved.media_url,
                    data: page.body,
                });
            }

            let Some(extra) = resolved.record.extra_url.as_deref() else {
                tracing::debug!(url = %resolved.media_url, "Video without preview, skipping");
                self.count_unresolved(&mut unresolved)?;
                continue;
            };
            let preview = self
                .download(extra, referer)
                .await
                .map_err(EndOfFeed::Download)?
                .body;
            self.stats.resolved += 1;
            return Ok(MediaRecord::Video {
                url: resolved.media_url,
                preview,
            });
        }
    }

    async fn resolve_next(
        &mut self,
        unresolved: &mut usize,
    ) -> Result<ResolvedSubmission, EndOfFeed> {
        loop {
            let mut record = self
                .paginator
                .next_record(&mut self.fetcher)
                .await
                .map_err(EndOfFeed::Listing)?;

            let outcome = match self.resolvers.resolve(&mut record, &mut self.fetcher).await {
                Ok(()) => classify(&record, &self.extensions),
                Err(_) => None,
            };

            match outcome {
                Some((kind, media_url)) => {
                    return Ok(ResolvedSubmission {
                        record,
                        kind,
                        media_url,
                    });
                }
                None => self.count_unresolved(unresolved)?,
            }
        }
    }

    /// Counts one unresolved submission against this call's ceiling.
    fn count_unresolved(&mut self, unresolved: &mut usize) -> Result<(), EndOfFeed> {
        *unresolved += 1;
        self.stats.unresolved += 1;
        if *unresolved >= self.unresolved_ceiling {
            tracing::info!(
                feed = %self.paginator.feed(),
                unresolved = *unresolved,
                "Too many submissions without media, stopping"
            );
            return Err(EndOfFeed::TooManyUnresolved {
                unresolved: *unresolved,
            });
        }
        Ok(())
    }

    /// Downloads `url` through the rate limiter with the media retry policy.
    pub async fn download(
        &mut self,
        url: &str,
        referer: Option<&str>,
    ) -> Result<FetchedPage, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_owned()))?;
        self.fetcher.get(&parsed, referer, &self.media_policy).await
    }

    /// Points the iterator at a new feed. The HTTP session, rate limits and
    /// stats carry over.
    pub fn reset(&mut self, feed: &str) {
        self.paginator.reset(feed);
    }
}

/// Kind of a resolved record and the URL its payload comes from.
///
/// Albums resolve to a `/zip` URL without an extension; they count as an
/// image when the extra preview is one.
fn classify(
    record: &SubmissionRecord,
    extensions: &MediaExtensions,
) -> Option<(MediaKind, String)> {
    match extensions.kind_of(&record.url) {
        Some(kind) => Some((kind, record.url.clone())),
        None => {
            let extra = record.extra_url.as_deref()?;
            extension_of(extra)
                .filter(|ext| extensions.is_image(ext))
                .map(|_| (MediaKind::Image, extra.to_owned()))
        }
    }
}

#[async_trait]
impl MediaSource for FeedIterator {
    async fn next_media(&mut self) -> Result<MediaRecord, EndOfFeed> {
        FeedIterator::next_media(self).await
    }

    fn reset(&mut self, feed: &str) {
        FeedIterator::reset(self, feed);
    }
}
