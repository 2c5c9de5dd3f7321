//! Turns submission URLs into direct media URLs.
//!
//! Dispatch is by the exact domain of the submission URL:
//!
//! | Domain | Resolver |
//! |---|---|
//! | `gallery_host` | [`GalleryResolver`]: landing page meta tags |
//! | `video_host` | [`VideoResolver`]: embedded `<video>` sources |
//! | anything else | [`DirectResolver`]: extension check, no request |
//!
//! A resolver mutates the record only on success. [`ResolveError`] is a
//! continue signal for the caller, not a fatal error.

mod direct;
mod gallery;
mod video;

pub use direct::DirectResolver;
pub use gallery::GalleryResolver;
pub use video::VideoResolver;

use thiserror::Error;

use crate::config::Config;
use crate::http::{FetchError, Fetcher};
use crate::types::SubmissionRecord;
use crate::util::domain_of_str;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("media unavailable at {url}: {reason}")]
    MediaUnavailable {
        url: String,
        reason: String,
        #[source]
        source: Option<FetchError>,
    },
}

impl ResolveError {
    pub(crate) fn unavailable(url: &str, reason: impl Into<String>) -> Self {
        ResolveError::MediaUnavailable {
            url: url.to_owned(),
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn fetch_failed(url: &str, source: FetchError) -> Self {
        ResolveError::MediaUnavailable {
            url: url.to_owned(),
            reason: "landing page unavailable".to_owned(),
            source: Some(source),
        }
    }
}

/// The closed set of resolver kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverKind {
    Direct,
    Gallery,
    Video,
}

/// Domain-dispatched resolver set.
#[derive(Debug, Clone)]
pub struct ResolverChain {
    gallery_host: String,
    video_host: String,
    direct: DirectResolver,
    gallery: GalleryResolver,
    video: VideoResolver,
}

impl ResolverChain {
    pub fn new(
        gallery_host: impl Into<String>,
        video_host: impl Into<String>,
        direct: DirectResolver,
        gallery: GalleryResolver,
        video: VideoResolver,
    ) -> Self {
        Self {
            gallery_host: gallery_host.into(),
            video_host: video_host.into(),
            direct,
            gallery,
            video,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let extensions = config.extensions();
        let policy = config.media_retry();
        Self::new(
            config.gallery_host.clone(),
            config.video_host.clone(),
            DirectResolver::new(extensions.clone()),
            GalleryResolver::new(extensions.clone(), policy),
            VideoResolver::new(extensions, config.video_source_prefixes.clone(), policy),
        )
    }

    /// Which resolver handles `url`. Matching is case-sensitive.
    pub fn kind_for(&self, url: &str) -> ResolverKind {
        match domain_of_str(url) {
            Some(domain) if domain == self.gallery_host => ResolverKind::Gallery,
            Some(domain) if domain == self.video_host => ResolverKind::Video,
            _ => ResolverKind::Direct,
        }
    }

    /// Resolves `record` in place.
    ///
    /// # Errors
    ///
    /// [`ResolveError::MediaUnavailable`] if no direct media was found; the
    /// record is left exactly as it was.
    pub async fn resolve(
        &self,
        record: &mut SubmissionRecord,
        fetcher: &mut Fetcher,
    ) -> Result<(), ResolveError> {
        let kind = self.kind_for(&record.url);
        let result = match kind {
            ResolverKind::Direct => self.direct.resolve(record),
            ResolverKind::Gallery => self.gallery.resolve(record, fetcher).await,
            ResolverKind::Video => self.video.resolve(record, fetcher).await,
        };
        match &result {
            Ok(()) => tracing::debug!(resolver = ?kind, url = %record.url, "Resolved submission"),
            Err(e) => tracing::debug!(resolver = ?kind, error = %e, "Submission unresolved"),
        }
        result
    }
}
