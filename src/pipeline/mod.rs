//! The media pipeline: listing → resolvers → downloads → look-ahead cache.
//!
//! [`FeedIterator`] produces one [`MediaRecord`] per call and owns every
//! piece of network state. [`PrefetchQueue`] moves an iterator onto a
//! background task and keeps a small buffer filled ahead of the consumer.

mod iterator;
mod prefetch;

pub use iterator::{FeedIterator, IterStats, ResolvedSubmission};
pub use prefetch::{PrefetchHandle, PrefetchQueue};

use async_trait::async_trait;
use thiserror::Error;

use crate::http::FetchError;
use crate::listing::PaginateError;
use crate::types::MediaRecord;

/// Terminal signal of an iteration. The original failure is the source.
#[derive(Debug, Error)]
pub enum EndOfFeed {
    #[error("feed listing ended")]
    Listing(#[source] PaginateError),

    /// Circuit breaker: too many submissions in a row had no media.
    #[error("{unresolved} submissions in a row without media")]
    TooManyUnresolved { unresolved: usize },

    #[error("media download failed")]
    Download(#[source] FetchError),
}

/// Something that produces media records and can be pointed at a new feed.
///
/// [`FeedIterator`] is the production implementation; the prefetch worker
/// only depends on this trait.
#[async_trait]
pub trait MediaSource: Send + 'static {
    async fn next_media(&mut self) -> Result<MediaRecord, EndOfFeed>;

    fn reset(&mut self, feed: &str);
}
