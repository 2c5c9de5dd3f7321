//! Streams directly-fetchable media out of a paginated community feed.
//!
//! The pipeline pages through an HTML listing, resolves each submission to a
//! direct media URL through per-host resolvers, downloads the payload under
//! per-domain rate limits and hands the result to a background look-ahead
//! cache. See [`pipeline`] for the entry points.

pub mod config;
pub mod http;
pub mod listing;
pub mod pipeline;
pub mod resolve;
pub mod types;
pub mod util;

pub use config::{Config, ConfigError};
pub use pipeline::{EndOfFeed, FeedIterator, MediaSource, PrefetchHandle, PrefetchQueue};
pub use types::{MediaKind, MediaRecord, SubmissionRecord};
