//! Configuration file parser for ~/.config/quickpeek/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
//!
//! A loaded `Config` is immutable and handed to every pipeline component at
//! construction; nothing reads settings from globals.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::http::RetryPolicy;
use crate::types::MediaExtensions;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A value parsed but cannot be used.
    #[error("Invalid config value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/77.0.3835.0 Safari/537.36";

/// Top-level pipeline configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the feed host, e.g. `https://old.reddit.com`.
    pub listing_root: String,

    /// Number of submissions per listing page; the cursor advances by this much.
    pub page_size: usize,

    /// Minimum interval between requests to the listing domain.
    pub listing_period_ms: u64,

    /// Minimum interval between requests to any other domain.
    pub media_period_ms: u64,

    /// Total attempts per request (first try included).
    pub max_attempts: u32,

    pub listing_retry_delay_ms: u64,

    pub media_retry_delay_ms: u64,

    /// Per-attempt timeout.
    pub request_timeout_secs: u64,

    /// Response bodies larger than this are rejected.
    pub max_response_bytes: usize,

    pub image_extensions: Vec<String>,

    pub video_extensions: Vec<String>,

    /// Domain of the gallery/video host whose landing pages carry meta tags.
    pub gallery_host: String,

    /// Domain of the single-video host whose landing pages embed `<video>`.
    pub video_host: String,

    /// Sub-domain prefixes accepted for video sources on `video_host` pages.
    pub video_source_prefixes: Vec<String>,

    /// Circuit breaker ceiling, in pages: `unresolved_pages * page_size`.
    pub unresolved_pages: usize,

    /// Look-ahead buffer size of the prefetch queue.
    pub cache_capacity: usize,

    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listing_root: "https://old.reddit.com".to_string(),
            page_size: 25,
            listing_period_ms: 2000,
            media_period_ms: 1000,
            max_attempts: 2,
            listing_retry_delay_ms: 2000,
            media_retry_delay_ms: 1000,
            request_timeout_secs: 30,
            max_response_bytes: 64 * 1024 * 1024,
            image_extensions: vec!["jpg".into(), "jpeg".into(), "png".into()],
            video_extensions: vec!["mp4".into(), "webm".into()],
            gallery_host: "imgur.com".to_string(),
            video_host: "gfycat.com".to_string(),
            video_source_prefixes: vec!["giant.".into(), "thumbs.".into(), "zippy.".into()],
            unresolved_pages: 3,
            cache_capacity: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 17] = [
        "listing_root",
        "page_size",
        "listing_period_ms",
        "media_period_ms",
        "max_attempts",
        "listing_retry_delay_ms",
        "media_retry_delay_ms",
        "request_timeout_secs",
        "max_response_bytes",
        "image_extensions",
        "video_extensions",
        "gallery_host",
        "video_host",
        "video_source_prefixes",
        "unresolved_pages",
        "cache_capacity",
        "user_agent",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    /// - Unusable values → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            listing_root = %config.listing_root,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let root = self.listing_root_url()?;
        if root.host_str().is_none() {
            return Err(ConfigError::Invalid {
                key: "listing_root",
                reason: "URL has no host".to_string(),
            });
        }
        let positive = [
            ("page_size", self.page_size as u64),
            ("max_attempts", u64::from(self.max_attempts)),
            ("cache_capacity", self.cache_capacity as u64),
            ("unresolved_pages", self.unresolved_pages as u64),
            ("max_response_bytes", self.max_response_bytes as u64),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn listing_root_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.listing_root).map_err(|e| ConfigError::Invalid {
            key: "listing_root",
            reason: e.to_string(),
        })
    }

    pub fn listing_period(&self) -> Duration {
        Duration::from_millis(self.listing_period_ms)
    }

    pub fn media_period(&self) -> Duration {
        Duration::from_millis(self.media_period_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn listing_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.listing_retry_delay_ms),
        )
    }

    pub fn media_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.media_retry_delay_ms),
        )
    }

    pub fn extensions(&self) -> MediaExtensions {
        MediaExtensions::new(&self.image_extensions, &self.video_extensions)
    }

    /// Unresolved submissions tolerated by one `next` call before giving up.
    pub fn unresolved_ceiling(&self) -> usize {
        self.unresolved_pages.saturating_mul(self.page_size)
    }
}

// ============================================================================
// Tests
// ============================================================================
