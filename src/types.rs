use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::util::extension_of;

// ============================================================================
// Submission Types
// ============================================================================

/// Resource locator of a single listing submission.
///
/// `url` starts out as whatever the listing linked to (often a landing page)
/// and is replaced in place by a resolver with a direct media URL. `referer`
/// always names the page that legitimately led to `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub url: String,
    #[serde(rename = "extra")]
    pub extra_url: Option<String>,
    pub referer: Option<String>,
}

impl SubmissionRecord {
    pub fn new(url: impl Into<String>, referer: Option<String>) -> Self {
        Self {
            url: url.into(),
            extra_url: None,
            referer,
        }
    }
}

/// Pagination state needed to request the next listing page.
///
/// `after_id` is the feed-assigned id of the last marker on the most recent
/// page (promoted or not) without its `thing_` prefix, e.g. `t3_abc123`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationCursor {
    pub seen_count: usize,
    pub after_id: String,
    pub referer: String,
}

impl PaginationCursor {
    /// True until the first page has been fetched successfully.
    pub fn is_first_page(&self) -> bool {
        self.seen_count == 0
    }
}

// ============================================================================
// Media Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    /// Sentinel: the pipeline is exhausted.
    None,
}

/// Terminal artifact handed to the display layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRecord {
    /// Image bytes fetched from `url`.
    Image { url: String, data: Bytes },
    /// Video to be streamed from `url`, with its preview image.
    Video { url: String, preview: Bytes },
    /// No more media for the current feed source.
    Exhausted,
}

impl MediaRecord {
    pub fn kind(&self) -> MediaKind {
        match self {
            MediaRecord::Image { .. } => MediaKind::Image,
            MediaRecord::Video { .. } => MediaKind::Video,
            MediaRecord::Exhausted => MediaKind::None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, MediaRecord::Exhausted)
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            MediaRecord::Image { url, .. } | MediaRecord::Video { url, .. } => Some(url),
            MediaRecord::Exhausted => None,
        }
    }
}

// ============================================================================
// Extension Sets
// ============================================================================

/// File extensions recognized as directly fetchable media.
///
/// Comparison is ASCII case-insensitive; entries are stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaExtensions {
    image: Vec<String>,
    video: Vec<String>,
}

impl MediaExtensions {
    pub fn new<I, V>(image: I, video: V) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        V: IntoIterator,
        V::Item: AsRef<str>,
    {
        let normalize = |ext: &str| ext.trim_start_matches('.').to_ascii_lowercase();
        Self {
            image: image.into_iter().map(|e| normalize(e.as_ref())).collect(),
            video: video.into_iter().map(|e| normalize(e.as_ref())).collect(),
        }
    }

    pub fn is_image(&self, ext: &str) -> bool {
        self.image.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    pub fn is_video(&self, ext: &str) -> bool {
        self.video.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    pub fn is_known(&self, ext: &str) -> bool {
        self.is_image(ext) || self.is_video(ext)
    }

    /// Extension of `url`'s path if it is in either set.
    pub fn known_extension(&self, url: &str) -> Option<String> {
        extension_of(url).filter(|ext| self.is_known(ext))
    }

    /// Classifies a direct URL by its extension.
    pub fn kind_of(&self, url: &str) -> Option<MediaKind> {
        let ext = extension_of(url)?;
        if self.is_video(&ext) {
            Some(MediaKind::Video)
        } else if self.is_image(&ext) {
            Some(MediaKind::Image)
        } else {
            None
        }
    }
}

impl Default for MediaExtensions {
    fn default() -> Self {
        Self::new(["jpg", "jpeg", "png"], ["mp4", "webm"])
    }
}
