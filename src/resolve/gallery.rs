use scraper::{Html, Selector};
use std::sync::OnceLock;
use url::Url;

use super::ResolveError;
use crate::http::{Fetcher, RetryPolicy};
use crate::types::{MediaExtensions, SubmissionRecord};
use crate::util::{extension_of, resolve_href};

/// Suffix the gallery host serves whole albums under.
const ALBUM_SUFFIX: &str = "/zip";

struct GallerySelectors {
    video: Selector,
    image: Selector,
    preview: Selector,
}

impl GallerySelectors {
    fn get() -> &'static Self {
        static SELECTORS: OnceLock<GallerySelectors> = OnceLock::new();
        SELECTORS.get_or_init(|| GallerySelectors {
            video: Selector::parse(r#"meta[property="og:video"]"#).expect("og:video selector"),
            image: Selector::parse(r#"meta[property="og:image"]"#).expect("og:image selector"),
            preview: Selector::parse(r#"link[rel="image_src"]"#).expect("image_src selector"),
        })
    }
}

/// Resolves landing pages of the gallery host.
#[derive(Debug, Clone)]
pub struct GalleryResolver {
    extensions: MediaExtensions,
    policy: RetryPolicy,
}

impl GalleryResolver {
    pub fn new(extensions: MediaExtensions, policy: RetryPolicy) -> Self {
        Self { extensions, policy }
    }

    pub async fn resolve(
        &self,
        record: &mut SubmissionRecord,
        fetcher: &mut Fetcher,
    ) -> Result<(), ResolveError> {
        if self.extensions.known_extension(&record.url).is_some() {
            return Ok(());
        }

        let mut page_url = Url::parse(&record.url)
            .map_err(|e| ResolveError::unavailable(&record.url, e.to_string()))?;
        rewrite_gallery_path(&mut page_url);

        let page = fetcher
            .get(&page_url, record.referer.as_deref(), &self.policy)
            .await
            .map_err(|e| ResolveError::fetch_failed(&record.url, e))?;

        let found = parse_landing_page(&page.text(), &page.url, &self.extensions).ok_or_else(
            || ResolveError::unavailable(&record.url, "no media tags on landing page"),
        )?;

        record.url = found.url;
        record.extra_url = found.extra;
        record.referer = Some(page.url.to_string());
        Ok(())
    }
}

/// Rewrites `/gallery/<id>` to the single-item `/a/<id>` form.
fn rewrite_gallery_path(url: &mut Url) {
    let rewritten = url
        .path()
        .strip_prefix("/gallery/")
        .map(|id| format!("/a/{id}"));
    if let Some(path) = rewritten {
        url.set_path(&path);
    }
}

#[derive(Debug, PartialEq, Eq)]
struct LandingMedia {
    url: String,
    extra: Option<String>,
}

/// Looks for a playable video first, then for an album preview.
fn parse_landing_page(
    html: &str,
    page_url: &Url,
    extensions: &MediaExtensions,
) -> Option<LandingMedia> {
    let document = Html::parse_document(html);
    let selectors = GallerySelectors::get();

    let meta_url = |selector: &Selector, attr: &str| {
        document
            .select(selector)
            .filter_map(|element| element.value().attr(attr))
            .find_map(|value| resolve_href(value, page_url))
            .map(String::from)
    };

    if let Some(video) = meta_url(&selectors.video, "content") {
        if extension_of(&video).is_some_and(|ext| extensions.is_known(&ext)) {
            return Some(LandingMedia {
                url: video,
                extra: meta_url(&selectors.image, "content"),
            });
        }
    }

    let preview = meta_url(&selectors.preview, "href")?;
    let mut album = page_url.clone();
    album.set_query(None);
    album.set_fragment(None);
    Some(LandingMedia {
        url: format!("{}{ALBUM_SUFFIX}", album.as_str().trim_end_matches('/')),
        extra: Some(preview),
    })
}
