use scraper::{Html, Selector};
use std::sync::OnceLock;
use url::Url;

use super::ResolveError;
use crate::http::{Fetcher, RetryPolicy};
use crate::types::{MediaExtensions, SubmissionRecord};
use crate::util::{resolve_href, url_extension};

struct VideoSelectors {
    video: Selector,
    source: Selector,
}

impl VideoSelectors {
    fn get() -> &'static Self {
        static SELECTORS: OnceLock<VideoSelectors> = OnceLock::new();
        SELECTORS.get_or_init(|| VideoSelectors {
            video: Selector::parse("video").expect("video selector"),
            source: Selector::parse("source[src]").expect("source selector"),
        })
    }
}

/// Resolves landing pages of the single-video host by scanning the
/// embedded `<video>` sources.
#[derive(Debug, Clone)]
pub struct VideoResolver {
    extensions: MediaExtensions,
    source_prefixes: Vec<String>,
    policy: RetryPolicy,
}

impl VideoResolver {
    pub fn new(
        extensions: MediaExtensions,
        source_prefixes: Vec<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            extensions,
            source_prefixes,
            policy,
        }
    }

    pub async fn resolve(
        &self,
        record: &mut SubmissionRecord,
        fetcher: &mut Fetcher,
    ) -> Result<(), ResolveError> {
        let page_url = Url::parse(&record.url)
            .map_err(|e| ResolveError::unavailable(&record.url, e.to_string()))?;

        let page = fetcher
            .get(&page_url, record.referer.as_deref(), &self.policy)
            .await
            .map_err(|e| ResolveError::fetch_failed(&record.url, e))?;

        let (source, poster) = self
            .find_source(&page.text(), &page.url)
            .ok_or_else(|| ResolveError::unavailable(&record.url, "no accepted video source"))?;

        record.url = source;
        record.extra_url = poster;
        record.referer = Some(page.url.to_string());
        Ok(())
    }

    fn accepts(&self, source: &Url) -> bool {
        let host_ok = source.host_str().is_some_and(|host| {
            self.source_prefixes
                .iter()
                .any(|prefix| host.starts_with(prefix.as_str()))
        });
        host_ok && url_extension(source).is_some_and(|ext| self.extensions.is_video(ext))
    }

    /// First accepted source across all `<video>` elements, with that
    /// element's poster.
    fn find_source(&self, html: &str, page_url: &Url) -> Option<(String, Option<String>)> {
        let document = Html::parse_document(html);
        let selectors = VideoSelectors::get();

        document.select(&selectors.video).find_map(|video| {
            let source = video
                .select(&selectors.source)
                .filter_map(|source| source.value().attr("src"))
                .filter_map(|src| resolve_href(src, page_url))
                .find(|src| self.accepts(src))?;
            let poster = video
                .value()
                .attr("poster")
                .and_then(|poster| resolve_href(poster, page_url))
                .map(String::from);
            Some((source.into(), poster))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RateLimiter;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolver() -> VideoResolver {
        VideoResolver::new(
            MediaExtensions::default(),
            vec!["giant.".into(), "thumbs.".into(), "zippy.".into()],
            RetryPolicy::new(2, Duration::from_millis(5)),
        )
    }

    const CLIP_PAGE: &str = r#"<html><body>
        <video poster="https://thumbs.gfycat.com/Clip-poster.jpg">
            <source src="https://thumbs.gfycat.com/Clip-mobile.gifv" type="video/gif">
            <source src="https://cdn.other.com/Clip.mp4" type="video/mp4">
            <source src="https://giant.gfycat.com/Clip.webm" type="video/webm">
            <source src="https://giant.gfycat.com/Clip.mp4" type="video/mp4">
        </video>
    </body></html>"#;

    #[test]
    fn test_find_source_matches_prefix_and_extension() {
        let page_url = Url::parse("https://gfycat.com/Clip").unwrap();
        let found = resolver().find_source(CLIP_PAGE, &page_url).unwrap();
        assert_eq!(
            found,
            (
                "https://giant.gfycat.com/Clip.webm".to_string(),
                Some("https://thumbs.gfycat.com/Clip-poster.jpg".to_string())
            )
        );
    }

    #[test]
    fn test_find_source_without_poster() {
        let page_url = Url::parse("https://gfycat.com/Clip").unwrap();
        let html = r#"<video><source src="https://zippy.gfycat.com/Clip.mp4"></video>"#;
        let found = resolver().find_source(html, &page_url).unwrap();
        assert_eq!(found.0, "https://zippy.gfycat.com/Clip.mp4");
        assert_eq!(found.1, None);
    }

    #[test]
    fn test_find_source_rejects_image_extensions() {
        let page_url = Url::parse("https://gfycat.com/Clip").unwrap();
        let html = r#"<video><source src="https://giant.gfycat.com/Clip.jpg"></video>"#;
        assert!(resolver().find_source(html, &page_url).is_none());
    }

    #[tokio::test]
    async fn test_resolve_updates_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Clip"))
            .and(header("referer", "https://old.reddit.com/r/gifs"))
            .respond_with(ResponseTemplate::new(200).set_body_string(CLIP_PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let mut fetcher = Fetcher::new(reqwest::Client::new(), RateLimiter::new(Duration::ZERO));
        let mut record = SubmissionRecord::new(
            format!("{}/Clip", server.uri()),
            Some("https://old.reddit.com/r/gifs".into()),
        );
        resolver().resolve(&mut record, &mut fetcher).await.unwrap();

        assert_eq!(record.url, "https://giant.gfycat.com/Clip.webm");
        assert_eq!(
            record.extra_url.as_deref(),
            Some("https://thumbs.gfycat.com/Clip-poster.jpg")
        );
        assert_eq!(record.referer, Some(format!("{}/Clip", server.uri())));
    }

    #[tokio::test]
    async fn test_no_source_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html><body>gone</body></html>"),
            )
            .mount(&server)
            .await;

        let mut fetcher = Fetcher::new(reqwest::Client::new(), RateLimiter::new(Duration::ZERO));
        let mut record = SubmissionRecord::new(format!("{}/Removed", server.uri()), None);
        let before = record.clone();

        let err = resolver().resolve(&mut record, &mut fetcher).await.unwrap_err();
        assert!(err.to_string().contains("no accepted video source"));
        assert_eq!(record, before);
    }
}
