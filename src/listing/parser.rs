use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use url::Url;

use crate::types::SubmissionRecord;
use crate::util::resolve_href;

/// Marker id fragment identifying a link submission on the listing.
const SUBMISSION_MARKER: &str = "thing_t3";
const MARKER_PREFIX: &str = "thing_";
const PROMOTED_CLASS: &str = "promoted";

/// Result of parsing one listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedListing {
    /// Non-promoted submissions, in page order.
    pub records: Vec<SubmissionRecord>,
    /// Id of the last marker on the page, promoted or not, prefix stripped.
    pub last_id: Option<String>,
    /// Number of submission markers found, promoted included.
    pub markers: usize,
}

struct ListingSelectors {
    first_marker: Selector,
}

impl ListingSelectors {
    fn get() -> &'static Self {
        static SELECTORS: OnceLock<ListingSelectors> = OnceLock::new();
        SELECTORS.get_or_init(|| ListingSelectors {
            first_marker: Selector::parse(r#"div[id*="thing_t3"]"#).expect("marker selector"),
        })
    }
}

fn is_marker(element: &ElementRef<'_>) -> bool {
    element.value().name() == "div"
        && element
            .value()
            .id()
            .is_some_and(|id| id.contains(SUBMISSION_MARKER))
}

/// Parses a listing page into submission records.
///
/// The first submission marker in document order anchors the scan; its
/// sibling markers follow in order. Markers carrying the `promoted` class
/// are counted for the cursor but not yielded. Every record gets
/// `page_url` as its referer; relative `data-url` values resolve against it.
pub fn parse_listing(html: &str, page_url: &Url) -> ParsedListing {
    let document = Html::parse_document(html);
    let selectors = ListingSelectors::get();

    let Some(first) = document.select(&selectors.first_marker).next() else {
        return ParsedListing::default();
    };

    let siblings = first
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .filter(is_marker);

    let mut listing = ParsedListing::default();
    for marker in std::iter::once(first).chain(siblings) {
        listing.markers += 1;
        if let Some(id) = marker.value().id() {
            listing.last_id = Some(id.replacen(MARKER_PREFIX, "", 1));
        }

        if marker.value().classes().any(|class| class == PROMOTED_CLASS) {
            continue;
        }

        let Some(data_url) = marker.value().attr("data-url") else {
            tracing::debug!(id = ?marker.value().id(), "Submission marker without data-url");
            continue;
        };
        match resolve_href(data_url, page_url) {
            Some(url) => listing
                .records
                .push(SubmissionRecord::new(url, Some(page_url.to_string()))),
            None => {
                tracing::debug!(data_url = data_url, "Unparsable submission URL, skipping");
            }
        }
    }

    listing
}
