//! URL helpers shared by the listing, resolver and fetch layers.
//!
//! - **Domain extraction**: the dispatch and rate-limit key of a URL
//! - **Extension extraction**: classifies direct media URLs
//! - **Relative link resolution**: listing `data-url` values may be site-relative

mod url;

pub use self::url::{domain_of, domain_of_str, extension_of, resolve_href, url_extension};
