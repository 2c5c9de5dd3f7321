//! Feed listing: HTML parsing and page-by-page pagination.

mod paginator;
mod parser;

pub use paginator::{ListingPaginator, PaginateError};
pub use parser::{parse_listing, ParsedListing};
