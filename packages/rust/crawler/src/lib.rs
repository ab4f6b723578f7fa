//! Retrieval of competitor pages.
//!
//! This crate provides:
//! - [`SearchProvider`] and [`GoogleCustomSearch`]: ranked search results
//! - [`PageFetcher`] and [`HttpFetcher`]: raw page markup over HTTP
//! - [`SiteResearcher`]: search + fetch for one keyword, with partial-result gaps

pub mod fetcher;
pub mod researcher;
pub mod search;

pub use fetcher::{HttpFetcher, PageFetcher, is_ssrf_target};
pub use researcher::{ResearchOutput, SiteResearcher};
pub use search::{GoogleCustomSearch, GoogleSearchOptions, SearchProvider};
