//! Web page scraping.

pub mod fetcher;
pub mod options;

pub use fetcher::{is_domain_allowed, ScrapeError, WebScraper};
pub use options::ScrapingOptions;
