//! Per-request scraping options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Controls how one page is fetched and what is extracted from it.
///
/// Durations travel as milliseconds so options can ride inside queue messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingOptions {
    /// HTTP timeout for the whole request
    pub timeout_ms: u64,
    /// Overrides the rotated user agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub follow_redirects: bool,
    /// Only these domains (and their subdomains) may be fetched
    pub allowed_domains: Vec<String>,
    /// These domains (and their subdomains) are never fetched
    pub disallowed_domains: Vec<String>,
    /// Pause between pages of a multi-page scrape
    pub rate_limit_delay_ms: u64,
    pub extract_text: bool,
    pub extract_links: bool,
    pub extract_images: bool,
    pub extract_forms: bool,
    pub extract_meta: bool,
    pub extract_scripts: bool,
    pub extract_html: bool,
}

impl Default for ScrapingOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            user_agent: None,
            follow_redirects: true,
            allowed_domains: Vec::new(),
            disallowed_domains: Vec::new(),
            rate_limit_delay_ms: 1_000,
            extract_text: true,
            extract_links: true,
            extract_images: true,
            extract_forms: true,
            extract_meta: true,
            extract_scripts: true,
            extract_html: true,
        }
    }
}

impl ScrapingOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ScrapingOptions::default();
        assert_eq!(options.timeout(), Duration::from_secs(30));
        assert_eq!(options.rate_limit_delay(), Duration::from_secs(1));
        assert!(options.follow_redirects);
        assert!(options.extract_text && options.extract_html && options.extract_scripts);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options: ScrapingOptions =
            serde_json::from_str(r#"{"timeout_ms": 500, "extract_html": false}"#).unwrap();
        assert_eq!(options.timeout(), Duration::from_millis(500));
        assert!(!options.extract_html);
        assert!(options.extract_links);
        assert_eq!(options.rate_limit_delay_ms, 1_000);
    }
}
