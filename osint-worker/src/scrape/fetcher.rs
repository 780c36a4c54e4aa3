//! Page fetching with domain filtering and user agent rotation.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{redirect, Client};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use super::options::ScrapingOptions;
use crate::html::{parse_page, ScrapedPage};
use crate::util::{build_headers, pick_user_agent};
use crate::Config;

/// Errors that can occur while scraping a page.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("domain not allowed: {0}")]
    DomainNotAllowed(String),

    #[error("timed out fetching {0}")]
    Timeout(String),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to fetch {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ScrapeError {
    fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            ScrapeError::Timeout(url.to_string())
        } else {
            ScrapeError::Http {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// Fetches pages and turns them into [`ScrapedPage`]s.
///
/// Cheap to clone; clones share the underlying connection pools.
#[derive(Clone)]
pub struct WebScraper {
    client: Client,
    no_redirect_client: Client,
    user_agent_pool: Option<Vec<String>>,
    allow_domains: Vec<String>,
    deny_domains: Vec<String>,
    default_timeout: Duration,
}

impl WebScraper {
    /// Create a scraper from explicit settings.
    pub fn new(
        default_timeout: Duration,
        user_agent_pool: Option<Vec<String>>,
        allow_domains: Option<Vec<String>>,
        deny_domains: Option<Vec<String>>,
    ) -> Result<Self, ScrapeError> {
        let client = Client::builder()
            .pool_max_idle_per_host(16)
            .build()
            .map_err(ScrapeError::Client)?;

        let no_redirect_client = Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .map_err(ScrapeError::Client)?;

        Ok(Self {
            client,
            no_redirect_client,
            user_agent_pool,
            allow_domains: allow_domains.unwrap_or_default(),
            deny_domains: deny_domains.unwrap_or_default(),
            default_timeout,
        })
    }

    /// Create a scraper from the application configuration.
    pub fn from_config(config: &Config) -> Result<Self, ScrapeError> {
        Self::new(
            Duration::from_millis(config.scrape_timeout_ms),
            config.user_agent_pool.clone(),
            config.allow_domains.clone(),
            config.deny_domains.clone(),
        )
    }

    /// Default options with the configured timeout applied.
    pub fn default_options(&self) -> ScrapingOptions {
        ScrapingOptions {
            timeout_ms: self.default_timeout.as_millis() as u64,
            ..ScrapingOptions::default()
        }
    }

    /// Fetch `url` and extract what `options` asks for.
    pub async fn scrape(
        &self,
        url: &str,
        options: &ScrapingOptions,
    ) -> Result<ScrapedPage, ScrapeError> {
        let target = self.check_url(url, options)?;

        let user_agent =
            pick_user_agent(options.user_agent.as_deref(), self.user_agent_pool.as_deref());
        let client = if options.follow_redirects {
            &self.client
        } else {
            &self.no_redirect_client
        };

        let mut request = client.get(target).timeout(options.timeout());
        for (key, value) in build_headers(&user_agent) {
            request = request.header(key, value);
        }

        debug!(url = %url, user_agent = %user_agent, "scrape_fetching");

        let response = request
            .send()
            .await
            .map_err(|e| ScrapeError::from_reqwest(url, e))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(ScrapeError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers
                    .entry(name.as_str().to_string())
                    .or_insert_with(|| value.to_string());
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| ScrapeError::from_reqwest(url, e))?;

        let mut page = parse_page(url, &body, options);
        page.status_code = status.as_u16();
        page.headers = headers;

        info!(
            url = %url,
            status_code = page.status_code,
            body_length = body.len(),
            links = page.links.len(),
            "page_scraped"
        );

        Ok(page)
    }

    /// Scrape `urls` one after another, pausing `rate_limit_delay` between
    /// pages. A page that fails yields an empty placeholder with status 0.
    pub async fn scrape_multiple(
        &self,
        urls: &[String],
        options: &ScrapingOptions,
    ) -> Vec<ScrapedPage> {
        let mut pages = Vec::with_capacity(urls.len());

        for (i, url) in urls.iter().enumerate() {
            if i > 0 && options.rate_limit_delay_ms > 0 {
                sleep(options.rate_limit_delay()).await;
            }

            match self.scrape(url, options).await {
                Ok(page) => pages.push(page),
                Err(e) => {
                    warn!(url = %url, error = %e, "scrape_failed");
                    pages.push(ScrapedPage::new(url.as_str()));
                }
            }
        }

        pages
    }

    fn check_url(&self, url: &str, options: &ScrapingOptions) -> Result<Url, ScrapeError> {
        let parsed = Url::parse(url).map_err(|e| ScrapeError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ScrapeError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        let host = parsed.host_str().unwrap_or_default().to_lowercase();

        let deny: Vec<&String> = self
            .deny_domains
            .iter()
            .chain(options.disallowed_domains.iter())
            .collect();
        let allow: Vec<&String> = self
            .allow_domains
            .iter()
            .chain(options.allowed_domains.iter())
            .collect();

        if !is_domain_allowed(&host, &allow, &deny) {
            debug!(url = %url, host = %host, "scrape_domain_filtered");
            return Err(ScrapeError::DomainNotAllowed(host));
        }

        Ok(parsed)
    }
}

/// Deny wins over allow; an empty allow list permits every domain.
///
/// A domain entry matches itself and any of its subdomains.
pub fn is_domain_allowed<S: AsRef<str>>(host: &str, allow: &[S], deny: &[S]) -> bool {
    let host = host.to_lowercase();
    let matches = |domain: &S| {
        let domain = domain.as_ref().trim().trim_start_matches('.').to_lowercase();
        !domain.is_empty() && (host == domain || host.ends_with(&format!(".{domain}")))
    };

    if deny.iter().any(matches) {
        return false;
    }

    allow.is_empty() || allow.iter().any(matches)
}
