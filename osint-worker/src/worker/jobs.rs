//! Handlers run by the worker's consume loops.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::analysis::{PiiType, TextAnalysisResult, TextAnalysisService};
use crate::html::ScrapedPage;
use crate::queue::{AnalyzeRequest, InvestigateJob, RequestResponseQueue, ScrapeRequest};
use crate::scrape::WebScraper;

/// RPC queue serving page scrapes.
pub type ScrapeRpc = RequestResponseQueue<ScrapeRequest, ScrapedPage>;

/// RPC queue serving text analysis.
pub type AnalyzeRpc = RequestResponseQueue<AnalyzeRequest, TextAnalysisResult>;

/// Number of keywords kept in an investigation report.
const REPORT_KEYWORDS: usize = 10;

/// Serve one scrape request.
pub async fn scrape_page(scraper: &WebScraper, request: ScrapeRequest) -> Result<ScrapedPage> {
    info!(url = %request.url, has_options = request.options.is_some(), "scrape_job_received");

    let options = request
        .options
        .unwrap_or_else(|| scraper.default_options());

    scraper
        .scrape(&request.url, &options)
        .await
        .with_context(|| format!("failed to scrape {}", request.url))
}

/// Serve one text analysis request.
pub fn analyze_text(
    service: &TextAnalysisService,
    request: AnalyzeRequest,
) -> Result<TextAnalysisResult> {
    info!(text_length = request.text.len(), "analyze_job_received");

    service.analyze(&request.text).context("text analysis failed")
}

/// Summary of one investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationReport {
    pub url: String,
    pub title: String,
    pub status_code: u16,
    pub links: usize,
    pub forms: usize,
    pub pii_total: usize,
    pub pii_stats: BTreeMap<String, usize>,
    pub emails: Vec<String>,
    pub top_keywords: Vec<String>,
}

impl InvestigationReport {
    fn new(page: &ScrapedPage, analysis: &TextAnalysisResult) -> Self {
        Self {
            url: page.url.clone(),
            title: page.title.clone(),
            status_code: page.status_code,
            links: page.links.len(),
            forms: page.forms.len(),
            pii_total: analysis.pii_result.total,
            pii_stats: analysis.pii_result.stats.clone(),
            emails: analysis
                .pii_result
                .by_type(PiiType::Email)
                .into_iter()
                .map(|e| e.value.clone())
                .collect(),
            top_keywords: analysis
                .keywords
                .iter()
                .take(REPORT_KEYWORDS)
                .map(|k| k.text.clone())
                .collect(),
        }
    }
}

/// Runs an investigation by chaining the scrape and analysis RPCs.
#[derive(Clone)]
pub struct Investigator {
    scrape: Arc<ScrapeRpc>,
    analyze: Arc<AnalyzeRpc>,
    rpc_timeout: Duration,
    shutdown: CancellationToken,
}

impl Investigator {
    pub fn new(
        scrape: Arc<ScrapeRpc>,
        analyze: Arc<AnalyzeRpc>,
        rpc_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            scrape,
            analyze,
            rpc_timeout,
            shutdown,
        }
    }

    /// Scrape the job's page, analyze its text and log what was found.
    ///
    /// Either RPC failing fails the whole job.
    pub async fn investigate(&self, job: InvestigateJob) -> Result<InvestigationReport> {
        info!(url = %job.url, "investigation_started");

        let page = self
            .scrape
            .send_and_wait(
                &self.shutdown,
                &ScrapeRequest {
                    url: job.url.clone(),
                    options: None,
                },
                self.rpc_timeout,
            )
            .await
            .with_context(|| format!("scrape of {} failed", job.url))?;

        let analysis = self
            .analyze
            .send_and_wait(
                &self.shutdown,
                &AnalyzeRequest {
                    text: page.text.clone(),
                },
                self.rpc_timeout,
            )
            .await
            .with_context(|| format!("analysis of {} failed", job.url))?;

        let report = InvestigationReport::new(&page, &analysis);

        info!(
            url = %report.url,
            title = %report.title,
            status_code = report.status_code,
            links = report.links,
            forms = report.forms,
            pii_total = report.pii_total,
            pii_stats = ?report.pii_stats,
            emails = ?report.emails,
            top_keywords = ?report.top_keywords,
            "investigation_complete"
        );

        Ok(report)
    }
}
