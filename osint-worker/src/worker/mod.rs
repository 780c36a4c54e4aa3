//! Worker: serves the scrape and analysis RPCs and runs investigations.
//!
//! For each concurrency slot the worker runs three consume loops:
//! - a `scrape` responder backed by [`WebScraper`]
//! - an `analyze_text` responder backed by [`TextAnalysisService`]
//! - an `investigate` consumer chaining both RPCs
//!
//! All loops share one transport and stop together.

pub mod jobs;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::analysis::TextAnalysisService;
use crate::queue::{
    InvestigateJob, Queue, QueueOptions, Transport, ANALYZE_QUEUE, INVESTIGATE_QUEUE, SCRAPE_QUEUE,
};
use crate::scrape::WebScraper;
use crate::Config;

pub use jobs::{analyze_text, scrape_page, AnalyzeRpc, InvestigationReport, Investigator, ScrapeRpc};

/// All consume loops of one worker process.
pub struct Worker {
    investigate: Arc<Queue<InvestigateJob>>,
    scrape: Arc<ScrapeRpc>,
    analyze: Arc<AnalyzeRpc>,
    scraper: WebScraper,
    analysis: TextAnalysisService,
    rpc_timeout: Duration,
    concurrency: usize,
    shutdown: CancellationToken,
}

impl Worker {
    /// Open the worker's queues on `transport`.
    pub async fn open(transport: Arc<dyn Transport>, config: &Config) -> Result<Self> {
        let options = QueueOptions::from_config(config);

        let investigate =
            Queue::open(Arc::clone(&transport), INVESTIGATE_QUEUE, options.clone())
                .await
                .context("Failed to open investigate queue")?;
        let scrape = ScrapeRpc::open(Arc::clone(&transport), SCRAPE_QUEUE, options.clone())
            .await
            .context("Failed to open scrape queue")?;
        let analyze = AnalyzeRpc::open(transport, ANALYZE_QUEUE, options)
            .await
            .context("Failed to open analyze queue")?;

        let scraper = WebScraper::from_config(config).context("Failed to create scraper")?;

        Ok(Self {
            investigate: Arc::new(investigate),
            scrape: Arc::new(scrape),
            analyze: Arc::new(analyze),
            scraper,
            analysis: TextAnalysisService::default(),
            rpc_timeout: config.rpc_timeout(),
            concurrency: config.worker_concurrency.max(1),
            shutdown: CancellationToken::new(),
        })
    }

    /// Investigator issuing RPCs through this worker's queues.
    pub fn investigator(&self) -> Investigator {
        Investigator::new(
            Arc::clone(&self.scrape),
            Arc::clone(&self.analyze),
            self.rpc_timeout,
            self.shutdown.clone(),
        )
    }

    /// Stop every loop and abort in-flight RPC waits. The transport stays open.
    pub fn stop(&self) {
        self.shutdown.cancel();
        self.investigate.stop();
        self.scrape.stop();
        self.analyze.stop();
    }

    /// Run all consume loops until [`stop`](Self::stop) is called or a loop
    /// fails. A failing loop stops the others.
    pub async fn run(&self) -> Result<()> {
        let mut tasks = JoinSet::new();

        for _ in 0..self.concurrency {
            let scrape = Arc::clone(&self.scrape);
            let scraper = self.scraper.clone();
            tasks.spawn(async move {
                scrape
                    .consume_with_reply(move |request| {
                        let scraper = scraper.clone();
                        async move { scrape_page(&scraper, request).await }
                    })
                    .await
            });

            let analyze = Arc::clone(&self.analyze);
            let analysis = self.analysis.clone();
            tasks.spawn(async move {
                analyze
                    .consume_with_reply(move |request| {
                        let result = analyze_text(&analysis, request);
                        async move { result }
                    })
                    .await
            });

            let investigate = Arc::clone(&self.investigate);
            let investigator = self.investigator();
            tasks.spawn(async move {
                investigate
                    .consume(move |job| {
                        let investigator = investigator.clone();
                        async move { investigator.investigate(job).await.map(|_| ()) }
                    })
                    .await
            });
        }

        info!(concurrency = self.concurrency, loops = tasks.len(), "worker_ready");

        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            let err = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => anyhow::Error::new(e).context("consume loop failed"),
                Err(e) => anyhow!("consume loop panicked: {e}"),
            };

            let message = format!("{err:#}");
            error!(error = %message, "worker_loop_failed");
            self.stop();
            failure.get_or_insert(err);
        }

        info!("worker_loops_stopped");

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
