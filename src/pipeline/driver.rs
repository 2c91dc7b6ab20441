use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::ScraperConfig;
use crate::error::PipelineError;
use crate::fetcher::{
    BrowserPage, CatalogNavigator, ChromeSession, PageExtractor, PaginationEnd, SnapshotPage,
};
use crate::models::{Catalog, CatalogDocument};
use crate::processor::NameClassifier;
use crate::storage::CatalogSink;

/// Outcome of one address run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub address: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub declared_pages: u32,
    pub pages_visited: u32,
    pub pages_processed: u32,
    pub pages_failed: Vec<u32>,
    pub item_errors: usize,
    pub end: PaginationEnd,
    pub catalog: Catalog,
    /// Where each sink put the catalog.
    pub outputs: Vec<String>,
}

impl RunReport {
    /// Fewer pages made it into the catalog than the site declared.
    pub fn is_partial(&self) -> bool {
        self.pages_processed < self.declared_pages
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    FromSiteRoot,
    FromCatalog,
}

/// Runs the scraper for one address at a time and hands each finished
/// catalog to the configured sinks.
pub struct PipelineDriver {
    config: ScraperConfig,
    extractor: PageExtractor,
    sinks: Vec<Box<dyn CatalogSink>>,
}

impl PipelineDriver {
    pub fn new(config: ScraperConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let classifier = Arc::new(NameClassifier::new()?);
        let extractor = PageExtractor::new(config.selectors.clone(), classifier)?;
        Ok(Self {
            config,
            extractor,
            sinks: Vec::new(),
        })
    }

    pub fn with_sink(mut self, sink: Box<dyn CatalogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// Launch a browser, scrape `address` live, and shut the browser down.
    pub async fn run(&self, address: &str) -> Result<RunReport, PipelineError> {
        let session = match ChromeSession::launch(&self.config).await {
            Ok(session) => session,
            Err(e) => {
                error!("could not retrieve data for address {}: {:#}", address, e);
                return Err(PipelineError::Browser(format!("{:#}", e)));
            }
        };

        let result = self.execute(session.page(), address, RunMode::FromSiteRoot).await;
        session.close().await;
        result
    }

    /// Scrape `address` on a page the caller owns.
    pub async fn run_on_page<P>(&self, page: &P, address: &str) -> Result<RunReport, PipelineError>
    where
        P: BrowserPage + ?Sized,
    {
        self.execute(page, address, RunMode::FromSiteRoot).await
    }

    /// Re-run extraction over saved catalog pages in `dir`.
    pub async fn replay(&self, dir: &Path, address: &str) -> Result<RunReport, PipelineError> {
        let page = SnapshotPage::load_dir(dir, &self.config.selectors.next_page)
            .map_err(|e| PipelineError::Browser(format!("{:#}", e)))?;
        self.execute(&page, address, RunMode::FromCatalog).await
    }

    async fn execute<P>(
        &self,
        page: &P,
        address: &str,
        mode: RunMode,
    ) -> Result<RunReport, PipelineError>
    where
        P: BrowserPage + ?Sized,
    {
        let run_id = Uuid::new_v4();
        let span = info_span!("catalog_run", run_id = %run_id, address = %address);
        let started_at = Utc::now();

        let mut navigator = CatalogNavigator::new(page, address, &self.config, &self.extractor)
            .with_span(span.clone());
        let outcome = match mode {
            RunMode::FromSiteRoot => navigator.run().await,
            RunMode::FromCatalog => Ok(navigator.run_from_catalog().await),
        };

        let run = match outcome {
            Ok(run) => run,
            Err(e) => {
                span.in_scope(|| error!("could not retrieve data for address {}", address));
                return Err(e.into());
            }
        };

        let document = CatalogDocument::new(address, run.catalog.clone());
        let outputs = match self.publish(&document).instrument(span.clone()).await {
            Ok(outputs) => outputs,
            Err(reason) => {
                span.in_scope(|| {
                    error!(
                        "no sink accepted the catalog for {} ({} products): {}",
                        address,
                        run.catalog.len(),
                        reason
                    )
                });
                return Err(PipelineError::Output {
                    reason,
                    catalog: run.catalog,
                });
            }
        };

        let report = RunReport {
            run_id,
            address: address.to_string(),
            started_at,
            finished_at: Utc::now(),
            elapsed: run.elapsed,
            declared_pages: run.declared_pages,
            pages_visited: run.pages_visited,
            pages_processed: run.pages_processed(),
            pages_failed: run.pages_failed,
            item_errors: run.item_errors,
            end: run.end,
            catalog: run.catalog,
            outputs,
        };

        if report.is_partial() {
            span.in_scope(|| {
                warn!(
                    "partial catalog: {} of {} declared pages processed",
                    report.pages_processed, report.declared_pages
                )
            });
        }
        Ok(report)
    }

    /// Fails only when sinks are configured and none of them accepted the
    /// catalog; the error lists each sink's failure.
    async fn publish(&self, document: &CatalogDocument) -> Result<Vec<String>, String> {
        let mut outputs = Vec::new();
        let mut failures = Vec::new();

        for sink in &self.sinks {
            match sink.publish(document).await {
                Ok(location) => {
                    info!("Catalog published via {}: {}", sink.name(), location);
                    outputs.push(location);
                }
                Err(e) => {
                    warn!("Failed to publish catalog via {}: {:#}", sink.name(), e);
                    failures.push(format!("{}: {:#}", sink.name(), e));
                }
            }
        }

        if outputs.is_empty() && !failures.is_empty() {
            return Err(failures.join("; "));
        }
        Ok(outputs)
    }
}
