use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::CatalogDocument;
use crate::storage::catalog_sink::{CatalogSink, address_slug};

/// `<results_dir>/catalog_<slug>_<YYYYmmdd_HHMMSS>.json`
pub fn export_path(results_dir: &Path, document: &CatalogDocument) -> PathBuf {
    let stamp = document.timestamp.format("%Y%m%d_%H%M%S");
    results_dir.join(format!(
        "catalog_{}_{}.json",
        address_slug(&document.address),
        stamp
    ))
}

/// Write the document as pretty JSON and return the file path.
pub fn export_catalog(results_dir: &Path, document: &CatalogDocument) -> Result<PathBuf> {
    std::fs::create_dir_all(results_dir)
        .with_context(|| format!("Failed to create results directory: {}", results_dir.display()))?;

    let path = export_path(results_dir, document);
    let json = serde_json::to_string_pretty(document)?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write catalog: {}", path.display()))?;

    info!("Results saved to {} ({} products)", path.display(), document.products.len());
    Ok(path)
}

pub struct JsonFileExport {
    results_dir: PathBuf,
}

impl JsonFileExport {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }
}

#[async_trait]
impl CatalogSink for JsonFileExport {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn publish(&self, document: &CatalogDocument) -> Result<String> {
        let path = export_catalog(&self.results_dir, document)?;
        Ok(path.display().to_string())
    }
}
