use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::models::Catalog;

/// Navigation stage a fatal failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationStage {
    LoadSite,
    SelectStore,
    OpenCatalog,
}

impl fmt::Display for NavigationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NavigationStage::LoadSite => "load site",
            NavigationStage::SelectStore => "select store",
            NavigationStage::OpenCatalog => "open catalog",
        };
        f.write_str(name)
    }
}

/// Failure before the catalog grid is reached. Always aborts the run.
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("{stage}: element '{selector}' did not appear within {timeout:?}")]
    Timeout {
        stage: NavigationStage,
        selector: String,
        timeout: Duration,
    },
    #[error("{stage}: {reason}")]
    Interaction {
        stage: NavigationStage,
        reason: String,
    },
}

impl NavigationError {
    pub fn stage(&self) -> NavigationStage {
        match self {
            NavigationError::Timeout { stage, .. } | NavigationError::Interaction { stage, .. } => {
                *stage
            }
        }
    }
}

/// A whole catalog page could not be read; its records are dropped.
#[derive(Debug, Error)]
#[error("page {page}: {reason}")]
pub struct PageError {
    pub page: u32,
    pub reason: String,
}

/// One product card could not be read; only that item is dropped.
#[derive(Debug, Error)]
#[error("page {page}, item {index}: {reason}")]
pub struct ItemError {
    pub page: u32,
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("browser session failed: {0}")]
    Browser(String),

    #[error(transparent)]
    Navigation(#[from] NavigationError),

    /// Every sink rejected the catalog. The scraped catalog is handed back
    /// so the caller can still keep it.
    #[error("catalog output failed ({} products kept in memory): {reason}", .catalog.len())]
    Output { reason: String, catalog: Catalog },
}
