//! Offline [`BrowserPage`] over saved catalog HTML.
//!
//! Each snapshot is one rendered catalog page. Navigation steps succeed as
//! long as their selectors are present in the current snapshot, and clicking
//! the next-page control moves to the following snapshot.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use crate::fetcher::page::{BrowserPage, PageElement};

pub struct SnapshotPage {
    pages: Vec<String>,
    next_page_template: String,
    current: Mutex<usize>,
}

/// Detached copy of one matched element.
#[derive(Debug, Clone)]
pub struct SnapshotElement {
    html: String,
    text: String,
    attributes: HashMap<String, String>,
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("Invalid selector '{}': {:?}", selector, e))
}

fn element_visible(attributes: &HashMap<String, String>) -> bool {
    if attributes.contains_key("hidden") {
        return false;
    }
    match attributes.get("style") {
        Some(style) => {
            let style: String = style.chars().filter(|c| !c.is_whitespace()).collect();
            !style.contains("display:none") && !style.contains("visibility:hidden")
        }
        None => true,
    }
}

impl SnapshotElement {
    fn from_ref(element: ElementRef<'_>) -> Self {
        let text = element
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let attributes = element
            .value()
            .attrs()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        Self {
            html: element.html(),
            text,
            attributes,
        }
    }
}

impl SnapshotPage {
    /// `next_page_template` is the next-page selector with a `{page}` placeholder.
    pub fn new(pages: Vec<String>, next_page_template: &str) -> Self {
        Self {
            pages,
            next_page_template: next_page_template.to_string(),
            current: Mutex::new(0),
        }
    }

    /// Load every `.html` file in `dir`, in file-name order.
    pub fn load_dir(dir: &Path, next_page_template: &str) -> Result<Self> {
        let mut paths = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read snapshot directory: {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "html"))
            .collect::<Vec<_>>();
        paths.sort();

        if paths.is_empty() {
            return Err(anyhow!("No .html snapshots found in {}", dir.display()));
        }

        let pages = paths
            .iter()
            .map(|path| {
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read snapshot: {}", path.display()))
            })
            .collect::<Result<Vec<_>>>()?;

        info!("Loaded {} catalog snapshots from {}", pages.len(), dir.display());
        Ok(Self::new(pages, next_page_template))
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Zero-based index of the snapshot currently shown.
    pub fn current_index(&self) -> usize {
        self.current.lock().map(|index| *index).unwrap_or(0)
    }

    fn select_current(&self, selector: &str) -> Result<Vec<SnapshotElement>> {
        let selector = parse_selector(selector)?;
        let index = self.current_index();
        let html = self
            .pages
            .get(index)
            .ok_or_else(|| anyhow!("Snapshot {} does not exist", index))?;
        let document = Html::parse_document(html);
        Ok(document.select(&selector).map(SnapshotElement::from_ref).collect())
    }
}

#[async_trait]
impl BrowserPage for SnapshotPage {
    type Element = SnapshotElement;

    async fn goto(&self, url: &str) -> Result<()> {
        debug!("snapshot goto {} (no-op)", url);
        Ok(())
    }

    async fn query(&self, selector: &str) -> Result<Option<SnapshotElement>> {
        Ok(self.select_current(selector)?.into_iter().next())
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<SnapshotElement>> {
        self.select_current(selector)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        if self.select_current(selector)?.is_empty() {
            return Err(anyhow!("No element to click: {}", selector));
        }

        let mut current = self
            .current
            .lock()
            .map_err(|_| anyhow!("Snapshot cursor poisoned"))?;
        let next_selector = self
            .next_page_template
            .replace("{page}", &(*current + 2).to_string());
        if selector == next_selector && *current + 1 < self.pages.len() {
            *current += 1;
            debug!("snapshot advanced to page {}", *current + 1);
        }
        Ok(())
    }

    async fn type_text(&self, selector: &str, _text: &str, _delay: Duration) -> Result<()> {
        if self.select_current(selector)?.is_empty() {
            return Err(anyhow!("No element to type into: {}", selector));
        }
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl PageElement for SnapshotElement {
    async fn inner_text(&self) -> Result<String> {
        Ok(self.text.clone())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        Ok(self.attributes.get(name).cloned())
    }

    async fn is_visible(&self) -> Result<bool> {
        Ok(element_visible(&self.attributes))
    }

    async fn query(&self, selector: &str) -> Result<Option<SnapshotElement>> {
        let selector = parse_selector(selector)?;
        let fragment = Html::parse_fragment(&self.html);
        Ok(fragment.select(&selector).next().map(SnapshotElement::from_ref))
    }
}
