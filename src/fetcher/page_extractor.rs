use anyhow::Result;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SelectorConfig;
use crate::error::{ItemError, PageError};
use crate::fetcher::page::{BrowserPage, PageElement};
use crate::models::{ListingFields, NOT_SPECIFIED, PRICE_NOT_SPECIFIED, ScrapedProductRecord};
use crate::processor::NameClassifier;

/// Records read from one catalog page.
#[derive(Debug, Default)]
pub struct PageExtraction {
    pub records: Vec<ScrapedProductRecord>,
    pub item_errors: Vec<ItemError>,
}

/// Reads product cards off a rendered catalog page and classifies them.
pub struct PageExtractor {
    selectors: SelectorConfig,
    classifier: Arc<NameClassifier>,
    price_pattern: Regex,
}

/// Text of the first visible match under `parent`, or the "Not specified"
/// sentinel when the element is missing or hidden.
pub async fn read_text<E: PageElement>(parent: &E, selector: &str) -> Result<String> {
    match parent.query(selector).await? {
        Some(element) if element.is_visible().await? => element.inner_text().await,
        _ => Ok(NOT_SPECIFIED.to_string()),
    }
}

/// Attribute of the first visible match under `parent`; `None` when the
/// element is missing, hidden, or lacks the attribute.
pub async fn read_attribute<E: PageElement>(
    parent: &E,
    selector: &str,
    attribute: &str,
) -> Result<Option<String>> {
    match parent.query(selector).await? {
        Some(element) if element.is_visible().await? => element.attribute(attribute).await,
        _ => Ok(None),
    }
}

impl PageExtractor {
    pub fn new(selectors: SelectorConfig, classifier: Arc<NameClassifier>) -> Result<Self> {
        Ok(Self {
            selectors,
            classifier,
            price_pattern: Regex::new(r"(\d+,\d+)")?,
        })
    }

    /// "129,99 ₽" style display price, or the price sentinel.
    pub fn clean_price(&self, raw: &str) -> String {
        match self.price_pattern.captures(raw) {
            Some(captures) => format!("{} ₽", &captures[1]),
            None => PRICE_NOT_SPECIFIED.to_string(),
        }
    }

    /// Extract every product card on the current page.
    ///
    /// Fails only when the grid itself cannot be read; a card that fails is
    /// logged, counted and skipped.
    pub async fn extract_page<P>(&self, page: &P, page_number: u32) -> Result<PageExtraction, PageError>
    where
        P: BrowserPage + ?Sized,
    {
        let items = page
            .query_all(&self.selectors.product_item)
            .await
            .map_err(|e| PageError {
                page: page_number,
                reason: format!("product grid unreadable: {:#}", e),
            })?;
        debug!("found {} products on page {}", items.len(), page_number);

        let mut extraction = PageExtraction::default();
        let total = items.len();

        for (offset, item) in items.iter().enumerate() {
            let index = offset + 1;
            match self.extract_item(item).await {
                Ok(record) => extraction.records.push(record),
                Err(e) => {
                    let error = ItemError {
                        page: page_number,
                        index,
                        reason: format!("{:#}", e),
                    };
                    warn!("Error parsing product: {}", error);
                    extraction.item_errors.push(error);
                }
            }

            if index % 10 == 0 {
                debug!("processed {}/{} products on page {}", index, total, page_number);
            }
        }

        info!(
            "page {} processed. Products: {} (skipped {})",
            page_number,
            extraction.records.len(),
            extraction.item_errors.len()
        );
        Ok(extraction)
    }

    async fn extract_item<E: PageElement>(&self, item: &E) -> Result<ScrapedProductRecord> {
        let name = read_text(item, &self.selectors.product_name).await?;
        let volume_text = read_text(item, &self.selectors.product_volume).await?;
        let price_raw = read_text(item, &self.selectors.product_price).await?;
        let image_url = read_attribute(item, &self.selectors.product_image, "src").await?;

        let listing = ListingFields {
            volume_text,
            price_text: self.clean_price(&price_raw),
            image_url,
        };

        let record = if name == NOT_SPECIFIED {
            ScrapedProductRecord::unclassified(NOT_SPECIFIED)
        } else {
            self.classifier.classify(&name)
        };
        Ok(record.with_listing(listing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::snapshot_page::SnapshotPage;
    use crate::models::Category;
    use async_trait::async_trait;
    use std::time::Duration;

    fn extractor() -> PageExtractor {
        PageExtractor::new(
            SelectorConfig::default(),
            Arc::new(NameClassifier::new().unwrap()),
        )
        .unwrap()
    }

    fn card(name: &str, price: &str) -> String {
        format!(
            r#"<div class="lu-grid__item ng-star-inserted">
                <span class="card-name_content">{}</span>
                <p class="card-name_package">0.45 л</p>
                <span class="main-price">{}</span>
                <img class="lu-product-card-image" src="https://cdn.lenta.com/{}.png">
            </div>"#,
            name,
            price,
            name.len()
        )
    }

    fn snapshot(cards: &[String]) -> SnapshotPage {
        let html = format!(
            r#"<html><body><div class="lu-grid">{}</div></body></html>"#,
            cards.join("\n")
        );
        SnapshotPage::new(vec![html], &SelectorConfig::default().next_page)
    }

    #[test]
    fn test_clean_price() {
        let extractor = extractor();
        assert_eq!(extractor.clean_price("89,99 ₽ за шт"), "89,99 ₽");
        assert_eq!(extractor.clean_price("  129,00\u{a0}₽"), "129,00 ₽");
        assert_eq!(extractor.clean_price("89 ₽"), PRICE_NOT_SPECIFIED);
        assert_eq!(extractor.clean_price(NOT_SPECIFIED), PRICE_NOT_SPECIFIED);
    }

    #[tokio::test]
    async fn test_extract_snapshot_page() {
        let page = snapshot(&[
            card("Пиво Жигули Барное светлое 4,9% 0.45", "79,99 ₽"),
            card("Сидр Mr. Cider яблочный полусладкий 4,5%", "119,99 ₽"),
        ]);

        let extraction = extractor().extract_page(&page, 1).await.unwrap();
        assert_eq!(extraction.records.len(), 2);
        assert!(extraction.item_errors.is_empty());

        let beer = &extraction.records[0];
        assert_eq!(beer.category, Category::Beer);
        assert_eq!(beer.volume_text, "0.45 л");
        assert_eq!(beer.price_text, "79,99 ₽");
        assert!(beer.image_url.as_deref().unwrap().starts_with("https://cdn.lenta.com/"));
        assert_eq!(extraction.records[1].category, Category::Cider);
    }

    #[tokio::test]
    async fn test_missing_fields_use_sentinels() {
        let html = r#"<html><body><div class="lu-grid">
            <div class="lu-grid__item ng-star-inserted">
                <p class="card-name_package">0.5 л</p>
                <span class="main-price" style="display:none">59,99 ₽</span>
            </div>
        </div></body></html>"#;
        let page = SnapshotPage::new(vec![html.to_string()], &SelectorConfig::default().next_page);

        let extraction = extractor().extract_page(&page, 1).await.unwrap();
        let record = &extraction.records[0];
        assert_eq!(record.raw_name, NOT_SPECIFIED);
        assert_eq!(record.category, Category::Unknown);
        assert_eq!(record.price_text, PRICE_NOT_SPECIFIED);
        assert!(record.image_url.is_none());
    }

    #[tokio::test]
    async fn test_empty_grid_yields_no_records() {
        let page = snapshot(&[]);
        let extraction = extractor().extract_page(&page, 4).await.unwrap();
        assert!(extraction.records.is_empty());
    }

    /// Card whose every read fails when `broken` is set.
    struct FlakyCard {
        name: String,
        broken: bool,
    }

    #[async_trait]
    impl PageElement for FlakyCard {
        async fn inner_text(&self) -> Result<String> {
            Ok(self.name.clone())
        }

        async fn attribute(&self, _name: &str) -> Result<Option<String>> {
            Ok(None)
        }

        async fn is_visible(&self) -> Result<bool> {
            Ok(true)
        }

        async fn query(&self, _selector: &str) -> Result<Option<FlakyCard>> {
            if self.broken {
                return Err(anyhow::anyhow!("element detached from DOM"));
            }
            Ok(Some(FlakyCard {
                name: self.name.clone(),
                broken: false,
            }))
        }
    }

    struct FlakyGrid {
        names: Vec<&'static str>,
        broken_index: usize,
        grid_fails: bool,
    }

    #[async_trait]
    impl BrowserPage for FlakyGrid {
        type Element = FlakyCard;

        async fn goto(&self, _url: &str) -> Result<()> {
            Ok(())
        }

        async fn query(&self, _selector: &str) -> Result<Option<FlakyCard>> {
            Ok(None)
        }

        async fn query_all(&self, _selector: &str) -> Result<Vec<FlakyCard>> {
            if self.grid_fails {
                return Err(anyhow::anyhow!("grid never rendered"));
            }
            Ok(self
                .names
                .iter()
                .enumerate()
                .map(|(i, name)| FlakyCard {
                    name: name.to_string(),
                    broken: i + 1 == self.broken_index,
                })
                .collect())
        }

        async fn click(&self, _selector: &str) -> Result<()> {
            Ok(())
        }

        async fn type_text(&self, _selector: &str, _text: &str, _delay: Duration) -> Result<()> {
            Ok(())
        }

        async fn evaluate(&self, _script: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failing_item_is_isolated() {
        let page = FlakyGrid {
            names: vec![
                "Пиво Балтика 3",
                "Пиво Балтика 7",
                "Пиво Балтика 9",
                "Сидр Шато",
                "Медовуха Старая",
            ],
            broken_index: 3,
            grid_fails: false,
        };

        let extraction = extractor().extract_page(&page, 2).await.unwrap();
        assert_eq!(extraction.records.len(), 4);
        assert_eq!(extraction.item_errors.len(), 1);
        assert_eq!(extraction.item_errors[0].index, 3);
        assert_eq!(extraction.item_errors[0].page, 2);
        assert!(extraction.records.iter().all(|r| r.raw_name != "Пиво Балтика 9"));
    }

    #[tokio::test]
    async fn test_unreadable_grid_is_page_error() {
        let page = FlakyGrid {
            names: vec![],
            broken_index: 0,
            grid_fails: true,
        };
        let err = extractor().extract_page(&page, 5).await.unwrap_err();
        assert_eq!(err.page, 5);
    }
}
