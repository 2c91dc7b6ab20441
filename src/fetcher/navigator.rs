use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep};
use tracing::{Instrument, Span, debug, error, info, warn};

use crate::config::ScraperConfig;
use crate::error::{NavigationError, NavigationStage, PageError};
use crate::fetcher::page::{BrowserPage, PageElement, wait_for_element};
use crate::fetcher::page_extractor::{PageExtraction, PageExtractor};
use crate::models::Catalog;

const SCROLL_TO_MIDDLE_JS: &str =
    "window.scrollTo({ top: document.body.scrollHeight / 2, behavior: 'smooth' })";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    Init,
    Loaded,
    StoreSelected,
    CatalogOpen,
    /// Processing the given 1-based page.
    Paginating(u32),
    Done,
    Failed,
}

/// Why pagination stopped. None of these are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaginationEnd {
    DeclaredTotalReached,
    NextControlMissing,
    /// The next-page control was found but could not be used.
    AdvanceFailed,
}

/// Result of a navigation run that reached the catalog.
#[derive(Debug)]
pub struct CatalogRun {
    pub catalog: Catalog,
    pub declared_pages: u32,
    pub pages_visited: u32,
    pub pages_failed: Vec<u32>,
    pub item_errors: usize,
    pub end: PaginationEnd,
    pub elapsed: Duration,
}

impl CatalogRun {
    pub fn pages_processed(&self) -> u32 {
        self.pages_visited - self.pages_failed.len() as u32
    }
}

/// "M min S.s sec"
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs_f64();
    let minutes = (total / 60.0).floor();
    let seconds = total - minutes * 60.0;
    format!("{} min {:.1} sec", minutes as u64, seconds)
}

/// Drives one page through store selection, catalog navigation and
/// pagination for a single delivery address.
pub struct CatalogNavigator<'a, P: BrowserPage + ?Sized> {
    page: &'a P,
    address: String,
    config: &'a ScraperConfig,
    extractor: &'a PageExtractor,
    state: NavState,
    started: Instant,
    span: Span,
}

impl<'a, P: BrowserPage + ?Sized> CatalogNavigator<'a, P> {
    pub fn new(
        page: &'a P,
        address: &str,
        config: &'a ScraperConfig,
        extractor: &'a PageExtractor,
    ) -> Self {
        Self {
            page,
            address: address.to_string(),
            config,
            extractor,
            state: NavState::Init,
            started: Instant::now(),
            span: Span::current(),
        }
    }

    /// Log every stage inside `span` instead of the caller's current span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    /// Full run from the site root.
    pub async fn run(&mut self) -> Result<CatalogRun, NavigationError> {
        let span = self.span.clone();
        async {
            self.started = Instant::now();
            info!("Starting parser for address: {}", self.address);

            self.load_site().await?;
            self.select_store().await?;
            self.open_catalog().await?;
            Ok::<_, NavigationError>(self.scrape_catalog().await)
        }
        .instrument(span)
        .await
    }

    /// Run against a page that already shows the product catalog.
    pub async fn run_from_catalog(&mut self) -> CatalogRun {
        let span = self.span.clone();
        async {
            self.started = Instant::now();
            self.state = NavState::CatalogOpen;
            info!("Parsing catalog already open for address: {}", self.address);
            self.scrape_catalog().await
        }
        .instrument(span)
        .await
    }

    fn fail(&mut self, error: NavigationError) -> NavigationError {
        self.state = NavState::Failed;
        error!(severity = "critical", stage = %error.stage(), "Critical error: {}", error);
        error
    }

    async fn require(
        &mut self,
        stage: NavigationStage,
        selector: &str,
    ) -> Result<P::Element, NavigationError> {
        let timeout = self.config.timeouts.navigation();
        match wait_for_element(self.page, selector, timeout).await {
            Some(element) => Ok(element),
            None => Err(self.fail(NavigationError::Timeout {
                stage,
                selector: selector.to_string(),
                timeout,
            })),
        }
    }

    async fn click(&mut self, stage: NavigationStage, selector: &str) -> Result<(), NavigationError> {
        match self.page.click(selector).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(NavigationError::Interaction {
                stage,
                reason: format!("click '{}': {:#}", selector, e),
            })),
        }
    }

    async fn load_site(&mut self) -> Result<(), NavigationError> {
        let url = self.config.site.base_url.clone();
        if let Err(e) = self.page.goto(&url).await {
            return Err(self.fail(NavigationError::Interaction {
                stage: NavigationStage::LoadSite,
                reason: format!("{:#}", e),
            }));
        }
        self.state = NavState::Loaded;
        info!("Main page loaded");
        Ok(())
    }

    async fn select_store(&mut self) -> Result<(), NavigationError> {
        let stage = NavigationStage::SelectStore;
        let config = self.config;
        let selectors = &config.selectors;
        info!("Selecting store ->");

        self.require(stage, &selectors.address_block).await?;
        self.click(stage, &selectors.address_block).await?;
        debug!("clicked address block");

        self.require(stage, &selectors.address_form).await?;
        let delay = config.timeouts.typing_delay();
        if let Err(e) = self
            .page
            .type_text(&selectors.address_input, &self.address, delay)
            .await
        {
            return Err(self.fail(NavigationError::Interaction {
                stage,
                reason: format!("type address: {:#}", e),
            }));
        }
        debug!("entered address: {}", self.address);

        self.require(stage, &selectors.address_suggestion).await?;
        self.click(stage, &selectors.address_suggestion).await?;
        self.click(stage, &selectors.address_confirm).await?;

        self.state = NavState::StoreSelected;
        info!("<- store successfully selected");
        Ok(())
    }

    async fn open_catalog(&mut self) -> Result<(), NavigationError> {
        let stage = NavigationStage::OpenCatalog;
        let config = self.config;
        let selectors = &config.selectors;
        info!("Navigating to product catalog ->");

        self.require(stage, &selectors.catalog_menu).await?;
        self.click(stage, &selectors.catalog_button).await?;
        debug!("main catalog opened");

        self.require(stage, &selectors.alcohol_category).await?;
        self.click(stage, &selectors.alcohol_category).await?;
        debug!("sub-catalog opened");

        self.require(stage, &selectors.category_chips).await?;
        self.click(stage, &selectors.beer_category).await?;

        self.state = NavState::CatalogOpen;
        info!("<- successfully navigated to product catalog");
        Ok(())
    }

    /// Page count shown by the pagination control. Anything unexpected,
    /// including no control at all, means a single page.
    async fn declared_page_count(&self) -> u32 {
        let selectors = &self.config.selectors;
        let timeout = self.config.timeouts.navigation();

        if wait_for_element(self.page, &selectors.pagination_nav, timeout)
            .await
            .is_none()
        {
            debug!("no pagination control, assuming a single page");
            return 1;
        }

        let Ok(Some(list)) = self.page.query(&selectors.pagination_list).await else {
            return 1;
        };
        let Ok(Some(last)) = list.query(&selectors.pagination_last).await else {
            return 1;
        };
        match last.inner_text().await {
            Ok(text) => text.trim().parse::<u32>().map(|n| n.max(1)).unwrap_or(1),
            Err(e) => {
                warn!("Error getting page count: {:#}", e);
                1
            }
        }
    }

    async fn process_page(&self, page_number: u32) -> Result<PageExtraction, PageError> {
        let grid = &self.config.selectors.product_grid;
        if wait_for_element(self.page, grid, self.config.timeouts.page())
            .await
            .is_none()
        {
            return Err(PageError {
                page: page_number,
                reason: format!("product grid '{}' did not render", grid),
            });
        }

        self.page
            .evaluate(SCROLL_TO_MIDDLE_JS)
            .await
            .map_err(|e| PageError {
                page: page_number,
                reason: format!("scroll failed: {:#}", e),
            })?;
        let settle = self.config.timeouts.scroll_settle();
        if !settle.is_zero() {
            sleep(settle).await;
        }

        self.extractor.extract_page(self.page, page_number).await
    }

    /// `Ok(false)` when the control for `next_page` is not on the page.
    async fn advance(&self, next_page: u32) -> anyhow::Result<bool> {
        let selector = self.config.selectors.next_page_for(next_page);
        if self.page.query(&selector).await?.is_none() {
            return Ok(false);
        }
        self.page.click(&selector).await?;
        debug!("navigating to page {}", next_page);
        Ok(true)
    }

    async fn scrape_catalog(&mut self) -> CatalogRun {
        let declared_pages = self.declared_page_count().await;
        info!("Total pages to parse: {}", declared_pages);

        let mut catalog = Catalog::new();
        let mut pages_visited = 0;
        let mut pages_failed = Vec::new();
        let mut item_errors = 0;
        let mut end = PaginationEnd::DeclaredTotalReached;

        for page_number in 1..=declared_pages {
            self.state = NavState::Paginating(page_number);
            pages_visited += 1;
            debug!("processing page {}/{}", page_number, declared_pages);

            match self.process_page(page_number).await {
                Ok(extraction) => {
                    item_errors += extraction.item_errors.len();
                    catalog.extend(extraction.records);
                }
                Err(e) => {
                    warn!("Skipping page: {}", e);
                    pages_failed.push(page_number);
                }
            }

            if page_number == declared_pages {
                break;
            }

            match self.advance(page_number + 1).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!("Next page button not found for page {}", page_number + 1);
                    end = PaginationEnd::NextControlMissing;
                    break;
                }
                Err(e) => {
                    warn!("Could not open page {}: {:#}", page_number + 1, e);
                    end = PaginationEnd::AdvanceFailed;
                    break;
                }
            }
        }

        self.state = NavState::Done;
        let elapsed = self.started.elapsed();
        info!(
            "<- parsing completed! Total products processed: {}",
            catalog.len()
        );
        info!("parser finished. Execution time: {}", format_elapsed(elapsed));

        CatalogRun {
            catalog,
            declared_pages,
            pages_visited,
            pages_failed,
            item_errors,
            end,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::snapshot_page::SnapshotPage;
    use crate::processor::NameClassifier;
    use std::sync::Arc;

    fn fast_config() -> ScraperConfig {
        let mut config = ScraperConfig::default();
        config.timeouts.navigation_ms = 50;
        config.timeouts.page_ms = 50;
        config.timeouts.typing_delay_ms = 0;
        config.timeouts.scroll_settle_ms = 0;
        config
    }

    fn extractor(config: &ScraperConfig) -> PageExtractor {
        PageExtractor::new(
            config.selectors.clone(),
            Arc::new(NameClassifier::new().unwrap()),
        )
        .unwrap()
    }

    fn grid(names: &[&str]) -> String {
        let cards: Vec<String> = names
            .iter()
            .map(|name| {
                format!(
                    r#"<div class="lu-grid__item ng-star-inserted">
                        <span class="card-name_content">{}</span>
                        <span class="main-price">99,90 ₽</span>
                    </div>"#,
                    name
                )
            })
            .collect();
        format!(r#"<div class="lu-grid">{}</div>"#, cards.join(""))
    }

    fn pagination(last: u32) -> String {
        format!(
            r#"<nav class="ng-star-inserted"><ul class="pagination"><li>1</li><li>2</li><li>{}</li></ul></nav>"#,
            last
        )
    }

    fn next_link(page: u32) -> String {
        format!(r#"<a aria-label="перейти на страницу {}">{}</a>"#, page, page)
    }

    fn html(parts: &[String]) -> String {
        format!("<html><body>{}</body></html>", parts.join(""))
    }

    const STORE_AND_CATALOG_CONTROLS: &str = r#"
        <div class="address-block ng-star-inserted">Выбрать адрес</div>
        <form class="ng-untouched ng-pristine ng-valid">
            <input class="p-element p-autocomplete-input p-inputtext p-component ng-star-inserted">
        </form>
        <ul><li class="p-ripple p-element p-autocomplete-item ng-star-inserted">Ижевск</li></ul>
        <button class="p-element p-button p-button-primary large w-100 p-component ng-star-inserted">OK</button>
        <lu-catalog-button class="ng-star-inserted">
            <button class="p-button p-button-tertiary catalog-button">Каталог</button>
        </lu-catalog-button>
        <a href="https://lenta.com/catalog/alkogol-17036/">Алкоголь</a>
        <lu-search-categories-chips class="ng-star-inserted">
            <a href="https://lenta.com/catalog/pivo-sidr-17045/">Пиво, сидр</a>
        </lu-search-categories-chips>
    "#;

    #[tokio::test]
    async fn test_next_control_is_authoritative() {
        let config = fast_config();
        let extractor = extractor(&config);
        let page = SnapshotPage::new(
            vec![
                html(&[pagination(10), grid(&["Пиво Балтика 3", "Пиво Балтика 7"]), next_link(2)]),
                html(&[pagination(10), grid(&["Сидр Шато"]), next_link(3)]),
                html(&[pagination(10), grid(&["Медовуха Старая"])]),
            ],
            &config.selectors.next_page,
        );

        let mut navigator = CatalogNavigator::new(&page, "Ижевск, Кирова ул., 146", &config, &extractor);
        let run = navigator.run_from_catalog().await;

        assert_eq!(run.declared_pages, 10);
        assert_eq!(run.pages_visited, 3);
        assert_eq!(run.pages_processed(), 3);
        assert_eq!(run.end, PaginationEnd::NextControlMissing);
        assert_eq!(run.catalog.len(), 4);
        assert_eq!(navigator.state(), NavState::Done);
    }

    #[tokio::test]
    async fn test_declared_total_bounds_pagination() {
        let config = fast_config();
        let extractor = extractor(&config);
        let page = SnapshotPage::new(
            vec![
                html(&[pagination(2), grid(&["Пиво Охота"]), next_link(2)]),
                html(&[pagination(2), grid(&["Пиво Жигули"]), next_link(3)]),
                html(&[pagination(2), grid(&["Пиво Лишнее"])]),
            ],
            &config.selectors.next_page,
        );

        let run = CatalogNavigator::new(&page, "addr", &config, &extractor)
            .run_from_catalog()
            .await;

        assert_eq!(run.pages_visited, 2);
        assert_eq!(run.end, PaginationEnd::DeclaredTotalReached);
        assert!(run.catalog.iter().all(|r| r.raw_name != "Пиво Лишнее"));
        assert_eq!(page.current_index(), 1);
    }

    #[tokio::test]
    async fn test_missing_pagination_means_one_page() {
        let config = fast_config();
        let extractor = extractor(&config);
        let page = SnapshotPage::new(
            vec![html(&[grid(&["Пиво Балтика 0"]), next_link(2)])],
            &config.selectors.next_page,
        );

        let run = CatalogNavigator::new(&page, "addr", &config, &extractor)
            .run_from_catalog()
            .await;

        assert_eq!(run.declared_pages, 1);
        assert_eq!(run.pages_visited, 1);
        assert_eq!(run.end, PaginationEnd::DeclaredTotalReached);
    }

    #[tokio::test]
    async fn test_failed_page_is_skipped() {
        let config = fast_config();
        let extractor = extractor(&config);
        let page = SnapshotPage::new(
            vec![
                html(&[pagination(3), grid(&["Пиво Балтика 3"]), next_link(2)]),
                html(&[pagination(3), next_link(3)]),
                html(&[pagination(3), grid(&["Пиво Балтика 9"])]),
            ],
            &config.selectors.next_page,
        );

        let run = CatalogNavigator::new(&page, "addr", &config, &extractor)
            .run_from_catalog()
            .await;

        assert_eq!(run.pages_visited, 3);
        assert_eq!(run.pages_failed, vec![2]);
        assert_eq!(run.pages_processed(), 2);
        assert_eq!(run.catalog.len(), 2);
    }

    #[tokio::test]
    async fn test_full_run_through_store_selection() {
        let config = fast_config();
        let extractor = extractor(&config);
        let page = SnapshotPage::new(
            vec![html(&[
                STORE_AND_CATALOG_CONTROLS.to_string(),
                pagination(1),
                grid(&["Балтика 7 Светлое Фильтрованное Пастеризованное 4,5% 0.5"]),
            ])],
            &config.selectors.next_page,
        );

        let mut navigator = CatalogNavigator::new(&page, "Ижевск, Кирова ул., 146", &config, &extractor);
        let run = navigator.run().await.unwrap();

        assert_eq!(navigator.state(), NavState::Done);
        assert_eq!(run.catalog.len(), 1);
        assert_eq!(run.catalog[0].cleaned_name, "Балтика 7");
        assert_eq!(run.catalog[0].price_text, "99,90 ₽");
    }

    #[tokio::test]
    async fn test_store_timeout_is_fatal() {
        let config = fast_config();
        let extractor = extractor(&config);
        let page = SnapshotPage::new(
            vec![html(&[grid(&["Пиво Балтика 3"])])],
            &config.selectors.next_page,
        );

        let mut navigator = CatalogNavigator::new(&page, "addr", &config, &extractor);
        let err = navigator.run().await.unwrap_err();

        assert_eq!(navigator.state(), NavState::Failed);
        assert_eq!(err.stage(), NavigationStage::SelectStore);
        assert!(matches!(err, NavigationError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_store_interaction_failure_is_fatal() {
        let config = fast_config();
        let extractor = extractor(&config);
        let page = SnapshotPage::new(
            vec![html(&[
                r#"<div class="address-block ng-star-inserted"></div>
                   <form class="ng-untouched ng-pristine ng-valid"></form>"#
                    .to_string(),
            ])],
            &config.selectors.next_page,
        );

        let mut navigator = CatalogNavigator::new(&page, "addr", &config, &extractor);
        let err = navigator.run().await.unwrap_err();

        assert_eq!(navigator.state(), NavState::Failed);
        assert!(matches!(
            err,
            NavigationError::Interaction {
                stage: NavigationStage::SelectStore,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_catalog_timeout_is_fatal() {
        let config = fast_config();
        let extractor = extractor(&config);
        let controls = STORE_AND_CATALOG_CONTROLS.replace("alkogol-17036", "vino-1");
        let page = SnapshotPage::new(vec![html(&[controls])], &config.selectors.next_page);

        let mut navigator = CatalogNavigator::new(&page, "addr", &config, &extractor);
        let err = navigator.run().await.unwrap_err();
        assert_eq!(err.stage(), NavigationStage::OpenCatalog);
        assert_eq!(navigator.state(), NavState::Failed);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(125_400)), "2 min 5.4 sec");
        assert_eq!(format_elapsed(Duration::from_millis(900)), "0 min 0.9 sec");
    }
}
