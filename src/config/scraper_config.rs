use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a browser-driven catalog scrape
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub site: SiteConfig,
    pub browser: BrowserConfig,
    pub timeouts: TimeoutConfig,
    pub selectors: SelectorConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
    /// Delivery addresses scraped when none are given on the command line
    pub addresses: Vec<String>,
}

/// Basic site information and the headers sent with every request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub name: String,
    pub base_url: String,
    pub user_agent: String,
    pub locale: String,
    pub referer: String,
    pub accept: String,
    pub accept_language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    /// Overridden by the `CHROMIUM_PATH` environment variable
    pub chrome_path: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
    pub request_timeout_secs: u64,
    pub extra_args: Vec<String>,
}

/// Wait budgets, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub navigation_ms: u64,
    pub page_ms: u64,
    pub typing_delay_ms: u64,
    pub scroll_settle_ms: u64,
}

/// CSS selectors for every element the scraper touches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub address_block: String,
    pub address_form: String,
    pub address_input: String,
    pub address_suggestion: String,
    pub address_confirm: String,
    pub catalog_menu: String,
    pub catalog_button: String,
    pub alcohol_category: String,
    pub category_chips: String,
    pub beer_category: String,
    pub pagination_nav: String,
    pub pagination_list: String,
    pub pagination_last: String,
    pub product_grid: String,
    pub product_item: String,
    pub product_name: String,
    pub product_volume: String,
    pub product_price: String,
    pub product_image: String,
    /// Next-page control; `{page}` is replaced with the target page number
    pub next_page: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub results_dir: PathBuf,
    /// JSON snapshot of the catalog store; reconciliation is skipped when unset
    pub store_snapshot: Option<PathBuf>,
    pub upload: bool,
    pub object_store_config: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub max_size_mb: f64,
    pub level: String,
}

impl ScraperConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scraper config file: {}", path))?;
        let config: ScraperConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse scraper config file: {}", path))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.site.base_url.is_empty() {
            return Err(anyhow::anyhow!("Site base_url cannot be empty"));
        }
        if !self.selectors.next_page.contains("{page}") {
            return Err(anyhow::anyhow!(
                "Next page selector must contain a {{page}} placeholder: {}",
                self.selectors.next_page
            ));
        }
        if self.timeouts.navigation_ms == 0 || self.timeouts.page_ms == 0 {
            return Err(anyhow::anyhow!("Wait timeouts must be positive"));
        }
        Ok(())
    }
}

impl TimeoutConfig {
    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn page(&self) -> Duration {
        Duration::from_millis(self.page_ms)
    }

    pub fn typing_delay(&self) -> Duration {
        Duration::from_millis(self.typing_delay_ms)
    }

    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }
}

impl SelectorConfig {
    pub fn next_page_for(&self, page: u32) -> String {
        self.next_page.replace("{page}", &page.to_string())
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "lenta".to_string(),
            base_url: "https://lenta.com/".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            locale: "ru-RU".to_string(),
            referer: "https://lenta.com/".to_string(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"
                .to_string(),
            accept_language: "ru-RU,ru;q=0.8,en-US;q=0.5,en;q=0.3".to_string(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            window_width: 1920,
            window_height: 1080,
            request_timeout_secs: 30,
            extra_args: vec![
                "--disable-blink-features=AutomationControlled".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--disable-notifications".to_string(),
                "--disable-infobars".to_string(),
                "--disable-popup-blocking".to_string(),
            ],
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation_ms: 30_000,
            page_ms: 30_000,
            typing_delay_ms: 30,
            scroll_settle_ms: 500,
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            address_block: "div.address-block.ng-star-inserted".to_string(),
            address_form: "form.ng-untouched.ng-pristine.ng-valid".to_string(),
            address_input:
                "input.p-element.p-autocomplete-input.p-inputtext.p-component.ng-star-inserted"
                    .to_string(),
            address_suggestion: "li.p-ripple.p-element.p-autocomplete-item.ng-star-inserted"
                .to_string(),
            address_confirm:
                "button.p-element.p-button.p-button-primary.large.w-100.p-component.ng-star-inserted"
                    .to_string(),
            catalog_menu: "lu-catalog-button.ng-star-inserted".to_string(),
            catalog_button: "button.p-button.p-button-tertiary.catalog-button".to_string(),
            alcohol_category: "a[href='https://lenta.com/catalog/alkogol-17036/']".to_string(),
            category_chips: "lu-search-categories-chips.ng-star-inserted".to_string(),
            beer_category: "a[href^='https://lenta.com/catalog/pivo-sidr']".to_string(),
            pagination_nav: "nav.ng-star-inserted".to_string(),
            pagination_list: "ul.pagination".to_string(),
            pagination_last: "li:last-child".to_string(),
            product_grid: "div.lu-grid".to_string(),
            product_item: "div[class='lu-grid__item ng-star-inserted']".to_string(),
            product_name: "span.card-name_content".to_string(),
            product_volume: "p.card-name_package".to_string(),
            product_price: "span.main-price, span[class^='main-price']".to_string(),
            product_image: "img.lu-product-card-image".to_string(),
            next_page: "a[aria-label='перейти на страницу {page}']".to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            store_snapshot: None,
            upload: false,
            object_store_config: PathBuf::from("src/configs/object_store.toml"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            max_size_mb: 1.0,
            level: "info".to_string(),
        }
    }
}
