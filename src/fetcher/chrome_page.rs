use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::ScraperConfig;
use crate::fetcher::page::{BrowserPage, PageElement};

const VISIBILITY_JS: &str = r#"function() {
    const rect = this.getBoundingClientRect();
    const style = window.getComputedStyle(this);
    return rect.width > 0 && rect.height > 0
        && style.visibility !== 'hidden' && style.display !== 'none';
}"#;

/// A live browser process plus the single tab a run drives.
pub struct ChromeSession {
    browser: Browser,
    handler: JoinHandle<()>,
    page: ChromePage,
}

/// Chrome tab behind the [`BrowserPage`] seam.
#[derive(Clone)]
pub struct ChromePage {
    page: Page,
}

pub struct ChromeElement {
    element: Element,
}

/// Find Chrome/Chromium: config path, then `CHROMIUM_PATH`, then the usual
/// install locations, then `which`.
pub fn find_chrome_executable(configured: Option<&PathBuf>) -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!("Using browser from CHROMIUM_PATH: {}", path.display());
            return Ok(path);
        }
        warn!("CHROMIUM_PATH points to a missing file: {}", path.display());
    }

    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.clone());
        }
        warn!("Configured chrome_path does not exist: {}", path.display());
    }

    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/usr/local/bin/chromium",
        "/opt/google/chrome/chrome",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];
    if let Some(path) = candidates.iter().map(PathBuf::from).find(|p| p.exists()) {
        info!("Found browser at: {}", path.display());
        return Ok(path);
    }

    for cmd in ["chromium", "chromium-browser", "google-chrome", "chrome"] {
        if let Ok(output) = Command::new("which").arg(cmd).output()
            && output.status.success()
        {
            let found = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !found.is_empty() {
                info!("Found browser using 'which': {}", found);
                return Ok(PathBuf::from(found));
            }
        }
    }

    Err(anyhow!("Chrome/Chromium executable not found; set CHROMIUM_PATH"))
}

impl ChromeSession {
    pub async fn launch(config: &ScraperConfig) -> Result<Self> {
        let chrome_path = find_chrome_executable(config.browser.chrome_path.as_ref())?;

        let mut builder = BrowserConfigBuilder::default()
            .request_timeout(Duration::from_secs(config.browser.request_timeout_secs))
            .window_size(config.browser.window_width, config.browser.window_height)
            .chrome_executable(chrome_path);

        builder = if config.browser.headless {
            builder.headless_mode(HeadlessMode::default())
        } else {
            builder.with_head()
        };

        builder = builder
            .arg(format!("--user-agent={}", config.site.user_agent))
            .arg(format!("--lang={}", config.site.locale))
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--no-first-run")
            .arg("--disable-gpu")
            .arg("--disable-geolocation")
            .arg("--disable-extensions");
        for arg in &config.browser.extra_args {
            builder = builder.arg(arg.as_str());
        }

        let browser_config = builder
            .build()
            .map_err(|e| anyhow!("Failed to build browser config: {e}"))?;

        let (mut browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("Failed to launch browser")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    let message = e.to_string();
                    if message.contains("data did not match any variant") {
                        continue;
                    }
                    error!("Browser handler error: {:?}", e);
                }
            }
            debug!("Browser handler task completed");
        });

        let page = match open_tab(&browser, config).await {
            Ok(page) => page,
            Err(e) => {
                shutdown(&mut browser, &handler).await;
                return Err(e);
            }
        };

        info!("Browser launched ({}x{})", config.browser.window_width, config.browser.window_height);

        Ok(Self {
            browser,
            handler,
            page: ChromePage { page },
        })
    }

    pub fn page(&self) -> &ChromePage {
        &self.page
    }

    pub async fn close(mut self) {
        shutdown(&mut self.browser, &self.handler).await;
    }
}

/// Blank tab with the site's request headers applied.
async fn open_tab(browser: &Browser, config: &ScraperConfig) -> Result<Page> {
    let page = browser
        .new_page("about:blank")
        .await
        .context("Failed to open browser tab")?;

    let headers = Headers::new(serde_json::json!({
        "Referer": config.site.referer,
        "Accept": config.site.accept,
        "Accept-Language": config.site.accept_language,
        "Sec-Fetch-Dest": "document",
    }));
    page.execute(SetExtraHttpHeadersParams::new(headers))
        .await
        .context("Failed to set request headers")?;
    Ok(page)
}

async fn shutdown(browser: &mut Browser, handler: &JoinHandle<()>) {
    if let Err(e) = browser.close().await {
        warn!("Failed to close browser cleanly: {}", e);
    }
    if let Err(e) = browser.wait().await {
        warn!("Browser process did not exit cleanly: {}", e);
    }
    handler.abort();
}

#[async_trait]
impl BrowserPage for ChromePage {
    type Element = ChromeElement;

    async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Failed to open {}", url))?;
        Ok(())
    }

    async fn query(&self, selector: &str) -> Result<Option<ChromeElement>> {
        let elements = self.page.find_elements(selector).await?;
        Ok(elements.into_iter().next().map(|element| ChromeElement { element }))
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ChromeElement>> {
        let elements = self.page.find_elements(selector).await?;
        Ok(elements
            .into_iter()
            .map(|element| ChromeElement { element })
            .collect())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .with_context(|| format!("No element to click: {}", selector))?;
        element.click().await?;
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str, delay: Duration) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .with_context(|| format!("No element to type into: {}", selector))?;
        element.click().await?;

        let mut buf = [0u8; 4];
        for ch in text.chars() {
            element.type_str(ch.encode_utf8(&mut buf)).await?;
            let jitter = rand::random::<u64>() % (delay.as_millis() as u64 / 2 + 1);
            sleep(delay + Duration::from_millis(jitter)).await;
        }
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<()> {
        self.page.evaluate(script).await?;
        Ok(())
    }
}

#[async_trait]
impl PageElement for ChromeElement {
    async fn inner_text(&self) -> Result<String> {
        Ok(self.element.inner_text().await?.unwrap_or_default())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        Ok(self.element.attribute(name).await?)
    }

    async fn is_visible(&self) -> Result<bool> {
        let returns = self.element.call_js_fn(VISIBILITY_JS, false).await?;
        Ok(returns
            .result
            .value
            .and_then(|value| value.as_bool())
            .unwrap_or(false))
    }

    async fn query(&self, selector: &str) -> Result<Option<ChromeElement>> {
        let elements = self.element.find_elements(selector).await?;
        Ok(elements.into_iter().next().map(|element| ChromeElement { element }))
    }
}
