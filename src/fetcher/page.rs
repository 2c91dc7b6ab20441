use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::trace;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One DOM element on a rendered page.
#[async_trait]
pub trait PageElement: Send + Sync + Sized {
    async fn inner_text(&self) -> Result<String>;

    async fn attribute(&self, name: &str) -> Result<Option<String>>;

    async fn is_visible(&self) -> Result<bool>;

    /// First descendant matching `selector`.
    async fn query(&self, selector: &str) -> Result<Option<Self>>;
}

/// The page operations the scraper drives. Implemented by the live Chrome
/// tab and by the offline snapshot page.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    type Element: PageElement;

    async fn goto(&self, url: &str) -> Result<()>;

    async fn query(&self, selector: &str) -> Result<Option<Self::Element>>;

    async fn query_all(&self, selector: &str) -> Result<Vec<Self::Element>>;

    async fn click(&self, selector: &str) -> Result<()>;

    /// Type `text` into the element, pausing `delay` between keystrokes.
    async fn type_text(&self, selector: &str, text: &str, delay: Duration) -> Result<()>;

    async fn evaluate(&self, script: &str) -> Result<()>;
}

/// Wait until `selector` matches, or give up after `timeout`.
///
/// Query errors while waiting are treated as "not there yet": pages under
/// navigation routinely reject DOM queries for a moment.
pub async fn wait_for_element<P>(
    page: &P,
    selector: &str,
    timeout: Duration,
) -> Option<P::Element>
where
    P: BrowserPage + ?Sized,
{
    let deadline = Instant::now() + timeout;
    loop {
        match page.query(selector).await {
            Ok(Some(element)) => return Some(element),
            Ok(None) => {}
            Err(e) => trace!("query '{}' failed while waiting: {}", selector, e),
        }

        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        sleep(POLL_INTERVAL.min(deadline - now)).await;
    }
}
