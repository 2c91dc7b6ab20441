pub mod chrome_page;
pub mod navigator;
pub mod page;
pub mod page_extractor;
pub mod snapshot_page;

pub use chrome_page::{ChromePage, ChromeSession};
pub use navigator::{CatalogNavigator, CatalogRun, NavState, PaginationEnd};
pub use page::{BrowserPage, PageElement};
pub use page_extractor::{PageExtraction, PageExtractor};
pub use snapshot_page::SnapshotPage;
