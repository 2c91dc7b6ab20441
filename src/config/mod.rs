pub mod object_store_config;
pub mod scraper_config;

pub use object_store_config::*;
pub use scraper_config::*;
