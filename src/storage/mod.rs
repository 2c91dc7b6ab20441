pub mod catalog_export;
pub mod catalog_sink;
pub mod catalog_store;
pub mod minio_client;

pub use catalog_export::{JsonFileExport, export_catalog};
pub use catalog_sink::{CatalogSink, address_slug};
pub use catalog_store::{CatalogStore, ProductFilter, ProductPatch, StorePatch, StoreSink};
pub use minio_client::CatalogUploader;
