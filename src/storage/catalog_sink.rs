use anyhow::Result;
use async_trait::async_trait;

use crate::models::CatalogDocument;

/// Destination for a finished catalog.
#[async_trait]
pub trait CatalogSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Store the document and return where it went (path, key, ...).
    async fn publish(&self, document: &CatalogDocument) -> Result<String>;
}

/// Lowercase address with every run of non-alphanumerics folded into `_`.
pub fn address_slug(address: &str) -> String {
    let mut slug = String::with_capacity(address.len());
    for c in address.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}
