//! In-process store of scraped catalogs per delivery address.
//!
//! Stores, products and the availability links between them, persisted as a
//! single JSON snapshot. Products are keyed by their raw listing name: a
//! re-scrape upserts by that name and flips availability on the store links.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::models::{CatalogDocument, Category, NOT_SPECIFIED, ScrapedProductRecord};
use crate::storage::catalog_sink::CatalogSink;

pub type StoreId = u64;
pub type ProductId = u64;

const DEFAULT_UPDATE_FREQUENCY_MINUTES: u32 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub id: StoreId,
    pub address: String,
    pub city: String,
    pub is_active: bool,
    pub popularity_score: f64,
    pub update_frequency_minutes: u32,
    pub request_count_24h: u32,
    pub is_auto_update: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_request_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredProduct {
    pub id: ProductId,
    #[serde(flatten)]
    pub record: ScrapedProductRecord,
    pub last_updated: DateTime<Utc>,
}

impl StoredProduct {
    pub fn name(&self) -> &str {
        &self.record.raw_name
    }
}

/// Availability of one product in one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreProduct {
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub is_available: bool,
    pub last_updated: DateTime<Utc>,
}

/// Mutable store fields. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorePatch {
    city: Option<String>,
    is_active: Option<bool>,
    is_auto_update: Option<bool>,
    update_frequency_minutes: Option<u32>,
    last_updated: Option<DateTime<Utc>>,
}

impl StorePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    pub fn auto_update(mut self, is_auto_update: bool) -> Self {
        self.is_auto_update = Some(is_auto_update);
        self
    }

    pub fn update_frequency_minutes(mut self, minutes: u32) -> Self {
        self.update_frequency_minutes = Some(minutes);
        self
    }

    pub fn last_updated(mut self, at: DateTime<Utc>) -> Self {
        self.last_updated = Some(at);
        self
    }

    fn apply(self, store: &mut Store) {
        if let Some(city) = self.city {
            store.city = city;
        }
        if let Some(is_active) = self.is_active {
            store.is_active = is_active;
        }
        if let Some(is_auto_update) = self.is_auto_update {
            store.is_auto_update = is_auto_update;
        }
        if let Some(minutes) = self.update_frequency_minutes {
            store.update_frequency_minutes = minutes;
        }
        if let Some(at) = self.last_updated {
            store.last_updated = Some(at);
        }
    }
}

/// Mutable product fields: the listing's display data. Classification is
/// fixed once the record exists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductPatch {
    volume_text: Option<String>,
    price_text: Option<String>,
    image_url: Option<Option<String>>,
}

impl ProductPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch carrying the display fields of a fresher listing.
    pub fn from_listing(record: &ScrapedProductRecord) -> Self {
        Self::new()
            .volume_text(record.volume_text.clone())
            .price_text(record.price_text.clone())
            .image_url(record.image_url.clone())
    }

    pub fn volume_text(mut self, volume: impl Into<String>) -> Self {
        self.volume_text = Some(volume.into());
        self
    }

    pub fn price_text(mut self, price: impl Into<String>) -> Self {
        self.price_text = Some(price.into());
        self
    }

    pub fn image_url(mut self, url: Option<String>) -> Self {
        self.image_url = Some(url);
        self
    }

    fn apply(self, product: &mut StoredProduct) {
        if let Some(volume) = self.volume_text {
            product.record.volume_text = volume;
        }
        if let Some(price) = self.price_text {
            product.record.price_text = price;
        }
        if let Some(url) = self.image_url {
            product.record.image_url = url;
        }
    }
}

/// Criteria for [`CatalogStore::filter_products`]; every set bound must hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductFilter {
    pub store_id: Option<StoreId>,
    pub category: Option<Category>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_alcohol: Option<f64>,
    pub max_alcohol: Option<f64>,
}

impl ProductFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(mut self, store_id: StoreId) -> Self {
        self.store_id = Some(store_id);
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn price_between(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_price = min;
        self.max_price = max;
        self
    }

    pub fn alcohol_between(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_alcohol = min;
        self.max_alcohol = max;
        self
    }

    fn matches(&self, product: &StoredProduct) -> bool {
        if let Some(category) = self.category
            && product.record.category != category
        {
            return false;
        }
        in_range(product.record.price_value(), self.min_price, self.max_price)
            && in_range(product.record.alcohol_percentage, self.min_alcohol, self.max_alcohol)
    }
}

/// A bound on a missing value never holds.
fn in_range(value: Option<f64>, min: Option<f64>, max: Option<f64>) -> bool {
    if min.is_none() && max.is_none() {
        return true;
    }
    let Some(value) = value else {
        return false;
    };
    min.is_none_or(|min| value >= min) && max.is_none_or(|max| value <= max)
}

/// Counts from one [`CatalogStore::update_store_products`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub created: usize,
    pub linked: usize,
    pub available: usize,
    pub unavailable: usize,
    /// Records without a readable name, left out of the upsert.
    pub skipped: usize,
}

/// Popularity from the request count, the gap since the previous request and
/// the auto-update flag.
pub fn popularity_score(request_count: u32, hours_since_previous: Option<f64>, auto_update: bool) -> f64 {
    let time_factor = match hours_since_previous {
        Some(hours) => (1.0 - hours / 24.0).max(0.1),
        None => 1.0,
    };
    let auto = if auto_update { 1.0 } else { 0.0 };
    (request_count as f64 * 0.4 + time_factor * 0.3 + auto * 0.3) * 100.0
}

/// Refresh interval for a popularity score.
pub fn update_frequency_for(score: f64) -> u32 {
    if score > 80.0 {
        60
    } else if score > 50.0 {
        180
    } else if score > 20.0 {
        360
    } else {
        1440
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogStore {
    stores: Vec<Store>,
    products: Vec<StoredProduct>,
    links: Vec<StoreProduct>,
    next_store_id: StoreId,
    next_product_id: ProductId,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot, or start empty when the file does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No store snapshot at {}, starting empty", path.display());
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read store snapshot: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse store snapshot: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write store snapshot: {}", path.display()))?;
        Ok(())
    }

    // Stores

    pub fn create_store(&mut self, address: &str, city: &str) -> &Store {
        self.next_store_id += 1;
        let index = self.stores.len();
        self.stores.push(Store {
            id: self.next_store_id,
            address: address.to_string(),
            city: city.to_string(),
            is_active: true,
            popularity_score: 0.0,
            update_frequency_minutes: DEFAULT_UPDATE_FREQUENCY_MINUTES,
            request_count_24h: 0,
            is_auto_update: true,
            last_updated: Some(Utc::now()),
            last_request_time: None,
        });
        &self.stores[index]
    }

    pub fn get_store(&self, id: StoreId) -> Option<&Store> {
        self.stores.iter().find(|store| store.id == id)
    }

    pub fn get_store_by_address(&self, address: &str) -> Option<&Store> {
        self.stores.iter().find(|store| store.address == address)
    }

    fn store_mut(&mut self, id: StoreId) -> Option<&mut Store> {
        self.stores.iter_mut().find(|store| store.id == id)
    }

    pub fn update_store(&mut self, id: StoreId, patch: StorePatch) -> Option<&Store> {
        let store = self.store_mut(id)?;
        patch.apply(store);
        Some(store)
    }

    /// Record one request for the store and recompute its score and
    /// refresh interval.
    pub fn update_popularity(&mut self, id: StoreId, now: DateTime<Utc>) -> Option<&Store> {
        let store = self.store_mut(id)?;

        let hours_since_previous = store
            .last_request_time
            .map(|previous| (now - previous).num_seconds().max(0) as f64 / 3600.0);
        store.request_count_24h += 1;
        store.last_request_time = Some(now);

        store.popularity_score = popularity_score(
            store.request_count_24h,
            hours_since_previous,
            store.is_auto_update,
        );
        store.update_frequency_minutes = update_frequency_for(store.popularity_score);
        Some(store)
    }

    pub fn reset_daily_stats(&mut self) {
        for store in &mut self.stores {
            store.request_count_24h = 0;
            store.popularity_score = 0.0;
        }
    }

    /// Active auto-updating stores whose refresh interval has elapsed.
    pub fn stores_due_for_update(&self, now: DateTime<Utc>) -> Vec<&Store> {
        self.stores
            .iter()
            .filter(|store| store.is_active && store.is_auto_update)
            .filter(|store| match store.last_updated {
                None => true,
                Some(at) => {
                    now - at >= Duration::minutes(i64::from(store.update_frequency_minutes))
                }
            })
            .collect()
    }

    // Products

    pub fn create_product(&mut self, record: ScrapedProductRecord) -> &StoredProduct {
        self.next_product_id += 1;
        let index = self.products.len();
        self.products.push(StoredProduct {
            id: self.next_product_id,
            record,
            last_updated: Utc::now(),
        });
        &self.products[index]
    }

    pub fn get_product(&self, id: ProductId) -> Option<&StoredProduct> {
        self.products.iter().find(|product| product.id == id)
    }

    fn product_by_name(&self, name: &str) -> Option<&StoredProduct> {
        self.products.iter().find(|product| product.name() == name)
    }

    pub fn update_product(&mut self, id: ProductId, patch: ProductPatch) -> Option<&StoredProduct> {
        let product = self.products.iter_mut().find(|product| product.id == id)?;
        patch.apply(product);
        product.last_updated = Utc::now();
        Some(product)
    }

    fn available_ids(&self, store_id: StoreId) -> HashSet<ProductId> {
        self.links
            .iter()
            .filter(|link| link.store_id == store_id && link.is_available)
            .map(|link| link.product_id)
            .collect()
    }

    /// Products currently available in the store.
    pub fn products_by_store(&self, store_id: StoreId) -> Vec<&StoredProduct> {
        let available = self.available_ids(store_id);
        self.products
            .iter()
            .filter(|product| available.contains(&product.id))
            .collect()
    }

    /// Upsert a fresh scrape into the store.
    ///
    /// Known names are refreshed and marked available, names missing from the
    /// scrape are marked unavailable, and new names create products and links.
    /// Records named [`NOT_SPECIFIED`] have no identity and are skipped.
    pub fn update_store_products(
        &mut self,
        store_id: StoreId,
        records: &[ScrapedProductRecord],
    ) -> Result<ReconcileSummary> {
        if self.get_store(store_id).is_none() {
            return Err(anyhow!("Store {} not found", store_id));
        }

        let now = Utc::now();
        let mut summary = ReconcileSummary::default();
        let named: Vec<&ScrapedProductRecord> = records
            .iter()
            .filter(|record| record.raw_name != NOT_SPECIFIED)
            .collect();
        summary.skipped = records.len() - named.len();
        if summary.skipped > 0 {
            debug!("Skipping {} unnamed records for store {}", summary.skipped, store_id);
        }
        let records = named;
        let scraped: HashMap<&str, &ScrapedProductRecord> = records
            .iter()
            .map(|record| (record.raw_name.as_str(), *record))
            .collect();

        let names: HashMap<ProductId, String> = self
            .products
            .iter()
            .map(|product| (product.id, product.name().to_string()))
            .collect();
        let mut linked: HashSet<ProductId> = HashSet::new();
        for link in self.links.iter_mut().filter(|link| link.store_id == store_id) {
            linked.insert(link.product_id);
            let present = names
                .get(&link.product_id)
                .is_some_and(|name| scraped.contains_key(name.as_str()));
            link.is_available = present;
            link.last_updated = now;
            if present {
                summary.available += 1;
            } else {
                summary.unavailable += 1;
            }
        }

        for record in records {
            let product_id = match self.product_by_name(&record.raw_name) {
                Some(existing) => {
                    let id = existing.id;
                    self.update_product(id, ProductPatch::from_listing(record));
                    id
                }
                None => {
                    summary.created += 1;
                    self.create_product(record.clone()).id
                }
            };

            if linked.insert(product_id) {
                self.links.push(StoreProduct {
                    store_id,
                    product_id,
                    is_available: true,
                    last_updated: now,
                });
                summary.linked += 1;
            }
        }

        Ok(summary)
    }

    /// Case-insensitive substring search on product names, optionally
    /// restricted to what a store currently has.
    pub fn search_products(&self, query: &str, store_id: Option<StoreId>) -> Vec<&StoredProduct> {
        let needle = query.to_lowercase();
        let available = store_id.map(|id| self.available_ids(id));
        self.products
            .iter()
            .filter(|product| {
                available
                    .as_ref()
                    .is_none_or(|ids| ids.contains(&product.id))
            })
            .filter(|product| product.name().to_lowercase().contains(&needle))
            .collect()
    }

    pub fn filter_products(&self, filter: &ProductFilter) -> Vec<&StoredProduct> {
        let available = filter.store_id.map(|id| self.available_ids(id));
        self.products
            .iter()
            .filter(|product| {
                available
                    .as_ref()
                    .is_none_or(|ids| ids.contains(&product.id))
            })
            .filter(|product| filter.matches(product))
            .collect()
    }
}

/// City part of a "City, street, house" address.
pub fn city_of(address: &str) -> &str {
    address.split(',').next().unwrap_or(address).trim()
}

/// Reconciles each published catalog into a [`CatalogStore`] snapshot file.
pub struct StoreSink {
    store: Mutex<CatalogStore>,
    snapshot: PathBuf,
}

impl StoreSink {
    pub fn open(snapshot: impl Into<PathBuf>) -> Result<Self> {
        let snapshot = snapshot.into();
        let store = CatalogStore::load(&snapshot)?;
        Ok(Self {
            store: Mutex::new(store),
            snapshot,
        })
    }

    fn reconcile(&self, document: &CatalogDocument) -> Result<ReconcileSummary> {
        let mut store = self
            .store
            .lock()
            .map_err(|_| anyhow!("Catalog store lock poisoned"))?;

        let store_id = match store.get_store_by_address(&document.address) {
            Some(existing) => existing.id,
            None => store.create_store(&document.address, city_of(&document.address)).id,
        };
        let summary = store.update_store_products(store_id, &document.products)?;
        store.update_store(store_id, StorePatch::new().last_updated(document.timestamp));
        store.save(&self.snapshot)?;
        Ok(summary)
    }
}

#[async_trait]
impl CatalogSink for StoreSink {
    fn name(&self) -> &str {
        "catalog-store"
    }

    async fn publish(&self, document: &CatalogDocument) -> Result<String> {
        let summary = self.reconcile(document)?;
        info!(
            "Store updated for {}: {} new, {} available, {} unavailable",
            document.address, summary.created, summary.available, summary.unavailable
        );
        Ok(self.snapshot.display().to_string())
    }
}
