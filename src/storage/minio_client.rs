use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::region::Region;
use tracing::info;

use crate::config::ObjectStoreConfig;
use crate::models::CatalogDocument;
use crate::storage::catalog_sink::{CatalogSink, address_slug};

/// Uploads exported catalogs to an S3-compatible bucket (MinIO in dev).
pub struct CatalogUploader {
    bucket: Bucket,
    key_prefix: String,
}

/// `<prefix>/<slug>/<YYYYmmdd>-<HHMMSS>.json`
pub fn catalog_key(prefix: &str, address: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}/{}/{}.json",
        prefix,
        address_slug(address),
        at.format("%Y%m%d-%H%M%S")
    )
}

impl CatalogUploader {
    pub fn new(
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        bucket_name: &str,
    ) -> Result<Self> {
        let config = ObjectStoreConfig {
            endpoint: endpoint.to_string(),
            bucket_name: bucket_name.to_string(),
            ..ObjectStoreConfig::default()
        };
        Self::with_credentials(&config, access_key, secret_key)
    }

    pub fn from_config(config: &ObjectStoreConfig) -> Result<Self> {
        config.validate()?;
        let credentials = config.credentials()?;
        Self::with_credentials(config, &credentials.access_key, &credentials.secret_key)
    }

    pub fn from_config_file(config_path: &str) -> Result<Self> {
        let config = ObjectStoreConfig::from_file(config_path)?;
        Self::from_config(&config)
    }

    fn with_credentials(
        config: &ObjectStoreConfig,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self> {
        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        };

        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)?;

        let bucket = Bucket::new(&config.bucket_name, region, credentials)?;
        let bucket = if config.path_style {
            *bucket.with_path_style()
        } else {
            *bucket
        };

        Ok(Self {
            bucket,
            key_prefix: config.key_prefix.clone(),
        })
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket.name
    }

    pub async fn ensure_bucket(&self) -> Result<()> {
        match self.bucket.exists().await {
            Ok(true) => {
                info!("Bucket '{}' already exists", self.bucket.name);
            }
            Ok(false) => {
                let config = s3::BucketConfiguration::default();
                s3::Bucket::create(
                    &self.bucket.name,
                    self.bucket.region.clone(),
                    self.bucket.credentials().await?,
                    config,
                )
                .await
                .map_err(|e| anyhow!("Failed to create bucket: {}", e))?;
                info!("Created bucket: {}", self.bucket.name);
            }
            Err(e) => {
                return Err(anyhow!("Failed to check bucket existence: {}", e));
            }
        }
        Ok(())
    }

    /// Upload one catalog JSON document and return its key.
    pub async fn store_catalog(&self, address: &str, json: &str) -> Result<String> {
        let key = catalog_key(&self.key_prefix, address, Utc::now());
        let response = self.bucket.put_object(&key, json.as_bytes()).await?;

        if response.status_code() == 200 {
            info!("Stored catalog: {}", key);
            Ok(key)
        } else {
            Err(anyhow!(
                "Failed to store catalog: HTTP {}",
                response.status_code()
            ))
        }
    }

    /// Catalog keys for an address, newest first.
    pub async fn list_catalog_keys(&self, address: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/{}/", self.key_prefix, address_slug(address));
        let pages = self.bucket.list(prefix, None).await?;

        let mut keys: Vec<String> = pages
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|object| object.key)
            .filter(|key| key.ends_with(".json"))
            .collect();
        keys.sort_by(|a, b| b.cmp(a));
        Ok(keys)
    }

    pub async fn load_latest_catalog(&self, address: &str) -> Result<Option<CatalogDocument>> {
        let Some(key) = self.list_catalog_keys(address).await?.into_iter().next() else {
            return Ok(None);
        };

        info!("Loading catalog from: {}", key);
        let response = self.bucket.get_object(&key).await?;
        if response.status_code() != 200 {
            return Err(anyhow!(
                "Failed to get catalog {}: HTTP {}",
                key,
                response.status_code()
            ));
        }

        let document: CatalogDocument = serde_json::from_slice(response.bytes())
            .map_err(|e| anyhow!("Failed to parse catalog {}: {}", key, e))?;
        Ok(Some(document))
    }
}

#[async_trait]
impl CatalogSink for CatalogUploader {
    fn name(&self) -> &str {
        "object-store"
    }

    async fn publish(&self, document: &CatalogDocument) -> Result<String> {
        let json = serde_json::to_string(document)?;
        self.store_catalog(&document.address, &json).await
    }
}
