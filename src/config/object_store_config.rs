use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

const DEFAULT_ACCESS_KEY_VAR: &str = "MINIO_ACCESS_KEY";
const DEFAULT_SECRET_KEY_VAR: &str = "MINIO_SECRET_KEY";

#[derive(Debug, Clone, Deserialize)]
struct ObjectStoreFile {
    object_store: ObjectStoreConfig,
}

/// S3/MinIO bucket that exported catalogs are uploaded to.
///
/// Credentials never live in the file; they are read from the environment
/// variables named by `access_key_var` / `secret_key_var`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStoreConfig {
    pub endpoint: String,
    pub bucket_name: String,
    pub region: String,
    pub path_style: bool,
    /// First path segment of every uploaded key
    pub key_prefix: String,
    pub access_key_var: String,
    pub secret_key_var: String,
}

/// Access/secret pair resolved from the environment.
#[derive(Debug, Clone)]
pub struct ObjectStoreCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl ObjectStoreConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read object store config file: {}", path))?;
        let file: ObjectStoreFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse object store config file: {}", path))?;
        Ok(file.object_store)
    }

    pub fn credentials(&self) -> Result<ObjectStoreCredentials> {
        let access_key = env::var(&self.access_key_var)
            .with_context(|| format!("Missing environment variable: {}", self.access_key_var))?;
        let secret_key = env::var(&self.secret_key_var)
            .with_context(|| format!("Missing environment variable: {}", self.secret_key_var))?;
        Ok(ObjectStoreCredentials {
            access_key,
            secret_key,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(anyhow::anyhow!("Object store endpoint cannot be empty"));
        }
        if self.bucket_name.is_empty() {
            return Err(anyhow::anyhow!("Object store bucket name cannot be empty"));
        }
        if self.key_prefix.contains('/') {
            return Err(anyhow::anyhow!(
                "Object store key prefix must be a single path segment: {}",
                self.key_prefix
            ));
        }
        Ok(())
    }
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            bucket_name: "catalog-scraper".to_string(),
            region: "us-east-1".to_string(),
            path_style: true,
            key_prefix: "raw".to_string(),
            access_key_var: DEFAULT_ACCESS_KEY_VAR.to_string(),
            secret_key_var: DEFAULT_SECRET_KEY_VAR.to_string(),
        }
    }
}
