use async_trait::async_trait;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::ProviderConfig;

/// A single object-storage backend.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn write_object(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Read an object. A missing object is `StorageError::NotFound`.
    async fn read_object(&self, key: &str) -> Result<Vec<u8>, StorageError>;
}

/// S3-compatible provider (AWS or a self-hosted mirror such as MinIO).
pub struct S3Provider {
    bucket: Box<Bucket>,
}

impl S3Provider {
    pub fn new(config: &ProviderConfig) -> Result<Self, StorageError> {
        let settings = &config.settings;

        let region = match &settings.s3_url {
            Some(endpoint) => Region::Custom {
                region: settings.default_region.clone(),
                endpoint: endpoint.clone(),
            },
            None => settings
                .default_region
                .parse::<Region>()
                .map_err(|e| StorageError::Config(e.to_string()))?,
        };

        let credentials = Credentials::new(
            settings.access_key_id.as_deref(),
            settings.secret_access_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(&settings.bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        // Self-hosted mirrors don't do virtual-host bucket addressing.
        let bucket = if settings.s3_url.is_some() {
            bucket.with_path_style()
        } else {
            bucket
        };

        Ok(Self { bucket })
    }
}

#[async_trait]
impl ObjectStore for S3Provider {
    async fn write_object(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let response = self.bucket.put_object(key, data).await?;
        match response.status_code() {
            200..=299 => Ok(()),
            code => Err(StorageError::Status(code)),
        }
    }

    async fn read_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = match self.bucket.get_object(key).await {
            Ok(r) => r,
            Err(S3Error::HttpFailWithBody(404, _)) => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        match response.status_code() {
            200..=299 => Ok(response.to_vec()),
            404 => Err(StorageError::NotFound(key.to_string())),
            code => Err(StorageError::Status(code)),
        }
    }
}

/// Object store held in memory.
#[derive(Default)]
pub struct MemoryProvider {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    unavailable: AtomicBool,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryProvider {
    async fn write_object(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.check_available()?;
        self.objects
            .write()
            .await
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn read_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.check_available()?;
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

#[derive(Clone)]
pub struct ProviderHandle {
    pub name: String,
    pub store: Arc<dyn ObjectStore>,
}

/// Object read from the first provider that had it.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectHit {
    pub provider: String,
    pub data: Vec<u8>,
}

/// Outcome of mirroring an object to every provider.
#[derive(Debug, Default)]
pub struct ReplicationReport {
    pub written: Vec<String>,
    pub failed: Vec<(String, StorageError)>,
}

impl ReplicationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Storage providers in read priority order.
#[derive(Clone)]
pub struct ProviderSet {
    providers: Vec<ProviderHandle>,
    timeout: Duration,
}

impl ProviderSet {
    pub fn new(timeout: Duration) -> Self {
        Self {
            providers: Vec::new(),
            timeout,
        }
    }

    /// Append a provider at the lowest priority. A name already present is ignored.
    pub fn with_provider(mut self, name: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        let name = name.into();
        if self.providers.iter().any(|p| p.name == name) {
            tracing::warn!(provider = %name, "Provider already registered");
            return self;
        }
        self.providers.push(ProviderHandle { name, store });
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Read `key` from the providers in order and return the first hit.
    ///
    /// Provider failures are logged and the next provider is tried; when no
    /// provider returns the object the result is `NotFound`.
    pub async fn read_first(&self, key: &str) -> Result<ObjectHit, StorageError> {
        for provider in &self.providers {
            let result = tokio::time::timeout(self.timeout, provider.store.read_object(key))
                .await
                .unwrap_or(Err(StorageError::Timeout(self.timeout)));

            match result {
                Ok(data) => {
                    tracing::debug!(provider = %provider.name, key = %key, bytes = data.len(), "Read object");
                    return Ok(ObjectHit {
                        provider: provider.name.clone(),
                        data,
                    });
                }
                Err(StorageError::NotFound(_)) => {
                    tracing::debug!(provider = %provider.name, key = %key, "Object not in provider");
                }
                Err(e) => {
                    tracing::warn!(provider = %provider.name, key = %key, error = %e, "Provider read failed");
                }
            }
        }

        Err(StorageError::NotFound(key.to_string()))
    }

    /// Write `data` to every provider. Successful writes are kept even when
    /// others fail.
    pub async fn write_all(&self, key: &str, data: &[u8]) -> ReplicationReport {
        let mut report = ReplicationReport::default();

        for provider in &self.providers {
            let result = tokio::time::timeout(self.timeout, provider.store.write_object(key, data))
                .await
                .unwrap_or(Err(StorageError::Timeout(self.timeout)));

            match result {
                Ok(()) => report.written.push(provider.name.clone()),
                Err(e) => {
                    tracing::warn!(provider = %provider.name, key = %key, error = %e, "Provider write failed");
                    report.failed.push((provider.name.clone(), e));
                }
            }
        }

        report
    }
}

/// Build one S3 provider per configured entry, keeping the configured order.
pub fn load_providers(
    configs: &[ProviderConfig],
    timeout: Duration,
) -> Result<ProviderSet, StorageError> {
    let mut set = ProviderSet::new(timeout);
    for config in configs {
        tracing::info!(provider = %config.name, bucket = %config.settings.bucket_name, "Loading storage provider");
        set = set.with_provider(config.name.clone(), Arc::new(S3Provider::new(config)?));
    }
    if set.is_empty() {
        tracing::warn!("No storage providers configured, reparse requests will fail");
    }
    Ok(set)
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] S3Error),

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Unexpected storage response status {0}")]
    Status(u16),

    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Storage provider unavailable")]
    Unavailable,
}
