use std::sync::Arc;

use crate::config::BackendConfig;
use crate::disk_cache::DiskCache;
use crate::error::BackendResult;
use crate::location::LocationCache;
use crate::oracle::Oracle;
use crate::remote::BlobStore;
use crate::transfer::TransferClient;

/// State shared by every operation of one backend, immutable apart from the
/// location cache's interior map.
pub struct BackendContext {
    pub config: BackendConfig,
    pub cache: LocationCache,
    pub oracle: Arc<dyn Oracle>,
    pub transfer: TransferClient,
    pub disk: DiskCache,
}

impl BackendContext {
    pub fn new(config: BackendConfig, store: Arc<dyn BlobStore>, oracle: Arc<dyn Oracle>) -> BackendResult<Self> {
        config.validate()?;
        let disk = DiskCache::create(config.scratch_parent.as_deref())?;
        let transfer = TransferClient::new(
            config.bucket.clone(),
            config.prefix.clone(),
            store,
            oracle.clone(),
            config.retry,
        );
        Ok(Self {
            config,
            cache: LocationCache::new(),
            oracle,
            transfer,
            disk,
        })
    }
}

impl std::fmt::Debug for BackendContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendContext")
            .field("bucket", &self.config.bucket)
            .field("prefix", &self.config.prefix)
            .field("cached_locations", &self.cache.len())
            .field("scratch", &self.disk.root())
            .finish()
    }
}
