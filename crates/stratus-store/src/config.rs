//! Backend configuration, loaded from TOML.
//!
//! ```toml
//! bucket = "objects"
//! prefix = "repos/demo/"
//!
//! [retry]
//! max_attempts = 5
//!
//! [remote]
//! kind = "http"
//! endpoint = "https://blobs.example.com"
//! token = "..."
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BackendError, BackendResult};
use crate::remote::{BlobStore, FsBlobStore, HttpBlobStore, InMemoryBlobStore};
use crate::retry::RetryPolicy;

fn default_timeout_secs() -> u64 {
    30
}

/// Which blob store the backend talks to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RemoteConfig {
    /// A process-local store; contents vanish with the backend.
    #[default]
    Memory,
    Filesystem {
        root: PathBuf,
    },
    Http {
        endpoint: String,
        #[serde(default)]
        token: Option<String>,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

impl RemoteConfig {
    /// Build the configured store.
    pub fn build(&self) -> BackendResult<Arc<dyn BlobStore>> {
        Ok(match self {
            Self::Memory => Arc::new(InMemoryBlobStore::new()),
            Self::Filesystem { root } => Arc::new(FsBlobStore::new(root.clone())),
            Self::Http {
                endpoint,
                token,
                timeout_secs,
            } => Arc::new(
                HttpBlobStore::new(endpoint, token.clone(), Duration::from_secs(*timeout_secs))
                    .map_err(|e| BackendError::Configuration(e.to_string()))?,
            ),
        })
    }
}

/// Everything a backend needs, fixed for its lifetime.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub bucket: String,
    /// Prepended verbatim to every key, so include a trailing `/` if wanted.
    pub prefix: String,
    /// Where the scratch directory is created; the system temp dir if unset.
    pub scratch_parent: Option<PathBuf>,
    pub retry: RetryPolicy,
    pub remote: RemoteConfig,
}

impl BackendConfig {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> BackendResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| BackendError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> BackendResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            BackendError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> BackendResult<()> {
        if self.bucket.trim().is_empty() {
            return Err(BackendError::Configuration("bucket must not be empty".into()));
        }
        if self.bucket.contains('/') {
            return Err(BackendError::Configuration(format!(
                "bucket must not contain '/': {}",
                self.bucket
            )));
        }
        if self.prefix.starts_with('/') {
            return Err(BackendError::Configuration(format!(
                "prefix must be relative: {}",
                self.prefix
            )));
        }
        if let RemoteConfig::Http { timeout_secs: 0, .. } = self.remote {
            return Err(BackendError::Configuration("timeout_secs must be positive".into()));
        }
        Ok(())
    }
}
