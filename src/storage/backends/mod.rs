use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::storage::template::ObjectStore;

mod blob_storage;
mod filesystem;
mod memory;

pub use blob_storage::BlobStorageBackend;
pub use filesystem::FileSystemBackend;
pub use memory::MemoryBackend;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendConfigs {
    Memory {
        /// The number of keys returned per listing page.
        #[serde(default = "default_page_size")]
        page_size: usize,
    },
    FileSystem {
        directory: PathBuf,
    },
    BlobStorage {
        region: String,
        endpoint: String,
        access_key: Option<String>,
        secret_key: Option<String>,
        session_token: Option<String>,
        request_timeout_secs: Option<u64>,
    },
}

impl BackendConfigs {
    /// Connects to the backend holding the objects of `bucket`.
    pub async fn connect(&self, bucket: &str) -> anyhow::Result<Arc<dyn ObjectStore>> {
        match self {
            Self::Memory { page_size } => {
                Ok(Arc::new(MemoryBackend::new(*page_size)))
            },
            Self::FileSystem { directory } => {
                Ok(Arc::new(FileSystemBackend::new(directory.join(bucket))))
            },
            Self::BlobStorage {
                region,
                endpoint,
                access_key,
                secret_key,
                session_token,
                request_timeout_secs,
            } => {
                let backend = BlobStorageBackend::new(
                    bucket.to_string(),
                    region.clone(),
                    endpoint.clone(),
                    access_key.clone(),
                    secret_key.clone(),
                    session_token.clone(),
                    request_timeout_secs.map(Duration::from_secs),
                )?;

                Ok(Arc::new(backend))
            },
        }
    }
}

const fn default_page_size() -> usize {
    1000
}
