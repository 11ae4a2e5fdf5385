use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::database::backends::DatabaseConfigs;
use crate::storage::backends::BackendConfigs;

/// What to do with a stored key which cannot be decoded while listing.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedKeyPolicy {
    /// The whole listing fails with a decode error.
    Abort,

    /// The key is logged and left out of the listing.
    Skip,
}

impl Default for MalformedKeyPolicy {
    fn default() -> Self {
        Self::Abort
    }
}

#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    /// Where patient images are kept.
    pub images: ImagesConfig,

    /// The patient record database.
    pub database: DatabaseConfigs,

    #[serde(default)]
    /// Demo data loaded into an empty database at startup.
    pub fixtures: Option<FixturesConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ImagesConfig {
    /// The name of the bucket holding every patient's images.
    ///
    /// Image uris are formed as `{bucket}/{key}`.
    pub bucket: String,

    #[serde(default)]
    /// See `config::MalformedKeyPolicy`.
    ///
    /// Defaults to `abort`.
    pub on_malformed_key: MalformedKeyPolicy,

    /// The object storage backend configuration.
    pub backend: BackendConfigs,
}

#[derive(Debug, Deserialize)]
pub struct FixturesConfig {
    /// The directory the fixture images are read from.
    pub dataset: PathBuf,
}

impl RuntimeConfig {
    pub async fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {:?}", path))?;

        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_yaml::from_str(data)?;

        if cfg.images.bucket.is_empty() {
            return Err(anyhow::anyhow!("images.bucket must not be empty"));
        }

        Ok(cfg)
    }
}
