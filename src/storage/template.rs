use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A single entry returned by a prefix listing.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One page of a prefix listing.
///
/// `next` is the continuation token for the following page, if any.
#[derive(Debug, Default)]
pub struct ListPage {
    pub objects: Vec<StoredObject>,
    pub next: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Sync + Send + 'static {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> anyhow::Result<()>;

    /// Lists keys starting with `prefix` in ascending key order.
    async fn list(
        &self,
        prefix: &str,
        continuation: Option<String>,
    ) -> anyhow::Result<ListPage>;

    /// Removes every object starting with `prefix`, returning how many were removed.
    async fn delete_prefixed(
        &self,
        prefix: &str,
    ) -> anyhow::Result<usize>;
}
