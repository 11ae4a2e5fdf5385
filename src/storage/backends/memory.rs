use std::collections::BTreeMap;
use std::ops::Bound;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::storage::template::{ListPage, ObjectStore, StoredObject};

#[cfg_attr(not(test), allow(dead_code))]
struct Entry {
    data: Bytes,
    content_type: String,
    last_modified: DateTime<Utc>,
}

/// A process local object store.
///
/// Listings come back in ascending key order and are split into pages of
/// `page_size`, the same way a remote bucket paginates.
pub struct MemoryBackend {
    page_size: usize,
    objects: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryBackend {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    #[cfg(test)]
    pub async fn get(&self, key: &str) -> Option<(Bytes, String)> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|entry| (entry.data.clone(), entry.content_type.clone()))
    }
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        debug!("storing object in memory @ {}", key);
        let entry = Entry {
            data,
            content_type: content_type.to_string(),
            last_modified: Utc::now(),
        };

        self.objects.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn list(&self, prefix: &str, continuation: Option<String>) -> Result<ListPage> {
        let objects = self.objects.read().await;

        let start = match continuation {
            Some(after) => Bound::Excluded(after),
            None => Bound::Included(prefix.to_string()),
        };

        let mut page: Vec<StoredObject> = objects
            .range((start, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(self.page_size + 1)
            .map(|(key, entry)| StoredObject {
                key: key.clone(),
                last_modified: Some(entry.last_modified),
            })
            .collect();

        let next = if page.len() > self.page_size {
            page.truncate(self.page_size);
            page.last().map(|obj| obj.key.clone())
        } else {
            None
        };

        Ok(ListPage { objects: page, next })
    }

    async fn delete_prefixed(&self, prefix: &str) -> Result<usize> {
        let mut objects = self.objects.write().await;
        let before = objects.len();
        objects.retain(|key, _| !key.starts_with(prefix));
        Ok(before - objects.len())
    }
}
