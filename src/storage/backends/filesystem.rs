use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::images::codec::KEY_SEPARATOR;
use crate::storage::template::{ListPage, ObjectStore, StoredObject};

/// Stores objects as files, each key segment becoming a directory.
pub struct FileSystemBackend {
    directory: PathBuf,
}

impl FileSystemBackend {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            directory: dir,
        }
    }

    fn format_path(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.directory.clone();
        for segment in key.split(KEY_SEPARATOR) {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(anyhow!("key {:?} cannot be mapped onto the filesystem", key));
            }
            path.push(segment);
        }
        Ok(path)
    }

    /// The directory to scan and the file name prefix to match for a listing prefix.
    fn split_prefix<'a>(&self, prefix: &'a str) -> (PathBuf, &'a str, &'a str) {
        match prefix.rfind(KEY_SEPARATOR) {
            Some(idx) => {
                let (dir, name) = prefix.split_at(idx + 1);
                let path = dir
                    .split(KEY_SEPARATOR)
                    .filter(|s| !s.is_empty())
                    .fold(self.directory.clone(), |acc, s| acc.join(s));
                (path, dir, name)
            },
            None => (self.directory.clone(), "", prefix),
        }
    }
}

async fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    meta.modified().ok().map(DateTime::<Utc>::from)
}

#[async_trait]
impl ObjectStore for FileSystemBackend {
    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> Result<()> {
        let path = self.format_path(key)?;

        debug!("storing object @ {:?}", &path);
        match tokio::fs::write(&path, &data).await {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == ErrorKind::NotFound => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&path, data).await?;
                Ok(())
            },
            Err(other) => Err(other.into()),
        }
    }

    async fn list(&self, prefix: &str, _continuation: Option<String>) -> Result<ListPage> {
        let (directory, key_prefix, name_prefix) = self.split_prefix(prefix);

        let mut entries = match tokio::fs::read_dir(&directory).await {
            Ok(entries) => entries,
            Err(ref e) if e.kind() == ErrorKind::NotFound => return Ok(ListPage::default()),
            Err(other) => return Err(other.into()),
        };

        let mut objects = vec![];
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }

            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!("skipping non utf-8 file name {:?} in {:?}", raw, &directory);
                    continue;
                },
            };

            if !name.starts_with(name_prefix) {
                continue;
            }

            objects.push(StoredObject {
                key: format!("{}{}", key_prefix, name),
                last_modified: modified_at(&entry.path()).await,
            });
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(ListPage { objects, next: None })
    }

    async fn delete_prefixed(&self, prefix: &str) -> Result<usize> {
        let page = self.list(prefix, None).await?;

        let mut removed = 0;
        for obj in page.objects {
            let path = self.format_path(&obj.key)?;
            debug!("purging object @ {:?}", &path);

            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(ref e) if e.kind() == ErrorKind::NotFound => continue,
                Err(other) => return Err(other.into()),
            }
        }

        Ok(removed)
    }
}
