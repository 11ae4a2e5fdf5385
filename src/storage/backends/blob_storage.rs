use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rusoto_core::credential::{ChainProvider, StaticProvider};
use rusoto_core::{HttpClient, Region};
use rusoto_s3::{
    DeleteObjectRequest,
    ListObjectsV2Request,
    PutObjectRequest,
    S3Client,
    S3,
};

use crate::storage::template::{ListPage, ObjectStore, StoredObject};

pub struct BlobStorageBackend {
    bucket: String,
    client: S3Client,
    request_timeout: Option<Duration>,
}

impl BlobStorageBackend {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bucket: String,
        region: String,
        endpoint: String,
        access_key: Option<String>,
        secret_key: Option<String>,
        session_token: Option<String>,
        request_timeout: Option<Duration>,
    ) -> Result<Self> {
        if access_key.is_some() != secret_key.is_some() {
            return Err(anyhow!("access_key and secret_key must be given together"));
        }

        let region = Region::Custom {
            name: region,
            endpoint,
        };
        let dispatcher = HttpClient::new().context("failed to build the S3 http client")?;

        let client = match access_key.zip(secret_key) {
            Some((key, secret)) => {
                let creds = StaticProvider::new(key, secret, session_token, None);
                S3Client::new_with(dispatcher, creds, region)
            },
            None => S3Client::new_with(dispatcher, ChainProvider::new(), region),
        };

        Ok(Self {
            bucket,
            client,
            request_timeout,
        })
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| anyhow!("request timed out after {:?}", limit))?,
            None => fut.await,
        }
    }
}

fn parse_last_modified(raw: Option<String>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    DateTime::parse_from_rfc3339(&raw)
        .or_else(|_| DateTime::parse_from_rfc2822(&raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[async_trait]
impl ObjectStore for BlobStorageBackend {
    #[instrument(name = "s3-put", skip(self, data), fields(bucket = %self.bucket, size = data.len()))]
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        let request = PutObjectRequest {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            content_length: Some(data.len() as i64),
            content_type: Some(content_type.to_string()),
            body: Some(data.to_vec().into()),
            ..Default::default()
        };

        debug!("storing object in bucket @ {}", key);
        self.with_timeout(async {
            self.client
                .put_object(request)
                .await
                .map_err(|e| anyhow!("remote storage bucket rejected the upload: {}", e))
        })
        .await?;

        Ok(())
    }

    #[instrument(name = "s3-list", skip(self), fields(bucket = %self.bucket))]
    async fn list(&self, prefix: &str, continuation: Option<String>) -> Result<ListPage> {
        let request = ListObjectsV2Request {
            bucket: self.bucket.clone(),
            prefix: Some(prefix.to_string()),
            continuation_token: continuation,
            ..Default::default()
        };

        let output = self
            .with_timeout(async {
                self.client
                    .list_objects_v2(request)
                    .await
                    .map_err(|e| anyhow!("remote storage bucket rejected the listing: {}", e))
            })
            .await?;

        let objects = output
            .contents
            .unwrap_or_default()
            .into_iter()
            .filter_map(|obj| {
                let last_modified = parse_last_modified(obj.last_modified);
                obj.key.map(|key| StoredObject { key, last_modified })
            })
            .collect();

        let next = if output.is_truncated.unwrap_or(false) {
            output.next_continuation_token
        } else {
            None
        };

        Ok(ListPage { objects, next })
    }

    async fn delete_prefixed(&self, prefix: &str) -> Result<usize> {
        let mut removed = 0;
        let mut continuation = None;

        loop {
            let page = self.list(prefix, continuation).await?;
            for obj in page.objects {
                debug!("purging object in bucket @ {}", &obj.key);
                let request = DeleteObjectRequest {
                    bucket: self.bucket.clone(),
                    key: obj.key,
                    ..Default::default()
                };

                self.with_timeout(async {
                    self.client
                        .delete_object(request)
                        .await
                        .map_err(|e| anyhow!("remote storage bucket rejected the delete: {}", e))
                })
                .await?;

                removed += 1;
            }

            match page.next {
                None => break,
                next => continuation = next,
            }
        }

        Ok(removed)
    }
}
