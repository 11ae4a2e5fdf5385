use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, SubsecRound, Utc};

use crate::config::MalformedKeyPolicy;
use crate::errors::ImageError;
use crate::images::codec;
use crate::images::kind::content_type_for;
use crate::models::PatientImage;
use crate::storage::ObjectStore;

/// Maps a patient's prefix in the bucket onto an ordered image collection.
///
/// Nothing is cached, every listing is recomputed from the store.
pub struct ImageResolver {
    bucket: String,
    on_malformed_key: MalformedKeyPolicy,
    storage: Arc<dyn ObjectStore>,
}

impl ImageResolver {
    pub fn new(
        bucket: String,
        on_malformed_key: MalformedKeyPolicy,
        storage: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            bucket,
            on_malformed_key,
            storage,
        }
    }

    #[inline]
    pub fn storage(&self) -> &Arc<dyn ObjectStore> {
        &self.storage
    }

    #[inline]
    fn uri_for(&self, key: &str) -> String {
        format!("{}/{}", self.bucket, key)
    }

    /// Every image stored for the patient, most recent first.
    #[instrument(skip(self))]
    pub async fn list_images(&self, patient_id: &str) -> Result<Vec<PatientImage>, ImageError> {
        let prefix = codec::patient_prefix(patient_id);

        let mut objects = vec![];
        let mut continuation = None;
        loop {
            let page = self
                .storage
                .list(&prefix, continuation)
                .await
                .map_err(|e| ImageError::storage("list", &prefix, e))?;

            objects.extend(page.objects);
            match page.next {
                None => break,
                next => continuation = next,
            }
        }

        let mut images = Vec::with_capacity(objects.len());
        for obj in objects {
            let timestamp = match codec::decode_key(&obj.key) {
                Ok((timestamp, _)) => timestamp,
                Err(e) if self.on_malformed_key == MalformedKeyPolicy::Skip => {
                    warn!("skipping image which cannot be decoded: {}", e);
                    continue;
                },
                Err(e) => {
                    error!("aborting image listing: {}", e);
                    return Err(e.into());
                },
            };

            trace!(key = %obj.key, last_modified = ?obj.last_modified, "resolved image");
            images.push(PatientImage {
                uri: self.uri_for(&obj.key),
                timestamp,
            });
        }

        // Stable, equal timestamps keep the order of the listing.
        images.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        debug!("resolved {} images", images.len());
        Ok(images)
    }

    /// Stores a new image for the patient, defaulting the capture time to now.
    #[instrument(skip(self, content), fields(size = content.len()))]
    pub async fn associate_image(
        &self,
        patient_id: &str,
        content: Bytes,
        filename: &str,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<PatientImage, ImageError> {
        // Keys only hold microseconds.
        let timestamp = timestamp.unwrap_or_else(Utc::now).trunc_subsecs(6);
        let key = codec::encode_key(patient_id, timestamp, filename);
        let content_type = content_type_for(codec::file_extension(filename));

        self.storage
            .put(&key, content, content_type)
            .await
            .map_err(|e| ImageError::storage("put", &key, e))?;

        info!("stored image @ {}", &key);
        Ok(PatientImage {
            uri: self.uri_for(&key),
            timestamp,
        })
    }
}
