use std::sync::Arc;

use bytes::Bytes;
use uuid::Uuid;

use crate::database::PatientStore;
use crate::errors::PatientError;
use crate::images::ImageResolver;
use crate::models::{NewPatient, Patient, PatientDocument, PatientSummary};
use crate::utils::parse_iso8601;

/// The most patients returned by a single listing.
pub const LIST_LIMIT: usize = 1000;

/// Joins the demographic records in the database with the images in object storage.
pub struct PatientController {
    database: Arc<dyn PatientStore>,
    images: ImageResolver,
}

impl PatientController {
    pub fn new(database: Arc<dyn PatientStore>, images: ImageResolver) -> Self {
        Self { database, images }
    }

    #[inline]
    pub fn database(&self) -> &Arc<dyn PatientStore> {
        &self.database
    }

    #[inline]
    pub fn images(&self) -> &ImageResolver {
        &self.images
    }

    pub async fn create(&self, patient: NewPatient) -> Result<Patient, PatientError> {
        let document = PatientDocument::new(patient);
        let patient_id = self
            .database
            .insert_one(&document)
            .await
            .map_err(PatientError::Database)?;

        info!(patient_id = %patient_id, "created patient");
        Ok(document.with_images(vec![]))
    }

    async fn find(&self, patient_id: Uuid) -> Result<PatientDocument, PatientError> {
        self.database
            .find_one(patient_id)
            .await
            .map_err(PatientError::Database)?
            .ok_or(PatientError::NotFound(patient_id))
    }

    pub async fn fetch(&self, patient_id: Uuid) -> Result<Patient, PatientError> {
        let document = self.find(patient_id).await?;
        let images = self.images.list_images(&patient_id.to_string()).await?;
        Ok(document.with_images(images))
    }

    pub async fn list(&self) -> Result<Vec<PatientSummary>, PatientError> {
        let patients = self
            .database
            .list(LIST_LIMIT)
            .await
            .map_err(PatientError::Database)?;

        Ok(patients.into_iter().map(PatientDocument::summary).collect())
    }

    /// Stores a new image for an existing patient and returns the patient
    /// with their refreshed image collection.
    ///
    /// The timestamp and the patient are both checked before anything is uploaded.
    pub async fn attach_image(
        &self,
        patient_id: Uuid,
        content: Bytes,
        filename: &str,
        img_timestamp: Option<&str>,
    ) -> Result<Patient, PatientError> {
        let timestamp = img_timestamp.map(|ts| parse_iso8601(ts.trim())).transpose()?;
        let document = self.find(patient_id).await?;

        let patient_id = patient_id.to_string();
        self.images
            .associate_image(&patient_id, content, filename, timestamp)
            .await?;

        let images = self.images.list_images(&patient_id).await?;
        Ok(document.with_images(images))
    }
}
