use chrono::{DateTime, Utc};
use poem_openapi::types::multipart::Upload;
use poem_openapi::{Multipart, Object};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A medical image stored for a patient.
#[derive(Object, Debug, Clone, PartialEq)]
pub struct PatientImage {
    /// The bucket qualified location of the image.
    pub uri: String,

    /// When the image was taken.
    pub timestamp: DateTime<Utc>,
}

/// The demographic fields supplied when creating a patient.
#[derive(Object, Debug, Clone)]
pub struct NewPatient {
    /// First name of the patient.
    pub first_name: String,

    /// Last name of the patient.
    pub last_name: String,

    /// ISO 8601 formatted timestamp of the patient's birth date.
    pub date_of_birth: DateTime<Utc>,
}

/// A patient and every medical image stored for them, most recent first.
#[derive(Object, Debug, Clone)]
pub struct Patient {
    /// Patient ID which is generated by the system.
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: DateTime<Utc>,
    pub images: Vec<PatientImage>,
}

/// The abridged listing form of a patient.
#[derive(Object, Debug, Clone)]
pub struct PatientSummary {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
}

/// Wraps the patient listing in an object rather than a bare array.
#[derive(Object, Debug)]
pub struct PatientCollection {
    pub patients: Vec<PatientSummary>,
}

#[derive(Object, Debug)]
pub struct Detail {
    /// Additional information regarding the response.
    pub detail: String,
}

impl Detail {
    pub fn new(detail: impl Into<String>) -> Self {
        Self { detail: detail.into() }
    }
}

#[derive(Multipart, Debug)]
pub struct ImageUploadPayload {
    /// Patient medical image.
    pub uploaded_img_file: Upload,

    /// When the image was taken in ISO 8601 format, defaults to the current UTC time.
    pub img_timestamp: Option<String>,
}

/// The record persisted in the patient database.
///
/// Images are never stored here, they are resolved from object storage on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientDocument {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: DateTime<Utc>,
}

impl PatientDocument {
    pub fn new(patient: NewPatient) -> Self {
        Self {
            id: Uuid::new_v4(),
            first_name: patient.first_name,
            last_name: patient.last_name,
            date_of_birth: patient.date_of_birth,
        }
    }

    pub fn with_images(self, images: Vec<PatientImage>) -> Patient {
        Patient {
            id: self.id,
            first_name: self.first_name,
            last_name: self.last_name,
            date_of_birth: self.date_of_birth,
            images,
        }
    }

    pub fn summary(self) -> PatientSummary {
        PatientSummary {
            id: self.id,
            first_name: self.first_name,
            last_name: self.last_name,
        }
    }
}
