use std::sync::Arc;

use bytes::Bytes;
use poem::Result;
use poem_openapi::param::Path;
use poem_openapi::payload::Json;
use poem_openapi::{ApiResponse, OpenApi};
use uuid::Uuid;

use crate::controller::PatientController;
use crate::errors::{ImageError, PatientError};
use crate::models::{
    Detail,
    ImageUploadPayload,
    NewPatient,
    Patient,
    PatientCollection,
};
use crate::utils::is_uuid_v4;

#[derive(ApiResponse)]
pub enum CreateResponse {
    /// The patient record was created.
    #[oai(status = 201)]
    Created(Json<Patient>),

    /// The patient could not be stored.
    #[oai(status = 500)]
    ServerError(Json<Detail>),
}

#[derive(ApiResponse)]
pub enum FetchResponse {
    #[oai(status = 200)]
    Ok(Json<Patient>),

    /// No patient exists with the given id.
    #[oai(status = 404)]
    NotFound(Json<Detail>),

    /// The id or the supplied timestamp is invalid.
    #[oai(status = 422)]
    Unprocessable(Json<Detail>),

    /// The database or object storage failed the request.
    #[oai(status = 500)]
    ServerError(Json<Detail>),
}

#[derive(ApiResponse)]
pub enum ListResponse {
    #[oai(status = 200)]
    Ok(Json<PatientCollection>),

    #[oai(status = 500)]
    ServerError(Json<Detail>),
}

impl From<PatientError> for FetchResponse {
    fn from(e: PatientError) -> Self {
        match e {
            PatientError::NotFound(_) => Self::NotFound(Json(Detail::new(e.to_string()))),
            PatientError::Validation(_) => Self::Unprocessable(Json(Detail::new(e.to_string()))),
            PatientError::Image(ImageError::Storage { .. }) => {
                error!("{}", e);
                Self::ServerError(Json(Detail::new(format!("Object storage error: {}", e))))
            },
            other => {
                error!("{}", other);
                Self::ServerError(Json(Detail::new(other.to_string())))
            },
        }
    }
}

/// Patient ids are generated as v4 uuids, anything else can never match.
fn parse_patient_id(raw: &str) -> Result<Uuid, FetchResponse> {
    match Uuid::parse_str(raw) {
        Ok(id) if is_uuid_v4(&id) => Ok(id),
        _ => Err(FetchResponse::Unprocessable(Json(Detail::new(format!(
            "{:?} is not a version 4 uuid",
            raw
        ))))),
    }
}

pub struct PatientApi {
    controller: Arc<PatientController>,
}

impl PatientApi {
    pub fn new(controller: Arc<PatientController>) -> Self {
        Self { controller }
    }
}

#[OpenApi(prefix_path = "/patients")]
impl PatientApi {
    /// Create Patient
    ///
    /// Insert a new patient record, the generated `id` is returned in the response.
    ///
    /// Medical images are uploaded afterwards using this `id` with the update endpoint.
    #[oai(path = "/", method = "post")]
    pub async fn create_patient(&self, payload: Json<NewPatient>) -> Result<CreateResponse> {
        match self.controller.create(payload.0).await {
            Ok(patient) => Ok(CreateResponse::Created(Json(patient))),
            Err(e) => {
                error!("failed to create patient: {}", e);
                Ok(CreateResponse::ServerError(Json(Detail::new(e.to_string()))))
            },
        }
    }

    /// List Patients
    ///
    /// Lists the first 1000 patients without their images.
    #[oai(path = "/", method = "get")]
    pub async fn list_patients(&self) -> Result<ListResponse> {
        match self.controller.list().await {
            Ok(patients) => Ok(ListResponse::Ok(Json(PatientCollection { patients }))),
            Err(e) => {
                error!("failed to list patients: {}", e);
                Ok(ListResponse::ServerError(Json(Detail::new(e.to_string()))))
            },
        }
    }

    /// Get Patient
    ///
    /// Fetches a patient along with every stored medical image, most recent first.
    #[oai(path = "/:patient_id", method = "get")]
    pub async fn get_patient(
        &self,
        patient_id: Path<String>,
    ) -> Result<FetchResponse> {
        let patient_id = match parse_patient_id(&patient_id.0) {
            Ok(id) => id,
            Err(resp) => return Ok(resp),
        };

        let resp = match self.controller.fetch(patient_id).await {
            Ok(patient) => FetchResponse::Ok(Json(patient)),
            Err(e) => FetchResponse::from(e),
        };

        Ok(resp)
    }

    /// Upload Patient Image
    ///
    /// Adds a medical image for the patient. Uploading again with the same timestamp and
    /// extension replaces the existing image.
    ///
    /// If `img_timestamp` is not given in ISO 8601 format the current UTC time is stored.
    #[oai(path = "/:patient_id", method = "put")]
    pub async fn update_patient(
        &self,
        patient_id: Path<String>,
        payload: ImageUploadPayload,
    ) -> Result<FetchResponse> {
        let patient_id = match parse_patient_id(&patient_id.0) {
            Ok(id) => id,
            Err(resp) => return Ok(resp),
        };

        let ImageUploadPayload { uploaded_img_file, img_timestamp } = payload;
        let filename = uploaded_img_file.file_name().unwrap_or_default().to_string();
        let content = match uploaded_img_file.into_vec().await {
            Ok(data) => Bytes::from(data),
            Err(e) => {
                let detail = Detail::new(format!("failed to read uploaded_img_file: {}", e));
                return Ok(FetchResponse::Unprocessable(Json(detail)));
            },
        };

        let resp = match self
            .controller
            .attach_image(patient_id, content, &filename, img_timestamp.as_deref())
            .await
        {
            Ok(patient) => FetchResponse::Ok(Json(patient)),
            Err(e) => FetchResponse::from(e),
        };

        Ok(resp)
    }
}
