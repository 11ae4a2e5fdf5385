use thiserror::Error;
use uuid::Uuid;

/// Why a stored key could not be turned back into an image record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeFailure {
    /// The key has no `/` separating the patient id from the image name.
    MissingPatientPrefix,

    /// The image name contains neither a `Z` marker nor a `.`.
    AmbiguousTimestamp,

    /// The timestamp segment was found but is not an ISO-8601 instant.
    InvalidTimestamp(String),
}

impl std::fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingPatientPrefix => write!(f, "key has no patient prefix"),
            Self::AmbiguousTimestamp => {
                write!(f, "key has neither a 'Z' marker nor an extension separator")
            },
            Self::InvalidTimestamp(text) => {
                write!(f, "{:?} is not an ISO-8601 timestamp", text)
            },
        }
    }
}

#[derive(Debug, Error)]
#[error("cannot decode image key {key:?}: {reason}")]
pub struct DecodeError {
    pub key: String,
    pub reason: DecodeFailure,
}

impl DecodeError {
    pub fn new(key: &str, reason: DecodeFailure) -> Self {
        Self {
            key: key.to_string(),
            reason,
        }
    }
}

/// A caller supplied timestamp which is not ISO-8601.
#[derive(Debug, Error)]
#[error("img_timestamp {0:?} is not a valid ISO 8601 datetime")]
pub struct ValidationError(pub String);

#[derive(Debug, Error)]
pub enum ImageError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("object storage {operation} failed for {target:?}: {source:#}")]
    Storage {
        operation: &'static str,
        target: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ImageError {
    pub fn storage(operation: &'static str, target: &str, source: anyhow::Error) -> Self {
        Self::Storage {
            operation,
            target: target.to_string(),
            source,
        }
    }
}

/// Everything that can go wrong serving a patient request.
#[derive(Debug, Error)]
pub enum PatientError {
    #[error("patient {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("patient database error: {0:#}")]
    Database(#[source] anyhow::Error),
}
