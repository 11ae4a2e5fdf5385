use std::str::FromStr;

use strum::EnumString;

/// The image encodings recognised from an upload's file extension.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ImageKind {
    Png,
    #[strum(serialize = "jpeg", serialize = "jpg")]
    Jpeg,
    Gif,
    Webp,
    #[strum(serialize = "tiff", serialize = "tif")]
    Tiff,
    Bmp,
    #[strum(serialize = "dcm", serialize = "dicom")]
    Dicom,
}

impl ImageKind {
    /// Looks up the kind for an extension with or without the leading `.`.
    pub fn from_extension(extension: &str) -> Option<Self> {
        Self::from_str(extension.trim_start_matches('.')).ok()
    }

    pub fn as_content_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Webp => "image/webp",
            Self::Tiff => "image/tiff",
            Self::Dicom => "application/dicom",
        }
    }
}

/// The content type stored alongside an object with the given extension.
pub fn content_type_for(extension: &str) -> &'static str {
    ImageKind::from_extension(extension)
        .map(|kind| kind.as_content_type())
        .unwrap_or("application/octet-stream")
}
