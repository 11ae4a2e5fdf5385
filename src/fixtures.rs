use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::controller::PatientController;
use crate::images::codec::{file_extension, patient_prefix};
use crate::images::kind::content_type_for;
use crate::models::{NewPatient, PatientDocument};
use crate::utils::parse_iso8601;

pub struct FixtureImage {
    /// Relative to the dataset directory.
    pub path: &'static str,

    /// Naive, as recorded by the original dataset.
    pub timestamp: &'static str,
}

pub struct FixturePatient {
    pub first_name: &'static str,
    pub last_name: &'static str,
    pub date_of_birth: &'static str,
    pub images: &'static [FixtureImage],
}

pub const FIXTURE_DATA: &[FixturePatient] = &[
    FixturePatient {
        first_name: "Jim",
        last_name: "Jones",
        date_of_birth: "1960-10-01",
        images: &[
            FixtureImage {
                path: "1.jpg",
                timestamp: "2021-02-01T00:00:00",
            },
            FixtureImage {
                path: "4.jpg",
                timestamp: "2021-03-10T00:00:00",
            },
        ],
    },
    FixturePatient {
        first_name: "Winston",
        last_name: "Rogers",
        date_of_birth: "1970-04-04",
        images: &[FixtureImage {
            path: "2.jpg",
            timestamp: "2020-06-15T00:00:00",
        }],
    },
    FixturePatient {
        first_name: "Diane",
        last_name: "Simmons",
        date_of_birth: "1980-08-01",
        images: &[FixtureImage {
            path: "3.jpg",
            timestamp: "2020-03-14T00:00:00",
        }],
    },
];

fn parse_fixture_date(text: &str) -> Result<DateTime<Utc>> {
    parse_iso8601(text).with_context(|| format!("invalid fixture date {:?}", text))
}

/// Populates an empty database with the demo patients and their images.
///
/// The images are stored under the dot-extension key layout of the original
/// dataset rather than the current encoding. Does nothing if the database
/// already holds any patient.
#[instrument(skip(controller))]
pub async fn populate_fixtures(controller: &PatientController, dataset: &Path) -> Result<usize> {
    if controller.database().count().await? > 0 {
        debug!("database already populated, skipping fixtures");
        return Ok(0);
    }

    let storage = controller.images().storage();
    let mut inserted = 0;
    for fixture in FIXTURE_DATA {
        let document = PatientDocument::new(NewPatient {
            first_name: fixture.first_name.to_string(),
            last_name: fixture.last_name.to_string(),
            date_of_birth: parse_fixture_date(fixture.date_of_birth)?,
        });
        let patient_id = controller.database().insert_one(&document).await?;
        inserted += 1;

        for image in fixture.images {
            let path = dataset.join(image.path);
            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                Err(ref e) if e.kind() == ErrorKind::NotFound => {
                    warn!("fixture image {:?} does not exist, skipping", &path);
                    continue;
                },
                Err(other) => return Err(other.into()),
            };

            let extension = file_extension(image.path);
            let key = format!(
                "{}{}{}",
                patient_prefix(&patient_id.to_string()),
                image.timestamp,
                extension,
            );

            storage
                .put(&key, Bytes::from(data), content_type_for(extension))
                .await
                .with_context(|| format!("failed to upload fixture image {:?}", &path))?;
        }
    }

    info!("populated {} fixture patients", inserted);
    Ok(inserted)
}
