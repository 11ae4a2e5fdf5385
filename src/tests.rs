use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use poem::endpoint::BoxEndpoint;
use poem::http::StatusCode;
use poem::middleware::{NormalizePath, TrailingSlash};
use poem::test::{TestClient, TestResponse};
use poem::{EndpointExt, Route};
use poem_openapi::OpenApiService;
use uuid::Uuid;

use crate::config::{MalformedKeyPolicy, RuntimeConfig};
use crate::controller::PatientController;
use crate::database::backends::MemoryDatabase;
use crate::errors::PatientError;
use crate::images::ImageResolver;
use crate::models::NewPatient;
use crate::routes::PatientApi;
use crate::storage::backends::MemoryBackend;
use crate::storage::{ListPage, ObjectStore};
use crate::utils::utc;
use crate::{build_controller, fixtures};

const MEMORY_CONFIG: &str = include_str!("../tests/configs/memory.yaml");
const LENIENT_CONFIG: &str = include_str!("../tests/configs/memory-lenient.yaml");
const TEST_IMAGE: &[u8] = b"\x89PNG\r\n\x1a\nnot really a png";
const BOUNDARY: &str = "records-upload-boundary";

struct TestApp {
    client: TestClient<BoxEndpoint<'static>>,
    controller: Arc<PatientController>,
}

async fn setup_environment(cfg: &str) -> anyhow::Result<TestApp> {
    let cfg = RuntimeConfig::from_yaml(cfg)?;
    let controller = Arc::new(build_controller(&cfg).await?);

    let app = OpenApiService::new(
        PatientApi::new(controller.clone()),
        "Patient Records API",
        env!("CARGO_PKG_VERSION"),
    );

    let app = Route::new()
        .nest("/v1", app)
        .with(NormalizePath::new(TrailingSlash::Trim))
        .map_to_response()
        .boxed();
    Ok(TestApp {
        client: TestClient::new(app),
        controller,
    })
}

async fn create_patient(app: &TestApp, first_name: &str) -> String {
    let res = app
        .client
        .post("/v1/patients/")
        .body_json(&serde_json::json!({
            "first_name": first_name,
            "last_name": "Ravichandran",
            "date_of_birth": "1986-09-18T11:55:00-07:00",
        }))
        .send()
        .await;

    res.assert_status(StatusCode::CREATED);
    let info = res.json().await;
    info.value().object().get("id").string().to_string()
}

fn upload_body(filename: &str, img_timestamp: Option<&str>) -> Vec<u8> {
    let mut body = vec![];
    if let Some(ts) = img_timestamp {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"img_timestamp\"\r\n\r\n{}\r\n",
                BOUNDARY, ts,
            )
            .as_bytes(),
        );
    }

    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"uploaded_img_file\"; filename=\"{}\"\r\n\
            Content-Type: image/png\r\n\r\n",
            BOUNDARY, filename,
        )
        .as_bytes(),
    );
    body.extend_from_slice(TEST_IMAGE);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn upload_image(app: &TestApp, patient_id: &str, img_timestamp: Option<&str>) -> TestResponse {
    app.client
        .put(format!("/v1/patients/{}", patient_id))
        .content_type(format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(upload_body("chest.png", img_timestamp))
        .send()
        .await
}

/// Counts uploads while delegating to an in memory store.
struct CountingStore {
    inner: MemoryBackend,
    puts: AtomicUsize,
}

#[async_trait]
impl ObjectStore for CountingStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, data, content_type).await
    }

    async fn list(&self, prefix: &str, continuation: Option<String>) -> anyhow::Result<ListPage> {
        self.inner.list(prefix, continuation).await
    }

    async fn delete_prefixed(&self, prefix: &str) -> anyhow::Result<usize> {
        self.inner.delete_prefixed(prefix).await
    }
}

fn counting_controller() -> (PatientController, Arc<CountingStore>) {
    let store = Arc::new(CountingStore {
        inner: MemoryBackend::new(100),
        puts: AtomicUsize::new(0),
    });
    let images = ImageResolver::new(
        "patient-images".to_string(),
        MalformedKeyPolicy::Abort,
        store.clone(),
    );
    let controller = PatientController::new(Arc::new(MemoryDatabase::default()), images);
    (controller, store)
}

fn new_patient() -> NewPatient {
    NewPatient {
        first_name: "Diane".to_string(),
        last_name: "Simmons".to_string(),
        date_of_birth: utc(1980, 8, 1, 0, 0, 0, 0),
    }
}

#[tokio::test]
async fn test_create_then_fetch_patient() -> anyhow::Result<()> {
    let app = setup_environment(MEMORY_CONFIG).await?;
    let patient_id = create_patient(&app, "Suraj").await;

    let res = app.client.get(format!("/v1/patients/{}", patient_id)).send().await;
    res.assert_status(StatusCode::OK);

    let info = res.json().await;
    let patient = info.value().object();
    assert_eq!(patient.get("id").string(), patient_id);
    assert_eq!(patient.get("first_name").string(), "Suraj");
    assert_eq!(patient.get("last_name").string(), "Ravichandran");
    assert_eq!(patient.get("images").array().len(), 0);

    Ok(())
}

#[tokio::test]
async fn test_fetch_unknown_patient() -> anyhow::Result<()> {
    let app = setup_environment(MEMORY_CONFIG).await?;

    let res = app.client.get(format!("/v1/patients/{}", Uuid::new_v4())).send().await;
    res.assert_status(StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_fetch_rejects_non_v4_ids() -> anyhow::Result<()> {
    let app = setup_environment(MEMORY_CONFIG).await?;

    let res = app.client.get(format!("/v1/patients/{}", Uuid::nil())).send().await;
    res.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    Ok(())
}

#[tokio::test]
async fn test_rejects_ids_which_are_not_uuids() -> anyhow::Result<()> {
    let app = setup_environment(MEMORY_CONFIG).await?;

    let res = app.client.get("/v1/patients/not-a-uuid").send().await;
    res.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let res = upload_image(&app, "not-a-uuid", None).await;
    res.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    Ok(())
}

#[tokio::test]
async fn test_upload_image() -> anyhow::Result<()> {
    let app = setup_environment(MEMORY_CONFIG).await?;
    let patient_id = create_patient(&app, "Suraj").await;

    let res = upload_image(&app, &patient_id, Some("2024-01-22T08:02:48.263247Z")).await;
    res.assert_status(StatusCode::OK);

    let info = res.json().await;
    let images = info.value().object().get("images").array();
    assert_eq!(images.len(), 1);
    assert_eq!(
        images.get(0).object().get("uri").string(),
        format!("test-patient-images/{}/2024-01-22T08:02:48.263247Z.png", patient_id),
    );

    // No timestamp means now, which sorts ahead of the first upload.
    let res = upload_image(&app, &patient_id, None).await;
    res.assert_status(StatusCode::OK);

    let info = res.json().await;
    let images = info.value().object().get("images").array();
    assert_eq!(images.len(), 2);
    assert_eq!(
        images.get(1).object().get("uri").string(),
        format!("test-patient-images/{}/2024-01-22T08:02:48.263247Z.png", patient_id),
    );

    Ok(())
}

#[tokio::test]
async fn test_upload_rejects_bad_timestamp() -> anyhow::Result<()> {
    let app = setup_environment(MEMORY_CONFIG).await?;
    let patient_id = create_patient(&app, "Suraj").await;

    let res = upload_image(&app, &patient_id, Some("last tuesday")).await;
    res.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let res = app.client.get(format!("/v1/patients/{}", patient_id)).send().await;
    res.assert_status(StatusCode::OK);
    let info = res.json().await;
    assert_eq!(info.value().object().get("images").array().len(), 0);

    Ok(())
}

#[tokio::test]
async fn test_upload_for_unknown_patient() -> anyhow::Result<()> {
    let app = setup_environment(MEMORY_CONFIG).await?;

    let res = upload_image(&app, &Uuid::new_v4().to_string(), None).await;
    res.assert_status(StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_list_patients_is_abridged() -> anyhow::Result<()> {
    let app = setup_environment(MEMORY_CONFIG).await?;
    let mut expected = vec![];
    for name in ["Jim", "Winston", "Diane"] {
        expected.push((create_patient(&app, name).await, name.to_string()));
    }
    expected.sort();

    let res = app.client.get("/v1/patients/").send().await;
    res.assert_status(StatusCode::OK);

    let info = res.json().await;
    let patients = info.value().object().get("patients").array();
    assert_eq!(patients.len(), 3);

    let mut received: Vec<(String, String)> = (0..patients.len())
        .map(|idx| {
            let patient = patients.get(idx).object();
            (
                patient.get("id").string().to_string(),
                patient.get("first_name").string().to_string(),
            )
        })
        .collect();
    received.sort();
    assert_eq!(received, expected);

    let res = app.client.get("/v1/patients").send().await;
    res.assert_status(StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_fetch_includes_images_most_recent_first() -> anyhow::Result<()> {
    let app = setup_environment(MEMORY_CONFIG).await?;
    let patient_id = create_patient(&app, "Jim").await;

    let images = app.controller.images();
    for ts in [
        utc(2021, 2, 1, 0, 0, 0, 0),
        utc(2021, 3, 10, 0, 0, 0, 0),
        utc(2020, 6, 15, 0, 0, 0, 0),
    ] {
        images
            .associate_image(&patient_id, Bytes::from_static(TEST_IMAGE), "scan.png", Some(ts))
            .await?;
    }

    let res = app.client.get(format!("/v1/patients/{}", patient_id)).send().await;
    res.assert_status(StatusCode::OK);

    let info = res.json().await;
    let listed = info.value().object().get("images").array();
    assert_eq!(listed.len(), 3);

    let first = listed.get(0).object();
    assert_eq!(
        first.get("uri").string(),
        format!("test-patient-images/{}/2021-03-10T00:00:00.000000Z.png", patient_id),
    );
    assert_eq!(
        listed.get(2).object().get("uri").string(),
        format!("test-patient-images/{}/2020-06-15T00:00:00.000000Z.png", patient_id),
    );

    Ok(())
}

#[tokio::test]
async fn test_malformed_key_fails_fetch_by_default() -> anyhow::Result<()> {
    let app = setup_environment(MEMORY_CONFIG).await?;
    let patient_id = create_patient(&app, "Jim").await;

    app.controller
        .images()
        .storage()
        .put(&format!("{}/20210201T000000", patient_id), Bytes::from_static(TEST_IMAGE), "image/png")
        .await?;

    let res = app.client.get(format!("/v1/patients/{}", patient_id)).send().await;
    res.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

    Ok(())
}

#[tokio::test]
async fn test_malformed_key_skipped_when_lenient() -> anyhow::Result<()> {
    let app = setup_environment(LENIENT_CONFIG).await?;
    let patient_id = create_patient(&app, "Jim").await;

    let storage = app.controller.images().storage();
    storage
        .put(&format!("{}/20210201T000000", patient_id), Bytes::from_static(TEST_IMAGE), "image/png")
        .await?;
    storage
        .put(&format!("{}/2021-02-01T00:00:00.jpg", patient_id), Bytes::from_static(TEST_IMAGE), "image/jpeg")
        .await?;

    let res = app.client.get(format!("/v1/patients/{}", patient_id)).send().await;
    res.assert_status(StatusCode::OK);

    let info = res.json().await;
    assert_eq!(info.value().object().get("images").array().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_attach_image_returns_refreshed_patient() -> anyhow::Result<()> {
    let (controller, store) = counting_controller();
    let patient = controller.create(new_patient()).await?;

    let updated = controller
        .attach_image(patient.id, Bytes::from_static(TEST_IMAGE), "x.png", Some(" 2024-01-22T08:02:48.263247Z\n"))
        .await?;

    assert_eq!(store.puts.load(Ordering::SeqCst), 1);
    assert_eq!(updated.images.len(), 1);
    assert_eq!(
        updated.images[0].uri,
        format!("patient-images/{}/2024-01-22T08:02:48.263247Z.png", patient.id),
    );
    assert_eq!(updated.images[0].timestamp, utc(2024, 1, 22, 8, 2, 48, 263247));

    Ok(())
}

#[tokio::test]
async fn test_attach_image_validates_before_upload() -> anyhow::Result<()> {
    let (controller, store) = counting_controller();
    let patient = controller.create(new_patient()).await?;

    let res = controller
        .attach_image(patient.id, Bytes::from_static(TEST_IMAGE), "x.png", Some("last tuesday"))
        .await;
    assert!(matches!(res, Err(PatientError::Validation(_))));

    let res = controller
        .attach_image(Uuid::new_v4(), Bytes::from_static(TEST_IMAGE), "x.png", None)
        .await;
    assert!(matches!(res, Err(PatientError::NotFound(_))));

    assert_eq!(store.puts.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_populate_fixtures() -> anyhow::Result<()> {
    let dataset = std::env::temp_dir().join(format!("records-fixtures-{}", Uuid::new_v4()));
    tokio::fs::create_dir_all(&dataset).await?;
    // 4.jpg is left out on purpose.
    for name in ["1.jpg", "2.jpg", "3.jpg"] {
        tokio::fs::write(dataset.join(name), TEST_IMAGE).await?;
    }

    let app = setup_environment(MEMORY_CONFIG).await?;
    assert_eq!(fixtures::populate_fixtures(&app.controller, &dataset).await?, 3);
    assert_eq!(fixtures::populate_fixtures(&app.controller, &dataset).await?, 0);

    let patients = app.controller.list().await?;
    assert_eq!(patients.len(), 3);

    let jim = patients
        .iter()
        .find(|p| p.first_name == "Jim")
        .expect("Jim Jones is a fixture");
    let jim = app.controller.fetch(jim.id).await?;
    assert_eq!(jim.images.len(), 1);
    assert_eq!(jim.images[0].uri, format!("test-patient-images/{}/2021-02-01T00:00:00.jpg", jim.id));
    assert_eq!(jim.images[0].timestamp, utc(2021, 2, 1, 0, 0, 0, 0));

    tokio::fs::remove_dir_all(&dataset).await?;
    Ok(())
}

#[tokio::test]
async fn test_fixtures_sort_with_current_keys() -> anyhow::Result<()> {
    let dataset: PathBuf = std::env::temp_dir().join(format!("records-fixtures-{}", Uuid::new_v4()));
    tokio::fs::create_dir_all(&dataset).await?;
    for name in ["1.jpg", "2.jpg", "3.jpg", "4.jpg"] {
        tokio::fs::write(dataset.join(name), TEST_IMAGE).await?;
    }

    let app = setup_environment(MEMORY_CONFIG).await?;
    fixtures::populate_fixtures(&app.controller, &dataset).await?;

    let jim = app
        .controller
        .list()
        .await?
        .into_iter()
        .find(|p| p.first_name == "Jim")
        .expect("Jim Jones is a fixture");

    // Falls between the two legacy fixture images.
    app.controller
        .attach_image(jim.id, Bytes::from_static(TEST_IMAGE), "followup.png", Some("2021-02-20T00:00:00Z"))
        .await?;

    let stamps: Vec<_> = app
        .controller
        .fetch(jim.id)
        .await?
        .images
        .into_iter()
        .map(|img| img.timestamp)
        .collect();
    assert_eq!(
        stamps,
        [
            utc(2021, 3, 10, 0, 0, 0, 0),
            utc(2021, 2, 20, 0, 0, 0, 0),
            utc(2021, 2, 1, 0, 0, 0, 0),
        ],
    );

    tokio::fs::remove_dir_all(&dataset).await?;
    Ok(())
}
