use async_trait::async_trait;
use uuid::Uuid;

use crate::models::PatientDocument;

#[async_trait]
pub trait PatientStore: Sync + Send + 'static {
    async fn insert_one(&self, patient: &PatientDocument) -> anyhow::Result<Uuid>;

    async fn find_one(&self, patient_id: Uuid) -> anyhow::Result<Option<PatientDocument>>;

    /// Fetches up to `limit` patients in no particular order.
    async fn list(&self, limit: usize) -> anyhow::Result<Vec<PatientDocument>>;

    async fn count(&self) -> anyhow::Result<usize>;
}
