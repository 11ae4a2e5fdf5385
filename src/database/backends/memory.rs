use anyhow::{anyhow, Result};
use async_trait::async_trait;
use hashbrown::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::template::PatientStore;
use crate::models::PatientDocument;

#[derive(Default)]
pub struct MemoryDatabase {
    patients: RwLock<HashMap<Uuid, PatientDocument>>,
}

#[async_trait]
impl PatientStore for MemoryDatabase {
    async fn insert_one(&self, patient: &PatientDocument) -> Result<Uuid> {
        let mut patients = self.patients.write().await;
        if patients.contains_key(&patient.id) {
            return Err(anyhow!("duplicate patient id {}", patient.id));
        }

        patients.insert(patient.id, patient.clone());
        Ok(patient.id)
    }

    async fn find_one(&self, patient_id: Uuid) -> Result<Option<PatientDocument>> {
        Ok(self.patients.read().await.get(&patient_id).cloned())
    }

    async fn list(&self, limit: usize) -> Result<Vec<PatientDocument>> {
        let patients = self.patients.read().await;
        Ok(patients.values().take(limit).cloned().collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.patients.read().await.len())
    }
}
