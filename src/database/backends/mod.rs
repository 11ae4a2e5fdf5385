use std::sync::Arc;

use serde::Deserialize;

use crate::database::template::PatientStore;

mod memory;
mod scylladb;

pub use memory::MemoryDatabase;
pub use scylladb::ScyllaDatabase;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseConfigs {
    Memory {},
    Scylla {
        nodes: Vec<String>,
        keyspace: String,
        table: Option<String>,
        user: Option<String>,
        password: Option<String>,
    },
}

impl DatabaseConfigs {
    pub async fn connect(&self) -> anyhow::Result<Arc<dyn PatientStore>> {
        match self {
            Self::Memory {} => Ok(Arc::new(MemoryDatabase::default())),
            Self::Scylla {
                nodes,
                keyspace,
                table,
                user,
                password,
            } => {
                let db = ScyllaDatabase::connect(
                    keyspace.clone(),
                    table.clone(),
                    nodes,
                    user.clone(),
                    password.clone(),
                )
                .await?;

                Ok(Arc::new(db))
            },
        }
    }
}
