use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use scylla::frame::response::result::{CqlValue, Row};
use scylla::IntoTypedRows;
use uuid::Uuid;

use crate::database::template::PatientStore;
use crate::models::PatientDocument;

/// Keeps each patient as a JSON document keyed by its id.
pub struct ScyllaDatabase {
    table: String,
    connection: session::Session,
}

impl ScyllaDatabase {
    pub async fn connect(
        keyspace: String,
        table: Option<String>,
        known_nodes: &[String],
        user: Option<String>,
        password: Option<String>,
    ) -> Result<Self> {
        let mut cfg = scylla::SessionConfig::new();
        cfg.add_known_nodes(known_nodes);
        cfg.auth_username = user;
        cfg.auth_password = password;

        let base = scylla::Session::connect(cfg).await?;
        base.use_keyspace(keyspace, false).await?;

        let connection = session::Session::from(base);

        let table = table.unwrap_or_else(|| "patients".to_string());
        let qry = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
            id uuid, \
            document text, \
            PRIMARY KEY (id)
        )",
            table
        );
        connection.query(&qry, ()).await?;

        Ok(Self { table, connection })
    }
}

/// Reads the `[applied]` column of a lightweight transaction.
fn was_applied(rows: &[Row]) -> bool {
    match rows.first().and_then(|row| row.columns.first()) {
        Some(Some(CqlValue::Boolean(applied))) => *applied,
        _ => false,
    }
}

#[async_trait]
impl PatientStore for ScyllaDatabase {
    async fn insert_one(&self, patient: &PatientDocument) -> Result<Uuid> {
        let qry = format!(
            "INSERT INTO {table} (id, document) VALUES (?, ?) IF NOT EXISTS;",
            table = self.table
        );

        let document = serde_json::to_string(patient)?;
        let result = self
            .connection
            .query_prepared(&qry, (patient.id, document))
            .await?;

        if !was_applied(result.rows.as_deref().unwrap_or_default()) {
            return Err(anyhow!("patient {} already exists", patient.id));
        }

        Ok(patient.id)
    }

    async fn find_one(&self, patient_id: Uuid) -> Result<Option<PatientDocument>> {
        let qry = format!("SELECT document FROM {table} WHERE id = ?;", table = self.table);

        let document = self
            .connection
            .query_prepared(&qry, (patient_id,))
            .await?
            .rows
            .unwrap_or_default()
            .into_typed::<(String,)>()
            .next()
            .transpose()?;

        match document {
            None => Ok(None),
            Some((raw,)) => {
                let patient = serde_json::from_str(&raw)
                    .with_context(|| format!("corrupt patient document for {}", patient_id))?;
                Ok(Some(patient))
            },
        }
    }

    async fn list(&self, limit: usize) -> Result<Vec<PatientDocument>> {
        let qry = format!(
            "SELECT document FROM {table} LIMIT {limit};",
            table = self.table,
            limit = limit,
        );

        let rows = self
            .connection
            .query_prepared(&qry, ())
            .await?
            .rows
            .unwrap_or_default();

        let mut patients = Vec::with_capacity(rows.len());
        for row in rows.into_typed::<(String,)>() {
            let (raw,) = row?;
            patients.push(serde_json::from_str(&raw).context("corrupt patient document")?);
        }

        Ok(patients)
    }

    async fn count(&self) -> Result<usize> {
        let qry = format!("SELECT COUNT(*) FROM {table};", table = self.table);

        let count = self
            .connection
            .query_prepared(&qry, ())
            .await?
            .rows
            .unwrap_or_default()
            .into_typed::<(i64,)>()
            .next()
            .transpose()?
            .map(|v| v.0 as usize)
            .unwrap_or_default();

        Ok(count)
    }
}

mod session {
    use std::fmt::Debug;

    use scylla::frame::value::ValueList;
    use scylla::query::Query;
    use scylla::transport::errors::{DbError, QueryError};
    use scylla::QueryResult;

    pub struct Session(scylla::CachingSession);

    impl From<scylla::Session> for Session {
        fn from(s: scylla::Session) -> Self {
            Self(scylla::CachingSession::from(s, 100))
        }
    }

    impl Session {
        #[instrument(skip(self, query), level = "debug")]
        pub async fn query(
            &self,
            query: &str,
            values: impl ValueList + Debug,
        ) -> Result<QueryResult, QueryError> {
            debug!("executing query {}", query);
            let result = self.0.execute(query, &values).await;

            if let Err(ref e) = result {
                consider_logging_error(e);
            }

            result
        }

        #[instrument(skip(self, query, values), level = "debug")]
        pub async fn query_prepared(
            &self,
            query: &str,
            values: impl ValueList,
        ) -> Result<QueryResult, QueryError> {
            debug!("preparing new statement: {}", query);
            let result = self.0.execute(Query::from(query), &values).await;

            match result {
                Ok(res) => Ok(res),
                Err(e) => {
                    consider_logging_error(&e);
                    Err(e)
                },
            }
        }
    }

    fn consider_logging_error(e: &QueryError) {
        if let QueryError::DbError(DbError::AlreadyExists { .. }, ..) = e {
            info!("Table already exists, skipping...");
        } else {
            error!("query failed: {}", e);
        }
    }
}
