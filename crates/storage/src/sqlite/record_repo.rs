use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::Row;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use tracing::debug;
use tutor_core::model::LearnerId;

use crate::repository::{LedgerStore, Namespace, StorageError};

use super::SqliteRepository;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn upsert<'q>(
    learner: &'q LearnerId,
    namespace: Namespace,
    payload: String,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    sqlx::query(
        r"
        INSERT INTO ledger_records (namespace, learner_id, payload, updated_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(namespace, learner_id) DO UPDATE SET
            payload = excluded.payload,
            updated_at = excluded.updated_at
        ",
    )
    .bind(namespace.as_str())
    .bind(learner.as_str())
    .bind(payload)
    .bind(Utc::now())
}

#[async_trait]
impl LedgerStore for SqliteRepository {
    async fn load(
        &self,
        learner: &LearnerId,
        namespace: Namespace,
    ) -> Result<Option<Value>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT payload
            FROM ledger_records
            WHERE namespace = ?1 AND learner_id = ?2
            ",
        )
        .bind(namespace.as_str())
        .bind(learner.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            debug!(key = %namespace.key(learner), "no stored record");
            return Ok(None);
        };

        let payload: String = row.try_get("payload").map_err(ser)?;
        serde_json::from_str(&payload).map(Some).map_err(ser)
    }

    async fn save(
        &self,
        learner: &LearnerId,
        namespace: Namespace,
        record: &Value,
    ) -> Result<(), StorageError> {
        let payload = serde_json::to_string(record).map_err(ser)?;
        let bytes = payload.len();
        upsert(learner, namespace, payload)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        debug!(key = %namespace.key(learner), bytes, "record saved");
        Ok(())
    }

    async fn save_all(
        &self,
        learner: &LearnerId,
        records: &[(Namespace, Value)],
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;
        for (namespace, record) in records {
            let payload = serde_json::to_string(record).map_err(ser)?;
            upsert(learner, *namespace, payload)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        }
        tx.commit()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        debug!(learner = %learner, count = records.len(), "records saved atomically");
        Ok(())
    }

    async fn list_learners(&self, namespace: Namespace) -> Result<Vec<LearnerId>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT learner_id
            FROM ledger_records
            WHERE namespace = ?1
            ORDER BY learner_id
            ",
        )
        .bind(namespace.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter()
            .map(|row| {
                let raw: String = row.try_get("learner_id").map_err(ser)?;
                LearnerId::new(raw).map_err(ser)
            })
            .collect()
    }
}
