use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tutor_core::model::LearnerId;

/// Errors surfaced by storage adapters.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Which ledger record a learner snapshot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Progress,
    Conversations,
}

impl Namespace {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Progress => "progress",
            Namespace::Conversations => "conversations",
        }
    }

    /// Storage key of the learner's record, e.g. `progress:usr_1`.
    #[must_use]
    pub fn key(self, learner: &LearnerId) -> String {
        format!("{}:{}", self.as_str(), learner)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable key-value store of per-learner JSON snapshots.
///
/// Every save replaces the whole record of a namespace; there is no
/// partial patching and no versioning.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fetch the learner's record for a namespace.
    ///
    /// Returns `Ok(None)` if nothing was ever saved.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn load(
        &self,
        learner: &LearnerId,
        namespace: Namespace,
    ) -> Result<Option<Value>, StorageError>;

    /// Replace the learner's record for a namespace.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be written.
    async fn save(
        &self,
        learner: &LearnerId,
        namespace: Namespace,
        record: &Value,
    ) -> Result<(), StorageError>;

    /// Replace several namespaces at once.
    ///
    /// The default writes one after the other; backends with transactions
    /// override it to make the batch atomic.
    ///
    /// # Errors
    ///
    /// Returns the first `StorageError` hit; earlier writes are kept.
    async fn save_all(
        &self,
        learner: &LearnerId,
        records: &[(Namespace, Value)],
    ) -> Result<(), StorageError> {
        for (namespace, record) in records {
            self.save(learner, *namespace, record).await?;
        }
        Ok(())
    }

    /// Learners that have a record in the namespace, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn list_learners(&self, namespace: Namespace) -> Result<Vec<LearnerId>, StorageError>;
}

/// Load and decode a typed record.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the stored JSON does not match `T`.
pub async fn load_record<T: DeserializeOwned>(
    store: &dyn LedgerStore,
    learner: &LearnerId,
    namespace: Namespace,
) -> Result<Option<T>, StorageError> {
    store
        .load(learner, namespace)
        .await?
        .map(|value| {
            serde_json::from_value(value).map_err(|e| StorageError::Serialization(e.to_string()))
        })
        .transpose()
}

/// Encode and save a typed record.
///
/// # Errors
///
/// Returns `StorageError` if encoding or writing fails.
pub async fn save_record<T: Serialize + ?Sized>(
    store: &dyn LedgerStore,
    learner: &LearnerId,
    namespace: Namespace,
    record: &T,
) -> Result<(), StorageError> {
    let value =
        serde_json::to_value(record).map_err(|e| StorageError::Serialization(e.to_string()))?;
    store.save(learner, namespace, &value).await
}

/// Simple in-memory store for testing and prototyping.
///
/// Writes can be switched off to simulate a full or missing backend.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    records: Arc<Mutex<HashMap<String, Value>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save fail with `StorageError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Raw record under a storage key such as `progress:usr_1`.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<Value> {
        self.records
            .lock()
            .ok()
            .and_then(|guard| guard.get(key).cloned())
    }
}

#[async_trait]
impl LedgerStore for InMemoryRepository {
    async fn load(
        &self,
        learner: &LearnerId,
        namespace: Namespace,
    ) -> Result<Option<Value>, StorageError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&namespace.key(learner)).cloned())
    }

    async fn save(
        &self,
        learner: &LearnerId,
        namespace: Namespace,
        record: &Value,
    ) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!(
                "cannot write {}",
                namespace.key(learner)
            )));
        }
        let mut guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(namespace.key(learner), record.clone());
        Ok(())
    }

    async fn list_learners(&self, namespace: Namespace) -> Result<Vec<LearnerId>, StorageError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let prefix = format!("{}:", namespace.as_str());
        let mut learners = guard
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .map(LearnerId::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        learners.sort();
        Ok(learners)
    }
}

/// The configured backend behind a trait object for easy swapping.
#[derive(Clone)]
pub struct Storage {
    pub records: Arc<dyn LedgerStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    #[must_use]
    pub fn from_repository(repo: impl LedgerStore + 'static) -> Self {
        let records: Arc<dyn LedgerStore> = Arc::new(repo);
        Self { records }
    }
}
