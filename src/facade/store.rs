use crate::config::StoreConfig;
use crate::core::{Document, Record, Result, StoreError};
use crate::storage::{Collection, PendingWrite, QueueStats, SnapshotStorage, WriteQueue, WriteSlot};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Runtime statistics for a document store.
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Logical name of the collection.
    pub collection: String,
    /// Records currently in memory.
    pub record_count: usize,
    /// Where the collection is persisted.
    pub location: String,
    /// Write queue activity, including the last persist failure.
    pub queue: QueueStats,
}

/// Embedded document store: an in-memory collection kept in step with one
/// durable snapshot.
///
/// Reads are served from memory and never wait for disk. Every mutation is
/// checked and applied to memory first, then a full persist is queued and
/// the caller waits for that persist to finish. Persists run one at a time
/// in submission order, so once the queue drains the stored snapshot equals
/// the in-memory collection.
///
/// A failed persist is returned to the caller as `StoreError::Persistence`
/// while the in-memory mutation stays applied; the next successful persist
/// (or an explicit [`flush`](Self::flush)) writes it out.
///
/// # Examples
///
/// ```no_run
/// use docstore::{DocumentStore, StoreConfig, User};
///
/// # async fn demo() -> docstore::Result<()> {
/// let users = DocumentStore::<User>::initialize(StoreConfig::new("data/users.json")).await?;
/// let ann = users.create(User::new("Ann", "ann@x.com")).await?;
/// assert_eq!(users.get_by_id(&ann.id)?.fields.email, "ann@x.com");
/// # Ok(())
/// # }
/// ```
pub struct DocumentStore<D: Document> {
    name: String,
    collection: Arc<RwLock<Collection<D>>>,
    storage: Arc<dyn SnapshotStorage<D>>,
    queue: WriteQueue,
}

impl<D: Document> DocumentStore<D> {
    /// Opens the JSON file described by `config`, loading existing records.
    /// A missing file starts an empty collection; an unreadable or corrupt
    /// one fails with `Persistence`.
    pub async fn initialize(config: StoreConfig) -> Result<Self> {
        let storage: Arc<dyn SnapshotStorage<D>> = Arc::new(config.storage());
        Self::initialize_with_storage(config.collection, storage, config.queue_capacity).await
    }

    pub async fn initialize_with_storage(
        name: impl Into<String>,
        storage: Arc<dyn SnapshotStorage<D>>,
        queue_capacity: Option<usize>,
    ) -> Result<Self> {
        let name = name.into();
        storage.prepare().await?;
        let records = storage.load().await?;
        let collection = Collection::from_records(records)?;

        info!(
            collection = %name,
            location = %storage.location(),
            records = collection.len(),
            "document store initialized"
        );

        let queue = WriteQueue::spawn(name.clone(), queue_capacity);
        Ok(Self {
            name,
            collection: Arc::new(RwLock::new(collection)),
            storage,
            queue,
        })
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn list_all(&self) -> Vec<Record<D>> {
        self.read().list()
    }

    pub fn get_by_id(&self, id: &str) -> Result<Record<D>> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub fn find_by_unique_key(&self, key: &str) -> Option<Record<D>> {
        self.read().get_by_unique_key(key).cloned()
    }

    /// Full scan returning every record matching `predicate`.
    pub fn find<P>(&self, predicate: P) -> Vec<Record<D>>
    where
        P: Fn(&Record<D>) -> bool,
    {
        self.list_all()
            .into_iter()
            .filter(|record| predicate(record))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    pub async fn create(&self, fields: D) -> Result<Record<D>> {
        self.ensure_key_free(fields.unique_key(), None)?;
        let slot = self.queue.reserve().await?;

        let (record, pending) = {
            let mut collection = self.write();
            if let Some(owner) = collection.find_conflict(fields.unique_key(), None) {
                debug!(
                    collection = %self.name,
                    owner,
                    "create rejected: {} already taken",
                    D::UNIQUE_FIELD
                );
                return Err(StoreError::conflict(D::UNIQUE_FIELD, fields.unique_key()));
            }

            let record = Record::new(fields);
            collection.put(record.clone());
            (record, self.submit_persist(slot))
        };

        self.settle("create", &record.id, pending).await?;
        Ok(record)
    }

    /// Replaces the fields of record `id`.
    pub async fn update(&self, id: &str, fields: D) -> Result<Record<D>> {
        self.ensure_exists(id)?;
        self.ensure_key_free(fields.unique_key(), Some(id))?;
        self.update_with(id, move |current| {
            *current = fields;
            Ok(())
        })
        .await
    }

    /// Edits a copy of the fields of record `id` under the write lock. An
    /// error returned by `edit` aborts the update without mutating; the
    /// edited fields go through the same uniqueness check as
    /// [`update`](Self::update).
    pub async fn update_with<F>(&self, id: &str, edit: F) -> Result<Record<D>>
    where
        F: FnOnce(&mut D) -> Result<()> + Send,
    {
        self.ensure_exists(id)?;
        let slot = self.queue.reserve().await?;

        let (updated, pending) = {
            let mut collection = self.write();
            let current = collection
                .get(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

            let mut fields = current.fields.clone();
            edit(&mut fields)?;

            if fields.unique_key() != current.unique_key()
                && collection.find_conflict(fields.unique_key(), Some(id)).is_some()
            {
                return Err(StoreError::conflict(D::UNIQUE_FIELD, fields.unique_key()));
            }

            let updated = current.revised(fields);
            collection.put(updated.clone());
            (updated, self.submit_persist(slot))
        };

        self.settle("update", id, pending).await?;
        Ok(updated)
    }

    /// Removes record `id`, returning it.
    pub async fn delete(&self, id: &str) -> Result<Record<D>> {
        self.ensure_exists(id)?;
        let slot = self.queue.reserve().await?;

        let (removed, pending) = {
            let mut collection = self.write();
            let removed = collection
                .remove(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            (removed, self.submit_persist(slot))
        };

        self.settle("delete", id, pending).await?;
        Ok(removed)
    }

    /// Queues a persist of the current collection and waits for it.
    pub async fn flush(&self) -> Result<()> {
        let slot = self.queue.reserve().await?;
        self.submit_persist(slot).wait().await
    }

    /// Drains queued writes and stops the writer. Later mutations fail with
    /// `Closed`; reads keep working.
    pub async fn close(&self) -> Result<()> {
        self.queue.close().await?;
        info!(collection = %self.name, records = self.len(), "document store closed");
        Ok(())
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            collection: self.name.clone(),
            record_count: self.len(),
            location: self.storage.location(),
            queue: self.queue.stats(),
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn read(&self) -> RwLockReadGuard<'_, Collection<D>> {
        self.collection.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Collection<D>> {
        self.collection.write().unwrap_or_else(PoisonError::into_inner)
    }

    // Early checks so a doomed mutation never waits for queue capacity.
    // Each mutation repeats them under the write lock.

    fn ensure_exists(&self, id: &str) -> Result<()> {
        if self.read().get(id).is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn ensure_key_free(&self, key: &str, exclude_id: Option<&str>) -> Result<()> {
        if self.read().find_conflict(key, exclude_id).is_some() {
            return Err(StoreError::conflict(D::UNIQUE_FIELD, key));
        }
        Ok(())
    }

    /// Queues a full persist. The snapshot is taken when the write runs, so
    /// it covers every mutation applied before it.
    fn submit_persist(&self, slot: WriteSlot) -> PendingWrite {
        let collection = self.collection.clone();
        let storage = self.storage.clone();
        slot.submit(move || async move {
            let snapshot = collection
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .snapshot();
            storage.persist(snapshot.list()).await
        })
    }

    async fn settle(&self, op: &'static str, id: &str, pending: PendingWrite) -> Result<()> {
        pending.wait().await.inspect_err(|err| {
            warn!(
                collection = %self.name,
                op,
                id,
                error = %err,
                "persist failed; in-memory change kept"
            );
        })
    }
}
