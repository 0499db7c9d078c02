use crate::core::{Document, Record, Result, StoreError};
use im::HashMap;

/// In-memory index of a collection: `id -> Record`, plus a secondary
/// `unique_key -> id` map kept in sync by `put`/`remove`.
///
/// Backed by persistent maps, so `snapshot()` is O(1) and a persist can
/// serialize a consistent view without holding the index lock.
///
/// `put` and `remove` do not check invariants; the store facade checks
/// uniqueness with `find_conflict` before mutating.
#[derive(Clone)]
pub struct Collection<D> {
    records: HashMap<String, Record<D>>,
    unique: HashMap<String, String>,
}

impl<D: Document> Collection<D> {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            unique: HashMap::new(),
        }
    }

    /// Builds an index from stored records, rejecting data that breaks the
    /// identity or uniqueness invariant.
    pub fn from_records(records: Vec<Record<D>>) -> Result<Self> {
        let mut collection = Self::new();
        for record in records {
            if collection.records.contains_key(&record.id) {
                return Err(StoreError::persistence(format!(
                    "duplicate id '{}' in stored data",
                    record.id
                )));
            }
            if let Some(owner) = collection.find_conflict(record.unique_key(), None) {
                return Err(StoreError::persistence(format!(
                    "{} '{}' is shared by records '{}' and '{}' in stored data",
                    D::UNIQUE_FIELD,
                    record.unique_key(),
                    owner,
                    record.id
                )));
            }
            collection.put(record);
        }
        Ok(collection)
    }

    pub fn get(&self, id: &str) -> Option<&Record<D>> {
        self.records.get(id)
    }

    pub fn get_by_unique_key(&self, key: &str) -> Option<&Record<D>> {
        self.unique.get(key).and_then(|id| self.records.get(id))
    }

    /// Id of the record already holding `key`, ignoring `exclude_id`.
    pub fn find_conflict(&self, key: &str, exclude_id: Option<&str>) -> Option<&str> {
        self.unique
            .get(key)
            .map(String::as_str)
            .filter(|owner| Some(*owner) != exclude_id)
    }

    /// All records ordered by `(created_at, id)`.
    pub fn list(&self) -> Vec<Record<D>> {
        let mut records: Vec<Record<D>> = self.records.values().cloned().collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        records
    }

    /// Inserts or replaces the record stored under `record.id`.
    pub fn put(&mut self, record: Record<D>) -> Option<Record<D>> {
        let id = record.id.clone();
        let key = record.unique_key().to_string();

        let previous = self.records.insert(id.clone(), record);
        if let Some(previous) = &previous {
            if previous.unique_key() != key {
                self.unique.remove(previous.unique_key());
            }
        }
        self.unique.insert(key, id);
        previous
    }

    pub fn remove(&mut self, id: &str) -> Option<Record<D>> {
        let removed = self.records.remove(id)?;
        if self.unique.get(removed.unique_key()).map(String::as_str) == Some(id) {
            self.unique.remove(removed.unique_key());
        }
        Some(removed)
    }

    /// Cheap point-in-time copy sharing structure with the live index.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<D: Document> Default for Collection<D> {
    fn default() -> Self {
        Self::new()
    }
}
