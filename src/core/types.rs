use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User-supplied fields of a stored entity.
///
/// Exactly one field acts as the secondary key: no two records in a
/// collection may return the same `unique_key()`. Keys are compared as exact
/// strings.
pub trait Document: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Name of the unique field, reported in conflict errors.
    const UNIQUE_FIELD: &'static str;

    fn unique_key(&self) -> &str;
}

/// A persisted entity: store-assigned identity, the document fields and the
/// two bookkeeping timestamps.
///
/// Serializes as a flat JSON object, e.g.
/// `{"id": "...", "name": "Ann", "email": "ann@x.com", "createdAt": "...", "updatedAt": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record<D> {
    pub id: String,
    #[serde(flatten)]
    pub fields: D,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<D: Document> Record<D> {
    /// Fresh record with a new id and `created_at == updated_at`.
    pub fn new(fields: D) -> Self {
        let now = Utc::now();
        Self {
            id: new_record_id(),
            fields,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn unique_key(&self) -> &str {
        self.fields.unique_key()
    }

    /// Copy of this record carrying `fields`, with `updated_at` moved
    /// strictly forward. Identity and `created_at` are preserved.
    pub fn revised(&self, fields: D) -> Self {
        Self {
            id: self.id.clone(),
            fields,
            created_at: self.created_at,
            updated_at: next_timestamp(self.updated_at),
        }
    }
}

pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current time, bumped past `previous` when the clock has not advanced.
pub fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::milliseconds(1)
    }
}
