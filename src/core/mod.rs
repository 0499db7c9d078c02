pub mod error;
pub mod types;

pub use error::{Result, StoreError};
pub use types::{Document, Record, new_record_id, next_timestamp};
