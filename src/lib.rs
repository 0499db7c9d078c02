// ============================================================================
// docstore Library
// ============================================================================

//! Embedded document store: an in-memory index backed by a single JSON file.
//!
//! - [`DocumentStore`] is the facade: synchronous reads from memory,
//!   mutations that check the uniqueness invariant, apply in memory and then
//!   wait for their queued persist.
//! - [`storage::WriteQueue`] runs persists one at a time, in submission order.
//! - [`storage::JsonFileStorage`] rewrites the backing file atomically.
//!
//! ```no_run
//! use docstore::{DocumentStore, StoreConfig, StoreError, User};
//!
//! # async fn demo() -> docstore::Result<()> {
//! let users = DocumentStore::<User>::initialize(StoreConfig::from_env()?).await?;
//!
//! let ann = users.create(User::new("Ann", "ann@x.com")).await?;
//! let duplicate = users.create(User::new("Other Ann", "ann@x.com")).await;
//! assert!(matches!(duplicate, Err(StoreError::Conflict { .. })));
//!
//! users.delete(&ann.id).await?;
//! users.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod entities;
pub mod facade;
pub mod storage;
pub mod web;

// Re-export main types for convenience
pub use crate::config::{ServerConfig, StoreConfig};
pub use crate::core::{Document, Record, Result, StoreError};
pub use crate::entities::{Post, User};
pub use crate::facade::{DocumentStore, StoreStats};
pub use crate::storage::{JsonFileStorage, QueueStats, SnapshotStorage};
