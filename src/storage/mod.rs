pub mod collection;
pub mod persistence;
pub mod write_queue;

pub use collection::Collection;
pub use persistence::{JsonFileStorage, SnapshotStorage};
pub use write_queue::{PendingWrite, QueueStats, WriteQueue, WriteSlot};
