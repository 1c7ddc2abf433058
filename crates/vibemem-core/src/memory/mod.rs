//! Memory subsystem: items, category aggregates and the snapshot store.

pub mod error;
pub mod item;
pub mod store;

pub use error::{MemoryError, MemoryResult};
pub use item::{CategoryAggregate, CategoryPath, MemoryItem, Priority, ELLIPSIS};
pub use store::{MemoryStore, StoreSnapshot, SNAPSHOT_VERSION};
