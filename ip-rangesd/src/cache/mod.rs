pub mod db;
pub mod digest;
pub mod sqlite;
pub mod store;

pub use sqlite::SqliteStore;
pub use store::{CacheEntry, CacheStore, MemoryStore};
