pub mod database;
pub mod memory;

pub use database::SqliteStore;
pub use memory::{MemoryStore, MemoryTransaction};
