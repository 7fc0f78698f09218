pub mod client;
pub mod memory;
mod record;
pub mod storage;

pub use client::DbClient;
pub use memory::MemoryStore;
pub use storage::{Result, Storage, StorageError};
