//! Single-slot result storage.
//!
//! The slot holds at most one JSON value and is overwritten on every write.
//! Callers interpret the value with [`crate::model::ResultRecord::from_value`];
//! the store itself never validates content.

mod file;
mod http;
mod memory;

pub use file::FileStore;
pub use http::HttpStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store content is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("store unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("store responded with status {0}")]
    Status(u16),
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Current value, or `None` when the slot is empty.
    async fn get(&self) -> Result<Option<Value>, StoreError>;
    /// Replace the slot content. Readers never observe a partial write.
    async fn put(&self, value: &Value) -> Result<(), StoreError>;
    /// Empty the slot. Clearing an empty slot succeeds.
    async fn clear(&self) -> Result<(), StoreError>;
}
