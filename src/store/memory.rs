use super::{ResultStore, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

/// In-process slot. Not durable.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_slot<T>(&self, f: impl FnOnce(&mut Option<Value>) -> T) -> T {
        // Assignments replace the whole value, so a poisoned slot is still whole.
        let mut guard = match self.slot.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn get(&self) -> Result<Option<Value>, StoreError> {
        Ok(self.with_slot(|slot| slot.clone()))
    }

    async fn put(&self, value: &Value) -> Result<(), StoreError> {
        self.with_slot(|slot| {
            *slot = if value.is_null() {
                None
            } else {
                Some(value.clone())
            }
        });
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.with_slot(|slot| *slot = None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn last_write_wins_and_clear_empties() {
        let store = MemoryStore::new();
        assert!(store.get().await.unwrap().is_none());

        store.put(&json!({ "hairCount": 1 })).await.unwrap();
        store.put(&json!({ "hairCount": 2 })).await.unwrap();
        assert_eq!(store.get().await.unwrap(), Some(json!({ "hairCount": 2 })));

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.get().await.unwrap().is_none());
    }
}
