use super::{ResultStore, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Slot persisted as a pretty-printed JSON file.
///
/// Writes go to a sibling temp file that is then renamed over the target, so
/// a concurrent `get` sees either the old or the new value. A missing file is
/// an empty slot. Two `FileStore`s on different paths do not see each other.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "data.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ResultStore for FileStore {
    async fn get(&self) -> Result<Option<Value>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let value: Value = serde_json::from_slice(&bytes)?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    async fn put(&self, value: &Value) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(value)?;
        let _guard = self.write_lock.lock().await;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_file_is_empty_slot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("data.json"));
        assert!(store.get().await.unwrap().is_none());
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn put_overwrites_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");

        let store = FileStore::new(&path);
        store.put(&json!({ "hairCount": 70000 })).await.unwrap();
        store
            .put(&json!({ "hairCount": 90000, "confidence": 80 }))
            .await
            .unwrap();
        assert!(!store.temp_path().exists());
        drop(store);

        let reopened = FileStore::new(&path);
        assert_eq!(
            reopened.get().await.unwrap(),
            Some(json!({ "hairCount": 90000, "confidence": 80 }))
        );

        reopened.clear().await.unwrap();
        assert!(!path.exists());
        assert!(reopened.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, b"{\"hairCount\": 12").unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(store.get().await, Err(StoreError::Decode(_))));
    }

    #[tokio::test]
    async fn null_and_blank_files_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let store = FileStore::new(&path);

        std::fs::write(&path, b"  \n").unwrap();
        assert!(store.get().await.unwrap().is_none());
        std::fs::write(&path, b"null").unwrap();
        assert!(store.get().await.unwrap().is_none());
    }
}
