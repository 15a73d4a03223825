//! services/api/src/adapters/storage.rs
//!
//! Local-disk implementation of the `ObjectStore` port. Uploaded videos are
//! written under one directory and served back by the web layer.

use async_trait::async_trait;
use reflects_core::ports::{ObjectStore, PortError, PortResult};
use std::path::PathBuf;

#[derive(Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: PathBuf, base_url: impl Into<String>) -> Self {
        Self {
            root,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, object_name: &str, data: &[u8]) -> PortResult<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| PortError::Unavailable(format!("Upload directory: {}", e)))?;
        tokio::fs::write(self.root.join(object_name), data)
            .await
            .map_err(|e| PortError::Unavailable(format!("Upload write: {}", e)))?;
        Ok(())
    }

    async fn delete(&self, object_name: &str) -> PortResult<()> {
        match tokio::fs::remove_file(self.root.join(object_name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PortError::Unavailable(format!("Upload delete: {}", e))),
        }
    }

    fn url_for(&self, object_name: &str) -> String {
        format!("{}/{}", self.base_url, object_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_writes_file_and_url_joins_base() {
        let root = std::env::temp_dir().join(format!("reflects-store-{}", uuid::Uuid::new_v4()));
        let store = LocalObjectStore::new(root.clone(), "/uploads/");

        store.put("7_3_clip.mp4", b"video").await.unwrap();

        let written = tokio::fs::read(root.join("7_3_clip.mp4")).await.unwrap();
        assert_eq!(written, b"video");
        assert_eq!(store.url_for("7_3_clip.mp4"), "/uploads/7_3_clip.mp4");

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn delete_removes_file_and_tolerates_missing() {
        let root = std::env::temp_dir().join(format!("reflects-store-{}", uuid::Uuid::new_v4()));
        let store = LocalObjectStore::new(root.clone(), "/uploads");

        store.put("9_1_clip.mp4", b"video").await.unwrap();
        store.delete("9_1_clip.mp4").await.unwrap();
        assert!(!root.join("9_1_clip.mp4").exists());
        store.delete("9_1_clip.mp4").await.unwrap();

        tokio::fs::remove_dir_all(&root).await.ok();
    }
}
