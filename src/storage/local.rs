use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use super::{extension_for, validate_asset_id, AssetError, AssetService};
use crate::db::models::ImageRef;

/// Stores images as files in a local directory and serves them under a
/// URL prefix.
#[derive(Debug, Clone)]
pub struct LocalAssetStore {
    root: PathBuf,
    public_prefix: String,
    max_bytes: usize,
}

impl LocalAssetStore {
    pub fn new(root: impl Into<PathBuf>, public_prefix: &str, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
            max_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an asset id to its file, rejecting ids that leave the root.
    pub fn path_for(&self, asset_id: &str) -> Result<PathBuf, AssetError> {
        validate_asset_id(asset_id)?;
        Ok(self.root.join(asset_id))
    }
}

#[async_trait]
impl AssetService for LocalAssetStore {
    async fn upload(&self, data: Bytes, content_type: &str) -> Result<ImageRef, AssetError> {
        let ext = extension_for(content_type)
            .ok_or_else(|| AssetError::UnsupportedType(content_type.to_string()))?;
        if data.len() > self.max_bytes {
            return Err(AssetError::TooLarge {
                limit: self.max_bytes,
            });
        }

        tokio::fs::create_dir_all(&self.root).await?;
        let asset_id = format!("{}.{}", uuid::Uuid::now_v7(), ext);
        tokio::fs::write(self.root.join(&asset_id), &data).await?;

        tracing::info!("Stored asset {} ({} bytes)", asset_id, data.len());
        Ok(ImageRef {
            url: format!("{}/{}", self.public_prefix, asset_id),
            asset_id,
        })
    }

    async fn release(&self, asset_id: &str) -> Result<(), AssetError> {
        let path = self.path_for(asset_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!("Released asset {}", asset_id);
                Ok(())
            }
            // Already gone counts as released
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Asset {} was already released", asset_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(max_bytes: usize) -> (LocalAssetStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        (
            LocalAssetStore::new(tmp.path().join("uploads"), "/uploads/", max_bytes),
            tmp,
        )
    }

    #[tokio::test]
    async fn upload_writes_file_and_builds_url() {
        let (store, _tmp) = store(1024);
        let image = store
            .upload(Bytes::from_static(b"\x89PNG fake"), "image/png")
            .await
            .unwrap();

        assert!(image.asset_id.ends_with(".png"));
        assert_eq!(image.url, format!("/uploads/{}", image.asset_id));
        let stored = std::fs::read(store.root().join(&image.asset_id)).unwrap();
        assert_eq!(stored, b"\x89PNG fake");
    }

    #[tokio::test]
    async fn upload_rejects_unsupported_types() {
        let (store, _tmp) = store(1024);
        let err = store
            .upload(Bytes::from_static(b"GIF89a"), "image/gif")
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::UnsupportedType(_)));
    }

    #[tokio::test]
    async fn upload_rejects_oversized_files() {
        let (store, _tmp) = store(4);
        let err = store
            .upload(Bytes::from_static(b"too big"), "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::TooLarge { limit: 4 }));
    }

    #[tokio::test]
    async fn release_removes_file_and_is_idempotent() {
        let (store, _tmp) = store(1024);
        let image = store
            .upload(Bytes::from_static(b"jpeg"), "image/jpeg")
            .await
            .unwrap();
        let path = store.path_for(&image.asset_id).unwrap();
        assert!(path.exists());

        store.release(&image.asset_id).await.unwrap();
        assert!(!path.exists());
        store.release(&image.asset_id).await.unwrap();
    }

    #[tokio::test]
    async fn release_refuses_paths_outside_root() {
        let (store, _tmp) = store(1024);
        let err = store.release("../abode.db").await.unwrap_err();
        assert!(matches!(err, AssetError::InvalidId(_)));
    }
}
