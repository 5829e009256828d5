mod ledger;
mod local;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

use crate::db::models::ImageRef;

pub use self::ledger::{AssetLedger, ClaimError, DynAssetLedger, SqliteAssetLedger};
pub use self::local::LocalAssetStore;

/// Content types accepted for listing images.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/webp"];

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Invalid file type '{0}'. Only JPEG, PNG, and WEBP are allowed.")]
    UnsupportedType(String),

    #[error("File exceeds the {limit} byte upload limit")]
    TooLarge { limit: usize },

    #[error("Invalid asset id: {0}")]
    InvalidId(String),

    #[error("Asset io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Asset service unavailable: {0}")]
    Unavailable(String),
}

/// Boundary to wherever listing images physically live.
///
/// `release` is called before a listing's images are replaced or the listing
/// is deleted; an error from it must abort that mutation.
#[async_trait]
pub trait AssetService: Send + Sync {
    async fn upload(&self, data: Bytes, content_type: &str) -> Result<ImageRef, AssetError>;

    async fn release(&self, asset_id: &str) -> Result<(), AssetError>;
}

pub type DynAssetService = Arc<dyn AssetService>;

/// Asset ids are bare file names; anything that could escape the storage
/// directory is rejected.
pub fn validate_asset_id(asset_id: &str) -> Result<(), AssetError> {
    let bad = asset_id.is_empty()
        || asset_id.starts_with('.')
        || asset_id.contains(&['/', '\\', '\0'][..])
        || asset_id.contains("..");
    if bad {
        return Err(AssetError::InvalidId(asset_id.to_string()));
    }
    Ok(())
}

/// File extension used when storing an accepted content type.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}
