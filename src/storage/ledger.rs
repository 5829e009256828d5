// Upload ownership: who stored each asset and which listing holds it.
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use std::sync::Arc;
use thiserror::Error;

use crate::db::{self, RepositoryError};
use crate::error::AppError;
use crate::state::DbPool;

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("Image {0} was not uploaded by you")]
    NotOwned(String),

    #[error("Image {0} is already attached to another listing")]
    InUse(String),

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

impl From<rusqlite::Error> for ClaimError {
    fn from(err: rusqlite::Error) -> Self {
        ClaimError::Storage(err.into())
    }
}

impl From<r2d2::Error> for ClaimError {
    fn from(err: r2d2::Error) -> Self {
        ClaimError::Storage(err.into())
    }
}

impl From<ClaimError> for AppError {
    fn from(err: ClaimError) -> Self {
        match err {
            ClaimError::NotOwned(_) => AppError::Authorization(err.to_string()),
            ClaimError::InUse(_) => AppError::Validation(err.to_string()),
            ClaimError::Storage(e) => e.into(),
        }
    }
}

#[async_trait]
pub trait AssetLedger: Send + Sync {
    /// Note that `owner_id` just stored `asset_id`.
    async fn record(&self, asset_id: &str, owner_id: &str) -> Result<(), RepositoryError>;

    /// Attach every asset to `listing_id`, or none of them. Each must have
    /// been uploaded by `owner_id` and be free or already on this listing.
    async fn claim(
        &self,
        owner_id: &str,
        listing_id: &str,
        asset_ids: &[&str],
    ) -> Result<(), ClaimError>;

    /// Detach whatever `listing_id` holds. Returns how many were detached.
    async fn unclaim(&self, listing_id: &str) -> Result<usize, RepositoryError>;

    /// Drop released assets.
    async fn forget(&self, asset_ids: &[&str]) -> Result<(), RepositoryError>;
}

pub type DynAssetLedger = Arc<dyn AssetLedger>;

pub struct SqliteAssetLedger {
    pool: DbPool,
}

impl SqliteAssetLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssetLedger for SqliteAssetLedger {
    async fn record(&self, asset_id: &str, owner_id: &str) -> Result<(), RepositoryError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO assets (asset_id, owner_id, created_at) VALUES (?1, ?2, ?3)",
            params![asset_id, owner_id, db::format_timestamp(Utc::now())],
        )?;
        Ok(())
    }

    async fn claim(
        &self,
        owner_id: &str,
        listing_id: &str,
        asset_ids: &[&str],
    ) -> Result<(), ClaimError> {
        let mut conn = self.pool.get()?;
        // Take the write lock up front so two listings cannot both win
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for &asset_id in asset_ids {
            let row: Option<(String, Option<String>)> = tx
                .query_row(
                    "SELECT owner_id, listing_id FROM assets WHERE asset_id = ?1",
                    params![asset_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match row {
                Some((owner, _)) if owner != owner_id => {
                    return Err(ClaimError::NotOwned(asset_id.to_string()))
                }
                None => return Err(ClaimError::NotOwned(asset_id.to_string())),
                Some((_, Some(holder))) if holder != listing_id => {
                    return Err(ClaimError::InUse(asset_id.to_string()))
                }
                Some(_) => {}
            }

            tx.execute(
                "UPDATE assets SET listing_id = ?1 WHERE asset_id = ?2",
                params![listing_id, asset_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    async fn unclaim(&self, listing_id: &str) -> Result<usize, RepositoryError> {
        let conn = self.pool.get()?;
        let detached = conn.execute(
            "UPDATE assets SET listing_id = NULL WHERE listing_id = ?1",
            params![listing_id],
        )?;
        Ok(detached)
    }

    async fn forget(&self, asset_ids: &[&str]) -> Result<(), RepositoryError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        for asset_id in asset_ids {
            tx.execute("DELETE FROM assets WHERE asset_id = ?1", params![asset_id])?;
        }
        tx.commit()?;
        Ok(())
    }
}
