use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::credentials::BcryptCredentials;
use crate::auth::tokens::{DynTokenService, SqliteTokenService};
use crate::categories::{DynCategoryRegistry, SqliteCategoryRegistry};
use crate::config::Config;
use crate::listings::{ListingService, SqliteListingRepository};
use crate::storage::{DynAssetService, LocalAssetStore, SqliteAssetLedger};
use crate::users::{IdentityStore, SqliteUserRepository};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub identity: IdentityStore,
    pub tokens: DynTokenService,
    pub categories: DynCategoryRegistry,
    pub listings: ListingService,
}

impl AppState {
    /// Wire every service against the pool, storing images on local disk.
    pub fn new(db: DbPool, config: Config) -> anyhow::Result<Self> {
        let assets: DynAssetService = Arc::new(LocalAssetStore::new(
            config.uploads_path(),
            &config.storage.public_prefix,
            config.storage.max_upload_bytes,
        ));
        Self::with_assets(db, config, assets)
    }

    /// Same wiring with a caller-supplied asset service.
    pub fn with_assets(
        db: DbPool,
        config: Config,
        assets: DynAssetService,
    ) -> anyhow::Result<Self> {
        let identity = IdentityStore::new(
            Arc::new(SqliteUserRepository::new(db.clone())),
            Arc::new(BcryptCredentials::new(config.auth.bcrypt_cost)),
        );
        let tokens: DynTokenService =
            Arc::new(SqliteTokenService::new(db.clone(), config.auth.token_ttl()?));
        let categories: DynCategoryRegistry = Arc::new(SqliteCategoryRegistry::new(db.clone()));
        let listings = ListingService::new(
            Arc::new(SqliteListingRepository::new(db.clone())),
            categories.clone(),
            identity.clone(),
            assets,
            Arc::new(SqliteAssetLedger::new(db.clone())),
        );

        Ok(Self {
            db,
            config,
            identity,
            tokens,
            categories,
            listings,
        })
    }
}
