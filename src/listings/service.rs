use bytes::Bytes;
use chrono::Utc;
use std::collections::HashMap;

use crate::auth::guard::ensure_owner;
use crate::categories::DynCategoryRegistry;
use crate::db::models::{CategorySummary, ImageRef, Listing, ListingView, OwnerSummary};
use crate::error::{AppError, AppResult};
use crate::listings::domain::{ListingInput, ListingPatch};
use crate::listings::repository::DynListingRepository;
use crate::listings::search::{ListingFilter, Page, Paginated, SearchQuery, SortKey};
use crate::storage::{DynAssetLedger, DynAssetService};
use crate::users::IdentityStore;

const LISTING_NOT_FOUND: &str = "House listing not found";
const TITLE_TAKEN: &str = "A listing with this title already exists";

/// Listing lifecycle: validation, ownership, category resolution, image
/// claims and release, and the owner/category join for everything handed back.
#[derive(Clone)]
pub struct ListingService {
    listings: DynListingRepository,
    categories: DynCategoryRegistry,
    identity: IdentityStore,
    assets: DynAssetService,
    ledger: DynAssetLedger,
}

fn asset_ids(images: &[ImageRef]) -> Vec<&str> {
    images.iter().map(|image| image.asset_id.as_str()).collect()
}

impl ListingService {
    pub fn new(
        listings: DynListingRepository,
        categories: DynCategoryRegistry,
        identity: IdentityStore,
        assets: DynAssetService,
        ledger: DynAssetLedger,
    ) -> Self {
        Self {
            listings,
            categories,
            identity,
            assets,
            ledger,
        }
    }

    /// Store one uploaded image and remember who uploaded it.
    pub async fn store_image(
        &self,
        owner_id: &str,
        data: Bytes,
        content_type: &str,
    ) -> AppResult<ImageRef> {
        let image = self.assets.upload(data, content_type).await?;
        if let Err(e) = self.ledger.record(&image.asset_id, owner_id).await {
            if let Err(release_err) = self.assets.release(&image.asset_id).await {
                tracing::warn!(
                    "Could not release unrecorded asset {}: {}",
                    image.asset_id,
                    release_err
                );
            }
            return Err(e.into());
        }
        Ok(image)
    }

    /// Throw away images from an upload batch that failed part way.
    pub async fn discard_uploads(&self, images: &[ImageRef]) {
        for image in images {
            if let Err(e) = self.assets.release(&image.asset_id).await {
                tracing::warn!("Could not release {} after failed upload: {}", image.asset_id, e);
                continue;
            }
            if let Err(e) = self.ledger.forget(&[image.asset_id.as_str()]).await {
                tracing::warn!("Could not forget released asset {}: {}", image.asset_id, e);
            }
        }
    }

    pub async fn create(&self, owner_id: &str, input: &ListingInput) -> AppResult<ListingView> {
        let new = input.validate()?;

        if self.identity.find_active_by_id(owner_id).await?.is_none() {
            return Err(AppError::NotFound("User not found".into()));
        }

        if self.listings.is_taken(&new.title, &new.slug, None).await? {
            return Err(AppError::Conflict(TITLE_TAKEN.into()));
        }

        let category = self.categories.resolve_or_create(&new.house_type).await?;

        let listing_id = uuid::Uuid::now_v7().to_string();
        self.ledger
            .claim(owner_id, &listing_id, &asset_ids(&new.images))
            .await?;

        let listing = Listing {
            id: listing_id,
            title: new.title,
            slug: new.slug,
            description: new.description,
            address: new.address,
            price: new.price,
            house_type: new.house_type,
            number_of_rooms: new.number_of_rooms,
            rented: false,
            images: new.images,
            owner_id: owner_id.to_string(),
            category_id: category.id,
            created_at: Utc::now(),
        };

        // A racing create with the same title still trips the UNIQUE index
        if let Err(e) = self.listings.insert(&listing).await {
            if let Err(unclaim_err) = self.ledger.unclaim(&listing.id).await {
                tracing::warn!(
                    "Images stay claimed by unsaved listing {}: {}",
                    listing.id,
                    unclaim_err
                );
            }
            return Err(match AppError::from(e) {
                AppError::Conflict(_) => AppError::Conflict(TITLE_TAKEN.into()),
                other => other,
            });
        }

        tracing::info!("House created: {} ({})", listing.id, listing.slug);
        self.enrich_one(listing).await
    }

    pub async fn update(
        &self,
        id: &str,
        caller_id: &str,
        patch: &ListingPatch,
    ) -> AppResult<ListingView> {
        let existing = self.fetch(id).await?;
        ensure_owner(caller_id, &existing)?;

        let mut changes = patch.validate()?;

        if let Some((title, slug)) = &changes.title {
            if self.listings.is_taken(title, slug, Some(id)).await? {
                return Err(AppError::Conflict(TITLE_TAKEN.into()));
            }
        }

        if let Some(house_type) = &changes.house_type {
            if *house_type != existing.house_type {
                let category = self.categories.resolve_or_create(house_type).await?;
                changes.category_id = Some(category.id);
            }
        }

        let released = match &changes.images {
            Some(replacement) => {
                // Refused claims abort before anything is released
                self.ledger
                    .claim(caller_id, id, &asset_ids(replacement))
                    .await?;
                let stale: Vec<&ImageRef> = existing
                    .images
                    .iter()
                    .filter(|old| !replacement.iter().any(|new| new.asset_id == old.asset_id))
                    .collect();
                self.release_all(&stale).await?
            }
            None => 0,
        };

        let applied = self.listings.update(id, &changes).await.map_err(|e| {
            if released > 0 {
                tracing::warn!(
                    "Released {} image(s) of {} but the update failed: {}",
                    released,
                    id,
                    e
                );
            }
            match AppError::from(e) {
                AppError::Conflict(_) => AppError::Conflict(TITLE_TAKEN.into()),
                other => other,
            }
        })?;
        if !applied {
            return Err(AppError::NotFound(LISTING_NOT_FOUND.into()));
        }

        tracing::info!("House updated: {}", id);
        let updated = self.fetch(id).await?;
        self.enrich_one(updated).await
    }

    pub async fn delete(&self, id: &str, caller_id: &str) -> AppResult<()> {
        let existing = self.fetch(id).await?;
        ensure_owner(caller_id, &existing)?;

        let images: Vec<&ImageRef> = existing.images.iter().collect();
        let released = self.release_all(&images).await?;

        match self.listings.delete(id).await {
            Ok(_) => {
                tracing::info!("House deleted: {}", id);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    "Released {} image(s) of {} but the delete failed: {}",
                    released,
                    id,
                    e
                );
                Err(e.into())
            }
        }
    }

    pub async fn get_by_id(&self, id: &str) -> AppResult<ListingView> {
        let listing = self.fetch(id).await?;
        self.enrich_one(listing).await
    }

    pub async fn get_by_slug(&self, slug: &str) -> AppResult<ListingView> {
        let listing = self
            .listings
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| AppError::NotFound(LISTING_NOT_FOUND.into()))?;
        self.enrich_one(listing).await
    }

    pub async fn get_by_category(&self, category_id: &str) -> AppResult<Vec<ListingView>> {
        if self.categories.find_by_id(category_id).await?.is_none() {
            return Err(AppError::NotFound("Category not found".into()));
        }
        let listings = self.listings.find_by_category(category_id).await?;
        self.enrich(listings).await
    }

    /// Every listing, rented ones included.
    pub async fn list_all(&self, page: Page, sort: SortKey) -> AppResult<Paginated<ListingView>> {
        self.paginate(&ListingFilter::default(), sort, page).await
    }

    pub async fn search(&self, query: &SearchQuery) -> AppResult<Paginated<ListingView>> {
        let mut filter = query.filter.clone();
        filter.available_only = true;
        self.paginate(&filter, query.sort, query.page).await
    }

    async fn paginate(
        &self,
        filter: &ListingFilter,
        sort: SortKey,
        page: Page,
    ) -> AppResult<Paginated<ListingView>> {
        let (listings, total) = self.listings.search(filter, sort, page).await?;
        let items = self.enrich(listings).await?;
        Ok(Paginated::new(items, total, page))
    }

    async fn fetch(&self, id: &str) -> AppResult<Listing> {
        self.listings
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(LISTING_NOT_FOUND.into()))
    }

    /// Release assets one by one; the first failure aborts the caller's
    /// mutation. Returns how many were released.
    async fn release_all(&self, images: &[&ImageRef]) -> AppResult<usize> {
        for (released, image) in images.iter().enumerate() {
            if let Err(e) = self.assets.release(&image.asset_id).await {
                if released > 0 {
                    tracing::warn!(
                        "Asset release stopped after {} of {} image(s)",
                        released,
                        images.len()
                    );
                }
                return Err(AppError::AssetService(e));
            }
            if let Err(e) = self.ledger.forget(&[image.asset_id.as_str()]).await {
                tracing::warn!("Released asset {} is still on record: {}", image.asset_id, e);
            }
            tracing::debug!("Released asset {}", image.asset_id);
        }
        Ok(images.len())
    }

    async fn enrich_one(&self, listing: Listing) -> AppResult<ListingView> {
        let mut views = self.enrich(vec![listing]).await?;
        views
            .pop()
            .ok_or_else(|| AppError::Internal("enrichment dropped a listing".into()))
    }

    /// Join owner and category summaries onto each listing, looking each
    /// referenced record up once.
    async fn enrich(&self, listings: Vec<Listing>) -> AppResult<Vec<ListingView>> {
        let mut owners: HashMap<String, Option<OwnerSummary>> = HashMap::new();
        let mut categories: HashMap<String, Option<CategorySummary>> = HashMap::new();

        let mut views = Vec::with_capacity(listings.len());
        for listing in listings {
            if !owners.contains_key(&listing.owner_id) {
                let owner = self
                    .identity
                    .find_active_by_id(&listing.owner_id)
                    .await?
                    .as_ref()
                    .map(OwnerSummary::from);
                owners.insert(listing.owner_id.clone(), owner);
            }
            if !categories.contains_key(&listing.category_id) {
                let category = self
                    .categories
                    .find_by_id(&listing.category_id)
                    .await?
                    .as_ref()
                    .map(CategorySummary::from);
                categories.insert(listing.category_id.clone(), category);
            }

            let owner = owners.get(&listing.owner_id).cloned().flatten();
            let category = categories.get(&listing.category_id).cloned().flatten();
            views.push(ListingView::new(listing, owner, category));
        }
        Ok(views)
    }
}
