use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::config::Config;
use crate::db::models::{ImageRef, ListingView};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::listings::{ListingInput, ListingPatch, Page, Paginated, SearchParams, SearchQuery, SortKey};
use crate::state::AppState;

pub fn router(config: &Config) -> Router<AppState> {
    // Room for a full batch plus multipart framing
    let upload_limit = config.storage.max_upload_bytes * config.storage.max_files + 64 * 1024;

    Router::new()
        .route(
            "/api/v1/houses/multiple",
            post(upload_images).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/v1/houses", post(create).get(list_all))
        .route("/api/v1/houses/search", get(search))
        .route("/api/v1/houses/id/{id}", get(get_by_id))
        .route("/api/v1/houses/category/{category_id}", get(get_by_category))
        // Reads address listings by slug, mutations by id
        .route(
            "/api/v1/houses/{key}",
            get(get_by_slug).put(update).delete(remove),
        )
}

// -- Response types --

#[derive(Serialize)]
pub struct ListingResponse {
    pub success: bool,
    pub data: ListingView,
}

#[derive(Serialize)]
pub struct ListingsResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<ListingView>,
}

#[derive(Serialize)]
pub struct PageResponse {
    pub success: bool,
    #[serde(flatten)]
    pub page: Paginated<ListingView>,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub results: Vec<ImageRef>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

fn one(data: ListingView) -> Json<ListingResponse> {
    Json(ListingResponse {
        success: true,
        data,
    })
}

fn page(page: Paginated<ListingView>) -> Json<PageResponse> {
    Json(PageResponse {
        success: true,
        page,
    })
}

// -- Handlers --

/// POST /api/v1/houses/multiple: store a batch of images, all or nothing
pub async fn upload_images(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<UploadResponse>> {
    let mut multipart = multipart.map_err(|e| AppError::Validation(e.body_text()))?;
    let max_files = state.config.storage.max_files;
    let mut results: Vec<ImageRef> = Vec::new();

    let outcome: AppResult<()> = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?
        {
            if field.name() != Some("images") {
                continue;
            }
            if results.len() >= max_files {
                return Err(AppError::Validation(format!(
                    "Too many files. At most {max_files} images per upload."
                )));
            }

            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(e.body_text()))?;

            results.push(
                state
                    .listings
                    .store_image(&caller.id, data, &content_type)
                    .await?,
            );
        }
        Ok(())
    }
    .await;

    if let Err(e) = outcome {
        // Drop whatever part of the batch already landed
        state.listings.discard_uploads(&results).await;
        return Err(e);
    }

    if results.is_empty() {
        return Err(AppError::Validation("No images uploaded".into()));
    }

    tracing::info!("{} uploaded {} image(s)", caller.email, results.len());
    Ok(Json(UploadResponse {
        success: true,
        results,
    }))
}

/// POST /api/v1/houses
pub async fn create(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    payload: Result<Json<ListingInput>, JsonRejection>,
) -> AppResult<Response> {
    let Json(input) = payload?;
    let listing = state.listings.create(&caller.id, &input).await?;
    Ok((StatusCode::CREATED, one(listing)).into_response())
}

/// GET /api/v1/houses: every listing, rented ones included
pub async fn list_all(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> AppResult<Json<PageResponse>> {
    let Query(params) = params?;
    let requested = Page::from_params(&params, state.config.search.default_limit)?;
    let sort = SortKey::parse(params.sort.as_deref());
    let listings = state.listings.list_all(requested, sort).await?;
    Ok(page(listings))
}

/// GET /api/v1/houses/search
pub async fn search(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> AppResult<Json<PageResponse>> {
    let Query(params) = params?;
    let query = SearchQuery::from_params(&params, state.config.search.default_limit)?;
    let results = state.listings.search(&query).await?;
    Ok(page(results))
}

/// GET /api/v1/houses/id/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ListingResponse>> {
    Ok(one(state.listings.get_by_id(&id).await?))
}

/// GET /api/v1/houses/{slug}
pub async fn get_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<ListingResponse>> {
    Ok(one(state.listings.get_by_slug(&slug).await?))
}

/// GET /api/v1/houses/category/{category_id}
pub async fn get_by_category(
    State(state): State<AppState>,
    Path(category_id): Path<String>,
) -> AppResult<Json<ListingsResponse>> {
    let data = state.listings.get_by_category(&category_id).await?;
    Ok(Json(ListingsResponse {
        success: true,
        count: data.len(),
        data,
    }))
}

/// PUT /api/v1/houses/{id}
pub async fn update(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<String>,
    payload: Result<Json<ListingPatch>, JsonRejection>,
) -> AppResult<Json<ListingResponse>> {
    let Json(patch) = payload?;
    Ok(one(state.listings.update(&id, &caller.id, &patch).await?))
}

/// DELETE /api/v1/houses/{id}
pub async fn remove(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    state.listings.delete(&id, &caller.id).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: "House listing deleted successfully".into(),
    }))
}
