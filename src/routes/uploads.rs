use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::storage::validate_asset_id;

pub fn router(config: &Config) -> Router<AppState> {
    let prefix = config.storage.public_prefix.trim_end_matches('/');
    Router::new().route(&format!("{prefix}/{{asset_id}}"), get(serve))
}

/// Serve a stored listing image straight from the uploads directory.
pub async fn serve(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
) -> AppResult<Response> {
    let not_found = || AppError::NotFound("Image not found".into());
    validate_asset_id(&asset_id).map_err(|_| not_found())?;

    let path = state.config.uploads_path().join(&asset_id);
    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(AppError::Internal(format!("reading {}: {e}", path.display()))),
    };

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
        ],
        data,
    )
        .into_response())
}
