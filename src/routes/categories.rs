use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::db::models::Category;
use crate::error::AppResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/categories", get(list))
}

#[derive(Serialize)]
pub struct CategoriesResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<Category>,
}

/// GET /api/v1/categories
pub async fn list(State(state): State<AppState>) -> AppResult<Json<CategoriesResponse>> {
    let data = state.categories.list().await?;
    Ok(Json(CategoriesResponse {
        success: true,
        count: data.len(),
        data,
    }))
}
