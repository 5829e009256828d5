// Account handlers: registration, login and public profile lookup.
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::tokens::IssuedToken;
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::users::Registration;

// -- Request/Response types --

#[derive(Deserialize, Default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub success: bool,
    pub user: User,
    pub token: String,
    pub expires_at: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub success: bool,
    pub data: User,
}

fn session(user: User, issued: IssuedToken) -> SessionResponse {
    SessionResponse {
        success: true,
        user,
        token: issued.token,
        expires_at: issued.expires_at.to_rfc3339(),
    }
}

async fn issue_for(state: &AppState, user: &User) -> AppResult<IssuedToken> {
    state
        .tokens
        .issue(&user.id, user.role)
        .await
        .map_err(|e| AppError::Internal(format!("token issue failed: {e}")))
}

/// POST /api/v1/users/register
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<Registration>, JsonRejection>,
) -> AppResult<Response> {
    let Json(registration) = payload?;
    let user = state.identity.register(&registration).await?;
    let issued = issue_for(&state, &user).await?;
    Ok((StatusCode::CREATED, Json(session(user, issued))).into_response())
}

/// POST /api/v1/users/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<SessionResponse>> {
    let Json(req) = payload?;
    let user = state
        .identity
        .authenticate(
            req.email.as_deref().unwrap_or_default(),
            req.password.as_deref().unwrap_or_default(),
        )
        .await?;
    let issued = issue_for(&state, &user).await?;
    Ok(Json(session(user, issued)))
}

/// GET /api/v1/users/{id}
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<UserResponse>> {
    let user = state
        .identity
        .find_active_by_id(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(UserResponse {
        success: true,
        data: user,
    }))
}
