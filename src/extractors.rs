use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use crate::auth::guard::{AuthGuard, Caller};
use crate::error::AppError;
use crate::state::AppState;

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Caller);

/// Extractor that requires a valid bearer token for an active user.
/// The token is verified on every request; nothing is cached.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let authorization = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        let caller = AuthGuard::new(state.tokens.as_ref(), &state.identity)
            .resolve(authorization)
            .await?;

        Ok(CurrentUser(caller))
    }
}
