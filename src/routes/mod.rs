pub mod categories;
pub mod houses;
pub mod uploads;
pub mod users;

use axum::middleware;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::error::{expose_error_details, AppError};
use crate::state::AppState;

/// The full HTTP surface, ready to serve.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(users::router())
        .merge(houses::router(&state.config))
        .merge(categories::router())
        .merge(uploads::router(&state.config))
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    expose_error_details,
                )),
        )
        .with_state(state)
}

async fn not_found() -> AppError {
    AppError::NotFound("Route not found".into())
}
