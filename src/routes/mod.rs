pub mod auth;
pub mod feed;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::storage::IMAGES_DIR;

/// The full HTTP surface: feed API, live updates, session logout and the
/// stored images.
pub fn app(state: AppState) -> Router {
    let images = ServeDir::new(state.config.uploads_path().join(IMAGES_DIR));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .merge(feed::router())
        .merge(auth::router())
        .nest_service("/images", images)
        .layer(DefaultBodyLimit::max(state.config.feed.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
