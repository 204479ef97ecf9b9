use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};

use crate::auth::session;
use crate::error::AppResult;
use crate::extractors::{bearer_token, CurrentUser};
use crate::routes::feed::MessageResponse;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/auth/logout", post(logout))
}

/// Revoke the session token the request was made with.
async fn logout(
    State(state): State<AppState>,
    user: CurrentUser,
    headers: HeaderMap,
) -> AppResult<Json<MessageResponse>> {
    if let Some(token) = bearer_token(&headers) {
        session::delete_session(&state.db, token)?;
        tracing::info!(user = %user.id, "Session revoked");
    }
    Ok(Json(MessageResponse {
        message: "Logged out",
    }))
}
