use axum::{
    extract::{Extension, State},
    http::HeaderMap,
    response::Response,
};
use serde_json::json;

use crate::app::AppState;
use crate::app::errors::{json_ok, request_id};
use crate::context::AuthContext;

/// Liveness plus the fallback counters, so a degraded store shows up here
/// even though requests keep succeeding.
pub async fn health(
    State(state): State<AppState>,
    caller: Option<Extension<AuthContext>>,
    headers: HeaderMap,
) -> Response {
    json_ok(
        json!({
            "status": "ok",
            "authenticated": caller.is_some(),
            "fallbacks": state.resolver.fallback_stats(),
        }),
        request_id(&headers),
    )
}

pub async fn whoami(Extension(context): Extension<AuthContext>, headers: HeaderMap) -> Response {
    json_ok(
        json!({
            "user_id": context.user_id(),
            "username": context.username(),
            "email": context.email(),
            "roles": context.roles(),
            "permissions": context.permissions(),
            "token_id": context.token_id(),
        }),
        request_id(&headers),
    )
}
