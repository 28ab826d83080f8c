//! Administrative writes to the state store.
//!
//! Both routes take effect on the target's next request: deactivation within
//! the status freshness window, forced logout for every token issued before
//! the call.

use axum::{
    Json,
    extract::{Extension, Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use serde::Deserialize;
use serde_json::json;

use authgate_auth::{StoreError, SubjectId};

use crate::app::AppState;
use crate::app::errors::{bad_request, json_error, json_ok, request_id};
use crate::context::AuthContext;

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub is_active: bool,
}

pub async fn set_status(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthContext>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<SetStatusRequest>, JsonRejection>,
) -> Response {
    let rid = request_id(&headers);
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(&rejection.body_text(), rid),
    };
    let Some(subject) = target(user_id) else {
        return bad_request("user id must not be empty", rid);
    };

    if let Err(err) = state.writer.set_account_status(&subject, body.is_active).await {
        return store_failure(&err, rid);
    }

    tracing::info!(
        admin_id = %admin.user_id(),
        user_id = %subject,
        is_active = body.is_active,
        "account status updated"
    );
    json_ok(
        json!({ "user_id": subject, "is_active": body.is_active }),
        rid,
    )
}

pub async fn force_logout(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthContext>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let rid = request_id(&headers);
    let Some(subject) = target(user_id) else {
        return bad_request("user id must not be empty", rid);
    };

    if let Err(err) = state.writer.set_force_logout_marker(&subject).await {
        return store_failure(&err, rid);
    }

    tracing::info!(
        admin_id = %admin.user_id(),
        user_id = %subject,
        "forced logout recorded"
    );
    json_ok(json!({ "user_id": subject, "force_logout": true }), rid)
}

fn target(user_id: String) -> Option<SubjectId> {
    let subject = SubjectId::new(user_id);
    (!subject.is_blank()).then_some(subject)
}

fn store_failure(err: &StoreError, rid: Option<&str>) -> Response {
    tracing::error!(error = %err, kind = err.kind(), "state store write failed");
    json_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "SERVICE_UNAVAILABLE",
        "State store unavailable",
        rid,
    )
}
