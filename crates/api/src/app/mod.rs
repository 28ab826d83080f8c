//! HTTP application wiring (Axum router + middleware stack).
//!
//! - `services.rs`: builds [`AppState`] from configuration (verifier, store)
//! - `routes/`: HTTP handlers
//! - `errors.rs`: response envelopes

use std::any::Any;
use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::Response,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::field::Empty;

use authgate_auth::{AuthorizationResolver, PermissionMatcher, StateWriter};

use crate::cors::{CorsPolicy, preflight_no_content};
use crate::middleware::{self, AuthState, PermissionGuard};
use crate::request_id::{self, MakeRequestUuidV7};

pub mod errors;
pub mod routes;
pub mod services;

/// Everything the router needs; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<AuthorizationResolver>,
    pub writer: Arc<dyn StateWriter>,
    pub matcher: Arc<PermissionMatcher>,

    /// Required by every `/admin` route.
    pub admin_permission: String,

    pub cors: CorsPolicy,
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(state: AppState) -> Router {
    let auth_state = AuthState {
        resolver: state.resolver.clone(),
    };
    let admin_guard = PermissionGuard::require(state.matcher.clone(), state.admin_permission.clone());

    // The last route_layer runs first: auth attaches the context the guard reads.
    let admin = Router::new()
        .route("/users/:id/status", put(routes::admin::set_status))
        .route("/users/:id/force-logout", post(routes::admin::force_logout))
        .route_layer(from_fn_with_state(admin_guard, middleware::permission_guard))
        .route_layer(from_fn_with_state(auth_state.clone(), middleware::auth_middleware));

    let authenticated = Router::new()
        .route("/whoami", get(routes::system::whoami))
        .route_layer(from_fn_with_state(auth_state.clone(), middleware::auth_middleware));

    let public = Router::new()
        .route("/health", get(routes::system::health))
        .route_layer(from_fn_with_state(auth_state, middleware::optional_auth_middleware));

    let request_id_header = request_id::header();

    // Outermost first: assign the request id, echo it back, then open the span.
    let observability = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(
            request_id_header.clone(),
            MakeRequestUuidV7,
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<axum::body::Body>| {
                    let rid = errors::request_id(req.headers()).unwrap_or("n/a");
                    tracing::info_span!(
                        "http_request",
                        method = %req.method(),
                        path = %req.uri().path(),
                        request_id = %rid,
                        subject_id = Empty,
                        status = Empty,
                        latency_ms = Empty,
                    )
                })
                .on_response(
                    |res: &Response, latency: std::time::Duration, span: &tracing::Span| {
                        span.record("status", res.status().as_u16());
                        span.record("latency_ms", latency.as_millis() as u64);
                    },
                ),
        );

    // `Router::layer` wraps outward: the last layer added runs first.
    Router::new()
        .merge(public)
        .merge(authenticated)
        .nest("/admin", admin)
        .with_state(state.clone())
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(state.cors.layer())
        .layer(from_fn(preflight_no_content))
        .layer(observability)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    tracing::error!(panic = detail, "panic recovered");

    errors::json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_SERVER_ERROR",
        "An unexpected error occurred",
        None,
    )
}
