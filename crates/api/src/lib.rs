//! HTTP request gate: authentication, permission guards and admin routes.

pub mod app;
pub mod context;
pub mod cors;
pub mod middleware;
pub mod request_id;
