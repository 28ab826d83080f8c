//! HTTP handlers. Routing and middleware are wired in `app::build_app`.

pub mod admin;
pub mod system;
