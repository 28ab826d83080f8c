//! Infrastructure layer: state store backends and configuration.

pub mod config;
pub mod state_store;
