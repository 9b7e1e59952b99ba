//! Concierge HTTP service: configuration, wiring and routes.

pub mod bootstrap;
pub mod config;
pub mod server;
