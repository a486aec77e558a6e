//! HTTP API server for Keel, a CDN control plane.
//!
//! This crate provides the HTTP surface over the metadata store:
//! - Profiles: CRUD with conditional requests, copy, export and import
//! - Parameters and profile-parameter associations
//! - CDNs and the locks users hold on them
//! - Token authentication, roles and the bootstrap admin token
//! - Prometheus metrics

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use auth::TraceId;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
