//! Axum HTTP API server.
//!
//! This crate provides:
//! - `POST /api/generate-video` rendering placeholder videos on demand
//! - Static serving of generated videos under a configurable public path
//! - The background expiry sweeper
//! - Security headers, request ids and Prometheus metrics
//!
//! Every accepted generation request spawns its own encoder immediately;
//! there is no queue or concurrency cap.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::ExpirySweeperService;
pub use state::AppState;
