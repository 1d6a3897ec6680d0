//! Edge-function server for the avatar backend.
//!
//! This crate provides:
//! - The video function (`start` / `status`) with background completion polling
//! - The media cache function for portraits, scenes and cloned voices
//! - A WebSocket proxy to the streaming avatar provider
//! - Rate limiting, security headers and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod poller;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use logging::JobLogger;
pub use poller::VideoPoller;
pub use routes::create_router;
pub use state::AppState;
