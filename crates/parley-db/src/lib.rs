//! Relational store client.
//!
//! The database is reached through its PostgREST interface. This crate
//! provides:
//! - A REST client with service-key authentication
//! - Upserts with `on_conflict` merge semantics (last writer wins)
//! - Retry with exponential backoff and jitter
//! - Typed repositories for video jobs and media cache rows

pub mod cache;
pub mod client;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod retry;

pub use cache::CacheRepository;
pub use client::{DbClient, DbConfig};
pub use error::{DbError, DbResult};
pub use jobs::VideoJobRepository;
pub use retry::RetryConfig;
