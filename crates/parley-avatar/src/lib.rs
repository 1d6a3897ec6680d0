//! Client for the talking-avatar video provider.
//!
//! This crate provides:
//! - Job submission returning either an immediate video or a job handle
//! - Status polling with typed, validated provider responses
//! - A WebSocket session for real-time avatar frame streaming

pub mod client;
pub mod error;
pub mod stream;
pub mod types;

pub use client::{AvatarClient, AvatarConfig};
pub use error::{AvatarError, AvatarResult};
pub use stream::{StreamReceiver, StreamSender, StreamSession};
pub use types::{GenerateRequest, JobHandle, JobPoll, Submission};
