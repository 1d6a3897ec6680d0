//! Shared data models for the Parley avatar backend.
//!
//! This crate provides Serde-serializable types for:
//! - Talking-video jobs and their status machine
//! - Audio chunks produced for chunked video synthesis
//! - Media cache rows (portraits, scenes, cloned voices)
//! - Avatar streaming WebSocket message schemas
//! - Video edge-function request and response bodies

pub mod audio;
pub mod cache;
pub mod figure;
pub mod job;
pub mod stream;
pub mod video_api;

// Re-export common types
pub use audio::AudioChunk;
pub use cache::{CacheRow, CachedPortrait, CachedScene, ClonedVoice};
pub use figure::FigureRef;
pub use job::{InvalidTransition, JobId, JobStatus, VideoJob};
pub use stream::{StreamClientMessage, StreamServerMessage};
pub use video_api::{StartVideoRequest, VideoFunctionRequest, VideoJobResponse};
