//! Chunked talking-video generation.
//!
//! This crate provides:
//! - WAV chunking into independently decodable slices
//! - A poll-until-done utility driven by an explicit policy
//! - A job registry for in-flight work
//! - The chunk scheduler: at most K jobs in flight, results in strict order
//! - Single-shot generation, video preloading and the edge-function client

pub mod chunker;
pub mod config;
pub mod error;
pub mod function_client;
pub mod metrics;
pub mod poll;
pub mod preloader;
pub mod registry;
pub mod scheduler;
pub mod synth;
pub mod talking;

#[cfg(test)]
mod testing;

pub use chunker::{AudioTrack, ChunkPolicy};
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use function_client::{FunctionClient, FunctionConfig};
pub use poll::{poll_until, Backoff, PollOutcome, PollPolicy, Probe};
pub use preloader::{PreloadConfig, VideoPreloader};
pub use registry::JobRegistry;
pub use scheduler::{ChunkEvent, ChunkScheduler, ScheduleReport, SchedulerConfig};
pub use synth::{probe_once, StoredMediaSynthesizer, VideoSynthesizer};
pub use talking::{TalkingVideo, VideoOutcome};
