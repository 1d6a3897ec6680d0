//! Pipeline configuration.

use std::time::Duration;

use crate::chunker::ChunkPolicy;
use crate::poll::PollPolicy;
use crate::preloader::PreloadConfig;
use crate::scheduler::SchedulerConfig;

/// Settings for chunked generation.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub chunk: ChunkPolicy,
    pub scheduler: SchedulerConfig,
    pub preload: PreloadConfig,
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let concurrency = std::env::var("CHUNK_CONCURRENCY")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|k: &usize| *k > 0)
            .unwrap_or(2);
        let chunk_ms = std::env::var("CHUNK_DURATION_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|ms: &u64| *ms > 0)
            .unwrap_or(5000);

        Self {
            chunk: ChunkPolicy::new(Duration::from_millis(chunk_ms)),
            scheduler: SchedulerConfig {
                concurrency,
                poll: PollPolicy::from_env(),
            },
            preload: PreloadConfig {
                max_concurrent: concurrency,
                ..PreloadConfig::default()
            },
        }
    }
}
