//! Pipeline metrics.

use metrics::{counter, gauge, histogram};

pub mod names {
    /// Chunk outcomes by kind (ready, failed, timed_out).
    pub const CHUNKS_TOTAL: &str = "parley_pipeline_chunks_total";

    /// Chunks currently submitted and not yet terminal.
    pub const CHUNKS_IN_FLIGHT: &str = "parley_pipeline_chunks_in_flight";

    /// Time from submission to a terminal poll.
    pub const CHUNK_LATENCY_SECONDS: &str = "parley_pipeline_chunk_latency_seconds";

    /// Preloader cache lookups by result (hit, miss).
    pub const PRELOAD_LOOKUPS_TOTAL: &str = "parley_pipeline_preload_lookups_total";
}

pub fn record_chunk_outcome(outcome: &'static str) {
    counter!(names::CHUNKS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn set_chunks_in_flight(n: usize) {
    gauge!(names::CHUNKS_IN_FLIGHT).set(n as f64);
}

pub fn record_chunk_latency(secs: f64) {
    histogram!(names::CHUNK_LATENCY_SECONDS).record(secs);
}

pub fn record_preload_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!(names::PRELOAD_LOOKUPS_TOTAL, "result" => result).increment(1);
}
