//! Concurrency limiter and playback sequencer for chunked synthesis.
//!
//! At most `concurrency` chunks are in flight (submitted, not yet terminal).
//! Results are released strictly in chunk order: a slow early chunk holds
//! back every later one even if those are already done.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parley_avatar::{JobHandle, Submission};
use parley_models::{AudioChunk, FigureRef};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::metrics;
use crate::poll::{PollPolicy, Probe};
use crate::registry::JobRegistry;
use crate::synth::{probe_once, VideoSynthesizer};

/// Scheduler limits.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Maximum chunks in flight
    pub concurrency: usize,
    /// Poll interval and per-chunk attempt budget
    pub poll: PollPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            poll: PollPolicy::default(),
        }
    }
}

/// Result for one chunk, delivered in index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkEvent {
    Ready {
        index: usize,
        video_url: String,
    },
    /// Submission or generation failed; `audio` allows audio-only playback
    Failed {
        index: usize,
        error: String,
        audio: AudioChunk,
    },
    /// Poll budget exhausted; `audio` allows audio-only playback
    TimedOut { index: usize, audio: AudioChunk },
}

impl ChunkEvent {
    pub fn index(&self) -> usize {
        match self {
            ChunkEvent::Ready { index, .. }
            | ChunkEvent::Failed { index, .. }
            | ChunkEvent::TimedOut { index, .. } => *index,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ChunkEvent::Ready { .. })
    }
}

/// Summary of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    pub total: usize,
    pub ready: usize,
    pub failed: usize,
    pub timed_out: usize,
    /// Largest number of chunks observed in flight at once
    pub max_in_flight: usize,
    /// The event receiver went away before every chunk was delivered
    pub cancelled: bool,
}

enum Completion {
    Ready(String),
    Failed(String),
    TimedOut,
}

/// Drives a list of chunks through a synthesizer.
///
/// Each `run` tracks its own in-flight jobs, so one scheduler can serve
/// several concurrent runs.
pub struct ChunkScheduler<S: ?Sized> {
    synth: Arc<S>,
    config: SchedulerConfig,
}

impl<S> ChunkScheduler<S>
where
    S: VideoSynthesizer + ?Sized + 'static,
{
    pub fn new(synth: Arc<S>, config: SchedulerConfig) -> Self {
        Self { synth, config }
    }

    /// Run on a background task, returning the ordered event stream.
    pub fn spawn(
        self,
        chunks: Vec<AudioChunk>,
        image_url: String,
        figure: FigureRef,
    ) -> (mpsc::Receiver<ChunkEvent>, JoinHandle<ScheduleReport>) {
        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        let handle = tokio::spawn(async move { self.run(chunks, &image_url, &figure, tx).await });
        (rx, handle)
    }

    /// Submit, poll and release chunks in order until all are delivered or
    /// the receiver is dropped. Jobs still running at the provider when the
    /// receiver goes away are abandoned, not cancelled.
    pub async fn run(
        &self,
        chunks: Vec<AudioChunk>,
        image_url: &str,
        figure: &FigureRef,
        events: mpsc::Sender<ChunkEvent>,
    ) -> ScheduleReport {
        let total = chunks.len();
        let span = info_span!("chunk_schedule", figure = %figure.label(), total);
        self.run_inner(chunks, image_url, figure, events)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        chunks: Vec<AudioChunk>,
        image_url: &str,
        figure: &FigureRef,
        events: mpsc::Sender<ChunkEvent>,
    ) -> ScheduleReport {
        let total = chunks.len();
        let concurrency = self.config.concurrency.max(1);
        let mut report = ScheduleReport {
            total,
            ..Default::default()
        };

        let in_flight: JobRegistry<usize, JobHandle> = JobRegistry::new();
        let mut next_submit = 0usize;
        let mut playback = 0usize;
        let mut completed: HashMap<usize, Completion> = HashMap::new();
        let mut attempts: HashMap<usize, u32> = HashMap::new();
        let mut submitted_at: HashMap<usize, Instant> = HashMap::new();

        info!(concurrency, "Starting chunked synthesis");

        while playback < total {
            if events.is_closed() {
                info!(delivered = playback, "Receiver dropped, stopping");
                report.cancelled = true;
                metrics::set_chunks_in_flight(0);
                return report;
            }

            // Fill free slots.
            while in_flight.len() < concurrency && next_submit < total {
                let index = next_submit;
                next_submit += 1;

                match self.synth.submit(image_url, &chunks[index].data_url, figure).await {
                    Ok(Submission::Immediate { video_url }) => {
                        debug!(index, "Chunk produced immediately");
                        completed.insert(index, Completion::Ready(video_url));
                    }
                    Ok(Submission::Pending { handle }) => {
                        debug!(index, handle = %handle, "Chunk submitted");
                        match in_flight.try_register(index, handle) {
                            Ok(()) => {
                                attempts.insert(index, 0);
                                submitted_at.insert(index, Instant::now());
                            }
                            Err(_) => {
                                warn!(index, "Chunk already in flight");
                                completed.insert(index, Completion::Failed("duplicate in-flight chunk".into()));
                            }
                        }
                    }
                    Err(e) => {
                        warn!(index, "Chunk submission failed: {}", e);
                        completed.insert(index, Completion::Failed(e.to_string()));
                    }
                }

                report.max_in_flight = report.max_in_flight.max(in_flight.len());
                metrics::set_chunks_in_flight(in_flight.len());
            }

            // Release everything that is ready at the playback cursor.
            let mut released = false;
            while let Some(done) = completed.remove(&playback) {
                let audio = &chunks[playback];
                let event = match done {
                    Completion::Ready(video_url) => {
                        report.ready += 1;
                        metrics::record_chunk_outcome("ready");
                        ChunkEvent::Ready {
                            index: playback,
                            video_url,
                        }
                    }
                    Completion::Failed(error) => {
                        report.failed += 1;
                        metrics::record_chunk_outcome("failed");
                        ChunkEvent::Failed {
                            index: playback,
                            error,
                            audio: audio.clone(),
                        }
                    }
                    Completion::TimedOut => {
                        report.timed_out += 1;
                        metrics::record_chunk_outcome("timed_out");
                        ChunkEvent::TimedOut {
                            index: playback,
                            audio: audio.clone(),
                        }
                    }
                };

                if events.send(event).await.is_err() {
                    info!(delivered = playback, "Receiver dropped, stopping");
                    report.cancelled = true;
                    metrics::set_chunks_in_flight(0);
                    return report;
                }
                playback += 1;
                released = true;
            }

            if released || playback >= total {
                continue;
            }

            // Head of line is not done: wait, then poll each in-flight job once.
            tokio::time::sleep(self.config.poll.interval).await;

            let mut live = in_flight.snapshot();
            live.sort_by_key(|(index, _)| *index);

            for (index, handle) in live {
                let attempt = attempts.entry(index).or_insert(0);
                *attempt += 1;

                let outcome = match probe_once(self.synth.as_ref(), &handle).await {
                    Probe::Ready(url) => Some(Completion::Ready(url)),
                    Probe::Failed(error) => Some(Completion::Failed(error)),
                    Probe::Pending if *attempt >= self.config.poll.max_attempts => {
                        warn!(index, attempts = *attempt, "Chunk timed out");
                        Some(Completion::TimedOut)
                    }
                    Probe::Pending => None,
                };

                if let Some(outcome) = outcome {
                    in_flight.deregister(&index);
                    if let Some(started) = submitted_at.remove(&index) {
                        metrics::record_chunk_latency(started.elapsed().as_secs_f64());
                    }
                    completed.insert(index, outcome);
                }
            }
            metrics::set_chunks_in_flight(in_flight.len());
        }

        info!(
            ready = report.ready,
            failed = report.failed,
            timed_out = report.timed_out,
            max_in_flight = report.max_in_flight,
            "Chunked synthesis finished"
        );
        report
    }
}
