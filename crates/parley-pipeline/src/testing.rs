//! Scripted synthesizer for scheduler and talking-video tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use parley_avatar::{AvatarError, JobHandle, JobPoll, Submission};
use parley_models::{AudioChunk, FigureRef};

use crate::error::PipelineResult;
use crate::synth::VideoSynthesizer;

/// Behaviour of one audio clip, keyed by its URL.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Plan {
    Immediate,
    ReadyAfter(u32),
    FailAfter(u32),
    RejectSubmit,
    Never,
}

#[derive(Debug, Default)]
struct FakeState {
    polls: HashMap<String, u32>,
    in_flight: usize,
    max_in_flight: usize,
    log: Vec<String>,
}

pub(crate) struct FakeSynth {
    plans: HashMap<String, Plan>,
    state: Mutex<FakeState>,
}

impl FakeSynth {
    pub(crate) fn new(plans: impl IntoIterator<Item = (String, Plan)>) -> Self {
        Self {
            plans: plans.into_iter().collect(),
            state: Mutex::new(FakeState::default()),
        }
    }

    pub(crate) fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }

    fn plan(&self, audio_url: &str) -> Plan {
        self.plans.get(audio_url).copied().unwrap_or(Plan::ReadyAfter(1))
    }
}

/// Chunks whose payload is just `chunk-<i>`.
pub(crate) fn fake_chunks(n: usize) -> Vec<AudioChunk> {
    (0..n)
        .map(|i| AudioChunk {
            index: i,
            data_url: format!("chunk-{}", i),
            start_offset_ms: i as u64 * 5000,
            duration_ms: 5000,
        })
        .collect()
}

#[async_trait]
impl VideoSynthesizer for FakeSynth {
    async fn submit(&self, _image_url: &str, audio_url: &str, _figure: &FigureRef) -> PipelineResult<Submission> {
        let plan = self.plan(audio_url);
        let mut state = self.state.lock().unwrap();
        state.log.push(format!("submit {}", audio_url));

        match plan {
            Plan::Immediate => Ok(Submission::Immediate {
                video_url: format!("video-{}", audio_url),
            }),
            Plan::RejectSubmit => Err(AvatarError::from_status(402, "out of credits").into()),
            _ => {
                state.in_flight += 1;
                state.max_in_flight = state.max_in_flight.max(state.in_flight);
                Ok(Submission::Pending {
                    handle: JobHandle::new(audio_url),
                })
            }
        }
    }

    async fn poll(&self, handle: &JobHandle) -> PipelineResult<JobPoll> {
        let plan = self.plan(handle.as_str());
        let mut state = self.state.lock().unwrap();
        let count = {
            let count = state.polls.entry(handle.as_str().to_string()).or_default();
            *count += 1;
            *count
        };

        let poll = match plan {
            Plan::ReadyAfter(n) if count >= n => JobPoll::Completed {
                video_url: format!("video-{}", handle),
            },
            Plan::FailAfter(n) if count >= n => JobPoll::Failed {
                error: "no face detected".into(),
            },
            _ => JobPoll::Pending,
        };

        if poll.is_terminal() {
            state.in_flight -= 1;
            state.log.push(format!("done {}", handle));
        }
        Ok(poll)
    }
}

