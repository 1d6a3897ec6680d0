//! Single-shot talking video generation.

use std::sync::Arc;

use parley_avatar::Submission;
use parley_models::FigureRef;
use tracing::{info, info_span, warn, Instrument};

use crate::error::PipelineResult;
use crate::poll::{poll_until, PollOutcome, PollPolicy};
use crate::synth::{probe_once, VideoSynthesizer};

/// Final state of one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoOutcome {
    Ready { video_url: String },
    Failed { error: String },
    TimedOut { attempts: u32 },
}

impl From<PollOutcome<String, String>> for VideoOutcome {
    fn from(outcome: PollOutcome<String, String>) -> Self {
        match outcome {
            PollOutcome::Ready(video_url) => VideoOutcome::Ready { video_url },
            PollOutcome::Failed(error) => VideoOutcome::Failed { error },
            PollOutcome::TimedOut { attempts } => VideoOutcome::TimedOut { attempts },
        }
    }
}

impl VideoOutcome {
    pub fn video_url(&self) -> Option<&str> {
        match self {
            VideoOutcome::Ready { video_url } => Some(video_url),
            _ => None,
        }
    }
}

/// Generates one video for a whole clip.
pub struct TalkingVideo<S: ?Sized> {
    synth: Arc<S>,
    policy: PollPolicy,
}

impl<S> TalkingVideo<S>
where
    S: VideoSynthesizer + ?Sized,
{
    pub fn new(synth: Arc<S>, policy: PollPolicy) -> Self {
        Self { synth, policy }
    }

    /// Submit and wait for the result.
    ///
    /// Submission errors are returned as `Err` so callers can tell quota and
    /// rate limits apart from a failed generation.
    pub async fn generate(
        &self,
        image_url: &str,
        audio_url: &str,
        figure: &FigureRef,
    ) -> PipelineResult<VideoOutcome> {
        let span = info_span!("talking_video", figure = %figure.label());
        self.generate_inner(image_url, audio_url, figure)
            .instrument(span)
            .await
    }

    async fn generate_inner(
        &self,
        image_url: &str,
        audio_url: &str,
        figure: &FigureRef,
    ) -> PipelineResult<VideoOutcome> {
        let handle = match self.synth.submit(image_url, audio_url, figure).await? {
            Submission::Immediate { video_url } => {
                info!("Video returned on submission");
                return Ok(VideoOutcome::Ready { video_url });
            }
            Submission::Pending { handle } => handle,
        };

        let synth = self.synth.as_ref();
        let handle = &handle;
        let outcome: VideoOutcome = poll_until(&self.policy, |_| probe_once(synth, handle))
            .await
            .into();

        match &outcome {
            VideoOutcome::Ready { .. } => info!(handle = %handle, "Video ready"),
            VideoOutcome::Failed { error } => warn!(handle = %handle, "Video failed: {}", error),
            VideoOutcome::TimedOut { attempts } => {
                warn!(handle = %handle, attempts, "Video timed out")
            }
        }
        Ok(outcome)
    }
}
