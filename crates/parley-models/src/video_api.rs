//! Request and response bodies of the video edge function.
//!
//! Requests carry an `action` discriminator. Media may be given as a
//! retrievable URL or as an inline base64 `data:` URL.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{JobId, JobStatus, VideoJob};

/// Body of `POST /functions/v1/ditto-generate-video`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum VideoFunctionRequest {
    Start(StartVideoRequest),
    Status {
        #[serde(rename = "jobId", alias = "job_id")]
        job_id: JobId,
    },
}

/// Payload of the `start` action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StartVideoRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub figure_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub figure_name: Option<String>,
}

impl StartVideoRequest {
    /// Image reference, preferring inline data over a URL.
    pub fn image(&self) -> Option<&str> {
        non_empty(self.image_data.as_deref()).or(non_empty(self.image_url.as_deref()))
    }

    /// Audio reference, preferring inline data over a URL.
    pub fn audio(&self) -> Option<&str> {
        non_empty(self.audio_data.as_deref()).or(non_empty(self.audio_url.as_deref()))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Response of both the `start` and `status` actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VideoJobResponse {
    pub status: JobStatus,
    #[serde(rename = "jobId")]
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&VideoJob> for VideoJobResponse {
    fn from(job: &VideoJob) -> Self {
        Self {
            status: job.status,
            job_id: job.id.clone(),
            video: job.video_url.clone(),
            error: job.error.clone(),
        }
    }
}
