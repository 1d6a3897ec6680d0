//! Provider request/response types.
//!
//! Provider bodies are decoded into sum types tagged by `status`. A body that
//! matches none of the variants is rejected at this boundary instead of being
//! probed field by field.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AvatarError, AvatarResult};

/// Request for a talking-head video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Retrievable URL of the portrait
    pub image_url: String,
    /// Retrievable URL of the speech audio
    pub audio_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub figure_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub figure_name: Option<String>,
}

/// Opaque handle for an asynchronous provider job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(pub String);

impl JobHandle {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Synchronous outcome of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Video produced inline; treated as a zero-latency completed job
    Immediate { video_url: String },
    /// Job accepted; poll with the handle
    Pending { handle: JobHandle },
}

/// One observation of a job's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPoll {
    Pending,
    Completed { video_url: String },
    Failed { error: String },
}

impl JobPoll {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobPoll::Pending)
    }
}

/// Body returned by `POST /v1/talking-video`.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum SubmitResponse {
    Completed { video_url: String },
    Queued { job_id: String },
    Processing { job_id: String },
    Failed { error: String },
}

/// Body returned by `GET /v1/talking-video/{job_id}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum StatusResponse {
    Queued,
    Processing,
    Completed { video_url: String },
    Failed { error: String },
}

impl SubmitResponse {
    pub(crate) fn into_submission(self) -> AvatarResult<Submission> {
        match self {
            SubmitResponse::Completed { video_url } => Ok(Submission::Immediate { video_url }),
            SubmitResponse::Queued { job_id } | SubmitResponse::Processing { job_id } => {
                Ok(Submission::Pending {
                    handle: JobHandle(job_id),
                })
            }
            SubmitResponse::Failed { error } => Err(AvatarError::Upstream {
                status: 200,
                message: error,
            }),
        }
    }
}

impl From<StatusResponse> for JobPoll {
    fn from(response: StatusResponse) -> Self {
        match response {
            StatusResponse::Queued | StatusResponse::Processing => JobPoll::Pending,
            StatusResponse::Completed { video_url } => JobPoll::Completed { video_url },
            StatusResponse::Failed { error } => JobPoll::Failed { error },
        }
    }
}

/// Decode a provider body, turning shape mismatches into a typed error.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(body: &str) -> AvatarResult<T> {
    serde_json::from_str(body).map_err(|e| {
        AvatarError::UnexpectedResponse(format!(
            "{} (body prefix: {})",
            e,
            body.chars().take(200).collect::<String>()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_variants() {
        let immediate: SubmitResponse =
            decode(r#"{"status":"completed","video_url":"https://v/1.mp4"}"#).unwrap();
        assert_eq!(
            immediate.into_submission().unwrap(),
            Submission::Immediate {
                video_url: "https://v/1.mp4".into()
            }
        );

        let queued: SubmitResponse = decode(r#"{"status":"queued","job_id":"j-1"}"#).unwrap();
        assert_eq!(
            queued.into_submission().unwrap(),
            Submission::Pending {
                handle: JobHandle::new("j-1")
            }
        );

        let failed: SubmitResponse = decode(r#"{"status":"failed","error":"no face"}"#).unwrap();
        assert!(failed.into_submission().is_err());
    }

    #[test]
    fn test_unknown_shape_is_rejected() {
        let result: AvatarResult<SubmitResponse> = decode(r#"{"video_path":"/tmp/x.mp4"}"#);
        assert!(matches!(result, Err(AvatarError::UnexpectedResponse(_))));

        // completed without the URL is not silently accepted
        let result: AvatarResult<StatusResponse> = decode(r#"{"status":"completed"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_error_preview_respects_char_boundaries() {
        // 'é' occupies bytes 199..201
        let body = format!("{}é and more", "x".repeat(199));
        let result: AvatarResult<StatusResponse> = decode(&body);
        match result {
            Err(AvatarError::UnexpectedResponse(message)) => {
                assert!(message.ends_with(&format!("{}é)", "x".repeat(199))));
            }
            other => panic!("expected UnexpectedResponse, got {:?}", other),
        }
    }

    #[test]
    fn test_status_to_poll() {
        let poll: JobPoll = decode::<StatusResponse>(r#"{"status":"processing"}"#).unwrap().into();
        assert_eq!(poll, JobPoll::Pending);
        assert!(!poll.is_terminal());
    }
}
