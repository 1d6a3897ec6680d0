//! Talking-video job records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a video job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle of a video job.
///
/// `Initiating` is also accepted as `pending`, the name the client-side
/// pipeline uses for a chunk that has not been submitted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Row created, media not yet resolved
    #[default]
    #[serde(alias = "pending")]
    Initiating,
    /// Media resolved, submission to the provider in progress
    Generating,
    /// Provider accepted the job, waiting on the poller
    Processing,
    /// Video is available
    Completed,
    /// Provider failure, submission failure or poll timeout
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Initiating => "initiating",
            JobStatus::Generating => "generating",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Initiating => 0,
            JobStatus::Generating => 1,
            JobStatus::Processing => 2,
            JobStatus::Completed | JobStatus::Failed => 3,
        }
    }

    /// Transitions only move forward; terminal states absorb everything.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid job transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// A talking-video generation job, as persisted in the `video_jobs` table.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoJob {
    pub id: JobId,
    pub status: JobStatus,
    /// Retrievable URL of the reference portrait
    pub image_url: String,
    /// Retrievable URL of the speech track
    pub audio_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub figure_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub figure_name: Option<String>,
    /// Opaque handle returned by the provider for async jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoJob {
    /// Create a new job in the `initiating` state.
    pub fn new(image_url: impl Into<String>, audio_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            status: JobStatus::Initiating,
            image_url: image_url.into(),
            audio_url: audio_url.into(),
            figure_id: None,
            figure_name: None,
            provider_job_id: None,
            video_url: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach figure metadata.
    pub fn with_figure(mut self, figure_id: Option<String>, figure_name: Option<String>) -> Self {
        self.figure_id = figure_id;
        self.figure_name = figure_name;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn advance(&mut self, next: JobStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Media resolved, about to call the provider.
    pub fn mark_generating(&mut self) -> Result<(), InvalidTransition> {
        self.advance(JobStatus::Generating)
    }

    /// Provider accepted the job and returned a handle.
    pub fn mark_processing(&mut self, handle: impl Into<String>) -> Result<(), InvalidTransition> {
        self.advance(JobStatus::Processing)?;
        self.provider_job_id = Some(handle.into());
        Ok(())
    }

    /// Mark job as completed with the generated video.
    pub fn complete(&mut self, video_url: impl Into<String>) -> Result<(), InvalidTransition> {
        self.advance(JobStatus::Completed)?;
        self.video_url = Some(video_url.into());
        Ok(())
    }

    /// Mark job as failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), InvalidTransition> {
        self.advance(JobStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }
}
