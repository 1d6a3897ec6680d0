//! Repository for the `video_jobs` table.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tracing::info;

use parley_models::{JobId, JobStatus, VideoJob};

use crate::client::DbClient;
use crate::error::DbResult;

const TABLE: &str = "video_jobs";

/// Mutable columns written by the background poller.
#[derive(Debug, Serialize)]
struct JobPatch<'a> {
    status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider_job_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    updated_at: DateTime<Utc>,
}

impl<'a> From<&'a VideoJob> for JobPatch<'a> {
    fn from(job: &'a VideoJob) -> Self {
        Self {
            status: job.status,
            provider_job_id: job.provider_job_id.as_deref(),
            video_url: job.video_url.as_deref(),
            error: job.error.as_deref(),
            updated_at: job.updated_at,
        }
    }
}

/// Repository for video job rows.
#[derive(Clone)]
pub struct VideoJobRepository {
    client: DbClient,
}

impl VideoJobRepository {
    pub fn new(client: DbClient) -> Self {
        Self { client }
    }

    /// Insert a new job row.
    pub async fn create(&self, job: &VideoJob) -> DbResult<VideoJob> {
        let stored: VideoJob = self.client.insert(TABLE, job).await?;
        counter!("parley_video_jobs_created_total").increment(1);
        info!(job_id = %job.id, "Created video job row");
        Ok(stored)
    }

    /// Get a job by ID.
    pub async fn get(&self, id: &JobId) -> DbResult<Option<VideoJob>> {
        self.client.select_one(TABLE, "id", id.as_str()).await
    }

    /// Persist the mutable columns of a job.
    pub async fn save_status(&self, job: &VideoJob) -> DbResult<()> {
        self.client
            .update(TABLE, "id", job.id.as_str(), &JobPatch::from(job))
            .await
    }
}
