//! Background completion polling for accepted video jobs.
//!
//! One task runs per job that the provider accepted asynchronously. It polls
//! the provider under a bounded [`PollPolicy`], writes the terminal row and
//! releases the request identity from the in-flight registry.

use std::sync::Arc;
use std::time::Instant;

use parley_avatar::JobHandle;
use parley_db::VideoJobRepository;
use parley_models::VideoJob;
use parley_pipeline::{poll_until, probe_once, PollPolicy, Probe, VideoOutcome, VideoSynthesizer};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::logging::JobLogger;
use crate::metrics;
use crate::state::InFlightJobs;

/// Error stored on a job that never finished within the polling budget.
pub const TIMED_OUT_ERROR: &str = "timed out";

#[derive(Clone)]
pub struct VideoPoller {
    jobs: VideoJobRepository,
    synth: Arc<dyn VideoSynthesizer>,
    in_flight: Arc<InFlightJobs>,
    policy: PollPolicy,
}

impl VideoPoller {
    pub fn new(
        jobs: VideoJobRepository,
        synth: Arc<dyn VideoSynthesizer>,
        in_flight: Arc<InFlightJobs>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            jobs,
            synth,
            in_flight,
            policy,
        }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Poll `job` in the background until it is terminal.
    ///
    /// `key` is the request identity registered for the job.
    pub fn spawn(&self, job: VideoJob, handle: JobHandle, key: String) -> JoinHandle<VideoJob> {
        let poller = self.clone();
        let span = JobLogger::new(&job.id, "video_poll").create_span();
        tokio::spawn(async move { poller.run(job, handle, key).await }.instrument(span))
    }

    /// Poll to completion and return the terminal job.
    pub async fn run(&self, mut job: VideoJob, handle: JobHandle, key: String) -> VideoJob {
        let logger = JobLogger::new(&job.id, "video_poll");
        logger.log_start(&format!(
            "polling {} every {:?}, at most {} attempts",
            handle,
            self.policy.interval,
            self.policy.max_attempts
        ));
        let started = Instant::now();

        let synth = self.synth.as_ref();
        let handle = &handle;
        let logger_ref = &logger;
        let outcome: VideoOutcome = poll_until(&self.policy, |attempt| async move {
            let probe = probe_once(synth, handle).await;
            if matches!(probe, Probe::Pending) && attempt % 10 == 0 {
                logger_ref.log_progress(&format!("still processing after {} polls", attempt));
            }
            probe
        })
        .await
        .into();

        let (transition, label) = match &outcome {
            VideoOutcome::Ready { video_url } => (job.complete(video_url.clone()), "completed"),
            VideoOutcome::Failed { error } => (job.fail(error.clone()), "failed"),
            VideoOutcome::TimedOut { .. } => (job.fail(TIMED_OUT_ERROR), "timed_out"),
        };

        match transition {
            Ok(()) => self.persist(&job, &logger).await,
            Err(e) => logger.log_warning(&format!("terminal state not applied: {}", e)),
        }

        self.in_flight.deregister(&key);
        metrics::record_video_job_finished(label, started.elapsed().as_secs_f64());

        match &outcome {
            VideoOutcome::Ready { video_url } => logger.log_completion(video_url),
            VideoOutcome::Failed { error } => logger.log_error(error),
            VideoOutcome::TimedOut { attempts } => {
                logger.log_error(&format!("no result after {} polls", attempts))
            }
        }
        job
    }

    /// Write the terminal row. The final write is retried once more on top of
    /// the client's own retries before giving up.
    async fn persist(&self, job: &VideoJob, logger: &JobLogger) {
        for attempt in 1..=2 {
            match self.jobs.save_status(job).await {
                Ok(()) => return,
                Err(e) => logger.log_warning(&format!("saving {} status failed (attempt {}): {}", job.status, attempt, e)),
            }
        }
        logger.log_error("terminal status was not persisted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_avatar::{AvatarClient, AvatarConfig};
    use parley_db::{DbClient, DbConfig, RetryConfig};
    use parley_models::{JobId, JobStatus};
    use std::time::Duration;
    use tokio_test::assert_ok;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn poller(server: &MockServer, in_flight: Arc<InFlightJobs>, max_attempts: u32) -> VideoPoller {
        let db = DbClient::new(DbConfig {
            base_url: format!("{}/rest/v1", server.uri()),
            service_key: "service-key".into(),
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            retry: RetryConfig {
                max_retries: 0,
                base_delay_ms: 1,
                max_delay_ms: 1,
            },
        })
        .unwrap();
        let avatar = AvatarClient::new(AvatarConfig {
            base_url: server.uri(),
            max_retries: 0,
            retry_base_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
            ..AvatarConfig::default()
        })
        .unwrap();

        VideoPoller::new(
            VideoJobRepository::new(db),
            Arc::new(avatar),
            in_flight,
            PollPolicy::flat(Duration::from_millis(10), max_attempts),
        )
    }

    fn processing_job(id: &str) -> VideoJob {
        let mut job = VideoJob::new("https://cdn/p.png", "https://cdn/a.wav");
        job.id = JobId::from_string(id);
        job.mark_generating().unwrap();
        job.mark_processing("prov-1").unwrap();
        job
    }

    async fn mount_row_update(server: &MockServer, id: &str, status: &str) {
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/video_jobs"))
            .and(query_param("id", format!("eq.{}", id)))
            .and(body_partial_json(serde_json::json!({ "status": status })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_completion_writes_row_and_deregisters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/talking-video/prov-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "completed",
                "video_url": "https://cdn/v.mp4"
            })))
            .mount(&server)
            .await;
        mount_row_update(&server, "job-1", "completed").await;

        let in_flight = Arc::new(InFlightJobs::new());
        assert_ok!(in_flight.register("key".into(), JobId::from_string("job-1")));

        let job = poller(&server, Arc::clone(&in_flight), 5)
            .run(processing_job("job-1"), JobHandle::new("prov-1"), "key".into())
            .await;

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.video_url.as_deref(), Some("https://cdn/v.mp4"));
        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_stored_as_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/talking-video/prov-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "processing" })))
            .expect(3)
            .mount(&server)
            .await;
        mount_row_update(&server, "job-2", "failed").await;

        let in_flight = Arc::new(InFlightJobs::new());
        in_flight.register("key".into(), JobId::from_string("job-2")).unwrap();

        let job = poller(&server, Arc::clone(&in_flight), 3)
            .run(processing_job("job-2"), JobHandle::new("prov-1"), "key".into())
            .await;

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some(TIMED_OUT_ERROR));
        assert!(!in_flight.contains(&"key".to_string()));
    }

    #[tokio::test]
    async fn test_provider_failure_and_db_outage_still_finish() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/talking-video/prov-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "failed",
                "error": "no face detected"
            })))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/video_jobs"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let in_flight = Arc::new(InFlightJobs::new());
        in_flight.register("key".into(), JobId::from_string("job-3")).unwrap();

        let job = poller(&server, Arc::clone(&in_flight), 5)
            .spawn(processing_job("job-3"), JobHandle::new("prov-1"), "key".into())
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("no face detected"));
        assert!(in_flight.is_empty());
    }
}
