//! Video edge function: `start` and `status` actions.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use tracing::{info, warn};

use parley_avatar::{JobHandle, Submission};
use parley_models::{
    FigureRef, JobId, JobStatus, StartVideoRequest, VideoFunctionRequest, VideoJob, VideoJobResponse,
};
use parley_storage::{MediaSource, AUDIO_PREFIX, PORTRAIT_PREFIX};

use crate::error::{ApiError, ApiResult};
use crate::handlers::parse_action;
use crate::logging::JobLogger;
use crate::metrics;
use crate::state::AppState;

/// `POST /functions/v1/ditto-generate-video`
pub async fn video_function(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<VideoJobResponse>> {
    let response = match parse_action(&body, &["start", "status"])? {
        VideoFunctionRequest::Start(request) => start_video(&state, request).await?,
        VideoFunctionRequest::Status { job_id } => job_status(&state, job_id).await?,
    };
    Ok(Json(response))
}

/// Identity of a start request. Identical requests share one job while it is
/// in flight.
fn request_key(image_url: &str, audio_url: &str, figure: &FigureRef) -> String {
    format!(
        "{}\n{}\n{}",
        image_url,
        audio_url,
        figure.figure_id.as_deref().unwrap_or_default()
    )
}

async fn start_video(state: &AppState, request: StartVideoRequest) -> ApiResult<VideoJobResponse> {
    let image = request
        .image()
        .ok_or_else(|| ApiError::bad_request("image_url or image_data is required"))?;
    let audio = request
        .audio()
        .ok_or_else(|| ApiError::bad_request("audio_url or audio_data is required"))?;

    let image_url = state
        .storage
        .resolve_media(MediaSource::parse(image)?, PORTRAIT_PREFIX)
        .await?;
    let audio_url = state
        .storage
        .resolve_media(MediaSource::parse(audio)?, AUDIO_PREFIX)
        .await?;

    let figure = FigureRef {
        figure_id: request.figure_id.clone(),
        figure_name: request.figure_name.clone(),
    };
    let key = request_key(&image_url, &audio_url, &figure);
    let mut job = VideoJob::new(image_url, audio_url).with_figure(request.figure_id, request.figure_name);

    if let Err(existing) = state.in_flight.try_register(key.clone(), job.id.clone()) {
        info!(job_id = %existing, "Start request joined an in-flight job");
        return Ok(existing_job(state, existing).await);
    }

    let logger = JobLogger::new(&job.id, "video_start");
    logger.log_start(figure.label());
    metrics::record_video_job_started();

    match submit(state, &mut job, &figure, &logger).await {
        Ok(Some(handle)) => {
            logger.log_progress(&format!("provider accepted job as {}", handle));
            state.poller.spawn(job.clone(), handle, key);
            Ok(VideoJobResponse::from(&job))
        }
        Ok(None) => {
            state.in_flight.deregister(&key);
            metrics::record_video_job_finished("completed", 0.0);
            logger.log_completion("video returned on submission");
            Ok(VideoJobResponse::from(&job))
        }
        Err(e) => {
            state.in_flight.deregister(&key);
            logger.log_error(&e.to_string());
            if job.fail(e.to_string()).is_ok() {
                persist(state, &job, &logger).await;
            }
            metrics::record_video_job_finished("failed", 0.0);
            Err(e)
        }
    }
}

/// Create the row and submit. Returns the handle when the provider answered
/// asynchronously.
async fn submit(
    state: &AppState,
    job: &mut VideoJob,
    figure: &FigureRef,
    logger: &JobLogger,
) -> ApiResult<Option<JobHandle>> {
    state.jobs.create(job).await?;

    job.mark_generating()?;
    persist(state, job, logger).await;

    match state.synth.submit(&job.image_url, &job.audio_url, figure).await? {
        Submission::Immediate { video_url } => {
            job.complete(video_url)?;
            persist(state, job, logger).await;
            Ok(None)
        }
        Submission::Pending { handle } => {
            job.mark_processing(handle.as_str())?;
            persist(state, job, logger).await;
            Ok(Some(handle))
        }
    }
}

/// Status writes are best effort; the provider result is still returned.
async fn persist(state: &AppState, job: &VideoJob, logger: &JobLogger) {
    if let Err(e) = state.jobs.save_status(job).await {
        logger.log_warning(&format!("could not save {} status: {}", job.status, e));
    }
}

async fn existing_job(state: &AppState, job_id: JobId) -> VideoJobResponse {
    match state.jobs.get(&job_id).await {
        Ok(Some(job)) => VideoJobResponse::from(&job),
        Ok(None) | Err(_) => VideoJobResponse {
            status: JobStatus::Processing,
            job_id,
            video: None,
            error: None,
        },
    }
}

async fn job_status(state: &AppState, job_id: JobId) -> ApiResult<VideoJobResponse> {
    if job_id.as_str().trim().is_empty() {
        return Err(ApiError::bad_request("jobId is required"));
    }

    match state.jobs.get(&job_id).await? {
        Some(job) => Ok(VideoJobResponse::from(&job)),
        None => {
            warn!(job_id = %job_id, "Status requested for unknown job");
            Err(ApiError::not_found(format!("job {}", job_id)))
        }
    }
}
