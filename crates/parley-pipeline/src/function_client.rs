//! Client for the backend video edge function.

use std::time::Duration;

use async_trait::async_trait;
use parley_avatar::{JobHandle, JobPoll, Submission};
use parley_models::{FigureRef, JobId, JobStatus, StartVideoRequest, VideoFunctionRequest, VideoJobResponse};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::synth::VideoSynthesizer;

const VIDEO_FUNCTION_PATH: &str = "/functions/v1/ditto-generate-video";

/// Edge-function client configuration.
#[derive(Debug, Clone)]
pub struct FunctionConfig {
    /// Base URL of the functions host
    pub base_url: String,
    /// Key sent as bearer token, if required
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl FunctionConfig {
    /// Create config from environment variables.
    pub fn from_env() -> PipelineResult<Self> {
        let base_url = std::env::var("FUNCTIONS_BASE_URL")
            .map_err(|_| PipelineError::config_error("FUNCTIONS_BASE_URL must be set"))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: std::env::var("FUNCTIONS_API_KEY").ok().filter(|k| !k.is_empty()),
            timeout: Duration::from_secs(
                std::env::var("FUNCTIONS_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    code: Option<String>,
}

/// Calls `start` and `status` on the video edge function.
#[derive(Clone)]
pub struct FunctionClient {
    http: Client,
    config: FunctionConfig,
}

impl FunctionClient {
    pub fn new(config: FunctionConfig) -> PipelineResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("parley-pipeline/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> PipelineResult<Self> {
        Self::new(FunctionConfig::from_env()?)
    }

    /// Start a job. Inline `data:` payloads are sent as `*_data` fields.
    pub async fn start(
        &self,
        image: &str,
        audio: &str,
        figure: &FigureRef,
    ) -> PipelineResult<VideoJobResponse> {
        let (image_url, image_data) = split_media(image);
        let (audio_url, audio_data) = split_media(audio);
        let request = VideoFunctionRequest::Start(StartVideoRequest {
            image_url,
            image_data,
            audio_url,
            audio_data,
            figure_id: figure.figure_id.clone(),
            figure_name: figure.figure_name.clone(),
        });
        self.call(&request).await
    }

    /// Read a job's current state.
    pub async fn status(&self, job_id: &JobId) -> PipelineResult<VideoJobResponse> {
        self.call(&VideoFunctionRequest::Status {
            job_id: job_id.clone(),
        })
        .await
    }

    async fn call(&self, request: &VideoFunctionRequest) -> PipelineResult<VideoJobResponse> {
        let url = format!("{}{}", self.config.base_url, VIDEO_FUNCTION_PATH);
        let mut builder = self.http.post(&url).json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let (message, code) = match serde_json::from_str::<ErrorBody>(&body) {
                Ok(e) => (e.error, e.code),
                Err(_) => (body, None),
            };
            return Err(PipelineError::Function {
                status: status.as_u16(),
                message,
                code,
            });
        }

        let parsed: VideoJobResponse = serde_json::from_str(&body)
            .map_err(|e| PipelineError::UnexpectedResponse(format!("video function: {}", e)))?;
        debug!(job_id = %parsed.job_id, status = parsed.status.as_str(), "Video function replied");
        Ok(parsed)
    }
}

fn split_media(value: &str) -> (Option<String>, Option<String>) {
    if value.trim_start().starts_with("data:") {
        (None, Some(value.to_string()))
    } else {
        (Some(value.to_string()), None)
    }
}

fn to_poll(response: VideoJobResponse) -> JobPoll {
    match (response.status, response.video) {
        (JobStatus::Completed, Some(video_url)) => JobPoll::Completed { video_url },
        (JobStatus::Completed, None) => JobPoll::Failed {
            error: "completed without a video".into(),
        },
        (JobStatus::Failed, _) => JobPoll::Failed {
            error: response.error.unwrap_or_else(|| "generation failed".into()),
        },
        _ => JobPoll::Pending,
    }
}

#[async_trait]
impl VideoSynthesizer for FunctionClient {
    async fn submit(&self, image_url: &str, audio_url: &str, figure: &FigureRef) -> PipelineResult<Submission> {
        let response = self.start(image_url, audio_url, figure).await?;
        let handle = JobHandle::new(response.job_id.as_str());
        match to_poll(response) {
            JobPoll::Completed { video_url } => Ok(Submission::Immediate { video_url }),
            JobPoll::Pending => Ok(Submission::Pending { handle }),
            JobPoll::Failed { error } => Err(PipelineError::Function {
                status: 200,
                message: error,
                code: None,
            }),
        }
    }

    async fn poll(&self, handle: &JobHandle) -> PipelineResult<JobPoll> {
        let response = self.status(&JobId::from_string(handle.as_str())).await?;
        Ok(to_poll(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> FunctionClient {
        FunctionClient::new(FunctionConfig {
            base_url: server.uri(),
            api_key: Some("anon".into()),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_submit_and_poll_through_function() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(VIDEO_FUNCTION_PATH))
            .and(body_partial_json(serde_json::json!({
                "action": "start",
                "image_url": "https://cdn/a.png",
                "audio_data": "data:audio/wav;base64,AAAA"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"status": "processing", "jobId": "job-1"}),
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(VIDEO_FUNCTION_PATH))
            .and(body_partial_json(serde_json::json!({"action": "status", "jobId": "job-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"status": "completed", "jobId": "job-1", "video": "https://v/1.mp4"}),
            ))
            .mount(&server)
            .await;

        let client = client(&server);
        let submission = VideoSynthesizer::submit(
            &client,
            "https://cdn/a.png",
            "data:audio/wav;base64,AAAA",
            &FigureRef::default(),
        )
        .await
        .unwrap();
        let Submission::Pending { handle } = submission else {
            panic!("expected pending submission");
        };
        assert_eq!(handle.as_str(), "job-1");

        let poll = VideoSynthesizer::poll(&client, &handle).await.unwrap();
        assert_eq!(
            poll,
            JobPoll::Completed {
                video_url: "https://v/1.mp4".into()
            }
        );
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(VIDEO_FUNCTION_PATH))
            .respond_with(ResponseTemplate::new(402).set_body_json(
                serde_json::json!({"success": false, "error": "Quota exceeded", "code": "payment_required"}),
            ))
            .mount(&server)
            .await;

        let err = client(&server)
            .status(&JobId::from_string("x"))
            .await
            .unwrap_err();
        match err {
            PipelineError::Function { status, message, code } => {
                assert_eq!(status, 402);
                assert_eq!(message, "Quota exceeded");
                assert_eq!(code.as_deref(), Some("payment_required"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_failed_status_maps_to_failed_poll() {
        let poll = to_poll(VideoJobResponse {
            status: JobStatus::Failed,
            job_id: JobId::from_string("j"),
            video: None,
            error: Some("timed out".into()),
        });
        assert_eq!(
            poll,
            JobPoll::Failed {
                error: "timed out".into()
            }
        );
    }

    #[test]
    #[serial]
    fn test_config_requires_base_url() {
        std::env::remove_var("FUNCTIONS_BASE_URL");
        assert!(FunctionConfig::from_env().is_err());
    }
}
