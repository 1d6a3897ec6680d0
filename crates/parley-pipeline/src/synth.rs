//! Video synthesizer seam.

use std::sync::Arc;

use async_trait::async_trait;
use parley_avatar::{AvatarClient, GenerateRequest, JobHandle, JobPoll, Submission};
use parley_models::FigureRef;
use parley_storage::{MediaSource, StorageClient, AUDIO_PREFIX, PORTRAIT_PREFIX};
use tracing::{debug, warn};

use crate::error::PipelineResult;
use crate::poll::Probe;

/// Anything that turns a portrait and an audio clip into a talking video.
#[async_trait]
pub trait VideoSynthesizer: Send + Sync {
    /// Start a job.
    async fn submit(&self, image_url: &str, audio_url: &str, figure: &FigureRef) -> PipelineResult<Submission>;

    /// Observe an async job once.
    async fn poll(&self, handle: &JobHandle) -> PipelineResult<JobPoll>;
}

/// Sends URLs to the provider as given; inline media needs
/// [`StoredMediaSynthesizer`] in front.
#[async_trait]
impl VideoSynthesizer for AvatarClient {
    async fn submit(&self, image_url: &str, audio_url: &str, figure: &FigureRef) -> PipelineResult<Submission> {
        let request = GenerateRequest {
            image_url: image_url.to_string(),
            audio_url: audio_url.to_string(),
            figure_id: figure.figure_id.clone(),
            figure_name: figure.figure_name.clone(),
        };
        Ok(AvatarClient::submit(self, &request).await?)
    }

    async fn poll(&self, handle: &JobHandle) -> PipelineResult<JobPoll> {
        Ok(self.status(handle).await?)
    }
}

/// Uploads inline `data:` media to object storage before handing the job to
/// `inner`, so the provider only sees retrievable URLs. An upload failure
/// fails the submission.
pub struct StoredMediaSynthesizer<S> {
    inner: S,
    storage: Arc<StorageClient>,
}

impl<S> StoredMediaSynthesizer<S> {
    pub fn new(inner: S, storage: Arc<StorageClient>) -> Self {
        Self { inner, storage }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: VideoSynthesizer> VideoSynthesizer for StoredMediaSynthesizer<S> {
    async fn submit(&self, image_url: &str, audio_url: &str, figure: &FigureRef) -> PipelineResult<Submission> {
        let image = MediaSource::parse(image_url)?;
        let audio = MediaSource::parse(audio_url)?;
        if image.is_inline() || audio.is_inline() {
            debug!(figure = %figure.label(), "Uploading inline media before submit");
        }

        let image_url = self.storage.resolve_media(image, PORTRAIT_PREFIX).await?;
        let audio_url = self.storage.resolve_media(audio, AUDIO_PREFIX).await?;
        self.inner.submit(&image_url, &audio_url, figure).await
    }

    async fn poll(&self, handle: &JobHandle) -> PipelineResult<JobPoll> {
        self.inner.poll(handle).await
    }
}

/// Poll once and classify the result. Transient errors count as pending.
pub async fn probe_once<S>(synth: &S, handle: &JobHandle) -> Probe<String, String>
where
    S: VideoSynthesizer + ?Sized,
{
    match synth.poll(handle).await {
        Ok(JobPoll::Pending) => Probe::Pending,
        Ok(JobPoll::Completed { video_url }) => Probe::Ready(video_url),
        Ok(JobPoll::Failed { error }) => Probe::Failed(error),
        Err(e) if e.is_retryable() => {
            warn!(handle = %handle, "Transient poll error: {}", e);
            Probe::Pending
        }
        Err(e) => Probe::Failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::tests::wav_data_url;
    use crate::chunker::{AudioTrack, ChunkPolicy};
    use crate::scheduler::{ChunkEvent, ChunkScheduler, SchedulerConfig};
    use crate::PollPolicy;
    use parley_avatar::AvatarConfig;
    use parley_storage::{content_key, DataUrl, StorageConfig};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_test::assert_err;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn storage(server: &MockServer) -> Arc<StorageClient> {
        Arc::new(StorageClient::new(StorageConfig {
            endpoint_url: server.uri(),
            access_key_id: "key".into(),
            secret_access_key: "secret".into(),
            bucket_name: "media".into(),
            region: "auto".into(),
            public_base_url: "https://cdn.example.com/media".into(),
        }))
    }

    fn avatar(server: &MockServer) -> AvatarClient {
        AvatarClient::new(AvatarConfig {
            base_url: server.uri(),
            max_retries: 0,
            retry_base_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
            ..AvatarConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_scheduled_chunk_reaches_provider_as_stored_url() {
        let server = MockServer::start().await;
        let chunks = AudioTrack::from_data_url(&wav_data_url(3, 8000, 1))
            .unwrap()
            .chunk(&ChunkPolicy::default())
            .unwrap();
        let bytes = DataUrl::parse(&chunks[0].data_url).unwrap().bytes;
        let key = content_key(AUDIO_PREFIX, &bytes, "audio/wav");

        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(format!("/media/{}", key)))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/talking-video"))
            .and(body_partial_json(serde_json::json!({
                "image_url": "https://cdn.example.com/lincoln.png",
                "audio_url": format!("https://cdn.example.com/media/{}", key)
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "completed",
                "video_url": "https://cdn.example.com/v/0.mp4"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let synth = Arc::new(StoredMediaSynthesizer::new(avatar(&server), storage(&server)));
        let scheduler = ChunkScheduler::new(
            synth,
            SchedulerConfig {
                concurrency: 2,
                poll: PollPolicy::flat(Duration::from_millis(10), 3),
            },
        );
        let (tx, mut rx) = mpsc::channel(1);
        let report = scheduler
            .run(chunks, "https://cdn.example.com/lincoln.png", &FigureRef::default(), tx)
            .await;

        assert_eq!(report.ready, 1);
        assert_eq!(
            rx.recv().await,
            Some(ChunkEvent::Ready {
                index: 0,
                video_url: "https://cdn.example.com/v/0.mp4".into()
            })
        );
    }

    #[tokio::test]
    async fn test_upload_failure_fails_submission() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/talking-video"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let synth = StoredMediaSynthesizer::new(avatar(&server), storage(&server));
        let inline = DataUrl::new("audio/wav", b"RIFF".to_vec()).encode();
        let err = assert_err!(
            synth
                .submit("https://cdn.example.com/lincoln.png", &inline, &FigureRef::default())
                .await
        );
        assert!(matches!(err, crate::PipelineError::Storage(_)));
    }
}
