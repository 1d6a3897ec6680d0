//! Application state.

use std::sync::Arc;

use parley_avatar::AvatarClient;
use parley_db::{CacheRepository, DbClient, VideoJobRepository};
use parley_models::{CachedPortrait, CachedScene, ClonedVoice, JobId};
use parley_pipeline::{JobRegistry, PollPolicy, VideoSynthesizer};
use parley_storage::StorageClient;

use crate::config::ApiConfig;
use crate::poller::VideoPoller;

/// Start requests currently being served, keyed by request identity.
pub type InFlightJobs = JobRegistry<String, JobId>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub db: DbClient,
    pub jobs: VideoJobRepository,
    pub portraits: CacheRepository<CachedPortrait>,
    pub scenes: CacheRepository<CachedScene>,
    pub voices: CacheRepository<ClonedVoice>,
    pub storage: Arc<StorageClient>,
    pub synth: Arc<dyn VideoSynthesizer>,
    pub in_flight: Arc<InFlightJobs>,
    pub poller: VideoPoller,
    /// Upstream WebSocket of the streaming avatar provider
    pub stream_url: Option<String>,
}

impl AppState {
    /// Build state from the environment.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let db = DbClient::from_env()?;
        let storage = StorageClient::from_env()?;
        let avatar = AvatarClient::from_env()?;

        Ok(Self::from_parts(config, db, storage, avatar, PollPolicy::from_env()))
    }

    /// Assemble state from already configured clients.
    pub fn from_parts(
        config: ApiConfig,
        db: DbClient,
        storage: StorageClient,
        avatar: AvatarClient,
        poll_policy: PollPolicy,
    ) -> Self {
        let stream_url = avatar.config().stream_url.clone();
        let synth: Arc<dyn VideoSynthesizer> = Arc::new(avatar);
        let jobs = VideoJobRepository::new(db.clone());
        let in_flight = Arc::new(InFlightJobs::new());
        let poller = VideoPoller::new(jobs.clone(), Arc::clone(&synth), Arc::clone(&in_flight), poll_policy);

        Self {
            config,
            portraits: CacheRepository::new(db.clone()),
            scenes: CacheRepository::new(db.clone()),
            voices: CacheRepository::new(db.clone()),
            jobs,
            db,
            storage: Arc::new(storage),
            synth,
            in_flight,
            poller,
            stream_url,
        }
    }
}
