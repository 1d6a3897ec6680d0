//! Video prefetching ahead of playback.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use reqwest::Client;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::metrics;

/// Preloader limits.
#[derive(Debug, Clone)]
pub struct PreloadConfig {
    /// Maximum concurrent downloads
    pub max_concurrent: usize,
    /// Maximum cached videos
    pub capacity: usize,
    /// Per-download timeout
    pub timeout: Duration,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            capacity: 8,
            timeout: Duration::from_secs(60),
        }
    }
}

type Slot = Arc<OnceCell<Arc<[u8]>>>;

#[derive(Default)]
struct Slots {
    by_url: HashMap<String, Slot>,
    order: VecDeque<String>,
}

impl Slots {
    /// Evict the oldest downloaded videos until within `capacity`. Slots
    /// still downloading and `keep` are never evicted.
    fn trim(&mut self, capacity: usize, keep: &str) {
        while self.by_url.len() > capacity {
            let victim = self.order.iter().position(|url| {
                url != keep && self.by_url.get(url).is_some_and(|slot| slot.initialized())
            });
            let Some(url) = victim.and_then(|i| self.order.remove(i)) else {
                break;
            };
            debug!(url = %url, "Evicting preloaded video");
            self.by_url.remove(&url);
        }
    }
}

/// Downloads videos ahead of time so playback can start without a fetch.
///
/// Concurrent requests for the same URL share one download.
pub struct VideoPreloader {
    http: Client,
    permits: Arc<Semaphore>,
    capacity: usize,
    slots: Mutex<Slots>,
}

impl VideoPreloader {
    pub fn new(config: PreloadConfig) -> PipelineResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("parley-pipeline/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            capacity: config.capacity.max(1),
            slots: Mutex::new(Slots::default()),
        })
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, url: &str) -> Slot {
        let mut slots = self.slots();
        if let Some(slot) = slots.by_url.get(url) {
            return slot.clone();
        }

        let slot: Slot = Arc::new(OnceCell::new());
        slots.by_url.insert(url.to_string(), slot.clone());
        slots.order.push_back(url.to_string());
        slots.trim(self.capacity, url);
        slot
    }

    /// Forget a slot whose download failed, unless it was replaced meanwhile.
    fn discard(&self, url: &str, slot: &Slot) {
        let mut slots = self.slots();
        let stale = slots
            .by_url
            .get(url)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && !current.initialized());
        if stale {
            slots.by_url.remove(url);
            slots.order.retain(|u| u != url);
        }
    }

    /// Fetch a video, reusing a cached or in-flight download.
    pub async fn fetch(&self, url: &str) -> PipelineResult<Arc<[u8]>> {
        let slot = self.slot(url);
        if let Some(bytes) = slot.get() {
            metrics::record_preload_lookup(true);
            return Ok(bytes.clone());
        }
        metrics::record_preload_lookup(false);

        let result = slot
            .get_or_try_init(|| async {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|_| PipelineError::preload("preloader closed"))?;

                debug!(url, "Preloading video");
                let response = self.http.get(url).send().await?;
                if !response.status().is_success() {
                    return Err(PipelineError::preload(format!(
                        "{} returned {}",
                        url,
                        response.status()
                    )));
                }
                let body = response.bytes().await?;
                Ok::<_, PipelineError>(Arc::<[u8]>::from(body.as_ref()))
            })
            .await;

        match result {
            Ok(bytes) => {
                let bytes = bytes.clone();
                self.slots().trim(self.capacity, url);
                Ok(bytes)
            }
            Err(e) => {
                self.discard(url, &slot);
                Err(e)
            }
        }
    }

    /// Start downloading the next videos in playback order. Only the first
    /// `capacity` URLs are fetched, so nothing is evicted before it plays.
    /// Returns how many are available.
    pub async fn preload(&self, urls: &[String]) -> usize {
        let urls = &urls[..urls.len().min(self.capacity)];
        let results = join_all(urls.iter().map(|url| self.fetch(url))).await;
        results
            .into_iter()
            .zip(urls)
            .filter(|(result, url)| match result {
                Ok(_) => true,
                Err(e) => {
                    warn!(url = %url, "Preload failed: {}", e);
                    false
                }
            })
            .count()
    }

    /// Cached bytes, without fetching.
    pub fn get(&self, url: &str) -> Option<Arc<[u8]>> {
        self.slots().by_url.get(url).and_then(|slot| slot.get().cloned())
    }

    /// Drop a cached video.
    pub fn evict(&self, url: &str) -> bool {
        let mut slots = self.slots();
        slots.order.retain(|u| u != url);
        slots.by_url.remove(url).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots().by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_with_videos(paths: &[&str]) -> MockServer {
        let server = MockServer::start().await;
        for p in paths {
            Mock::given(method("GET"))
                .and(path(*p))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(p.as_bytes().to_vec()))
                .mount(&server)
                .await;
        }
        server
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v/0.mp4"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"video".to_vec())
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let preloader = VideoPreloader::new(PreloadConfig::default()).unwrap();
        let url = format!("{}/v/0.mp4", server.uri());
        let (a, b) = tokio::join!(preloader.fetch(&url), preloader.fetch(&url));
        assert_eq!(&*a.unwrap(), b"video");
        assert_eq!(&*b.unwrap(), b"video");
        assert_eq!(preloader.get(&url).as_deref(), Some(&b"video"[..]));
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let server = server_with_videos(&["/a", "/b", "/c"]).await;
        let preloader = VideoPreloader::new(PreloadConfig {
            capacity: 2,
            ..PreloadConfig::default()
        })
        .unwrap();

        let urls: Vec<String> = ["/a", "/b", "/c"].iter().map(|p| format!("{}{}", server.uri(), p)).collect();
        for url in &urls {
            preloader.fetch(url).await.unwrap();
        }

        assert_eq!(preloader.len(), 2);
        assert!(preloader.get(&urls[0]).is_none());
        assert!(preloader.get(&urls[2]).is_some());
        assert!(preloader.evict(&urls[2]));
        assert!(preloader.get(&urls[2]).is_none());
    }

    #[tokio::test]
    async fn test_failed_download_frees_its_slot() {
        let server = server_with_videos(&["/a", "/b"]).await;
        let preloader = VideoPreloader::new(PreloadConfig {
            capacity: 2,
            ..PreloadConfig::default()
        })
        .unwrap();
        let url = |p: &str| format!("{}{}", server.uri(), p);

        preloader.fetch(&url("/a")).await.unwrap();
        assert!(preloader.fetch(&url("/missing")).await.is_err());
        assert_eq!(preloader.len(), 1);

        preloader.fetch(&url("/b")).await.unwrap();
        assert!(preloader.get(&url("/a")).is_some());
        assert!(preloader.get(&url("/b")).is_some());
    }

    #[tokio::test]
    async fn test_downloading_slots_are_not_evicted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"slow".to_vec())
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fast"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fast".to_vec()))
            .mount(&server)
            .await;

        let preloader = VideoPreloader::new(PreloadConfig {
            capacity: 1,
            ..PreloadConfig::default()
        })
        .unwrap();
        let slow = format!("{}/slow", server.uri());
        let fast = format!("{}/fast", server.uri());

        let (a, b) = tokio::join!(preloader.fetch(&slow), preloader.fetch(&fast));
        assert_eq!(&*a.unwrap(), b"slow");
        assert_eq!(&*b.unwrap(), b"fast");
        assert_eq!(preloader.get(&slow).as_deref(), Some(&b"slow"[..]));
        assert_eq!(preloader.len(), 1);
    }

    #[tokio::test]
    async fn test_preload_stops_at_capacity() {
        let server = server_with_videos(&["/a", "/b"]).await;
        Mock::given(method("GET"))
            .and(path("/c"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let preloader = VideoPreloader::new(PreloadConfig {
            capacity: 2,
            ..PreloadConfig::default()
        })
        .unwrap();

        let urls: Vec<String> = ["/a", "/b", "/c"].iter().map(|p| format!("{}{}", server.uri(), p)).collect();
        assert_eq!(preloader.preload(&urls).await, 2);
        assert!(preloader.get(&urls[0]).is_some());
        assert!(preloader.get(&urls[1]).is_some());
        assert!(preloader.get(&urls[2]).is_none());
    }

    #[tokio::test]
    async fn test_preload_counts_failures() {
        let server = server_with_videos(&["/ok"]).await;
        let preloader = VideoPreloader::new(PreloadConfig::default()).unwrap();

        let urls = vec![format!("{}/ok", server.uri()), format!("{}/missing", server.uri())];
        assert_eq!(preloader.preload(&urls).await, 1);
        assert!(preloader.get(&urls[1]).is_none());
    }
}
