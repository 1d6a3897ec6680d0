//! Media cache rows.
//!
//! Each row maps a figure (or scene) key to durable media in object storage.
//! The key column is unique in the database, so there is at most one row per
//! key and writes are upserts where the last writer wins.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Common behaviour of cache tables.
pub trait CacheRow: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Table name.
    const TABLE: &'static str;
    /// Unique key column used for `on_conflict` upserts.
    const KEY_COLUMN: &'static str;

    /// Value of the key column.
    fn key(&self) -> &str;

    /// Optional freshness window.
    fn expires_at(&self) -> Option<DateTime<Utc>>;

    /// A row without an expiry never goes stale.
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map_or(true, |exp| exp > now)
    }
}

/// Generated portrait for a historical figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CachedPortrait {
    pub figure_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub figure_name: Option<String>,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl CacheRow for CachedPortrait {
    const TABLE: &'static str = "cached_portraits";
    const KEY_COLUMN: &'static str = "figure_id";

    fn key(&self) -> &str {
        &self.figure_id
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

/// Generated background scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CachedScene {
    pub scene_key: String,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl CacheRow for CachedScene {
    const TABLE: &'static str = "cached_scenes";
    const KEY_COLUMN: &'static str = "scene_key";

    fn key(&self) -> &str {
        &self.scene_key
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

/// Voice cloned for a figure at a TTS provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClonedVoice {
    pub figure_id: String,
    pub voice_id: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl CacheRow for ClonedVoice {
    const TABLE: &'static str = "cloned_voices";
    const KEY_COLUMN: &'static str = "figure_id";

    fn key(&self) -> &str {
        &self.figure_id
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

fn default_version() -> u32 {
    1
}
