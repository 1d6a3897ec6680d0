//! Media cache edge function.
//!
//! Reads and writes the portrait, scene and cloned-voice cache rows. Reads
//! only return fresh rows; writes are upserts on the row key.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use validator::Validate;

use parley_db::CacheRepository;
use parley_models::CacheRow;

use crate::error::{ApiError, ApiResult};
use crate::handlers::parse_action;
use crate::metrics;
use crate::state::AppState;

/// Which cache table a request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Portrait,
    Scene,
    Voice,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Portrait => "portrait",
            CacheKind::Scene => "scene",
            CacheKind::Voice => "voice",
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CacheLookup {
    pub kind: CacheKind,
    #[validate(length(min = 1, max = 256))]
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct CacheWrite {
    pub kind: CacheKind,
    /// Row in the table's own shape; `updated_at` is set by the server
    pub row: Value,
}

/// Body of `POST /functions/v1/media-cache`.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MediaCacheRequest {
    Get(CacheLookup),
    Put(CacheWrite),
}

#[derive(Debug, Serialize)]
pub struct MediaCacheResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<Value>,
}

/// `POST /functions/v1/media-cache`
pub async fn media_cache(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<MediaCacheResponse>> {
    let response = match parse_action(&body, &["get", "put"])? {
        MediaCacheRequest::Get(lookup) => {
            lookup
                .validate()
                .map_err(|e| ApiError::bad_request(format!("Invalid key: {}", e)))?;
            let row = match lookup.kind {
                CacheKind::Portrait => get_row(&state.portraits, &lookup.key).await?,
                CacheKind::Scene => get_row(&state.scenes, &lookup.key).await?,
                CacheKind::Voice => get_row(&state.voices, &lookup.key).await?,
            };
            metrics::record_cache_lookup(lookup.kind.as_str(), row.is_some());
            MediaCacheResponse {
                found: row.is_some(),
                row,
            }
        }
        MediaCacheRequest::Put(write) => {
            let kind = write.kind;
            let stored = match kind {
                CacheKind::Portrait => put_row(&state.portraits, write.row).await,
                CacheKind::Scene => put_row(&state.scenes, write.row).await,
                CacheKind::Voice => put_row(&state.voices, write.row).await,
            };
            let stored = stored.inspect_err(|e| warn!(kind = kind.as_str(), "Cache write failed: {}", e))?;
            MediaCacheResponse {
                found: true,
                row: Some(stored),
            }
        }
    };

    Ok(Json(response))
}

async fn get_row<T: CacheRow>(repo: &CacheRepository<T>, key: &str) -> ApiResult<Option<Value>> {
    match repo.get_fresh(key).await? {
        Some(row) => Ok(Some(serde_json::to_value(row)?)),
        None => {
            debug!(table = T::TABLE, key, "Cache miss");
            Ok(None)
        }
    }
}

async fn put_row<T: CacheRow>(repo: &CacheRepository<T>, mut row: Value) -> ApiResult<Value> {
    let Value::Object(fields) = &mut row else {
        return Err(ApiError::bad_request("row must be an object"));
    };
    fields.insert("updated_at".to_string(), serde_json::json!(Utc::now()));

    let row: T = serde_json::from_value(row).map_err(|e| ApiError::bad_request(format!("Invalid row: {}", e)))?;
    if row.key().trim().is_empty() {
        return Err(ApiError::bad_request(format!("{} cannot be empty", T::KEY_COLUMN)));
    }

    let stored = repo.upsert(&row).await?;
    Ok(serde_json::to_value(stored)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shapes() {
        let get: MediaCacheRequest =
            serde_json::from_value(serde_json::json!({"action": "get", "kind": "voice", "key": "lincoln"})).unwrap();
        assert!(matches!(get, MediaCacheRequest::Get(CacheLookup { kind: CacheKind::Voice, .. })));

        let put: MediaCacheRequest = serde_json::from_value(serde_json::json!({
            "action": "put",
            "kind": "scene",
            "row": {"scene_key": "gettysburg", "image_url": "https://cdn/s.png"}
        }))
        .unwrap();
        assert!(matches!(put, MediaCacheRequest::Put(CacheWrite { kind: CacheKind::Scene, .. })));
    }

    #[test]
    fn test_lookup_key_is_validated() {
        let lookup = CacheLookup {
            kind: CacheKind::Portrait,
            key: String::new(),
        };
        assert!(lookup.validate().is_err());
    }
}
