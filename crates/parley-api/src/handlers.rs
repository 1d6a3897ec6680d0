//! Request handlers.

pub mod health;
pub mod media_cache;
pub mod video;

pub use health::*;
pub use media_cache::*;
pub use video::*;

use crate::error::{ApiError, ApiResult};

/// Decode an `action`-tagged body, reporting a missing or unknown action as
/// a client error rather than a generic decode failure.
pub(crate) fn parse_action<T: serde::de::DeserializeOwned>(body: &[u8], actions: &[&str]) -> ApiResult<T> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))?;

    match value.get("action").and_then(|a| a.as_str()) {
        None => return Err(ApiError::bad_request("Missing action")),
        Some(action) if !actions.contains(&action) => {
            return Err(ApiError::bad_request(format!("Unknown action: {}", action)))
        }
        Some(_) => {}
    }

    serde_json::from_value(value).map_err(|e| ApiError::bad_request(e.to_string()))
}
