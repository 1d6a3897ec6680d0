//! Object storage for generated media.
//!
//! This crate provides:
//! - Byte uploads to an S3-compatible bucket with public URLs
//! - `data:` URL parsing for inline base64 payloads
//! - Content-addressed keys so identical media is stored once
//! - Resolution of URL-or-inline media into retrievable URLs

pub mod client;
pub mod content;
pub mod data_url;
pub mod error;

pub use client::{StorageClient, StorageConfig};
pub use content::{content_key, MediaSource, AUDIO_PREFIX, PORTRAIT_PREFIX};
pub use data_url::DataUrl;
pub use error::{StorageError, StorageResult};
