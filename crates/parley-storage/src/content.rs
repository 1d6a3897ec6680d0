//! Content addressing and media references.

use sha2::{Digest, Sha256};

use crate::data_url::{extension_for, DataUrl};
use crate::error::StorageResult;

/// Key prefix for uploaded portraits.
pub const PORTRAIT_PREFIX: &str = "portraits";
/// Key prefix for uploaded speech audio.
pub const AUDIO_PREFIX: &str = "audio";

/// Object key derived from content: `<prefix>/<sha256>.<ext>`.
pub fn content_key(prefix: &str, data: &[u8], mime: &str) -> String {
    let digest = Sha256::digest(data);
    let prefix = prefix.trim_matches('/');
    let ext = extension_for(mime);
    if prefix.is_empty() {
        format!("{:x}.{}", digest, ext)
    } else {
        format!("{}/{:x}.{}", prefix, digest, ext)
    }
}

/// Media supplied either as a retrievable URL or as an inline payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    Url(String),
    Inline(DataUrl),
}

impl MediaSource {
    /// Classify a request field: data URLs are decoded, anything else is a URL.
    pub fn parse(value: &str) -> StorageResult<Self> {
        if DataUrl::is_data_url(value) {
            Ok(MediaSource::Inline(DataUrl::parse(value)?))
        } else {
            Ok(MediaSource::Url(value.trim().to_string()))
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, MediaSource::Inline(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_key_is_stable() {
        let a = content_key("audio", b"hello", "audio/wav");
        let b = content_key("/audio/", b"hello", "audio/wav");
        assert_eq!(a, b);
        assert_eq!(
            a,
            "audio/2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824.wav"
        );
    }

    #[test]
    fn test_content_key_differs_by_content() {
        assert_ne!(
            content_key("images", b"a", "image/png"),
            content_key("images", b"b", "image/png")
        );
    }

    #[test]
    fn test_media_source_parse() {
        assert!(MediaSource::parse("data:image/png;base64,AQID").unwrap().is_inline());
        assert_eq!(
            MediaSource::parse(" https://cdn/a.png ").unwrap(),
            MediaSource::Url("https://cdn/a.png".into())
        );
        assert!(MediaSource::parse("data:image/png;base64,@@").is_err());
    }
}
