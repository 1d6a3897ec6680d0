//! Inline `data:` URL payloads.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{StorageError, StorageResult};

/// Decoded `data:<mime>;base64,<payload>` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl DataUrl {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
        }
    }

    /// Parse a base64 data URL. Only base64 payloads are accepted.
    pub fn parse(input: &str) -> StorageResult<Self> {
        let rest = input
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| StorageError::invalid_data_url("missing data: prefix"))?;

        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| StorageError::invalid_data_url("missing ',' separator"))?;

        let mut parts = header.split(';');
        let mime = parts.next().unwrap_or_default().trim();
        if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
            return Err(StorageError::invalid_data_url("payload is not base64"));
        }

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| StorageError::invalid_data_url(format!("bad base64: {}", e)))?;

        if bytes.is_empty() {
            return Err(StorageError::invalid_data_url("empty payload"));
        }

        let mime = if mime.is_empty() {
            "application/octet-stream"
        } else {
            mime
        };

        Ok(Self::new(mime.to_ascii_lowercase(), bytes))
    }

    /// True if the string looks like a data URL.
    pub fn is_data_url(input: &str) -> bool {
        input.trim_start().starts_with("data:")
    }

    /// Encode back into a data URL string.
    pub fn encode(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }

    /// File extension for the MIME type.
    pub fn extension(&self) -> &'static str {
        extension_for(&self.mime)
    }
}

pub(crate) fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/ogg" => "ogg",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    #[test]
    fn test_parse_roundtrip() {
        let url = DataUrl::new("image/png", vec![1, 2, 3]).encode();
        assert_eq!(url, "data:image/png;base64,AQID");
        let parsed = DataUrl::parse(&url).unwrap();
        assert_eq!(parsed.bytes, vec![1, 2, 3]);
        assert_eq!(parsed.extension(), "png");
    }

    #[test]
    fn test_parse_with_params() {
        let parsed = DataUrl::parse("data:audio/wav;codecs=1;base64,AQID").unwrap();
        assert_eq!(parsed.mime, "audio/wav");
        assert_eq!(parsed.extension(), "wav");
    }

    #[test]
    fn test_rejects_malformed() {
        for input in [
            "https://example.com/a.png",
            "data:image/png,AQID",
            "data:image/png;base64",
            "data:image/png;base64,!!!",
            "data:image/png;base64,",
        ] {
            assert_err!(DataUrl::parse(input), "accepted {}", input);
        }
    }

    #[test]
    fn test_is_data_url() {
        assert!(DataUrl::is_data_url("data:audio/wav;base64,AA=="));
        assert!(!DataUrl::is_data_url("https://cdn/a.wav"));
    }
}
