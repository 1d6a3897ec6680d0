//! Audio chunk records.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A bounded-duration slice of a speech track.
///
/// Chunks are immutable once produced and ordered by `index`. `data_url` is a
/// self-contained, independently decodable payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AudioChunk {
    pub index: usize,
    pub data_url: String,
    pub start_offset_ms: u64,
    pub duration_ms: u64,
}

impl AudioChunk {
    /// End offset within the original track.
    pub fn end_offset_ms(&self) -> u64 {
        self.start_offset_ms + self.duration_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_wire_names() {
        let chunk = AudioChunk {
            index: 1,
            data_url: "data:audio/wav;base64,AA==".into(),
            start_offset_ms: 5000,
            duration_ms: 2000,
        };
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["startOffsetMs"], 5000);
        assert_eq!(json["dataUrl"], "data:audio/wav;base64,AA==");
        assert_eq!(chunk.end_offset_ms(), 7000);
    }
}
