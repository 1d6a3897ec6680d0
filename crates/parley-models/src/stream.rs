//! Avatar streaming WebSocket message types.
//!
//! The client opens the stream with `init`, sends any number of
//! `audio_chunk` messages and closes the input with `end`. The server answers
//! with `frame` messages and finishes with `complete` or `error`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Messages sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamClientMessage {
    /// Open a session with the reference portrait
    Init {
        image_b64: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        figure_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sample_rate: Option<u32>,
    },

    /// A slice of PCM audio
    AudioChunk {
        audio_b64: String,
        sample_rate: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chunksize: Option<Vec<u32>>,
    },

    /// No more audio will follow
    End,
}

impl StreamClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamClientMessage::Init { .. } => "init",
            StreamClientMessage::AudioChunk { .. } => "audio_chunk",
            StreamClientMessage::End => "end",
        }
    }
}

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamServerMessage {
    /// Session accepted
    Ready,

    /// One encoded video frame
    Frame {
        data: String,
        format: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<u64>,
    },

    /// All frames delivered
    Complete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frames: Option<u64>,
    },

    /// Session failed
    Error { message: String },
}

impl StreamServerMessage {
    /// Create an error message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamServerMessage::Ready => "ready",
            StreamServerMessage::Frame { .. } => "frame",
            StreamServerMessage::Complete { .. } => "complete",
            StreamServerMessage::Error { .. } => "error",
        }
    }

    /// `complete` and `error` end the session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamServerMessage::Complete { .. } | StreamServerMessage::Error { .. }
        )
    }
}
