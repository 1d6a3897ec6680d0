//! Audio chunking for chunked video synthesis.
//!
//! Tracks are decoded from WAV data URLs with `hound`. Each produced chunk is
//! re-encoded as a standalone WAV with the original format, so every chunk
//! can be submitted on its own.

use std::io::Cursor;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use parley_models::AudioChunk;
use parley_storage::DataUrl;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

/// How to slice a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    pub chunk_duration: Duration,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            chunk_duration: Duration::from_secs(5),
        }
    }
}

impl ChunkPolicy {
    pub fn new(chunk_duration: Duration) -> Self {
        Self { chunk_duration }
    }
}

#[derive(Debug, Clone)]
enum Samples {
    Int(Vec<i32>),
    Float(Vec<f32>),
}

impl Samples {
    fn len(&self) -> usize {
        match self {
            Samples::Int(s) => s.len(),
            Samples::Float(s) => s.len(),
        }
    }
}

/// A decoded speech track.
#[derive(Debug, Clone)]
pub struct AudioTrack {
    spec: WavSpec,
    samples: Samples,
    source: DataUrl,
}

impl AudioTrack {
    /// Decode a `data:audio/wav;base64,...` URL.
    pub fn from_data_url(data_url: &str) -> PipelineResult<Self> {
        let source = DataUrl::parse(data_url).map_err(|e| PipelineError::malformed_audio(e.to_string()))?;
        Self::decode(source)
    }

    /// Decode raw WAV bytes.
    pub fn from_wav_bytes(bytes: Vec<u8>) -> PipelineResult<Self> {
        Self::decode(DataUrl::new("audio/wav", bytes))
    }

    fn decode(source: DataUrl) -> PipelineResult<Self> {
        let reader = WavReader::new(Cursor::new(source.bytes.as_slice()))?;
        let spec = reader.spec();
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(PipelineError::malformed_audio("zero channels or sample rate"));
        }

        let samples = match spec.sample_format {
            SampleFormat::Int => Samples::Int(reader.into_samples::<i32>().collect::<Result<_, _>>()?),
            SampleFormat::Float => Samples::Float(reader.into_samples::<f32>().collect::<Result<_, _>>()?),
        };

        Ok(Self { spec, samples, source })
    }

    pub fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.spec.channels
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.spec.channels as usize
    }

    pub fn duration_ms(&self) -> u64 {
        frames_to_ms(self.frames(), self.spec.sample_rate)
    }

    /// Split into ordered chunks of at most `policy.chunk_duration`.
    ///
    /// A track no longer than one chunk is returned as a single chunk that
    /// carries the original payload unchanged.
    pub fn chunk(&self, policy: &ChunkPolicy) -> PipelineResult<Vec<AudioChunk>> {
        let frames_per_chunk =
            (self.spec.sample_rate as u128 * policy.chunk_duration.as_millis() / 1000) as usize;
        if frames_per_chunk == 0 {
            return Err(PipelineError::config_error("chunk duration shorter than one sample"));
        }

        let total = self.frames();
        if total <= frames_per_chunk {
            return Ok(vec![AudioChunk {
                index: 0,
                data_url: self.source.encode(),
                start_offset_ms: 0,
                duration_ms: self.duration_ms(),
            }]);
        }

        let channels = self.spec.channels as usize;
        let mut chunks = Vec::with_capacity(total.div_ceil(frames_per_chunk));
        let mut start = 0usize;

        while start < total {
            let end = (start + frames_per_chunk).min(total);
            let range = start * channels..end * channels;
            let wav = match &self.samples {
                Samples::Int(s) => encode_wav(self.spec, &s[range])?,
                Samples::Float(s) => encode_wav(self.spec, &s[range])?,
            };

            chunks.push(AudioChunk {
                index: chunks.len(),
                data_url: DataUrl::new("audio/wav", wav).encode(),
                start_offset_ms: frames_to_ms(start, self.spec.sample_rate),
                duration_ms: frames_to_ms(end - start, self.spec.sample_rate),
            });
            start = end;
        }

        debug!(
            chunks = chunks.len(),
            duration_ms = self.duration_ms(),
            "Split audio track"
        );
        Ok(chunks)
    }

    /// Mono little-endian f32 PCM frames, base64 encoded, for the streaming
    /// protocol. Channels are averaged and integer samples normalised to
    /// `[-1.0, 1.0]`.
    pub fn pcm_f32_chunks(&self, frames_per_chunk: usize) -> Vec<String> {
        let channels = self.spec.channels as usize;
        let mono: Vec<f32> = match &self.samples {
            Samples::Float(s) => s
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect(),
            Samples::Int(s) => {
                let scale = (1i64 << (self.spec.bits_per_sample.saturating_sub(1))) as f32;
                s.chunks(channels)
                    .map(|frame| frame.iter().map(|v| *v as f32).sum::<f32>() / channels as f32 / scale)
                    .collect()
            }
        };

        mono.chunks(frames_per_chunk.max(1))
            .map(|frames| {
                let bytes: Vec<u8> = frames.iter().flat_map(|v| v.to_le_bytes()).collect();
                STANDARD.encode(bytes)
            })
            .collect()
    }
}

fn frames_to_ms(frames: usize, sample_rate: u32) -> u64 {
    (frames as u64 * 1000) / sample_rate as u64
}

fn encode_wav<S: hound::Sample + Copy>(spec: WavSpec, samples: &[S]) -> PipelineResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for sample in samples {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
