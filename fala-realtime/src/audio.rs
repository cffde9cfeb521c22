//! Audio formats and the PCM16 transport codec.
//!
//! Microphone samples travel to the live endpoint as base64-wrapped 16-bit
//! little-endian PCM; model audio comes back the same way and is decoded into
//! float buffers for playback.

use crate::error::{Result, VoiceError};
use base64::Engine;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Microphone sample rate expected by the live endpoint.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of audio produced by the live endpoint.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Samples per capture frame.
pub const CAPTURE_FRAME_SAMPLES: usize = 4096;

/// Audio format of a PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::input()
    }
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self { sample_rate, channels }
    }

    /// Mono 16 kHz microphone format.
    pub fn input() -> Self {
        Self::new(INPUT_SAMPLE_RATE, 1)
    }

    /// Mono 24 kHz model output format.
    pub fn output() -> Self {
        Self::new(OUTPUT_SAMPLE_RATE, 1)
    }

    /// MIME tag declaring this format on the wire.
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }

    /// Calculate bytes per second for PCM16 in this format.
    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate * self.channels as u32 * 2
    }
}

/// A base64-encoded PCM16 payload tagged with its MIME type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportBlob {
    pub mime_type: String,
    pub data: String,
}

impl TransportBlob {
    /// Sample rate declared in the MIME tag, if any.
    pub fn sample_rate(&self) -> Option<u32> {
        self.mime_type
            .split(';')
            .filter_map(|param| param.trim().strip_prefix("rate="))
            .find_map(|rate| rate.parse().ok())
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Decoded, playable audio. Channels are stored de-interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Create a buffer from per-channel samples of equal length.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self> {
        if sample_rate == 0 {
            return Err(VoiceError::decoding("sample rate must be positive"));
        }
        if channels.is_empty() {
            return Err(VoiceError::decoding("audio buffer needs at least one channel"));
        }
        let frames = channels[0].len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(VoiceError::decoding("channels have different lengths"));
        }
        Ok(Self { sample_rate, channels })
    }

    /// Create a mono buffer.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { sample_rate: sample_rate.max(1), channels: vec![samples] }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn number_of_channels(&self) -> usize {
        self.channels.len()
    }

    /// Samples of one channel.
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Number of sample frames.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Encode float samples into a PCM16 transport blob.
///
/// Samples are clamped to [-1, 1]. An empty slice yields an empty payload.
pub fn encode(samples: &[f32], sample_rate: u32) -> TransportBlob {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&float_to_pcm16(sample).to_le_bytes());
    }
    TransportBlob {
        mime_type: AudioFormat::new(sample_rate, 1).mime_type(),
        data: base64::engine::general_purpose::STANDARD.encode(&bytes),
    }
}

/// Decode PCM16 little-endian bytes into an audio buffer.
///
/// Payloads with an odd byte count, or a sample count that does not divide
/// evenly into `channels`, are rejected whole.
pub fn decode(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<AudioBuffer> {
    if channels == 0 {
        return Err(VoiceError::decoding("channel count must be positive"));
    }
    if bytes.len() % 2 != 0 {
        return Err(VoiceError::decoding(format!(
            "Invalid data length for PCM16: {} (must be even)",
            bytes.len()
        )));
    }
    let total = bytes.len() / 2;
    let channel_count = channels as usize;
    if total % channel_count != 0 {
        return Err(VoiceError::decoding(format!(
            "{} samples do not split into {} channels",
            total, channels
        )));
    }

    let frames = total / channel_count;
    let mut planes = vec![Vec::with_capacity(frames); channel_count];
    for (i, chunk) in bytes.chunks_exact(2).enumerate() {
        let value = i16::from_le_bytes([chunk[0], chunk[1]]);
        planes[i % channel_count].push(value as f32 / 32768.0);
    }
    AudioBuffer::new(sample_rate, planes)
}

/// Decode a base64 PCM16 payload.
pub fn decode_base64(data: &str, sample_rate: u32, channels: u16) -> Result<AudioBuffer> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| VoiceError::decoding(format!("invalid base64 audio: {}", e)))?;
    decode(&bytes, sample_rate, channels)
}

fn float_to_pcm16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    (clamped * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}

/// Low-amplitude noise burst that trips the endpoint's voice activity detector.
pub fn wake_stimulus(samples: usize, amplitude: f32) -> Vec<f32> {
    let amplitude = amplitude.abs().min(1.0);
    let mut rng = rand::thread_rng();
    (0..samples).map(|_| rng.gen_range(-amplitude..=amplitude)).collect()
}

/// Slices device callbacks of arbitrary size into fixed-size frames.
#[derive(Debug, Clone)]
pub struct FrameChunker {
    pending: Vec<f32>,
    frame_len: usize,
}

impl FrameChunker {
    pub fn new(frame_len: usize) -> Self {
        let frame_len = frame_len.max(1);
        Self { pending: Vec::with_capacity(frame_len), frame_len }
    }

    /// Push samples and take every frame that is now complete, in order.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend_from_slice(samples);
        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_len {
            let rest = self.pending.split_off(self.frame_len);
            frames.push(std::mem::replace(&mut self.pending, rest));
        }
        frames
    }

    /// Take any incomplete frame left over.
    pub fn flush_remaining(&mut self) -> Option<Vec<f32>> {
        if self.pending.is_empty() { None } else { Some(std::mem::take(&mut self.pending)) }
    }
}
