//! Configuration for lesson sessions.

use crate::audio::{CAPTURE_FRAME_SAMPLES, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
use crate::error::{Result, VoiceError};
use crate::transcript::ThoughtMarkers;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-09-2025";

/// Tunables for one voice session.
///
/// Durations are (de)serialized as milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Live model identifier.
    pub model: String,
    /// Microphone sample rate sent to the endpoint.
    pub input_sample_rate: u32,
    /// Sample rate of model audio.
    pub output_sample_rate: u32,
    /// Channels in model audio.
    pub output_channels: u16,
    /// Samples per capture frame.
    pub frame_samples: usize,
    /// Delay between connecting and the first wake stimulus.
    #[serde(with = "millis")]
    pub settle_delay: Duration,
    /// Silence tolerated while awaiting the model before re-waking it.
    #[serde(with = "millis")]
    pub watchdog_timeout: Duration,
    /// Unanswered wake stimuli allowed before the session fails.
    pub max_wake_retries: u32,
    /// Length of a wake stimulus in samples.
    pub wake_samples: usize,
    /// Peak amplitude of the wake stimulus noise.
    pub wake_amplitude: f32,
    /// Reasoning markup hidden from the transcript.
    pub thought_markers: ThoughtMarkers,
    /// Turns required before the lesson may be completed.
    pub completion_threshold: u32,
    /// Interval at which finished playback segments are reaped.
    #[serde(with = "millis")]
    pub reap_interval: Duration,
    /// Capacity of the inbound command queue.
    pub command_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            input_sample_rate: INPUT_SAMPLE_RATE,
            output_sample_rate: OUTPUT_SAMPLE_RATE,
            output_channels: 1,
            frame_samples: CAPTURE_FRAME_SAMPLES,
            settle_delay: Duration::from_millis(500),
            watchdog_timeout: Duration::from_secs(4),
            max_wake_retries: 5,
            wake_samples: 2048,
            wake_amplitude: 0.02,
            thought_markers: ThoughtMarkers::default(),
            completion_threshold: 3,
            reap_interval: Duration::from_millis(250),
            command_buffer: 32,
        }
    }
}

impl SessionConfig {
    /// Create a new config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_watchdog_timeout(mut self, timeout: Duration) -> Self {
        self.watchdog_timeout = timeout;
        self
    }

    pub fn with_max_wake_retries(mut self, retries: u32) -> Self {
        self.max_wake_retries = retries;
        self
    }

    pub fn with_frame_samples(mut self, samples: usize) -> Self {
        self.frame_samples = samples;
        self
    }

    pub fn with_wake_stimulus(mut self, samples: usize, amplitude: f32) -> Self {
        self.wake_samples = samples;
        self.wake_amplitude = amplitude;
        self
    }

    pub fn with_thought_markers(mut self, markers: ThoughtMarkers) -> Self {
        self.thought_markers = markers;
        self
    }

    pub fn with_completion_threshold(mut self, turns: u32) -> Self {
        self.completion_threshold = turns;
        self
    }

    /// Reject settings the session cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(VoiceError::config("model must not be empty"));
        }
        if self.input_sample_rate == 0 || self.output_sample_rate == 0 {
            return Err(VoiceError::config("sample rates must be positive"));
        }
        if self.output_channels == 0 {
            return Err(VoiceError::config("output_channels must be positive"));
        }
        if self.frame_samples == 0 {
            return Err(VoiceError::config("frame_samples must be positive"));
        }
        if self.watchdog_timeout.is_zero() {
            return Err(VoiceError::config("watchdog_timeout must be positive"));
        }
        if self.reap_interval.is_zero() {
            return Err(VoiceError::config("reap_interval must be positive"));
        }
        if self.command_buffer == 0 {
            return Err(VoiceError::config("command_buffer must be positive"));
        }
        if !(0.0..=1.0).contains(&self.wake_amplitude) {
            return Err(VoiceError::config("wake_amplitude must be within [0, 1]"));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
