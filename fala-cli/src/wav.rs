//! File-backed audio devices.
//!
//! [`WavMicrophone`] plays a recording into the session in real time and then
//! keeps sending silence, like an idle microphone. [`WavRecorder`] renders the
//! coach's scheduled audio onto a timeline and writes it out when the session
//! releases it.

use crate::mixer::Mixer;
use crate::resample::resample;
use async_trait::async_trait;
use fala_realtime::{
    AudioBuffer, AudioOutput, CaptureSettings, FrameChunker, Microphone, MicrophoneStream,
    SegmentId, VoiceError,
};
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

/// Read a WAV file as mono float samples.
pub fn read_wav(path: &Path) -> anyhow::Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };
    let channels = spec.channels.max(1) as usize;
    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();
    Ok((mono, spec.sample_rate))
}

/// Microphone that streams a recording.
#[derive(Debug, Clone)]
pub struct WavMicrophone {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
}

impl WavMicrophone {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let (samples, sample_rate) = read_wav(path.as_ref())?;
        tracing::info!(
            path = %path.as_ref().display(),
            seconds = samples.len() as f64 / sample_rate as f64,
            "Loaded microphone recording"
        );
        Ok(Self::from_samples(samples, sample_rate))
    }

    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples: Arc::new(samples), sample_rate }
    }
}

#[async_trait]
impl Microphone for WavMicrophone {
    async fn acquire(&self, settings: CaptureSettings) -> fala_realtime::Result<MicrophoneStream> {
        if settings.frame_samples == 0 || settings.format.sample_rate == 0 {
            return Err(VoiceError::device("invalid capture settings"));
        }
        let samples = resample(&self.samples, self.sample_rate, settings.format.sample_rate)
            .map_err(|e| VoiceError::device(format!("cannot resample recording: {}", e)))?;
        let frame_len = settings.frame_samples;
        let period =
            Duration::from_secs_f64(frame_len as f64 / settings.format.sample_rate as f64);

        let (tx, rx) = mpsc::channel(8);
        let feeder = tokio::spawn(async move {
            let mut chunker = FrameChunker::new(frame_len);
            let mut frames = chunker.push(&samples);
            if let Some(mut rest) = chunker.flush_remaining() {
                rest.resize(frame_len, 0.0);
                frames.push(rest);
            }
            let mut frames = frames.into_iter();

            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let frame = frames.next().unwrap_or_else(|| vec![0.0; frame_len]);
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        Ok(MicrophoneStream::new(rx, move || feeder.abort()))
    }
}

/// Speaker that records the coach to a WAV file.
#[derive(Debug)]
pub struct WavRecorder {
    path: PathBuf,
    mixer: Mixer,
    started: Instant,
    written: bool,
}

impl WavRecorder {
    pub fn create(path: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self { path: path.into(), mixer: Mixer::new(sample_rate), started: Instant::now(), written: false }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self) -> anyhow::Result<u64> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.mixer.sample_rate(),
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&self.path, spec)?;
        let frames = self.mixer.end();
        let mut block = vec![0.0f32; 4096];
        let mut from = 0;
        while from < frames {
            let len = (frames - from).min(block.len() as u64) as usize;
            self.mixer.render(from, &mut block[..len]);
            for sample in &block[..len] {
                writer.write_sample((sample * i16::MAX as f32) as i16)?;
            }
            from += len as u64;
        }
        writer.finalize()?;
        Ok(frames)
    }
}

impl AudioOutput for WavRecorder {
    fn current_time(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn resume(&self) -> BoxFuture<'static, fala_realtime::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn start_segment(
        &mut self,
        id: SegmentId,
        buffer: &AudioBuffer,
        when: f64,
    ) -> fala_realtime::Result<()> {
        if self.written {
            return Err(VoiceError::audio_context("recorder already closed"));
        }
        self.mixer
            .insert(id, buffer, when)
            .map_err(|e| VoiceError::decoding(format!("cannot resample segment: {}", e)))
    }

    fn stop_segment(&mut self, id: SegmentId) {
        let now = self.mixer.frame_at(self.current_time());
        self.mixer.cut(id, now);
    }

    fn close(&mut self) {
        if self.written {
            return;
        }
        self.written = true;
        match self.write() {
            Ok(frames) => tracing::info!(
                path = %self.path.display(),
                seconds = frames as f64 / self.mixer.sample_rate() as f64,
                "Coach audio recorded"
            ),
            Err(e) => tracing::error!(path = %self.path.display(), error = %e, "Failed to write recording"),
        }
    }
}
