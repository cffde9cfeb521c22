//! System microphone and speaker through cpal.
//!
//! cpal streams are not `Send` on every platform, so each stream lives on a
//! dedicated thread that holds it until the session releases the device.

use crate::mixer::{Mixer, mono_at};
use crate::resample::StreamResampler;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use fala_realtime::{
    AudioBuffer, AudioOutput, CaptureSettings, FrameChunker, Microphone, MicrophoneStream,
    SegmentId, VoiceError,
};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};

fn device_error(e: impl std::fmt::Display) -> VoiceError {
    VoiceError::device(e.to_string())
}

/// Default input device.
#[derive(Debug, Clone, Default)]
pub struct CpalMicrophone;

#[async_trait]
impl Microphone for CpalMicrophone {
    async fn acquire(&self, settings: CaptureSettings) -> fala_realtime::Result<MicrophoneStream> {
        let (frames_tx, frames_rx) = mpsc::channel(16);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        std::thread::Builder::new()
            .name("fala-mic".into())
            .spawn(move || {
                let stream = match build_input(settings, frames_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Hold the stream until released.
                let _ = stop_rx.recv();
                drop(stream);
                tracing::debug!("Microphone stream stopped");
            })
            .map_err(device_error)?;

        ready_rx.await.map_err(|_| VoiceError::device("microphone thread exited"))??;
        Ok(MicrophoneStream::new(frames_rx, move || {
            let _ = stop_tx.send(());
        }))
    }
}

fn build_input(
    settings: CaptureSettings,
    frames: mpsc::Sender<Vec<f32>>,
) -> fala_realtime::Result<cpal::Stream> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| VoiceError::device("No input device available"))?;
    let config = device.default_input_config().map_err(device_error)?.config();
    tracing::info!(
        device = %device.name().unwrap_or_else(|_| "unknown".into()),
        rate = config.sample_rate.0,
        channels = config.channels,
        "Opening microphone"
    );

    let channels = config.channels.max(1) as usize;
    let device_rate = config.sample_rate.0;
    let mut resampler = StreamResampler::new(device_rate, settings.format.sample_rate)
        .map_err(device_error)?;
    let mut chunker = FrameChunker::new(settings.frame_samples);
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mono: Vec<f32> = data
                    .chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                    .collect();
                let samples = match resampler.process(&mono) {
                    Ok(samples) => samples,
                    Err(e) => {
                        tracing::warn!(error = %e, "Dropping microphone audio, resampling failed");
                        return;
                    }
                };
                for frame in chunker.push(&samples) {
                    if frames.try_send(frame).is_err() {
                        tracing::warn!("Dropping microphone frame, session is behind");
                    }
                }
            },
            |err| tracing::warn!(error = %err, "Microphone stream error"),
            None,
        )
        .map_err(device_error)?;
    stream.play().map_err(device_error)?;
    Ok(stream)
}

struct Playhead {
    mixer: Mixer,
    played: u64,
}

/// Default output device with a mixing playhead.
pub struct CpalSpeaker {
    playhead: Arc<Mutex<Playhead>>,
    sample_rate: u32,
    stop: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalSpeaker {
    /// Open the default output device and start its clock.
    pub fn open() -> fala_realtime::Result<Self> {
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let thread = std::thread::Builder::new()
            .name("fala-speaker".into())
            .spawn(move || {
                let (stream, playhead) = match build_output() {
                    Ok(opened) => opened,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(playhead));
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(device_error)?;

        let playhead: Arc<Mutex<Playhead>> =
            ready_rx.recv().map_err(|_| VoiceError::device("speaker thread exited"))??;
        let sample_rate = playhead.lock().mixer.sample_rate();
        Ok(Self { playhead, sample_rate, stop: Some(stop_tx), thread: Some(thread) })
    }
}

fn build_output() -> fala_realtime::Result<(cpal::Stream, Arc<Mutex<Playhead>>)> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| VoiceError::device("No output device available"))?;
    let config = device.default_output_config().map_err(device_error)?.config();
    tracing::info!(
        device = %device.name().unwrap_or_else(|_| "unknown".into()),
        rate = config.sample_rate.0,
        channels = config.channels,
        "Opening speaker"
    );
    let playhead =
        Arc::new(Mutex::new(Playhead { mixer: Mixer::new(config.sample_rate.0), played: 0 }));
    let shared = playhead.clone();

    let channels = config.channels.max(1) as usize;
    let mut mono = Vec::new();
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                mono.resize(frames, 0.0);
                let mut head = shared.lock();
                head.mixer.render(head.played, &mut mono);
                head.played += frames as u64;
                let played = head.played;
                head.mixer.prune(played);
                drop(head);
                for (out, sample) in data.chunks_mut(channels).zip(&mono) {
                    out.fill(*sample);
                }
            },
            |err| tracing::warn!(error = %err, "Speaker stream error"),
            None,
        )
        .map_err(device_error)?;
    stream.play().map_err(device_error)?;
    Ok((stream, playhead))
}

impl AudioOutput for CpalSpeaker {
    fn current_time(&self) -> f64 {
        self.playhead.lock().played as f64 / self.sample_rate as f64
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
        if self.stop.is_none() {
            return Err(VoiceError::audio_context("speaker closed"));
        }
        // Convert outside the lock so the audio callback never waits on it.
        let samples = mono_at(buffer, self.sample_rate)
            .map_err(|e| VoiceError::decoding(format!("cannot resample segment: {}", e)))?;
        self.playhead.lock().mixer.place(id, samples, when);
        Ok(())
    }

    fn stop_segment(&mut self, id: SegmentId) {
        let mut head = self.playhead.lock();
        let played = head.played;
        head.mixer.cut(id, played);
    }

    fn close(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("Speaker thread panicked");
            }
        }
    }
}
