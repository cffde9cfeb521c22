//! Microphone capture.
//!
//! A [`Microphone`] yields a [`MicrophoneStream`] of fixed-size frames. The
//! stream owns the device through a [`DeviceGuard`] that is released when the
//! stream is dropped, so every exit path gives the hardware back. The
//! [`CapturePipeline`] gates each frame on the [`MicGate`] and encodes it for
//! the transport.

use crate::audio::{AudioFormat, TransportBlob, encode};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// User-controlled mute switch shared between the handle and the capture path.
///
/// Open means frames are sent. Clones share the same flag.
#[derive(Debug, Clone)]
pub struct MicGate(Arc<AtomicBool>);

impl Default for MicGate {
    fn default() -> Self {
        Self::new(true)
    }
}

impl MicGate {
    pub fn new(open: bool) -> Self {
        Self(Arc::new(AtomicBool::new(open)))
    }

    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set_open(&self, open: bool) {
        self.0.store(open, Ordering::SeqCst);
    }

    /// Flip the gate and return the new state.
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::SeqCst)
    }
}

/// What the session asks of a microphone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    pub format: AudioFormat,
    /// Samples per delivered frame.
    pub frame_samples: usize,
}

/// Releases a captured device. Called at most once.
pub trait DeviceGuard: Send {
    fn release(&mut self);
}

impl<F: FnMut() + Send> DeviceGuard for F {
    fn release(&mut self) {
        self()
    }
}

/// Frames from an acquired microphone.
pub struct MicrophoneStream {
    frames: mpsc::Receiver<Vec<f32>>,
    guard: Option<Box<dyn DeviceGuard>>,
}

impl MicrophoneStream {
    pub fn new(frames: mpsc::Receiver<Vec<f32>>, guard: impl DeviceGuard + 'static) -> Self {
        Self { frames, guard: Some(Box::new(guard)) }
    }

    /// Next captured frame; `None` once the device stopped producing.
    pub async fn recv(&mut self) -> Option<Vec<f32>> {
        if self.guard.is_none() {
            return None;
        }
        self.frames.recv().await
    }

    /// Stop the device. Idempotent.
    pub fn release(&mut self) {
        if let Some(mut guard) = self.guard.take() {
            guard.release();
            self.frames.close();
            tracing::debug!("Microphone released");
        }
    }

    pub fn is_released(&self) -> bool {
        self.guard.is_none()
    }
}

impl Drop for MicrophoneStream {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for MicrophoneStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicrophoneStream").field("released", &self.is_released()).finish()
    }
}

/// Source of microphone audio.
///
/// Acquisition may wait on user consent. A denial is reported as
/// [`VoiceError::DeviceError`](crate::VoiceError::DeviceError).
#[async_trait]
pub trait Microphone: Send + Sync {
    async fn acquire(&self, settings: CaptureSettings) -> Result<MicrophoneStream>;
}

#[async_trait]
impl<T: Microphone + ?Sized> Microphone for Box<T> {
    async fn acquire(&self, settings: CaptureSettings) -> Result<MicrophoneStream> {
        (**self).acquire(settings).await
    }
}

/// Gates and encodes captured frames in capture order.
#[derive(Debug, Clone)]
pub struct CapturePipeline {
    gate: MicGate,
    sample_rate: u32,
    frames_sent: u64,
    frames_muted: u64,
}

impl CapturePipeline {
    pub fn new(gate: MicGate, sample_rate: u32) -> Self {
        Self { gate, sample_rate, frames_sent: 0, frames_muted: 0 }
    }

    /// Encode `frame` for the transport, or `None` while muted.
    pub fn process(&mut self, frame: &[f32]) -> Option<TransportBlob> {
        if !self.gate.is_open() {
            self.frames_muted += 1;
            return None;
        }
        self.frames_sent += 1;
        Some(encode(frame, self.sample_rate))
    }

    pub fn gate(&self) -> &MicGate {
        &self.gate
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_muted(&self) -> u64 {
        self.frames_muted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_gate_toggle_shared() {
        let gate = MicGate::default();
        let other = gate.clone();
        assert!(gate.is_open());
        assert!(!other.toggle());
        assert!(!gate.is_open());
        assert!(gate.toggle());
        assert!(other.is_open());
    }

    #[test]
    fn test_pipeline_discards_muted_frames() {
        let gate = MicGate::default();
        let mut pipeline = CapturePipeline::new(gate.clone(), 16_000);

        assert!(pipeline.process(&[0.1; 8]).is_some());
        gate.set_open(false);
        assert!(pipeline.process(&[0.1; 8]).is_none());
        gate.set_open(true);
        let blob = pipeline.process(&[0.1; 8]).unwrap();

        assert_eq!(blob.mime_type, "audio/pcm;rate=16000");
        assert_eq!(pipeline.frames_sent(), 2);
        assert_eq!(pipeline.frames_muted(), 1);
    }

    #[tokio::test]
    async fn test_stream_releases_once_on_drop() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let (tx, rx) = mpsc::channel(4);
        tx.send(vec![0.0; 4]).await.unwrap();

        let mut stream = MicrophoneStream::new(rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(stream.recv().await, Some(vec![0.0; 4]));
        stream.release();
        assert!(stream.recv().await.is_none());
        drop(stream);

        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(tx.is_closed());
    }
}
