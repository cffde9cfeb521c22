//! Band-limited sample rate conversion.
//!
//! Device and file audio rarely runs at the session's rates, so every stream
//! owns one [`StreamResampler`] for its whole lifetime. The resampler keeps
//! unconsumed input between calls, which makes the output independent of how
//! a device happens to slice its callbacks.

use anyhow::{Result, bail};
use rubato::{FftFixedIn, Resampler};

/// Input frames per FFT chunk.
const CHUNK_FRAMES: usize = 1024;
const SUB_CHUNKS: usize = 2;

/// Stateful mono resampler for one continuous stream.
pub struct StreamResampler {
    inner: Option<FftFixedIn<f32>>,
    pending: Vec<f32>,
}

impl std::fmt::Debug for StreamResampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResampler")
            .field("passthrough", &self.inner.is_none())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl StreamResampler {
    pub fn new(from: u32, to: u32) -> Result<Self> {
        if from == 0 || to == 0 {
            bail!("sample rates must be positive ({} -> {})", from, to);
        }
        let inner = if from == to {
            None
        } else {
            Some(FftFixedIn::<f32>::new(from as usize, to as usize, CHUNK_FRAMES, SUB_CHUNKS, 1)?)
        };
        Ok(Self { inner, pending: Vec::new() })
    }

    /// Frames of filter delay at the start of the output.
    pub fn delay(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.output_delay())
    }

    /// Convert every complete chunk available; the remainder waits for more input.
    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(samples.to_vec());
        };
        self.pending.extend_from_slice(samples);

        let mut out = Vec::new();
        let mut offset = 0;
        loop {
            let needed = inner.input_frames_next();
            if self.pending.len() - offset < needed {
                break;
            }
            let chunk: [&[f32]; 1] = [&self.pending[offset..offset + needed]];
            let mut converted = inner.process(&chunk[..], None)?;
            out.append(&mut converted[0]);
            offset += needed;
        }
        self.pending.drain(..offset);
        Ok(out)
    }

    /// Push buffered input through, padded with silence.
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(Vec::new());
        };
        let rest = std::mem::take(&mut self.pending);
        let chunk: [&[f32]; 1] = [rest.as_slice()];
        let mut converted = inner.process_partial(Some(&chunk[..]), None)?;
        Ok(std::mem::take(&mut converted[0]))
    }
}

/// Convert a complete recording, aligned to the input and trimmed to its duration.
pub fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let mut resampler = StreamResampler::new(from, to)?;
    let expected = (samples.len() as f64 * to as f64 / from as f64).round() as usize;
    let delay = resampler.delay();

    let mut out = resampler.process(samples)?;
    while out.len() < delay + expected {
        out.extend(resampler.flush()?);
    }
    out.drain(..delay);
    out.truncate(expected);
    Ok(out)
}
