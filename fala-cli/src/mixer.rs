//! Timeline mixer shared by the WAV recorder and the desktop speaker.

use crate::resample::resample;
use fala_realtime::{AudioBuffer, SegmentId};
use std::collections::BTreeMap;

#[derive(Debug)]
struct Placed {
    start: u64,
    samples: Vec<f32>,
    /// Frame at which the segment was cut short.
    cut: Option<u64>,
}

impl Placed {
    fn end(&self) -> u64 {
        let natural = self.start + self.samples.len() as u64;
        self.cut.map_or(natural, |cut| cut.min(natural))
    }
}

/// Mono segments placed at absolute frames and summed on render.
#[derive(Debug)]
pub struct Mixer {
    sample_rate: u32,
    segments: BTreeMap<SegmentId, Placed>,
}

impl Mixer {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate, segments: BTreeMap::new() }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_at(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }

    /// Place `buffer` at `when` seconds, downmixed to mono and resampled to the mixer rate.
    pub fn insert(&mut self, id: SegmentId, buffer: &AudioBuffer, when: f64) -> anyhow::Result<()> {
        let samples = mono_at(buffer, self.sample_rate)?;
        self.place(id, samples, when);
        Ok(())
    }

    /// Place samples already at the mixer rate.
    pub fn place(&mut self, id: SegmentId, samples: Vec<f32>, when: f64) {
        let start = self.frame_at(when);
        self.segments.insert(id, Placed { start, samples, cut: None });
    }

    /// Silence a segment from `frame` on.
    pub fn cut(&mut self, id: SegmentId, frame: u64) {
        if let Some(placed) = self.segments.get_mut(&id) {
            placed.cut = Some(frame);
        }
    }

    /// Sum every segment overlapping `[from, from + out.len())` into `out`.
    pub fn render(&self, from: u64, out: &mut [f32]) {
        out.fill(0.0);
        let to = from + out.len() as u64;
        for placed in self.segments.values() {
            let start = placed.start.max(from);
            let end = placed.end().min(to);
            for frame in start..end {
                out[(frame - from) as usize] += placed.samples[(frame - placed.start) as usize];
            }
        }
        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }

    /// Forget segments that ended before `frame`.
    pub fn prune(&mut self, frame: u64) {
        self.segments.retain(|_, placed| placed.end() > frame);
    }

    /// Last frame any segment reaches.
    pub fn end(&self) -> u64 {
        self.segments.values().map(Placed::end).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Downmix `buffer` to mono at `sample_rate`.
pub fn mono_at(buffer: &AudioBuffer, sample_rate: u32) -> anyhow::Result<Vec<f32>> {
    resample(&downmix(buffer), buffer.sample_rate(), sample_rate)
}

fn downmix(buffer: &AudioBuffer) -> Vec<f32> {
    let channels = buffer.number_of_channels().max(1);
    (0..buffer.frames())
        .map(|i| {
            (0..channels).filter_map(|c| buffer.channel(c).map(|s| s[i])).sum::<f32>()
                / channels as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(value: f32, frames: usize) -> AudioBuffer {
        AudioBuffer::mono(vec![value; frames], 10)
    }

    #[test]
    fn test_render_places_segments() {
        let mut mixer = Mixer::new(10);
        mixer.insert(1, &buffer(0.5, 3), 0.0).unwrap();
        mixer.insert(2, &buffer(0.25, 2), 0.3).unwrap();

        let mut out = [0.0; 6];
        mixer.render(0, &mut out);
        assert_eq!(out, [0.5, 0.5, 0.5, 0.25, 0.25, 0.0]);
        assert_eq!(mixer.end(), 5);
    }

    #[test]
    fn test_cut_silences_rest_of_segment() {
        let mut mixer = Mixer::new(10);
        mixer.insert(1, &buffer(0.5, 4), 0.0).unwrap();
        mixer.cut(1, 2);

        let mut out = [0.0; 4];
        mixer.render(0, &mut out);
        assert_eq!(out, [0.5, 0.5, 0.0, 0.0]);
        mixer.prune(2);
        assert!(mixer.is_empty());
    }

    #[test]
    fn test_overlap_is_summed_and_clamped() {
        let mut mixer = Mixer::new(10);
        mixer.insert(1, &buffer(0.75, 2), 0.0).unwrap();
        mixer.insert(2, &buffer(0.75, 2), 0.1).unwrap();

        let mut out = [0.0; 3];
        mixer.render(0, &mut out);
        assert_eq!(out, [0.75, 1.0, 0.75]);
    }

    #[test]
    fn test_insert_converts_to_mixer_rate() {
        let mut mixer = Mixer::new(48_000);
        mixer.insert(1, &AudioBuffer::mono(vec![0.0; 2_400], 24_000), 0.0).unwrap();
        assert_eq!(mixer.end(), 4_800);
    }
}
