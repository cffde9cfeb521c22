//! Gapless playback scheduling.
//!
//! Model audio arrives as many short segments. [`PlaybackScheduler`] lays them
//! back to back on the output device's timeline through a single
//! `next_start_time` cursor, keeps track of what is still sounding, and can cut
//! everything at once when the model is interrupted.

use crate::audio::AudioBuffer;
use crate::error::Result;
use futures::future::BoxFuture;
use std::collections::BTreeMap;

/// Identifier of one scheduled segment.
pub type SegmentId = u64;

/// An output device with its own clock.
///
/// Times are seconds on the device timeline. Implementations start a segment
/// at an absolute time and must be able to silence it early.
pub trait AudioOutput: Send {
    /// Current position of the output clock in seconds.
    fn current_time(&self) -> f64;

    /// Resume a suspended output. Platforms may refuse without a user gesture.
    fn resume(&self) -> BoxFuture<'static, Result<()>>;

    /// Start `buffer` at absolute time `when`.
    fn start_segment(&mut self, id: SegmentId, buffer: &AudioBuffer, when: f64) -> Result<()>;

    /// Silence a segment immediately. Unknown ids are ignored.
    fn stop_segment(&mut self, id: SegmentId);

    /// Release the device. Called once during teardown.
    fn close(&mut self);
}

impl<T: AudioOutput + ?Sized> AudioOutput for Box<T> {
    fn current_time(&self) -> f64 {
        (**self).current_time()
    }

    fn resume(&self) -> BoxFuture<'static, Result<()>> {
        (**self).resume()
    }

    fn start_segment(&mut self, id: SegmentId, buffer: &AudioBuffer, when: f64) -> Result<()> {
        (**self).start_segment(id, buffer, when)
    }

    fn stop_segment(&mut self, id: SegmentId) {
        (**self).stop_segment(id)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// A segment committed to the output timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSegment {
    pub id: SegmentId,
    /// Start time on the output clock.
    pub start: f64,
    /// Length in seconds.
    pub duration: f64,
}

impl ScheduledSegment {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Schedules decoded segments back to back on an [`AudioOutput`].
pub struct PlaybackScheduler<O> {
    output: O,
    next_start_time: f64,
    active: BTreeMap<SegmentId, ScheduledSegment>,
    next_id: SegmentId,
    closed: bool,
}

impl<O: AudioOutput> PlaybackScheduler<O> {
    pub fn new(output: O) -> Self {
        Self { output, next_start_time: 0.0, active: BTreeMap::new(), next_id: 0, closed: false }
    }

    /// Current time of the underlying output clock.
    pub fn now(&self) -> f64 {
        self.output.current_time()
    }

    /// Schedule `buffer` right after everything already queued.
    ///
    /// If the cursor fell behind `current_clock_time` (idle output) it is moved
    /// up to the clock first. Empty buffers are skipped and return `None`.
    pub fn enqueue(
        &mut self,
        buffer: &AudioBuffer,
        current_clock_time: f64,
    ) -> Result<Option<ScheduledSegment>> {
        if self.closed || buffer.is_empty() {
            return Ok(None);
        }
        if self.next_start_time < current_clock_time {
            self.next_start_time = current_clock_time;
        }

        let segment = ScheduledSegment {
            id: self.next_id,
            start: self.next_start_time,
            duration: buffer.duration(),
        };
        self.output.start_segment(segment.id, buffer, segment.start)?;

        self.next_id += 1;
        self.next_start_time = segment.end();
        self.active.insert(segment.id, segment);
        tracing::trace!(
            segment_id = segment.id,
            start = segment.start,
            duration = segment.duration,
            "Scheduled playback segment"
        );
        Ok(Some(segment))
    }

    /// Drop segments that have finished playing by `current_clock_time`.
    pub fn reap(&mut self, current_clock_time: f64) -> usize {
        let before = self.active.len();
        self.active.retain(|_, segment| segment.end() > current_clock_time);
        before - self.active.len()
    }

    /// Mark one segment as finished (natural end reported by the output).
    pub fn segment_ended(&mut self, id: SegmentId) -> bool {
        self.active.remove(&id).is_some()
    }

    /// Stop every active segment and reset the cursor to zero.
    pub fn flush(&mut self) -> usize {
        let stopped = self.active.len();
        for id in self.active.keys() {
            self.output.stop_segment(*id);
        }
        self.active.clear();
        self.next_start_time = 0.0;
        if stopped > 0 {
            tracing::debug!(stopped, "Flushed playback queue");
        }
        stopped
    }

    /// Flush and release the output. Further enqueues are ignored.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.flush();
        self.output.close();
        self.closed = true;
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Active segments ordered by id (and therefore by start time).
    pub fn active(&self) -> impl Iterator<Item = &ScheduledSegment> {
        self.active.values()
    }

    pub fn is_playing(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }
}
