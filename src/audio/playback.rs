//! Playback scheduling on an output timeline
//!
//! [`PlaybackScheduler`] decides *when* each decoded chunk plays. It keeps a
//! single `playhead` (the next free instant on the output clock) and a
//! `primed` flag. The first chunk of an utterance is pushed at least
//! `prebuffer` into the future; every chunk starts no earlier than
//! `now + safety_margin`, and consecutive chunks are laid end to end.
//!
//! [`OutputTimeline`] is the clock + "play this at T" capability the
//! scheduler's decisions are applied to. [`VirtualTimeline`] is a manual
//! clock for deterministic use; the cpal adapter lives in
//! [`crate::audio::output`].

use parking_lot::Mutex;
use std::sync::Arc;

use crate::audio::types::DecodedBuffer;

/// Identifies a chunk handed to an output timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleHandle {
    pub id: u64,
    /// Output-clock start, seconds
    pub start: f64,
    /// Output-clock end, seconds
    pub end: f64,
}

/// Output clock plus fire-and-forget scheduling.
///
/// Once scheduled, a chunk plays on its own; there is no retraction.
pub trait OutputTimeline {
    /// Current output-clock time in seconds
    fn now(&self) -> f64;

    /// Play `buffer` starting at output-clock time `at`
    fn schedule(&mut self, buffer: DecodedBuffer, at: f64) -> ScheduleHandle;
}

/// Where a chunk was placed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub start: f64,
    /// Start was pushed forward to `now + safety_margin` because the
    /// chunk arrived after the playhead had already passed
    pub snapped: bool,
}

/// Playhead bookkeeping for one utterance epoch
#[derive(Debug, Clone)]
pub struct PlaybackScheduler {
    playhead: f64,
    primed: bool,
    prebuffer: f64,
    safety_margin: f64,
}

impl PlaybackScheduler {
    pub fn new(prebuffer: f64, safety_margin: f64) -> Self {
        Self {
            playhead: 0.0,
            primed: false,
            prebuffer,
            safety_margin,
        }
    }

    /// Start a new epoch: playhead one prebuffer ahead of `now`, not primed
    pub fn reset(&mut self, now: f64) {
        self.playhead = (now + self.prebuffer).max(0.0);
        self.primed = false;
    }

    /// Reserve `duration` seconds of output time for a chunk arriving at `now`
    pub fn place(&mut self, now: f64, duration: f64) -> Placement {
        if !self.primed {
            self.playhead = self.playhead.max(now + self.prebuffer);
            self.primed = true;
        }

        let earliest = now + self.safety_margin;
        let snapped = earliest > self.playhead;
        let start = if snapped { earliest } else { self.playhead };

        self.playhead = start + duration;
        Placement { start, snapped }
    }

    pub fn playhead(&self) -> f64 {
        self.playhead
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    pub fn prebuffer(&self) -> f64 {
        self.prebuffer
    }

    pub fn safety_margin(&self) -> f64 {
        self.safety_margin
    }
}

/// A chunk recorded by [`VirtualTimeline`]
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledChunk {
    pub handle: ScheduleHandle,
    /// Clock reading when the chunk was scheduled
    pub scheduled_at: f64,
    pub buffer: DecodedBuffer,
}

#[derive(Debug, Default)]
struct VirtualState {
    now: f64,
    next_id: u64,
    scheduled: Vec<ScheduledChunk>,
}

/// Manually advanced output clock that records every scheduled chunk.
///
/// Clones share the same clock and log, so a caller can keep a handle while
/// a session owns another.
#[derive(Debug, Clone, Default)]
pub struct VirtualTimeline {
    state: Arc<Mutex<VirtualState>>,
}

impl VirtualTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(now: f64) -> Self {
        let timeline = Self::new();
        timeline.set_now(now);
        timeline
    }

    pub fn set_now(&self, now: f64) {
        self.state.lock().now = now;
    }

    pub fn advance(&self, seconds: f64) {
        self.state.lock().now += seconds;
    }

    /// Every chunk scheduled so far, in scheduling order
    pub fn scheduled(&self) -> Vec<ScheduledChunk> {
        self.state.lock().scheduled.clone()
    }

    pub fn scheduled_count(&self) -> usize {
        self.state.lock().scheduled.len()
    }
}

impl OutputTimeline for VirtualTimeline {
    fn now(&self) -> f64 {
        self.state.lock().now
    }

    fn schedule(&mut self, buffer: DecodedBuffer, at: f64) -> ScheduleHandle {
        let mut state = self.state.lock();
        let handle = ScheduleHandle {
            id: state.next_id,
            start: at,
            end: at + buffer.duration(),
        };
        state.next_id += 1;
        let scheduled_at = state.now;
        state.scheduled.push(ScheduledChunk {
            handle,
            scheduled_at,
            buffer,
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREBUFFER: f64 = 0.25;
    const SAFETY: f64 = 0.12;
    const CHUNK: f64 = 0.02;
    const EPS: f64 = 1e-9;

    #[test]
    fn test_first_chunk_waits_for_prebuffer() {
        let mut scheduler = PlaybackScheduler::new(PREBUFFER, SAFETY);
        scheduler.reset(0.0);

        let placement = scheduler.place(1.0, CHUNK);
        assert!((placement.start - 1.25).abs() < EPS);
        assert!(!placement.snapped);
        assert!(scheduler.is_primed());
        assert!((scheduler.playhead() - 1.27).abs() < EPS);
    }

    #[test]
    fn test_timely_chunks_are_contiguous() {
        let mut scheduler = PlaybackScheduler::new(PREBUFFER, SAFETY);
        scheduler.reset(0.0);

        let mut starts = Vec::new();
        for i in 0..10 {
            // Arrivals keep pace with playback
            let now = i as f64 * CHUNK;
            starts.push(scheduler.place(now, CHUNK).start);
        }

        for pair in starts.windows(2) {
            assert!((pair[1] - (pair[0] + CHUNK)).abs() < EPS);
        }
    }

    #[test]
    fn test_late_arrivals_snap_forward_without_overlap() {
        let mut scheduler = PlaybackScheduler::new(PREBUFFER, SAFETY);
        scheduler.reset(0.0);

        let arrivals = [0.0, 0.01, 0.5, 0.505, 1.2, 1.21, 1.22];
        let mut last_end = f64::NEG_INFINITY;
        let mut last_start = f64::NEG_INFINITY;

        for (i, &now) in arrivals.iter().enumerate() {
            let placement = scheduler.place(now, CHUNK);
            if i == 0 {
                assert!(placement.start >= now + PREBUFFER - EPS);
            }
            assert!(placement.start >= now + SAFETY - EPS);
            assert!(placement.start >= last_start);
            assert!(placement.start >= last_end - EPS);
            last_start = placement.start;
            last_end = placement.start + CHUNK;
        }
    }

    #[test]
    fn test_snap_is_reported() {
        let mut scheduler = PlaybackScheduler::new(PREBUFFER, SAFETY);
        scheduler.reset(0.0);
        scheduler.place(0.0, CHUNK);

        let placement = scheduler.place(2.0, CHUNK);
        assert!(placement.snapped);
        assert!((placement.start - 2.12).abs() < EPS);
    }

    #[test]
    fn test_reset_unprimes() {
        let mut scheduler = PlaybackScheduler::new(PREBUFFER, SAFETY);
        scheduler.reset(0.0);
        scheduler.place(0.0, CHUNK);

        scheduler.reset(3.0);
        assert!(!scheduler.is_primed());
        assert!((scheduler.playhead() - 3.25).abs() < EPS);
    }

    #[test]
    fn test_virtual_timeline_records() {
        let mut timeline = VirtualTimeline::starting_at(1.0);
        let observer = timeline.clone();

        let handle = timeline.schedule(DecodedBuffer::mono(vec![0.0; 480], 24_000), 1.5);
        observer.advance(0.5);

        assert_eq!(handle.id, 0);
        assert!((handle.end - 1.52).abs() < EPS);
        assert!((timeline.now() - 1.5).abs() < EPS);

        let chunks = observer.scheduled();
        assert_eq!(chunks.len(), 1);
        assert!((chunks[0].scheduled_at - 1.0).abs() < EPS);
    }
}
