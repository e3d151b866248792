//! Downlink playback session
//!
//! Owns everything one utterance epoch mutates: the reorder window and its
//! cursor, the decode pipeline, and the playhead. All mutation goes through
//! `&mut self`, so the session is driven by exactly one event loop and needs
//! no locking.

use bytes::Bytes;

use crate::audio::buffer::ReorderBuffer;
use crate::audio::playback::{OutputTimeline, PlaybackScheduler, ScheduleHandle};
use crate::audio::types::DecodedBuffer;
use crate::codec::header::OpusHead;
use crate::codec::pipeline::{DecodePipeline, DecoderFactory};
use crate::config::AppConfig;
use crate::error::CodecError;

/// Session counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_submitted: u64,
    pub frames_stale: u64,
    pub frames_evicted: u64,
    pub chunks_decoded: u64,
    pub decode_failures: u64,
    pub chunks_scheduled: u64,
    /// Chunks whose start was pushed to `now + safety_margin`
    pub late_snaps: u64,
    pub stale_epoch_discards: u64,
    pub flushes: u64,
}

pub struct PlaybackSession<F: DecoderFactory, T: OutputTimeline> {
    pipeline: DecodePipeline<F>,
    reorder: ReorderBuffer,
    scheduler: PlaybackScheduler,
    timeline: T,
    head: OpusHead,
    closed: bool,
    stats: SessionStats,
}

impl<F: DecoderFactory, T: OutputTimeline> PlaybackSession<F, T> {
    /// Create a session. Fails with [`CodecError::UnsupportedPlatform`] when
    /// the decode capability is unavailable; the session never starts then.
    ///
    /// The session still needs [`configure`](Self::configure) before the
    /// first frame.
    pub fn new(factory: F, timeline: T, config: &AppConfig) -> Result<Self, CodecError> {
        let pipeline = DecodePipeline::new(factory, config.codec.frame_duration_us)?;
        let mut scheduler = PlaybackScheduler::new(
            config.playback.prebuffer_sec,
            config.playback.safety_margin_sec,
        );
        scheduler.reset(timeline.now());

        Ok(Self {
            pipeline,
            reorder: ReorderBuffer::new(config.playback.reorder_window),
            scheduler,
            timeline,
            head: OpusHead::for_stream(config.codec.sample_rate, config.codec.channels as u8),
            closed: false,
            stats: SessionStats::default(),
        })
    }

    /// Start an utterance: recreate the decoder with a fresh `OpusHead` and
    /// reset the cursor, reorder window and playhead
    pub fn configure(&mut self) -> Result<(), CodecError> {
        if self.closed {
            return Ok(());
        }
        let head = self.head;
        self.pipeline.reconfigure(&head)?;
        self.reset_epoch_state();
        tracing::debug!("Playback configured, epoch {}", self.pipeline.epoch());
        Ok(())
    }

    /// Accept one inbound payload
    pub fn submit(&mut self, seq: u32, payload: Bytes) {
        self.submit_timed(seq, payload, None);
    }

    /// Accept one inbound payload with an explicit presentation timestamp.
    ///
    /// The hint only applies if this payload is released immediately;
    /// payloads released from the reorder window use `seq * frame_duration`.
    pub fn submit_timed(&mut self, seq: u32, payload: Bytes, timestamp_us: Option<f64>) {
        if self.closed {
            return;
        }
        self.stats.frames_submitted += 1;

        let outcome = self.reorder.submit(seq, payload);
        if outcome.stale {
            self.stats.frames_stale += 1;
            return;
        }
        self.stats.frames_evicted += outcome.evicted.len() as u64;

        for (released, payload) in outcome.released {
            let hint = if released == seq { timestamp_us } else { None };
            if let Err(e) = self.pipeline.decode(payload, released, hint) {
                self.stats.decode_failures += 1;
                tracing::warn!("Failed to submit seq {} for decoding: {}", released, e);
            }
        }

        self.pump();
    }

    /// Schedule every decoded buffer that is ready. Returns how many were
    /// scheduled.
    pub fn pump(&mut self) -> usize {
        let mut scheduled = 0;
        while let Some(output) = self.pipeline.try_next() {
            match output.result {
                Ok(buffer) => {
                    self.stats.chunks_decoded += 1;
                    self.on_decoded(buffer);
                    scheduled += 1;
                }
                Err(e) => {
                    // The cursor already moved past this unit; skip it
                    self.stats.decode_failures += 1;
                    tracing::warn!("Decode failed for seq {}: {}", output.sequence, e);
                }
            }
        }
        self.stats.stale_epoch_discards = self.pipeline.stale_discarded();
        scheduled
    }

    /// Place one decoded buffer on the output timeline
    pub fn on_decoded(&mut self, buffer: DecodedBuffer) -> ScheduleHandle {
        let now = self.timeline.now();
        let placement = self.scheduler.place(now, buffer.duration());
        if placement.snapped {
            self.stats.late_snaps += 1;
            tracing::debug!("Chunk arrived late, starting at now + safety margin");
        }
        self.stats.chunks_scheduled += 1;
        self.timeline.schedule(buffer, placement.start)
    }

    /// End the utterance: drain the decoder, schedule what it emits, then
    /// reset the cursor, reorder window and playhead for the next one
    pub fn flush(&mut self) -> Result<(), CodecError> {
        if self.closed {
            return Ok(());
        }
        self.stats.flushes += 1;

        let drained = self.pipeline.drain();
        if let Err(ref e) = drained {
            tracing::error!("Decoder flush failed: {}", e);
        }
        self.pump();

        self.pipeline.advance_epoch();
        self.reset_epoch_state();
        drained
    }

    /// Release the decoder permanently. Chunks already scheduled keep
    /// playing; every later call on this session is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.pipeline.close();
        self.reorder.reset();
        self.closed = true;
        tracing::debug!("Playback session closed");
    }

    fn reset_epoch_state(&mut self) {
        self.reorder.reset();
        self.scheduler.reset(self.timeline.now());
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Next sequence the session will decode
    pub fn expecting(&self) -> u64 {
        self.reorder.expecting()
    }

    /// Sequences waiting in the reorder window
    pub fn buffered(&self) -> Vec<u32> {
        self.reorder.buffered()
    }

    pub fn playhead(&self) -> f64 {
        self.scheduler.playhead()
    }

    pub fn is_primed(&self) -> bool {
        self.scheduler.is_primed()
    }

    pub fn epoch(&self) -> u64 {
        self.pipeline.epoch()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.clone()
    }

    pub fn timeline(&self) -> &T {
        &self.timeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::playback::VirtualTimeline;
    use crate::codec::testing::{chunk_of, ScriptedFactory, FAIL_BYTE};

    const EPS: f64 = 1e-9;

    type TestSession = PlaybackSession<ScriptedFactory, VirtualTimeline>;

    fn session(factory: &ScriptedFactory, timeline: &VirtualTimeline) -> TestSession {
        let mut session =
            PlaybackSession::new(factory.clone(), timeline.clone(), &AppConfig::default()).unwrap();
        session.configure().unwrap();
        session
    }

    fn payload(value: u8) -> Bytes {
        Bytes::from(vec![value, 0, 0])
    }

    fn scheduled_values(timeline: &VirtualTimeline) -> Vec<f32> {
        timeline
            .scheduled()
            .iter()
            .map(|c| c.buffer.plane(0).unwrap()[0])
            .collect()
    }

    #[test]
    fn test_unsupported_platform() {
        let result = TestSession::new(
            ScriptedFactory::unsupported(),
            VirtualTimeline::new(),
            &AppConfig::default(),
        );
        assert!(matches!(result, Err(CodecError::UnsupportedPlatform(_))));
    }

    #[test]
    fn test_configure_sends_reference_head() {
        let factory = ScriptedFactory::new();
        let timeline = VirtualTimeline::starting_at(2.0);
        let session = session(&factory, &timeline);

        assert_eq!(factory.configured(), vec![OpusHead::default()]);
        assert_eq!(OpusHead::default().to_bytes().len(), 19);
        assert!(!session.is_primed());
        assert!((session.playhead() - 2.25).abs() < EPS);
    }

    #[test]
    fn test_out_of_order_frames_decode_in_order() {
        let factory = ScriptedFactory::new();
        let timeline = VirtualTimeline::new();
        let mut session = session(&factory, &timeline);

        session.submit(2, payload(2));
        session.submit(1, payload(1));
        assert!(factory.submitted_sequences().is_empty());
        assert_eq!(session.buffered(), vec![1, 2]);

        session.submit(0, payload(0));
        assert_eq!(factory.submitted_sequences(), vec![0, 1, 2]);

        session.submit(3, payload(3));
        assert_eq!(factory.submitted_sequences(), vec![0, 1, 2, 3]);
        assert_eq!(session.expecting(), 4);

        let expected: Vec<f32> = (0..4u8).map(|v| chunk_of(v).planes[0][0]).collect();
        assert_eq!(scheduled_values(&timeline), expected);
    }

    #[test]
    fn test_timestamps_from_sequence_and_hint() {
        let factory = ScriptedFactory::new();
        let timeline = VirtualTimeline::new();
        let mut session = session(&factory, &timeline);

        session.submit_timed(1, payload(1), Some(99_999.7));
        session.submit_timed(0, payload(0), Some(5_000.2));

        let timestamps: Vec<i64> = factory.submitted().iter().map(|s| s.2).collect();
        // seq 0 was released immediately and keeps its hint; seq 1 came out
        // of the window and falls back to seq * 20 ms
        assert_eq!(timestamps, vec![5_000, 20_000]);
    }

    #[test]
    fn test_missing_packet_stalls_until_flush() {
        let factory = ScriptedFactory::new();
        let timeline = VirtualTimeline::new();
        let mut session = session(&factory, &timeline);

        for seq in 1..=10 {
            session.submit(seq, payload(seq as u8));
        }

        assert_eq!(session.buffered(), (3..=10).collect::<Vec<_>>());
        assert_eq!(session.expecting(), 0);
        assert_eq!(session.stats().frames_evicted, 2);
        assert_eq!(timeline.scheduled_count(), 0);

        session.flush().unwrap();
        assert!(session.buffered().is_empty());
        assert_eq!(session.expecting(), 0);

        session.submit(0, payload(0));
        assert_eq!(timeline.scheduled_count(), 1);
    }

    #[test]
    fn test_stale_and_duplicate_frames_ignored() {
        let factory = ScriptedFactory::new();
        let timeline = VirtualTimeline::new();
        let mut session = session(&factory, &timeline);

        session.submit(0, payload(0));
        session.submit(0, payload(0));
        session.submit(1, payload(1));

        assert_eq!(factory.submitted_sequences(), vec![0, 1]);
        assert_eq!(session.stats().frames_stale, 1);
    }

    #[test]
    fn test_decode_failure_is_skipped() {
        let factory = ScriptedFactory::new();
        let timeline = VirtualTimeline::new();
        let mut session = session(&factory, &timeline);

        session.submit(0, payload(1));
        session.submit(1, Bytes::from_static(&[FAIL_BYTE]));
        session.submit(2, payload(3));

        let stats = session.stats();
        assert_eq!(stats.decode_failures, 1);
        assert_eq!(stats.chunks_scheduled, 2);
        assert_eq!(session.expecting(), 3);
    }

    #[test]
    fn test_schedule_is_monotonic_under_late_arrivals() {
        let factory = ScriptedFactory::new();
        let timeline = VirtualTimeline::starting_at(10.0);
        let mut session = session(&factory, &timeline);

        let first_arrival = timeline.now();
        // Arrivals drift well behind the 20 ms playback pace
        let gaps = [0.0, 0.05, 0.2, 0.01, 0.4, 0.0, 0.3];
        let mut arrivals = Vec::new();
        for (seq, gap) in gaps.iter().enumerate() {
            timeline.advance(*gap);
            arrivals.push(timeline.now());
            session.submit(seq as u32, payload(seq as u8));
        }

        let chunks = timeline.scheduled();
        assert_eq!(chunks.len(), gaps.len());
        assert!(chunks[0].handle.start >= first_arrival + 0.25 - EPS);

        for (chunk, arrival) in chunks.iter().zip(&arrivals) {
            assert!(chunk.handle.start >= arrival + 0.12 - EPS);
        }
        for pair in chunks.windows(2) {
            assert!(pair[1].handle.start >= pair[0].handle.start);
            assert!(pair[1].handle.start >= pair[0].handle.end - EPS);
        }
        assert!(session.stats().late_snaps > 0);
    }

    #[test]
    fn test_flush_schedules_drained_output_then_resets() {
        let factory = ScriptedFactory::deferred();
        let timeline = VirtualTimeline::new();
        let mut session = session(&factory, &timeline);

        session.submit(0, payload(0));
        session.submit(1, payload(1));
        assert_eq!(timeline.scheduled_count(), 0);

        timeline.advance(1.0);
        session.flush().unwrap();

        assert_eq!(factory.flushed(), 1);
        assert_eq!(timeline.scheduled_count(), 2);
        assert_eq!(session.expecting(), 0);
        assert!(!session.is_primed());
        assert!((session.playhead() - 1.25).abs() < EPS);
        // Flush keeps the decoder; only configure rebuilds it
        assert_eq!(factory.configured().len(), 1);
    }

    #[test]
    fn test_late_outputs_from_previous_epoch_are_discarded() {
        let factory = ScriptedFactory::deferred();
        let timeline = VirtualTimeline::new();
        let mut session = session(&factory, &timeline);

        session.submit(0, payload(0));
        session.submit(1, payload(1));

        // New utterance before the old decoder delivered anything
        session.configure().unwrap();
        factory.release_pending();
        session.pump();

        assert_eq!(timeline.scheduled_count(), 0);
        assert_eq!(session.stats().stale_epoch_discards, 2);
    }

    #[test]
    fn test_close_is_final() {
        let factory = ScriptedFactory::new();
        let timeline = VirtualTimeline::new();
        let mut session = session(&factory, &timeline);

        session.submit(0, payload(0));
        session.close();
        session.close();
        session.submit(1, payload(1));
        assert!(session.flush().is_ok());
        assert!(session.configure().is_ok());

        assert!(session.is_closed());
        assert_eq!(factory.closed(), 2);
        assert_eq!(factory.submitted_sequences(), vec![0]);
        // Already scheduled audio is not retracted
        assert_eq!(timeline.scheduled_count(), 1);
    }

    #[test]
    fn test_reconfigure_after_failure_is_safe() {
        let factory = ScriptedFactory::new();
        let timeline = VirtualTimeline::new();
        let mut session = session(&factory, &timeline);

        session.submit(1, payload(1));
        session.submit(1, Bytes::from_static(&[FAIL_BYTE]));
        session.configure().unwrap();

        assert_eq!(session.expecting(), 0);
        assert!(session.buffered().is_empty());
        session.submit(0, payload(0));
        assert_eq!(timeline.scheduled_count(), 1);
    }
}
