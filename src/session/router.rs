//! Inbound message routing
//!
//! Dispatches whatever the transport hands over (binary wire frames or JSON
//! text) to the current [`PlaybackSession`], creating and configuring one on
//! demand:
//!
//! - first audio frame with no player: create and configure one
//! - empty payload: flush, then drop the player
//! - `is_final`: decode the payload, then flush
//! - `tts_audio_meta` announcing Opus: create if missing, then configure
//! - anything else: returned to the caller untouched

use crate::audio::playback::OutputTimeline;
use crate::codec::pipeline::DecoderFactory;
use crate::config::AppConfig;
use crate::error::{CodecError, ProtocolError};
use crate::protocol::messages::InboundMessage;
use crate::protocol::wire::WireFrame;
use crate::session::player::{PlaybackSession, SessionStats};

/// What the router did with one message
#[derive(Debug, Clone, PartialEq)]
pub enum RouteEvent {
    /// Payload handed to the session
    Audio { sequence: u32, is_final: bool },
    /// Empty payload: the utterance was flushed and the player dropped
    EndOfUnit { sequence: u32 },
    /// Frame could not be parsed and was dropped
    Dropped(ProtocolError),
    /// Empty binary message, ignored
    Empty,
    /// Downlink format announced; the player was (re)configured
    Configured,
    /// Message for the application
    Passthrough(InboundMessage),
}

pub struct InboundRouter<F, T>
where
    F: DecoderFactory + Clone,
    T: OutputTimeline + Clone,
{
    factory: F,
    timeline: T,
    config: AppConfig,
    session: Option<PlaybackSession<F, T>>,
    malformed: u64,
    /// Counters of sessions already dropped
    retired: SessionStats,
}

impl<F, T> InboundRouter<F, T>
where
    F: DecoderFactory + Clone,
    T: OutputTimeline + Clone,
{
    pub fn new(factory: F, timeline: T, config: AppConfig) -> Self {
        Self {
            factory,
            timeline,
            config,
            session: None,
            malformed: 0,
            retired: SessionStats::default(),
        }
    }

    /// Handle one binary transport message
    pub fn handle_binary(&mut self, data: &[u8]) -> Result<RouteEvent, CodecError> {
        if data.is_empty() {
            tracing::debug!("Skipping empty binary message");
            return Ok(RouteEvent::Empty);
        }

        let frame = match WireFrame::parse(data) {
            Ok(frame) => frame,
            Err(e) => {
                self.malformed += 1;
                tracing::warn!("Dropping wire frame: {}", e);
                return Ok(RouteEvent::Dropped(e));
            }
        };

        self.handle_frame(frame)
    }

    /// Handle an already parsed wire frame
    pub fn handle_frame(&mut self, frame: WireFrame) -> Result<RouteEvent, CodecError> {
        let session = self.ensure_session(true)?;

        if frame.is_end_of_unit() {
            tracing::debug!(
                "End of decode unit at seq {} (final: {})",
                frame.sequence,
                frame.is_final
            );
            let flushed = session.flush();
            self.retire_session();
            flushed?;
            return Ok(RouteEvent::EndOfUnit {
                sequence: frame.sequence,
            });
        }

        session.submit(frame.sequence, frame.payload);

        if frame.is_final {
            session.flush()?;
        }

        Ok(RouteEvent::Audio {
            sequence: frame.sequence,
            is_final: frame.is_final,
        })
    }

    /// Handle one JSON text message
    pub fn handle_text(&mut self, text: &str) -> Result<RouteEvent, crate::Error> {
        let message = InboundMessage::parse(text)?;

        if message.announces_opus() {
            let session = self.ensure_session(false)?;
            session.configure()?;
            return Ok(RouteEvent::Configured);
        }

        Ok(RouteEvent::Passthrough(message))
    }

    /// Schedule decoded audio that became ready since the last message
    pub fn pump(&mut self) -> usize {
        self.session.as_mut().map_or(0, PlaybackSession::pump)
    }

    /// Close the current player, if any
    pub fn close(&mut self) {
        self.retire_session();
    }

    pub fn session(&self) -> Option<&PlaybackSession<F, T>> {
        self.session.as_ref()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    /// Counters summed over the current and every dropped session
    pub fn totals(&self) -> SessionStats {
        let mut totals = self.retired.clone();
        if let Some(session) = &self.session {
            add_stats(&mut totals, &session.stats());
        }
        totals
    }

    fn ensure_session(
        &mut self,
        configure_new: bool,
    ) -> Result<&mut PlaybackSession<F, T>, CodecError> {
        if self.session.is_none() {
            tracing::info!("Creating playback session");
            let mut session =
                PlaybackSession::new(self.factory.clone(), self.timeline.clone(), &self.config)?;
            if configure_new {
                session.configure()?;
            }
            self.session = Some(session);
        }
        self.session.as_mut().ok_or(CodecError::Closed)
    }

    fn retire_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
            add_stats(&mut self.retired, &session.stats());
        }
    }
}

fn add_stats(total: &mut SessionStats, s: &SessionStats) {
    total.frames_submitted += s.frames_submitted;
    total.frames_stale += s.frames_stale;
    total.frames_evicted += s.frames_evicted;
    total.chunks_decoded += s.chunks_decoded;
    total.decode_failures += s.decode_failures;
    total.chunks_scheduled += s.chunks_scheduled;
    total.late_snaps += s.late_snaps;
    total.stale_epoch_discards += s.stale_epoch_discards;
    total.flushes += s.flushes;
}
