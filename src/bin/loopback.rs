//! Loopback Player
//!
//! Exercises both directions on one machine: the microphone is conditioned
//! like the uplink, Opus-encoded into downlink wire frames, shuffled the way
//! a jittery transport would deliver them, and played back through the
//! inbound router.
//!
//! Usage: `loopback [input-device-id] [output-device-id]`

use anyhow::{Context, Result};
use bytes::Bytes;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voice_agent_audio::{
    audio::{
        capture::{FrameAccumulator, MicCapture},
        output::CpalTimeline,
        playback::OutputTimeline,
    },
    codec::{OpusEncoder, OpusWorkerFactory},
    config::AppConfig,
    constants::*,
    protocol::WireFrame,
    session::{InboundRouter, RouteEvent, Uplink},
};

/// Delivers frames in pairs with the two swapped: 1, 0, 3, 2, ...
#[derive(Default)]
struct PairSwapper {
    held: Option<WireFrame>,
}

impl PairSwapper {
    fn push(&mut self, frame: WireFrame) -> Vec<WireFrame> {
        match self.held.take() {
            Some(earlier) => vec![frame, earlier],
            None => {
                self.held = Some(frame);
                Vec::new()
            }
        }
    }

    fn finish(&mut self) -> Option<WireFrame> {
        self.held.take()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting loopback player");

    let config = AppConfig::load().context("loading configuration")?;
    let input_id = std::env::args().nth(1).or(config.capture.device_id.clone());
    let output_id = std::env::args().nth(2).or(config.playback.device_id.clone());

    let timeline = CpalTimeline::open(output_id.as_deref())?;
    let mut router = InboundRouter::new(OpusWorkerFactory, timeline.clone(), config.clone());

    let mut capture = MicCapture::new(
        input_id.as_deref(),
        config.capture.frame_ms,
        config.capture.channel_capacity,
    )?;
    capture.start()?;

    let mut uplink = Uplink::from_config(&config.capture);
    let mut encoder = OpusEncoder::voice(TARGET_SAMPLE_RATE, FRAME_DURATION_MS)?;
    // Opus packets must be exactly one codec frame at the transport rate
    let mut accumulator = FrameAccumulator::new(encoder.frame_size());
    let mut swapper = PairSwapper::default();
    let mut sequence: u32 = 0;

    router.handle_text(r#"{"type":"tts_audio_meta","format":"opus"}"#)?;

    tracing::info!(
        "Looping {}Hz microphone through {}Hz output - press Ctrl+C to stop",
        capture.sample_rate(),
        timeline.sample_rate()
    );

    let frames = capture.frames();
    let mut tick = tokio::time::interval(Duration::from_millis(5));
    let mut last_report = std::time::Instant::now();

    // One listener for the whole run so a Ctrl+C during a tick is not lost
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted, flushing playback");
                break;
            }
            _ = tick.tick() => {
                let mut packets: Vec<Bytes> = Vec::new();
                while let Ok(frame) = frames.try_recv() {
                    let conditioned = uplink.condition(&frame);
                    for samples in accumulator.push_collect(&conditioned) {
                        match encoder.encode(&samples) {
                            Ok(packet) => packets.push(packet),
                            Err(e) => tracing::warn!("Encoding failed: {}", e),
                        }
                    }
                }

                for packet in packets {
                    let frame = WireFrame::new(sequence, packet, false);
                    sequence = sequence.wrapping_add(1);
                    for delivered in swapper.push(frame) {
                        deliver(&mut router, &delivered)?;
                    }
                }

                router.pump();

                if let Some(err) = capture.check_errors() {
                    tracing::warn!("Capture stream error: {}", err);
                }

                if last_report.elapsed() >= Duration::from_secs(5) {
                    let totals = router.totals();
                    tracing::info!(
                        "Stats: {} frames in, {} scheduled, {} late snaps, {} missed, level {:.2}",
                        totals.frames_submitted,
                        totals.chunks_scheduled,
                        totals.late_snaps,
                        timeline.chunks_missed(),
                        uplink.level()
                    );
                    last_report = std::time::Instant::now();
                }
            }
        }
    }

    capture.stop();

    if let Some(held) = swapper.finish() {
        deliver(&mut router, &held)?;
    }
    router.pump();

    // Let the tail of the utterance play out before the stream goes away
    let tail = router
        .session()
        .map_or(0.0, |session| (session.playhead() - timeline.now()).max(0.0));
    deliver(&mut router, &WireFrame::end_of_unit(sequence, true))?;
    tokio::time::sleep(Duration::from_secs_f64(tail + config.playback.prebuffer_sec)).await;

    let totals = router.totals();
    tracing::info!(
        "Done: {} frames, {} stale, {} evicted, {} decode failures",
        totals.frames_submitted,
        totals.frames_stale,
        totals.frames_evicted,
        totals.decode_failures
    );

    Ok(())
}

fn deliver(
    router: &mut InboundRouter<OpusWorkerFactory, CpalTimeline>,
    frame: &WireFrame,
) -> Result<()> {
    match router.handle_binary(&frame.encode())? {
        RouteEvent::Dropped(e) => tracing::warn!("Frame {} dropped: {}", frame.sequence, e),
        event => tracing::trace!("{:?}", event),
    }
    Ok(())
}
