//! Microphone Sender
//!
//! Captures the microphone and writes one `input_audio_buffer.append`
//! envelope per 20 ms frame to stdout as newline-delimited JSON, ready to be
//! piped into any text transport. Ctrl+C sends `input_audio_buffer.commit`
//! and exits.

use anyhow::{Context, Result};
use std::io::Write;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voice_agent_audio::{
    audio::{capture::MicCapture, device::list_devices},
    config::AppConfig,
    session::Uplink,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the envelopes
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting microphone sender");

    let config = AppConfig::load().context("loading configuration")?;

    for device in list_devices().iter().filter(|d| d.is_input) {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        tracing::info!(
            "Input {}{} (id {}, {:?} Hz)",
            device.name,
            default_marker,
            device.id,
            device.default_sample_rate
        );
    }

    // Optional device id as the first argument overrides the config
    let device_id = std::env::args().nth(1).or(config.capture.device_id.clone());

    let mut capture = MicCapture::new(
        device_id.as_deref(),
        config.capture.frame_ms,
        config.capture.channel_capacity,
    )?;
    capture.start()?;

    tracing::info!(
        "Capturing {} samples per frame at {}Hz - press Ctrl+C to commit and stop",
        capture.frame_size(),
        capture.sample_rate()
    );

    let frames = capture.frames();
    let mut uplink = Uplink::from_config(&config.capture);
    let mut stdout = std::io::stdout().lock();
    let mut tick = tokio::time::interval(Duration::from_millis(5));
    let mut last_report = std::time::Instant::now();

    // One listener for the whole run so a Ctrl+C during a tick is not lost
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted, committing input");
                break;
            }
            _ = tick.tick() => {
                while let Ok(frame) = frames.try_recv() {
                    let message = uplink.process(&frame);
                    writeln!(stdout, "{}", message.to_json()?)?;
                }
                stdout.flush()?;

                if let Some(err) = capture.check_errors() {
                    tracing::warn!("Capture stream error: {}", err);
                }

                if last_report.elapsed() >= Duration::from_secs(5) {
                    tracing::info!(
                        "Stats: {} frames sent, {} dropped, level {:.2}",
                        uplink.frames_sent(),
                        capture.frames_dropped(),
                        uplink.level()
                    );
                    last_report = std::time::Instant::now();
                }
            }
        }
    }

    capture.stop();

    // Whatever was captured before the stop still goes out ahead of the commit
    while let Ok(frame) = frames.try_recv() {
        writeln!(stdout, "{}", uplink.process(&frame).to_json()?)?;
    }
    writeln!(stdout, "{}", uplink.commit().to_json()?)?;
    stdout.flush()?;

    Ok(())
}
