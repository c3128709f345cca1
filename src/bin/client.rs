//! Voice Relay Probe Client
//!
//! Joins a channel with a synthetic tone and logs the level of the mix it
//! hears back. Usage: `relay-client <channel> [server-addr]`. Without an
//! address the server is found through discovery.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_voice_relay::{
    audio::Frame,
    config::{AppConfig, CONFIG_ENV_VAR},
    constants::PROBE_SAMPLE_RATE,
    network::{discover, AudioSink, AudioSource, ClientController, ClientSettings},
};

/// Sine tone paced at the real-time frame rate
struct ToneSource {
    frame_size: usize,
    frequency: f32,
    phase: f32,
    next_due: Instant,
    frame_duration: Duration,
}

impl ToneSource {
    fn new(frame_size: usize, frequency: f32) -> Self {
        let frame_duration =
            Duration::from_secs_f64(frame_size as f64 / PROBE_SAMPLE_RATE as f64);
        Self {
            frame_size,
            frequency,
            phase: 0.0,
            next_due: Instant::now(),
            frame_duration,
        }
    }
}

impl AudioSource for ToneSource {
    fn capture_frame(&mut self) -> Option<Frame> {
        let now = Instant::now();
        if now < self.next_due {
            std::thread::sleep(self.next_due - now);
        }
        self.next_due += self.frame_duration;

        let step = 2.0 * std::f32::consts::PI * self.frequency / PROBE_SAMPLE_RATE as f32;
        let samples = (0..self.frame_size)
            .map(|_| {
                let value = self.phase.sin() * 0.25;
                self.phase = (self.phase + step) % (2.0 * std::f32::consts::PI);
                value
            })
            .collect();

        Some(Frame::new(samples))
    }
}

/// Logs the received level about once a second
struct LevelSink {
    frames: u64,
    last_report: Instant,
}

impl AudioSink for LevelSink {
    fn play_frame(&mut self, frame: Frame) {
        self.frames += 1;
        if self.last_report.elapsed() >= Duration::from_secs(1) {
            self.last_report = Instant::now();
            tracing::info!(
                "Received {} frames, current mix level {:.1} dB",
                self.frames,
                frame.level_db()
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let channel = args.next().context("Usage: relay-client <channel> [server-addr]")?;
    let explicit_server = args.next();

    let config_path = std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from);
    let config = AppConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    let server: SocketAddr = match explicit_server {
        Some(addr) => addr.parse().context("Invalid server address")?,
        None => {
            let target = config.client.discovery_target()?;
            tracing::info!("Looking for a relay via {}", target);
            let reply = discover(
                target,
                config.client.discovery_timeout(),
                config.client.discovery_attempts,
            )
            .await?;
            reply.stream_addr()?
        }
    };
    tracing::info!("Using relay at {}", server);

    let settings = ClientSettings::new(server, &config.client);
    let controller = ClientController::spawn(
        settings,
        ToneSource::new(config.client.buffer_size, 440.0),
        LevelSink {
            frames: 0,
            last_report: Instant::now(),
        },
    )?;
    controller.join_channel(channel.clone())?;
    tracing::info!("Joining channel {} - press Ctrl+C to stop", channel);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Leaving channel {}", channel);

    tokio::task::spawn_blocking(move || controller.shutdown()).await?;
    Ok(())
}
