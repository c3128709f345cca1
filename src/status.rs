//! Periodic operator status
//!
//! The reporter only reads registry snapshots. The snapshot is taken first,
//! then rendered and logged, so no registry lock is held during output.

use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::channels::ChannelRegistry;
use crate::constants::LEVEL_FLOOR_DB;
use crate::protocol::RegistrySnapshot;

/// Meter bar for a dB level: one block per 5 dB above the floor
pub fn level_bar(level_db: f32) -> String {
    let above_floor = (level_db - LEVEL_FLOOR_DB).max(0.0);
    let blocks = (above_floor / 5.0).floor() as usize;
    "█".repeat(blocks)
}

/// Render the operator view of a snapshot
pub fn render_status(snapshot: &RegistrySnapshot, server: SocketAddr) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Voice Relay Status ===");
    let _ = writeln!(out, "Server: {}", server);
    let _ = writeln!(out, "Channels: {}", snapshot.channels.len());

    for channel in &snapshot.channels {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Channel: {} ({} clients)",
            channel.key,
            channel.members.len()
        );
        let _ = writeln!(out, "{}", "-".repeat(50));
        for member in &channel.members {
            let _ = writeln!(
                out,
                "{} | Level: {} {:.1} dB",
                member.address,
                level_bar(member.level_db),
                member.level_db
            );
        }
    }

    out
}

/// Logs the registry status on a fixed interval
pub struct StatusReporter {
    registry: Arc<ChannelRegistry>,
    server: SocketAddr,
    interval: Duration,
}

impl StatusReporter {
    pub fn new(registry: Arc<ChannelRegistry>, server: SocketAddr, interval: Duration) -> Self {
        Self {
            registry,
            server,
            interval,
        }
    }

    /// Render once
    pub fn render(&self) -> String {
        let snapshot = self.registry.snapshot();
        render_status(&snapshot, self.server)
    }

    /// Run until `shutdown` flips to `true`
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let rendered = self.render();
                    tracing::info!(target: "relay::status", "\n{}", rendered);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
