//! Server-wide counters

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Relay statistics, updated lock-free from every session
#[derive(Default)]
pub struct ServerStats {
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    handshakes_rejected: AtomicU64,
    frames_received: AtomicU64,
    mixes_sent: AtomicU64,
    frames_evicted: AtomicU64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_rejected(&self) {
        self.handshakes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mix_sent(&self) {
        self.mixes_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_evicted(&self) {
        self.frames_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            handshakes_rejected: self.handshakes_rejected.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            mixes_sent: self.mixes_sent.load(Ordering::Relaxed),
            frames_evicted: self.frames_evicted.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`ServerStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub handshakes_rejected: u64,
    pub frames_received: u64,
    pub mixes_sent: u64,
    pub frames_evicted: u64,
}

impl StatsSnapshot {
    /// Sessions currently between accept and teardown
    pub fn sessions_active(&self) -> u64 {
        self.sessions_opened.saturating_sub(self.sessions_closed)
    }
}
