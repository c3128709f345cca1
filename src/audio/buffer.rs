//! Bounded inbound frame buffer and level meter
//!
//! Each member owns one [`FrameBuffer`]. The owning session pushes, any
//! mixer pass in the same channel pops. Both operations are single atomic
//! queue operations, so a frame is handed to at most one consumer.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::audio::frame::Frame;
use crate::constants::LEVEL_FLOOR_DB;

/// Bounded FIFO with drop-oldest overflow
pub struct FrameBuffer {
    queue: ArrayQueue<Frame>,
    pushed: AtomicU64,
    evicted: AtomicU64,
}

impl FrameBuffer {
    /// Create a new buffer holding at most `capacity` frames
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            pushed: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// Push a frame, evicting the oldest one when full
    ///
    /// Returns the evicted frame, if any. Never blocks.
    pub fn push(&self, frame: Frame) -> Option<Frame> {
        self.pushed.fetch_add(1, Ordering::Relaxed);
        let evicted = self.queue.force_push(frame);
        if evicted.is_some() {
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        evicted
    }

    /// Pop the oldest frame, or `None` if nothing is pending
    pub fn pop(&self) -> Option<Frame> {
        self.queue.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Total frames pushed since creation
    pub fn pushed_count(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Frames discarded by the drop-oldest policy
    pub fn evicted_count(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

/// Last observed level in dB, shared between the session and observers
pub struct LevelMeter {
    bits: AtomicU32,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self {
            bits: AtomicU32::new(LEVEL_FLOOR_DB.to_bits()),
        }
    }

    pub fn record(&self, level_db: f32) {
        let level = if level_db.is_finite() {
            level_db.max(LEVEL_FLOOR_DB)
        } else {
            LEVEL_FLOOR_DB
        };
        self.bits.store(level.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new()
    }
}
