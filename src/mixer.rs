//! Per-member channel mixing
//!
//! For a requesting member, every *other* member of the channel contributes
//! at most its oldest pending frame. Contributions are averaged and clipped
//! to [-1.0, 1.0]. Members with nothing pending are skipped, not zero-filled.
//!
//! Consumption is destructive: a frame popped for one requester is gone for
//! every other requester. Across concurrent requesters the frame goes to
//! whichever pass pops it first; within one member's buffer frames are always
//! taken oldest first.

use std::sync::Arc;

use crate::audio::Frame;
use crate::channels::{ChannelRegistry, Member};

/// Mixing engine bound to a registry and a frame size
pub struct Mixer {
    registry: Arc<ChannelRegistry>,
    frame_size: usize,
}

/// Result of one mixing pass
#[derive(Debug, Clone)]
pub struct Mix {
    pub frame: Frame,
    /// Number of members whose frame went into the mix
    pub contributors: usize,
}

impl Mixer {
    pub fn new(registry: Arc<ChannelRegistry>, frame_size: usize) -> Self {
        Self {
            registry,
            frame_size,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Mix everyone in `member`'s channel except `member` itself
    pub fn mix_for(&self, member: &Member) -> Mix {
        let contributions: Vec<Frame> = self
            .registry
            .members_of(member.channel())
            .iter()
            .filter(|other| other.id() != member.id())
            .filter_map(|other| other.pop_frame())
            .filter(|frame| {
                let fits = frame.len() == self.frame_size;
                if !fits {
                    tracing::warn!(
                        expected = self.frame_size,
                        actual = frame.len(),
                        "Dropping frame of unexpected size"
                    );
                }
                fits
            })
            .collect();

        Mix {
            contributors: contributions.len(),
            frame: mix_frames(&contributions, self.frame_size),
        }
    }
}

/// Average `frames` sample-wise and clip to [-1.0, 1.0]
///
/// Returns silence of `frame_size` samples when `frames` is empty. All
/// frames are expected to hold `frame_size` samples; extra samples are
/// ignored and missing ones count as zero. NaN and infinite samples also
/// count as zero.
pub fn mix_frames(frames: &[Frame], frame_size: usize) -> Frame {
    if frames.is_empty() {
        return Frame::silence(frame_size);
    }

    // f64 accumulator: a sum of finite f32 samples cannot overflow it
    let mut sums = vec![0.0f64; frame_size];
    for frame in frames {
        for (sum, &sample) in sums.iter_mut().zip(frame.samples()) {
            if sample.is_finite() {
                *sum += f64::from(sample);
            }
        }
    }

    let count = frames.len() as f64;
    let output = sums
        .into_iter()
        .map(|sum| (sum / count).clamp(-1.0, 1.0) as f32)
        .collect();

    Frame::new(output)
}
