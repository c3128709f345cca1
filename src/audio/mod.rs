//! Audio frame representation and buffering

pub mod buffer;
pub mod frame;

pub use buffer::{FrameBuffer, LevelMeter};
pub use frame::Frame;
