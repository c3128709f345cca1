//! Channel membership

pub mod member;
pub mod registry;

pub use member::{Member, SessionId};
pub use registry::ChannelRegistry;
