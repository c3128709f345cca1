//! Network subsystem: discovery, stream sessions, server and client

pub mod client;
pub mod discovery;
pub mod server;
pub mod session;
pub mod socket;
pub mod stats;

pub use client::{AudioSink, AudioSource, ChannelCommand, ClientController, ClientSettings, ClientStatus};
pub use discovery::{discover, DiscoveryResponder};
pub use server::{RelayServer, ShutdownHandle};
pub use session::{Session, SessionState, SessionSummary};
pub use stats::{ServerStats, StatsSnapshot};
