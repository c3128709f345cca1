//! Wire and status message types
//!
//! Handshake: JSON `{"channel": "<key>"}` right-padded with NUL bytes to the
//! configured handshake region size.
//! Discovery reply: JSON `{"host": "<ip>", "port": <tcp port>}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

use crate::channels::SessionId;
use crate::error::ProtocolError;

/// Channel selection sent by a client right after connecting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    #[serde(default)]
    pub channel: String,
}

impl Handshake {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }

    /// Serialize into a region of exactly `region_size` bytes
    pub fn encode(&self, region_size: usize) -> Result<Vec<u8>, ProtocolError> {
        let mut payload = serde_json::to_vec(self)
            .map_err(|e| ProtocolError::MalformedHandshake(e.to_string()))?;

        if payload.len() > region_size {
            return Err(ProtocolError::HandshakeTooLarge {
                size: payload.len(),
                limit: region_size,
            });
        }

        payload.resize(region_size, 0);
        Ok(payload)
    }

    /// Parse a received handshake region
    ///
    /// Trailing NUL and whitespace padding is ignored. A missing or empty
    /// channel key is rejected.
    pub fn decode(region: &[u8]) -> Result<Self, ProtocolError> {
        let end = region
            .iter()
            .rposition(|&b| b != 0 && !b.is_ascii_whitespace())
            .map_or(0, |i| i + 1);
        let payload = &region[..end];

        if payload.is_empty() {
            return Err(ProtocolError::MalformedHandshake("empty handshake".into()));
        }

        let handshake: Handshake = serde_json::from_slice(payload)
            .map_err(|e| ProtocolError::MalformedHandshake(e.to_string()))?;

        if handshake.channel.is_empty() {
            return Err(ProtocolError::EmptyChannel);
        }

        Ok(handshake)
    }
}

/// Reply to a discovery datagram
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryReply {
    pub host: String,
    pub port: u16,
}

impl DiscoveryReply {
    pub fn encode(&self) -> Vec<u8> {
        // Two plain fields; serializing cannot fail
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(data).map_err(|e| ProtocolError::MalformedDiscovery(e.to_string()))
    }

    /// Resolve into the stream endpoint
    pub fn stream_addr(&self) -> Result<SocketAddr, ProtocolError> {
        let ip = self
            .host
            .parse::<IpAddr>()
            .map_err(|_| ProtocolError::MalformedDiscovery(format!("bad host {}", self.host)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Per-member status for operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberStatus {
    pub id: SessionId,
    pub address: SocketAddr,
    pub level_db: f32,
    pub pending_frames: usize,
    pub evicted_frames: u64,
    pub joined_at: DateTime<Utc>,
}

/// Per-channel status for operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub key: String,
    pub generation: u64,
    pub created_at: DateTime<Utc>,
    pub members: Vec<MemberStatus>,
}

/// Point-in-time view of the whole registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub taken_at: DateTime<Utc>,
    pub channels: Vec<ChannelStatus>,
}

impl RegistrySnapshot {
    pub fn member_count(&self) -> usize {
        self.channels.iter().map(|c| c.members.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_padded_to_region() {
        let region = Handshake::new("match-42").encode(512).unwrap();
        assert_eq!(region.len(), 512);
        assert_eq!(region[511], 0);

        let decoded = Handshake::decode(&region).unwrap();
        assert_eq!(decoded.channel, "match-42");
    }

    #[test]
    fn test_handshake_unpadded_json_accepted() {
        let decoded = Handshake::decode(br#"{"channel": "team-100"}"#).unwrap();
        assert_eq!(decoded.channel, "team-100");

        let decoded = Handshake::decode(b"{\"channel\":\"a\"}  \n").unwrap();
        assert_eq!(decoded.channel, "a");
    }

    #[test]
    fn test_handshake_rejections() {
        assert_eq!(
            Handshake::decode(&[0u8; 512]).unwrap_err(),
            ProtocolError::MalformedHandshake("empty handshake".into())
        );
        assert_eq!(
            Handshake::decode(br#"{"channel": ""}"#).unwrap_err(),
            ProtocolError::EmptyChannel
        );
        assert_eq!(
            Handshake::decode(br#"{"team": 1}"#).unwrap_err(),
            ProtocolError::EmptyChannel
        );
        assert!(matches!(
            Handshake::decode(b"not json"),
            Err(ProtocolError::MalformedHandshake(_))
        ));
        assert!(matches!(
            Handshake::decode(br#"{"channel": 7}"#),
            Err(ProtocolError::MalformedHandshake(_))
        ));
    }

    #[test]
    fn test_handshake_too_large() {
        let long = "x".repeat(600);
        let err = Handshake::new(long).encode(512).unwrap_err();
        assert!(matches!(err, ProtocolError::HandshakeTooLarge { limit: 512, .. }));
    }

    #[test]
    fn test_discovery_reply_json_shape() {
        let reply = DiscoveryReply {
            host: "192.168.1.20".into(),
            port: 65432,
        };
        let value: serde_json::Value = serde_json::from_slice(&reply.encode()).unwrap();
        assert_eq!(value["host"], "192.168.1.20");
        assert_eq!(value["port"], 65432);

        let decoded = DiscoveryReply::decode(&reply.encode()).unwrap();
        assert_eq!(decoded.stream_addr().unwrap(), "192.168.1.20:65432".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_discovery_reply_bad_host() {
        let reply = DiscoveryReply {
            host: "not-an-ip".into(),
            port: 1,
        };
        assert!(reply.stream_addr().is_err());
        assert!(DiscoveryReply::decode(b"{}").is_err());
    }
}
