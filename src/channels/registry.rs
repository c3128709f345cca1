//! Channel registry
//!
//! Owns both indexes of the server state: channel key → members (used by the
//! mixer) and session id → member (used for teardown). The channel map is a
//! sharded [`DashMap`]; a channel's member list only changes while its entry
//! lock is held, so join, leave and empty-channel removal are atomic with
//! respect to each other. Frame pushes and pops go through the member's own
//! lock-free queue and never touch the maps' write locks.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::Frame;
use crate::channels::member::{Member, SessionId};
use crate::error::ChannelError;
use crate::protocol::{ChannelStatus, MemberStatus, RegistrySnapshot};

/// A named group of members
struct Channel {
    generation: u64,
    created_at: DateTime<Utc>,
    /// Members in join order
    members: Vec<Arc<Member>>,
}

impl Channel {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            created_at: Utc::now(),
            members: Vec::new(),
        }
    }
}

/// Registry of channels and their members
pub struct ChannelRegistry {
    channels: DashMap<String, Channel>,
    members: DashMap<SessionId, Arc<Member>>,
    generations: AtomicU64,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            members: DashMap::new(),
            generations: AtomicU64::new(0),
        }
    }

    /// Register a new member under `channel_key`
    ///
    /// The channel is created if this is its first member.
    pub fn join(
        &self,
        channel_key: &str,
        id: SessionId,
        address: SocketAddr,
    ) -> Result<Arc<Member>, ChannelError> {
        if channel_key.is_empty() {
            return Err(ChannelError::EmptyKey);
        }

        let member = Arc::new(Member::new(id, address, channel_key));

        match self.members.entry(id) {
            Entry::Occupied(_) => return Err(ChannelError::AlreadyJoined(id)),
            Entry::Vacant(slot) => {
                slot.insert(member.clone());
            }
        }

        let mut channel = self
            .channels
            .entry(channel_key.to_string())
            .or_insert_with(|| {
                let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::info!(channel = channel_key, generation, "Channel created");
                Channel::new(generation)
            });
        channel.members.push(member.clone());

        tracing::debug!(
            session = %id,
            channel = channel_key,
            members = channel.members.len(),
            "Member joined"
        );

        Ok(member)
    }

    /// Remove a member from both indexes
    ///
    /// Deletes the member's channel if it became empty. Calling this again
    /// for the same id is a no-op returning `None`.
    pub fn leave(&self, id: SessionId) -> Option<Arc<Member>> {
        let (_, member) = self.members.remove(&id)?;
        let key = member.channel();

        if let Some(mut channel) = self.channels.get_mut(key) {
            channel.members.retain(|m| m.id() != id);
        }

        if let Some((_, channel)) = self
            .channels
            .remove_if(key, |_, channel| channel.members.is_empty())
        {
            tracing::info!(
                channel = key,
                generation = channel.generation,
                "Channel removed"
            );
        }

        tracing::debug!(session = %id, channel = key, "Member left");
        Some(member)
    }

    /// Snapshot of the members currently in `channel_key`, in join order
    pub fn members_of(&self, channel_key: &str) -> Vec<Arc<Member>> {
        self.channels
            .get(channel_key)
            .map(|channel| channel.members.clone())
            .unwrap_or_default()
    }

    /// Take the oldest pending frame of a member
    pub fn pop_oldest_frame(&self, id: SessionId) -> Option<Frame> {
        self.members.get(&id).and_then(|member| member.pop_frame())
    }

    /// Queue a frame on a member's inbound buffer
    ///
    /// Returns the frame evicted by the drop-oldest policy, if any.
    pub fn push_frame(&self, id: SessionId, frame: Frame) -> Result<Option<Frame>, ChannelError> {
        let member = self.member(id).ok_or(ChannelError::NotFound(id))?;
        Ok(member.push_frame(frame))
    }

    pub fn member(&self, id: SessionId) -> Option<Arc<Member>> {
        self.members.get(&id).map(|member| member.clone())
    }

    pub fn contains_channel(&self, channel_key: &str) -> bool {
        self.channels.contains_key(channel_key)
    }

    /// Generation number of the live channel under `channel_key`
    ///
    /// Every channel creation takes a fresh, strictly increasing number.
    pub fn channel_generation(&self, channel_key: &str) -> Option<u64> {
        self.channels.get(channel_key).map(|channel| channel.generation)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Point-in-time copy of every channel, sorted by key
    ///
    /// No registry lock is held once this returns.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut channels: Vec<ChannelStatus> = self
            .channels
            .iter()
            .map(|entry| ChannelStatus {
                key: entry.key().clone(),
                generation: entry.generation,
                created_at: entry.created_at,
                members: entry
                    .members
                    .iter()
                    .map(|member| MemberStatus {
                        id: member.id(),
                        address: member.address(),
                        level_db: member.level_db(),
                        pending_frames: member.pending_frames(),
                        evicted_frames: member.evicted_frames(),
                        joined_at: member.joined_at(),
                    })
                    .collect(),
            })
            .collect();
        channels.sort_by(|a, b| a.key.cmp(&b.key));

        RegistrySnapshot {
            taken_at: Utc::now(),
            channels,
        }
    }

    /// Drop every remaining member and channel
    ///
    /// Returns how many members were still registered.
    pub fn clear(&self) -> usize {
        let remaining = self.members.len();
        self.members.clear();
        self.channels.clear();
        remaining
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
