//! Call state store and per-call data model.
//!
//! Holds the process-wide table of in-flight calls plus the reverse
//! indexes the correlator needs to resolve an incoming ARI event to a
//! call. Mirrors the `Arc<DashMap<...>>` sharing pattern this codebase
//! uses for its call and media-relay tables: cheap concurrent reads, no
//! central lock, one entry per call id.

use std::collections::HashSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    Dialer,
    Dialed,
    Agent,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegRole {
    LegA,
    LegB,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnsweredBySource {
    Dialed,
    Agent,
}

/// Per-leg timeline; leg A is the outbound trunk call, leg B is the local
/// extension / agent side.
#[derive(Debug, Clone, Default)]
pub struct LegTimeline {
    pub channel_id: Option<String>,
    pub peer_name: Option<String>,
    pub caller_name: Option<String>,
    pub paired_channel_name: Option<String>,
    pub paired_channel_id: Option<String>,
    pub dial_string: Option<String>,
    pub target_number: Option<String>,
    pub answered_by: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub answered_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_status: Option<String>,
}

/// Sub-timeline for an individual agent channel, distinct from the
/// aggregate leg B (a call may cycle through more than one agent channel
/// before one is answered).
#[derive(Debug, Clone)]
pub struct AgentLeg {
    pub identity: Option<String>,
    pub dialed_at: Option<DateTime<Utc>>,
    pub answered_at: Option<DateTime<Utc>>,
    pub hangup_at: Option<DateTime<Utc>>,
    pub last_status: Option<String>,
}

impl AgentLeg {
    pub fn new(dialed_at: DateTime<Utc>) -> Self {
        Self {
            identity: None,
            dialed_at: Some(dialed_at),
            answered_at: None,
            hangup_at: None,
            last_status: None,
        }
    }
}

pub struct Call {
    pub call_id: Uuid,
    pub number: String,
    pub created_at: DateTime<Utc>,
    pub created_at_monotonic: Instant,

    pub bridge: Option<String>,
    pub bridges: HashSet<String>,
    pub channels: HashSet<String>,
    pub channel_roles: std::collections::HashMap<String, ChannelRole>,

    pub dialer_channel_id: Option<String>,
    pub dialed_channel_id: Option<String>,
    pub agent_channel_id: Option<String>,
    pub agent_channels: HashSet<String>,
    pub agent_legs: std::collections::HashMap<String, AgentLeg>,

    pub linked_ids: HashSet<String>,
    pub originated_partner: bool,
    pub dialer_up: bool,

    pub dialer_connected_at: Option<DateTime<Utc>>,
    pub dialed_connected_at: Option<DateTime<Utc>>,
    pub dialer_hangup_at: Option<DateTime<Utc>>,
    pub dialed_hangup_at: Option<DateTime<Utc>>,
    pub agent_answered_at: Option<DateTime<Utc>>,
    pub call_connected_at: Option<DateTime<Utc>>,
    pub effective_connected_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub dialer_hangup_cause: Option<String>,
    pub dialed_hangup_cause: Option<String>,

    pub answered_by: Option<String>,
    pub answered_by_source: Option<AnsweredBySource>,

    pub recording: Option<String>,
    pub recording_id: Option<String>,
    pub recording_path: Option<String>,
    pub recording_format_used: Option<String>,

    pub leg_a: LegTimeline,
    pub leg_b: LegTimeline,

    pub summary_logged: bool,
}

impl Call {
    pub fn new(call_id: Uuid, number: String) -> Self {
        let now = Utc::now();
        Self {
            call_id,
            number: number.clone(),
            created_at: now,
            created_at_monotonic: Instant::now(),
            bridge: None,
            bridges: HashSet::new(),
            channels: HashSet::new(),
            channel_roles: std::collections::HashMap::new(),
            dialer_channel_id: None,
            dialed_channel_id: None,
            agent_channel_id: None,
            agent_channels: HashSet::new(),
            agent_legs: std::collections::HashMap::new(),
            linked_ids: HashSet::new(),
            originated_partner: false,
            dialer_up: false,
            dialer_connected_at: None,
            dialed_connected_at: None,
            dialer_hangup_at: None,
            dialed_hangup_at: None,
            agent_answered_at: None,
            call_connected_at: None,
            effective_connected_at: None,
            completed_at: None,
            dialer_hangup_cause: None,
            dialed_hangup_cause: None,
            answered_by: None,
            answered_by_source: None,
            recording: None,
            recording_id: None,
            recording_path: None,
            recording_format_used: None,
            leg_a: LegTimeline {
                target_number: Some(number),
                started_at: Some(now),
                ..Default::default()
            },
            leg_b: LegTimeline::default(),
            summary_logged: false,
        }
    }

    /// `answeredBy` source precedence: once set with source=agent, a
    /// dialed-sourced identity must not overwrite it.
    pub fn set_answered_by(&mut self, identity: impl Into<String>, source: AnsweredBySource) {
        if self.answered_by_source == Some(AnsweredBySource::Agent)
            && source == AnsweredBySource::Dialed
        {
            return;
        }
        self.answered_by = Some(identity.into());
        self.answered_by_source = Some(source);
    }

    /// Recomputes `call_connected_at` and `effective_connected_at` per the
    /// talk-start formula: earliest of the agent answer and the later of
    /// the two trunk/local connect times.
    pub fn recompute_connected_at(&mut self) {
        let talk_start = match (self.dialed_connected_at, self.dialer_connected_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        };

        let candidates = [self.agent_answered_at, self.call_connected_at, talk_start];
        self.call_connected_at = candidates.into_iter().flatten().min();

        self.effective_connected_at = match (self.effective_connected_at, self.call_connected_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (None, Some(b)) => Some(b),
            (Some(a), None) => Some(a),
            (None, None) => self.dialer_connected_at,
        };
    }

    pub fn role_of(&self, channel_id: &str) -> ChannelRole {
        self.channel_roles
            .get(channel_id)
            .copied()
            .unwrap_or(ChannelRole::Unknown)
    }
}

/// Concurrent, reverse-indexed table of in-flight calls. Every reverse
/// index key inserted here must also be added to the owning call's mirror
/// set so that [`CallStore::remove`] leaves no dangling entries.
pub struct CallStore {
    calls: DashMap<Uuid, Call>,
    by_channel: DashMap<String, Uuid>,
    by_bridge: DashMap<String, Uuid>,
    by_linked_id: DashMap<String, Uuid>,
    by_recording: DashMap<String, Uuid>,
}

impl Default for CallStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CallStore {
    pub fn new() -> Self {
        Self {
            calls: DashMap::new(),
            by_channel: DashMap::new(),
            by_bridge: DashMap::new(),
            by_linked_id: DashMap::new(),
            by_recording: DashMap::new(),
        }
    }

    pub fn insert(&self, call: Call) {
        self.calls.insert(call.call_id, call);
    }

    pub fn get(&self, call_id: Uuid) -> Option<dashmap::mapref::one::Ref<'_, Uuid, Call>> {
        self.calls.get(&call_id)
    }

    pub fn get_mut(&self, call_id: Uuid) -> Option<dashmap::mapref::one::RefMut<'_, Uuid, Call>> {
        self.calls.get_mut(&call_id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn index_channel(&self, channel_id: impl Into<String>, call_id: Uuid) {
        let channel_id = channel_id.into();
        self.by_channel.insert(channel_id.clone(), call_id);
        if let Some(mut call) = self.calls.get_mut(&call_id) {
            call.channels.insert(channel_id);
        }
    }

    pub fn index_bridge(&self, bridge_id: impl Into<String>, call_id: Uuid) {
        let bridge_id = bridge_id.into();
        self.by_bridge.insert(bridge_id.clone(), call_id);
        if let Some(mut call) = self.calls.get_mut(&call_id) {
            call.bridges.insert(bridge_id);
        }
    }

    pub fn index_linked_id(&self, linked_id: impl Into<String>, call_id: Uuid) {
        let linked_id = linked_id.into();
        self.by_linked_id.insert(linked_id.clone(), call_id);
        if let Some(mut call) = self.calls.get_mut(&call_id) {
            call.linked_ids.insert(linked_id);
        }
    }

    pub fn index_recording(&self, recording_id: impl Into<String>, call_id: Uuid) {
        self.by_recording.insert(recording_id.into(), call_id);
    }

    pub fn resolve_by_channel(&self, channel_id: &str) -> Option<Uuid> {
        self.by_channel.get(channel_id).map(|v| *v)
    }

    pub fn resolve_by_bridge(&self, bridge_id: &str) -> Option<Uuid> {
        self.by_bridge.get(bridge_id).map(|v| *v)
    }

    pub fn resolve_by_linked_id(&self, linked_id: &str) -> Option<Uuid> {
        self.by_linked_id.get(linked_id).map(|v| *v)
    }

    pub fn resolve_by_recording(&self, recording_id: &str) -> Option<Uuid> {
        self.by_recording.get(recording_id).map(|v| *v)
    }

    /// Scans every in-flight call's `linked_ids` set. Used only as a
    /// fallback when the direct linked-id index misses.
    pub fn scan_linked_id(&self, linked_id: &str) -> Option<Uuid> {
        self.calls
            .iter()
            .find(|entry| entry.linked_ids.contains(linked_id))
            .map(|entry| *entry.key())
    }

    pub fn iter(&self) -> dashmap::iter::Iter<'_, Uuid, Call> {
        self.calls.iter()
    }

    /// Removes a call and every reverse-index entry that points to it,
    /// satisfying the "mirror set" cleanup invariant.
    pub fn remove(&self, call_id: Uuid) -> Option<Call> {
        let call = self.calls.remove(&call_id).map(|(_, c)| c)?;

        for channel_id in &call.channels {
            self.by_channel.remove(channel_id);
        }
        for bridge_id in &call.bridges {
            self.by_bridge.remove(bridge_id);
        }
        for linked_id in &call.linked_ids {
            self.by_linked_id.remove(linked_id);
        }
        if let Some(recording_id) = &call.recording_id {
            self.by_recording.remove(recording_id);
        }

        Some(call)
    }
}

pub fn not_found(call_id: Uuid) -> Error {
    Error::invalid_state(format!("no active call for id {call_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_set_cleanup_leaves_no_dangling_index() {
        let store = CallStore::new();
        let call_id = Uuid::new_v4();
        store.insert(Call::new(call_id, "15551234567".to_string()));

        store.index_channel("chan-a", call_id);
        store.index_bridge("bridge-1", call_id);
        store.index_linked_id("linked-1", call_id);

        store.remove(call_id);

        assert!(store.resolve_by_channel("chan-a").is_none());
        assert!(store.resolve_by_bridge("bridge-1").is_none());
        assert!(store.resolve_by_linked_id("linked-1").is_none());
        assert!(store.get(call_id).is_none());
    }

    #[test]
    fn answered_by_agent_source_wins_over_dialed() {
        let mut call = Call::new(Uuid::new_v4(), "15551234567".to_string());
        call.set_answered_by("agent-1", AnsweredBySource::Agent);
        call.set_answered_by("dialed-identity", AnsweredBySource::Dialed);
        assert_eq!(call.answered_by.as_deref(), Some("agent-1"));
    }

    #[test]
    fn connected_at_takes_minimum_across_candidates() {
        let mut call = Call::new(Uuid::new_v4(), "15551234567".to_string());
        let t0 = Utc::now();
        call.dialer_connected_at = Some(t0 + chrono::Duration::seconds(2));
        call.dialed_connected_at = Some(t0 + chrono::Duration::seconds(5));
        call.recompute_connected_at();
        assert_eq!(call.call_connected_at, Some(t0 + chrono::Duration::seconds(5)));
    }
}
