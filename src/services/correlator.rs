//! Event correlator: resolves each ARI event to a call, updates leg state,
//! and drives the follow-up commands (partner originate, recording,
//! cleanup) that keep a call's two legs moving in lockstep.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DialerConfig;
use crate::protocols::ari::{AriChannel, AriClient, AriEvent};
use crate::services::recording::RecordingManager;
use crate::services::state::{AgentLeg, AnsweredBySource, Call, CallStore, ChannelRole};
use crate::services::summary::{compute_summary, SummaryStore};
use crate::Result;

static NO_ANSWER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^NO\s?ANSWER$").unwrap());
static ANSWERED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^ANSWER(ED)?$").unwrap());

/// Normalizes a raw dial status into the canonical tokens the rest of the
/// system compares against.
pub fn normalize_status(raw: &str) -> String {
    let trimmed = raw.trim();
    if NO_ANSWER_RE.is_match(trimmed) {
        "NO ANSWER".to_string()
    } else if ANSWERED_RE.is_match(trimmed) {
        "ANSWERED".to_string()
    } else {
        trimmed.to_uppercase()
    }
}

/// Picks the best status among several candidates: `ANSWERED` always wins;
/// progress states are kept only when nothing more specific is available;
/// `NO ANSWER` is the last resort.
pub fn best_status(candidates: &[Option<&str>]) -> String {
    let normalized: Vec<String> = candidates
        .iter()
        .filter_map(|c| c.map(normalize_status))
        .collect();

    if normalized.iter().any(|s| s == "ANSWERED") {
        return "ANSWERED".to_string();
    }

    const PROGRESS: &[&str] = &[
        "RINGING", "DIALING", "TRYING", "PROGRESS", "UP", "DOWN", "HUNGUP", "UNKNOWN",
        "EARLY MEDIA",
    ];
    if let Some(progress) = normalized.iter().find(|s| PROGRESS.contains(&s.as_str())) {
        return progress.clone();
    }

    if normalized.iter().any(|s| s == "NO ANSWER") {
        return "NO ANSWER".to_string();
    }

    "NO ANSWER".to_string()
}

/// Strips the local-channel `;1`/`;2` half suffix from a channel name.
pub fn strip_half_suffix(name: &str) -> &str {
    name.strip_suffix(";1").or_else(|| name.strip_suffix(";2")).unwrap_or(name)
}

/// True if `name` (ignoring the `;1`/`;2` half suffix) is a local channel
/// addressed at the configured target extension, optionally pinned to the
/// configured context.
pub fn is_target_local_name(name: &str, extension: &str, context: &str) -> bool {
    let stripped = strip_half_suffix(name);
    let exact = format!("Local/{extension}@{context}");
    if stripped == exact {
        return true;
    }
    stripped
        .strip_prefix(&format!("Local/{extension}@"))
        .is_some()
}

/// Swaps the `;1`/`;2` half suffix, used to match the other half of a
/// local-channel pair by name.
fn swap_half_suffix(name: &str) -> Option<String> {
    if let Some(stripped) = name.strip_suffix(";1") {
        Some(format!("{stripped};2"))
    } else {
        name.strip_suffix(";2").map(|stripped| format!("{stripped};1"))
    }
}

pub struct Correlator<A: AriClient> {
    store: Arc<CallStore>,
    ari: Arc<A>,
    config: DialerConfig,
    recordings: Arc<RecordingManager<A>>,
    summaries: Arc<SummaryStore>,
    completed_tx: mpsc::UnboundedSender<Uuid>,
}

impl<A: AriClient + 'static> Correlator<A> {
    pub fn new(
        store: Arc<CallStore>,
        ari: Arc<A>,
        config: DialerConfig,
        recordings: Arc<RecordingManager<A>>,
        summaries: Arc<SummaryStore>,
        completed_tx: mpsc::UnboundedSender<Uuid>,
    ) -> Self {
        Self {
            store,
            ari,
            config,
            recordings,
            summaries,
            completed_tx,
        }
    }

    pub async fn handle_event(&self, event: AriEvent) {
        let result = match &event {
            AriEvent::StasisStart { .. } => self.on_stasis_start(event).await,
            AriEvent::StasisEnd { .. } => self.on_stasis_end_or_destroyed(event).await,
            AriEvent::ChannelDestroyed { .. } => self.on_stasis_end_or_destroyed(event).await,
            AriEvent::ChannelStateChange { .. } => self.on_channel_state_change(event).await,
            AriEvent::Dial { .. } => self.on_dial(event).await,
            AriEvent::BridgeEnter { .. } => self.on_bridge_enter(event).await,
            AriEvent::RecordingFinished { recording } => {
                self.recordings.on_recording_finished(&recording.name).await;
                Ok(())
            }
            AriEvent::Unknown { kind, .. } => {
                debug!(kind, "ignoring unrecognized ARI event");
                Ok(())
            }
        };

        if let Err(err) = result {
            warn!(error = %err, "failed to process ARI event");
        }
    }

    /// Resolution chain shared by the non-Dial event kinds.
    fn resolve_general(&self, channel: &AriChannel, bridge_id: Option<&str>) -> Option<Uuid> {
        if let Some(call_id) = self.store.resolve_by_channel(&channel.id) {
            return Some(call_id);
        }
        if let Some(bridge_id) = bridge_id {
            if let Some(call_id) = self.store.resolve_by_bridge(bridge_id) {
                return Some(call_id);
            }
        }
        if let Some(linked_id) = &channel.linkedid {
            if let Some(call_id) = self.store.resolve_by_linked_id(linked_id) {
                return Some(call_id);
            }
            if let Some(call_id) = self.store.scan_linked_id(linked_id) {
                return Some(call_id);
            }
        }
        None
    }

    async fn on_stasis_start(&self, event: AriEvent) -> Result<()> {
        let AriEvent::StasisStart { channel, args, timestamp } = event else {
            return Ok(());
        };

        let (role, call_id) = match args.first().map(String::as_str) {
            Some("dialer") => {
                let call_id = args
                    .get(1)
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .or_else(|| self.resolve_general(&channel, None));
                (ChannelRole::Dialer, call_id)
            }
            Some("dialed") => {
                let call_id = args
                    .get(1)
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .or_else(|| self.resolve_general(&channel, None));
                (ChannelRole::Dialed, call_id)
            }
            _ => (ChannelRole::Unknown, self.resolve_general(&channel, None)),
        };

        let Some(call_id) = call_id else {
            warn!(channel = %channel.id, "StasisStart for unresolvable call");
            return Ok(());
        };

        self.store.index_channel(channel.id.clone(), call_id);
        if let Some(linked_id) = &channel.linkedid {
            self.store.index_linked_id(linked_id.clone(), call_id);
        }

        let now = parse_timestamp(timestamp.as_deref());
        let mut should_originate_partner = false;
        let mut should_start_recording = false;
        let mut should_answer_dialed = false;
        let mut bridge_to_create = false;

        if let Some(mut call) = self.store.get_mut(call_id) {
            call.channel_roles.insert(channel.id.clone(), role);

            match role {
                ChannelRole::Dialer => {
                    call.dialer_channel_id = Some(channel.id.clone());
                    call.leg_a.channel_id = Some(channel.id.clone());
                    call.leg_a.peer_name = Some(channel.name.clone());
                    call.leg_a.started_at.get_or_insert(now);
                    if channel.state == "Up" {
                        call.dialer_up = true;
                        call.dialer_connected_at.get_or_insert(now);
                        call.leg_a.answered_at.get_or_insert(now);
                        should_start_recording = true;
                    }
                    if call.bridge.is_none() {
                        bridge_to_create = true;
                    }
                    if !call.originated_partner {
                        should_originate_partner = true;
                    }
                }
                ChannelRole::Dialed => {
                    call.dialed_channel_id = Some(channel.id.clone());
                    call.leg_b.channel_id = Some(channel.id.clone());
                    call.leg_b.peer_name = Some(channel.name.clone());
                    call.leg_b.started_at.get_or_insert(now);
                    call.dialed_connected_at.get_or_insert(now);
                    call.leg_b.answered_at.get_or_insert(now);
                    if let Some(connected) = &channel.connected {
                        if !connected.number.is_empty() {
                            call.set_answered_by(connected.number.clone(), AnsweredBySource::Dialed);
                        }
                    }
                    should_answer_dialed = true;
                    should_start_recording = true;
                }
                ChannelRole::Agent | ChannelRole::Unknown => {}
            }
            call.recompute_connected_at();
        } else {
            return Ok(());
        }

        if bridge_to_create {
            match self.ari.create_bridge(&format!("bridge-{call_id}")).await {
                Ok(bridge) => {
                    self.store.index_bridge(bridge.id.clone(), call_id);
                    if let Some(mut call) = self.store.get_mut(call_id) {
                        call.bridge = Some(bridge.id.clone());
                    }
                    let _ = self.ari.add_channel_to_bridge(&bridge.id, &channel.id).await;
                }
                Err(err) => warn!(error = %err, "failed to create bridge"),
            }
        } else if let Some(bridge_id) = self.store.get(call_id).and_then(|c| c.bridge.clone()) {
            let _ = self.ari.add_channel_to_bridge(&bridge_id, &channel.id).await;
        }

        if should_answer_dialed {
            if let Err(err) = self.ari.answer(&channel.id).await {
                warn!(error = %err, channel = %channel.id, "failed to answer dialed channel");
            }
        }

        if should_originate_partner {
            self.originate_partner(call_id).await;
        }

        if should_start_recording {
            self.recordings.maybe_start(call_id).await;
        }

        Ok(())
    }

    async fn originate_partner(&self, call_id: Uuid) {
        let already = self
            .store
            .get(call_id)
            .map(|c| c.originated_partner)
            .unwrap_or(true);
        if already {
            return;
        }

        let endpoint = self
            .config
            .target
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("Local/{}@{}", self.config.target.extension, self.config.target.context));

        let caller_id = self
            .store
            .get(call_id)
            .map(|c| c.number.clone())
            .or_else(|| self.config.caller_id.clone());

        match self
            .ari
            .originate(
                &endpoint,
                &self.config.ari.stasis_app,
                &["dialed".to_string(), call_id.to_string()],
                caller_id.as_deref(),
                self.config.call_timeout,
            )
            .await
        {
            Ok(_) => {
                if let Some(mut call) = self.store.get_mut(call_id) {
                    call.originated_partner = true;
                    if let Some(rest) = endpoint.strip_prefix("Local/") {
                        if let Some((extension, _context)) = rest.split_once('@') {
                            call.leg_b.target_number = Some(extension.to_string());
                        }
                    }
                    call.leg_b.dial_string = Some(endpoint);
                    call.agent_legs.insert(
                        format!("pending-{call_id}"),
                        AgentLeg::new(Utc::now()),
                    );
                }
            }
            Err(err) => {
                warn!(error = %err, call_id = %call_id, "partner originate failed, cleaning up call");
                self.cleanup_call(call_id).await;
            }
        }
    }

    async fn on_stasis_end_or_destroyed(&self, event: AriEvent) -> Result<()> {
        let (channel, bridge, cause_txt, is_destroyed) = match event {
            AriEvent::StasisEnd { channel, bridge, .. } => (channel, bridge, None, false),
            AriEvent::ChannelDestroyed { channel, cause_txt, .. } => (channel, None, cause_txt, true),
            _ => return Ok(()),
        };

        let Some(call_id) = self.resolve_general(&channel, bridge.as_ref().map(|b| b.id.as_str())) else {
            warn!(channel = %channel.id, "StasisEnd/ChannelDestroyed for unresolvable call");
            return Ok(());
        };

        let mut channels_remaining = usize::MAX;
        let mut hangup_everyone = false;

        if let Some(mut call) = self.store.get_mut(call_id) {
            let mut role = call.role_of(&channel.id);
            if role == ChannelRole::Unknown {
                // A channel that never went through StasisStart still needs a
                // canonical role to stamp its hangup cause against; assign it
                // to the first unfilled slot, dialer before dialed.
                if call.dialer_channel_id.is_none() {
                    role = ChannelRole::Dialer;
                } else if call.dialed_channel_id.is_none() {
                    role = ChannelRole::Dialed;
                }
            }

            if let Some(cause) = &cause_txt {
                let leg = match role {
                    ChannelRole::Dialer => Some(&mut call.leg_a),
                    ChannelRole::Dialed => Some(&mut call.leg_b),
                    _ => None,
                };
                if let Some(leg) = leg {
                    let already_answered = matches!(
                        leg.last_status.as_deref(),
                        Some("ANSWER") | Some("ANSWERED")
                    );
                    if !already_answered {
                        leg.last_status = Some(cause.clone());
                    }
                }
            }

            match role {
                ChannelRole::Dialer => {
                    call.dialer_hangup_at.get_or_insert(Utc::now());
                    call.dialer_hangup_cause = cause_txt.clone();
                    if matches!(role, ChannelRole::Dialer) {
                        hangup_everyone = true;
                    }
                }
                ChannelRole::Dialed => {
                    call.dialed_hangup_at.get_or_insert(Utc::now());
                    call.dialed_hangup_cause = cause_txt.clone();
                    hangup_everyone = true;
                }
                ChannelRole::Agent => {
                    if let Some(agent_leg) = call.agent_legs.get_mut(&channel.id) {
                        agent_leg.hangup_at.get_or_insert(Utc::now());
                    }
                }
                ChannelRole::Unknown => {}
            }

            if is_destroyed {
                call.channels.remove(&channel.id);
                channels_remaining = call.channels.len();
            }
        }

        if hangup_everyone {
            self.hangup_other_channels(call_id, &channel.id).await;
        }

        if is_destroyed && channels_remaining == 0 {
            self.cleanup_call(call_id).await;
        }

        Ok(())
    }

    async fn hangup_other_channels(&self, call_id: Uuid, except: &str) {
        let others: Vec<String> = self
            .store
            .get(call_id)
            .map(|c| c.channels.iter().filter(|id| id.as_str() != except).cloned().collect())
            .unwrap_or_default();

        for channel_id in others {
            if let Err(err) = self.ari.hangup(&channel_id).await {
                debug!(error = %err, channel = %channel_id, "hangup of peer channel failed");
            }
        }
    }

    async fn on_channel_state_change(&self, event: AriEvent) -> Result<()> {
        let AriEvent::ChannelStateChange { channel, .. } = event else {
            return Ok(());
        };

        let Some(call_id) = self.resolve_general(&channel, None) else {
            return Ok(());
        };

        let mut should_start_recording = false;

        if let Some(mut call) = self.store.get_mut(call_id) {
            let role = call.role_of(&channel.id);
            let now = Utc::now();
            match role {
                ChannelRole::Dialer if channel.state == "Up" => {
                    call.dialer_up = true;
                    call.dialer_connected_at.get_or_insert(now);
                    call.leg_a.answered_at.get_or_insert(now);
                    should_start_recording = true;
                }
                ChannelRole::Dialed if channel.state == "Up" => {
                    call.dialed_connected_at.get_or_insert(now);
                    call.leg_b.answered_at.get_or_insert(now);
                    if let Some(connected) = &channel.connected {
                        if !connected.number.is_empty() {
                            call.set_answered_by(connected.number.clone(), AnsweredBySource::Dialed);
                        }
                    }
                    should_start_recording = true;
                }
                ChannelRole::Agent => {
                    let leg = call
                        .agent_legs
                        .entry(channel.id.clone())
                        .or_insert_with(|| AgentLeg::new(now));
                    if channel.state == "Up" {
                        leg.answered_at.get_or_insert(now);
                        call.agent_answered_at.get_or_insert(now);
                        call.agent_channel_id.get_or_insert(channel.id.clone());
                        if let Some(connected) = &channel.connected {
                            if !connected.number.is_empty() {
                                call.set_answered_by(connected.number.clone(), AnsweredBySource::Agent);
                            }
                        }
                    } else if matches!(channel.state.as_str(), "Down" | "Hungup") {
                        leg.hangup_at.get_or_insert(now);
                    }
                }
                _ => {}
            }
            call.recompute_connected_at();
        }

        if should_start_recording {
            self.recordings.maybe_start(call_id).await;
        }

        Ok(())
    }

    /// Resolves the call a `Dial` event belongs to, trying the dialstring
    /// prefix match, then the local-channel naming heuristic, then a
    /// channel-name match against known leg peer names.
    fn resolve_dial_call(&self, dialstring: Option<&str>, channel_name: &str) -> Option<Uuid> {
        if let Some(dialstring) = dialstring {
            if let Some((prefix, _)) = dialstring.split_once('@') {
                let matches: Vec<Uuid> = self
                    .store
                    .iter()
                    .filter(|entry| entry.number == prefix)
                    .map(|entry| *entry.key())
                    .collect();
                if matches.len() == 1 {
                    return Some(matches[0]);
                }
                if matches.len() > 1 {
                    // Ambiguous: do not associate, per design note (c).
                    return None;
                }
            }
        }

        if is_target_local_name(channel_name, &self.config.target.extension, &self.config.target.context) {
            let candidates: Vec<Uuid> = self
                .store
                .iter()
                .filter(|entry| {
                    entry.originated_partner
                        && entry.leg_b.channel_id.is_none()
                        && entry.dialed_channel_id.is_none()
                        && !entry.channel_roles.values().any(|r| *r == ChannelRole::Dialed)
                })
                .map(|entry| *entry.key())
                .collect();
            if candidates.len() == 1 {
                return Some(candidates[0]);
            }
        }

        let swapped = swap_half_suffix(channel_name);
        self.store.iter().find_map(|entry| {
            let matches = [
                entry.leg_a.peer_name.as_deref(),
                entry.leg_a.paired_channel_name.as_deref(),
                entry.leg_b.peer_name.as_deref(),
                entry.leg_b.paired_channel_name.as_deref(),
            ]
            .into_iter()
            .flatten()
            .any(|name| name == channel_name || Some(name.to_string()) == swapped);
            matches.then(|| *entry.key())
        })
    }

    async fn on_dial(&self, event: AriEvent) -> Result<()> {
        let AriEvent::Dial { caller, peer, dialstring, dialstatus, .. } = event else {
            return Ok(());
        };

        let status = dialstatus.as_deref().map(normalize_status);

        for (candidate, peer_of_candidate) in [
            (caller.as_ref(), peer.as_ref()),
            (peer.as_ref(), caller.as_ref()),
        ] {
            let Some(candidate) = candidate else { continue };

            let call_id = self
                .resolve_general(candidate, None)
                .or_else(|| self.resolve_dial_call(dialstring.as_deref(), &candidate.name));

            let Some(call_id) = call_id else { continue };

            self.store.index_channel(candidate.id.clone(), call_id);

            let is_local_half_one = candidate.name.ends_with(";1");
            let caller_name = candidate
                .caller
                .as_ref()
                .map(|c| c.name.clone())
                .filter(|name| !name.is_empty());

            if let Some(mut call) = self.store.get_mut(call_id) {
                let role = call.role_of(&candidate.id);
                let now = Utc::now();

                match role {
                    ChannelRole::Dialer => {
                        call.leg_a.dial_string = dialstring.clone();
                        call.leg_a.last_status = status.clone();
                        if let Some(name) = caller_name {
                            call.leg_a.caller_name.get_or_insert(name);
                        }
                        if let Some(peer) = peer_of_candidate {
                            call.leg_a.paired_channel_name.get_or_insert(peer.name.clone());
                            call.leg_a.paired_channel_id.get_or_insert(peer.id.clone());
                        }
                        if status.as_deref() == Some("ANSWERED") {
                            call.leg_a.answered_at.get_or_insert(now);
                            if let Some(ds) = &dialstring {
                                call.leg_a.answered_by.get_or_insert(ds.clone());
                            }
                        } else if call.leg_a.last_status.is_none() {
                            call.leg_a.started_at.get_or_insert(now);
                        }
                    }
                    ChannelRole::Dialed => {
                        call.leg_b.dial_string = dialstring.clone();
                        call.leg_b.last_status = status.clone();
                        if let Some(name) = caller_name {
                            call.leg_b.caller_name.get_or_insert(name);
                        }
                        if let Some(peer) = peer_of_candidate {
                            call.leg_b.paired_channel_name.get_or_insert(peer.name.clone());
                            call.leg_b.paired_channel_id.get_or_insert(peer.id.clone());
                        }
                        if status.as_deref() == Some("ANSWERED") {
                            call.leg_b.answered_at.get_or_insert(now);
                            if let Some(ds) = &dialstring {
                                call.leg_b.answered_by.get_or_insert(ds.clone());
                            }
                        }
                    }
                    ChannelRole::Unknown if !is_local_half_one => {
                        call.channel_roles.insert(candidate.id.clone(), ChannelRole::Agent);
                        call.agent_channels.insert(candidate.id.clone());
                        let leg = call
                            .agent_legs
                            .entry(candidate.id.clone())
                            .or_insert_with(|| AgentLeg::new(now));
                        leg.last_status = status.clone();
                        match status.as_deref() {
                            Some("ANSWER") | Some("ANSWERED") => {
                                leg.answered_at.get_or_insert(now);
                            }
                            Some("RINGING") => {}
                            Some(_) => {
                                leg.hangup_at.get_or_insert(now);
                            }
                            None => {}
                        }
                    }
                    _ => {}
                }
                call.recompute_connected_at();
            }
        }

        Ok(())
    }

    async fn on_bridge_enter(&self, event: AriEvent) -> Result<()> {
        let AriEvent::BridgeEnter { bridge, channel, .. } = event else {
            return Ok(());
        };

        let Some(call_id) = self.resolve_general(&channel, Some(&bridge.id)) else {
            warn!(channel = %channel.id, "BridgeEnter for unresolvable call");
            return Ok(());
        };

        self.store.index_bridge(bridge.id.clone(), call_id);
        self.store.index_channel(channel.id.clone(), call_id);

        let already_roled = self
            .store
            .get(call_id)
            .map(|c| matches!(c.role_of(&channel.id), ChannelRole::Dialer | ChannelRole::Dialed))
            .unwrap_or(false);

        if already_roled {
            return Ok(());
        }

        if is_target_local_name(&channel.name, &self.config.target.extension, &self.config.target.context) {
            if let Some(mut call) = self.store.get_mut(call_id) {
                call.channel_roles.insert(channel.id.clone(), ChannelRole::Dialed);
                call.dialed_channel_id.get_or_insert(channel.id.clone());
            }
            return Ok(());
        }

        let now = Utc::now();
        if let Some(mut call) = self.store.get_mut(call_id) {
            call.channel_roles.insert(channel.id.clone(), ChannelRole::Agent);
            call.agent_channels.insert(channel.id.clone());
            call.agent_channel_id.get_or_insert(channel.id.clone());
            if let Some(connected) = &channel.connected {
                if !connected.number.is_empty() {
                    call.set_answered_by(connected.number.clone(), AnsweredBySource::Agent);
                }
            }
            call.agent_answered_at.get_or_insert(now);
            call.recompute_connected_at();
        }

        Ok(())
    }

    /// Final cleanup for a call: writes the summary, stops and relocates
    /// the recording, destroys the bridge, and purges every index.
    pub async fn cleanup_call(&self, call_id: Uuid) {
        let bridge_id = self.store.get(call_id).and_then(|c| c.bridge.clone());

        self.recordings.stop_and_finalize(call_id).await;

        if let Some(bridge_id) = &bridge_id {
            if let Err(err) = self.ari.destroy_bridge(bridge_id).await {
                debug!(error = %err, bridge = %bridge_id, "bridge destroy failed during cleanup");
            }
        }

        let should_log = self
            .store
            .get(call_id)
            .map(|c| !c.summary_logged)
            .unwrap_or(false);

        if should_log {
            if let Some(mut call) = self.store.get_mut(call_id) {
                call.completed_at.get_or_insert(Utc::now());
                let summary = compute_summary(&call);
                info!(call_id = %call_id, "{}", summary.line);
                call.summary_logged = true;
                drop(call);
                self.summaries.persist(call_id, summary).await;
            }
        }

        self.store.remove(call_id);
        let _ = self.completed_tx.send(call_id);
    }
}

fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_no_answer_variants() {
        assert_eq!(normalize_status("NOANSWER"), "NO ANSWER");
        assert_eq!(normalize_status("no answer"), "NO ANSWER");
        assert_eq!(normalize_status("NO ANSWER"), "NO ANSWER");
    }

    #[test]
    fn normalizes_answer_variants() {
        assert_eq!(normalize_status("ANSWER"), "ANSWERED");
        assert_eq!(normalize_status("answered"), "ANSWERED");
    }

    #[test]
    fn answered_always_wins_in_best_status() {
        let status = best_status(&[Some("RINGING"), Some("ANSWER"), Some("NO ANSWER")]);
        assert_eq!(status, "ANSWERED");
    }

    #[test]
    fn progress_beats_no_answer_when_present() {
        let status = best_status(&[Some("NO ANSWER"), Some("RINGING")]);
        assert_eq!(status, "RINGING");
    }

    #[test]
    fn strip_half_suffix_removes_local_channel_tag() {
        assert_eq!(strip_half_suffix("Local/777@default2;1"), "Local/777@default2");
        assert_eq!(strip_half_suffix("Local/777@default2;2"), "Local/777@default2");
        assert_eq!(strip_half_suffix("PJSIP/trunk-0001"), "PJSIP/trunk-0001");
    }

    #[test]
    fn is_target_local_name_matches_configured_extension() {
        assert!(is_target_local_name("Local/777@default2;1", "777", "default2"));
        assert!(!is_target_local_name("Local/888@default2;1", "777", "default2"));
    }

    #[test]
    fn swap_half_suffix_flips_local_channel_half() {
        assert_eq!(swap_half_suffix("Local/777@default2;1").as_deref(), Some("Local/777@default2;2"));
        assert_eq!(swap_half_suffix("PJSIP/trunk-0001"), None);
    }
}
