//! Summary computation and MySQL persistence (C7).
//!
//! On terminal cleanup the correlator computes a one-line summary and an
//! upsert row for each call. The persistence pool is built lazily, the
//! same way this codebase's CDR storage lazily rotates its backing file —
//! if the pool can never be built, persistence is disabled for the run
//! with a single warning rather than retried on every call.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Timelike, Utc};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::MysqlConfig;
use crate::services::state::Call;

#[derive(Debug, Clone, Default)]
pub struct LegRow {
    pub status: String,
    pub number: Option<String>,
    pub channel: Option<String>,
    pub paired_channel: Option<String>,
    pub peer: Option<String>,
    pub caller: Option<String>,
    pub dial_string: Option<String>,
    pub answered_by: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub answer: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub wait_seconds: i64,
    pub talk_seconds: i64,
}

#[derive(Debug, Clone)]
pub struct CallSummary {
    pub line: String,
    pub leg_a: LegRow,
    pub leg_b: LegRow,
    pub recording_path: Option<String>,
}

/// Computes both legs' status/wait/talk figures and the single summary
/// line, per the formulas this system has always used for reporting.
pub fn compute_summary(call: &Call) -> CallSummary {
    let completed_at = call.completed_at.unwrap_or_else(Utc::now);

    let leg_a_status = if call.dialer_connected_at.is_some() && call.dialed_connected_at.is_some() {
        "ANSWERED".to_string()
    } else {
        crate::services::correlator::best_status(&[
            call.dialer_hangup_cause.as_deref(),
            call.dialed_hangup_cause.as_deref(),
            call.leg_a.last_status.as_deref(),
        ])
    };

    let leg_a_wait = if let Some(connected) = call.dialer_connected_at {
        seconds_between(call.created_at, connected)
    } else {
        seconds_between(call.created_at, completed_at)
    };

    let talk_start = call.agent_answered_at.or(call.call_connected_at);
    let leg_a_talk = match (talk_start, call.dialer_hangup_at) {
        (Some(start), Some(end)) => seconds_between(start, end),
        _ => 0,
    };

    let agent_dialed_at = call
        .agent_legs
        .values()
        .filter_map(|leg| leg.dialed_at)
        .min()
        .unwrap_or(call.created_at);

    let leg_b_status = if call.agent_answered_at.is_some() {
        "ANSWERED".to_string()
    } else {
        crate::services::correlator::best_status(&[
            call.dialed_hangup_cause.as_deref(),
            call.leg_b.last_status.as_deref(),
        ])
    };

    let leg_b_wait = if let Some(answered) = call.agent_answered_at {
        seconds_between(agent_dialed_at, answered)
    } else {
        seconds_between(agent_dialed_at, completed_at)
    };

    let leg_b_talk = match (
        call.agent_answered_at,
        call.agent_legs.values().filter_map(|leg| leg.hangup_at).max(),
    ) {
        (Some(start), Some(end)) => seconds_between(start, end),
        _ => 0,
    };

    let agent_identity = call.answered_by.clone().unwrap_or_else(|| "unknown".to_string());

    let line = format!(
        "{};{};{};{};{};{};{};{};{};{}",
        call.created_at.to_rfc3339(),
        call.number,
        leg_a_status,
        leg_a_wait,
        leg_a_talk,
        leg_b_status,
        agent_identity,
        leg_b_wait,
        leg_b_talk,
        call.recording_path.clone().unwrap_or_default(),
    );

    let leg_a = LegRow {
        status: leg_a_status,
        number: Some(call.number.clone()),
        channel: call.dialer_channel_id.clone(),
        paired_channel: call.leg_a.paired_channel_id.clone(),
        peer: call.leg_a.peer_name.clone(),
        caller: call.leg_a.caller_name.clone(),
        dial_string: call.leg_a.dial_string.clone(),
        answered_by: call.leg_a.answered_by.clone(),
        start: call.leg_a.started_at.map(truncate_to_second),
        answer: call.dialer_connected_at.map(truncate_to_second),
        end: call.dialer_hangup_at.map(truncate_to_second),
        wait_seconds: leg_a_wait,
        talk_seconds: leg_a_talk,
    };

    let leg_b = LegRow {
        status: leg_b_status,
        number: call.leg_b.target_number.clone(),
        channel: call.dialed_channel_id.clone(),
        paired_channel: call.leg_b.paired_channel_id.clone(),
        peer: call.leg_b.peer_name.clone(),
        caller: call.leg_b.caller_name.clone(),
        dial_string: call.leg_b.dial_string.clone(),
        answered_by: call.answered_by.clone(),
        start: Some(agent_dialed_at),
        answer: call.agent_answered_at,
        end: call.agent_legs.values().filter_map(|leg| leg.hangup_at).max(),
        wait_seconds: leg_b_wait,
        talk_seconds: leg_b_talk,
    };

    CallSummary {
        line,
        leg_a,
        leg_b,
        recording_path: call.recording_path.clone(),
    }
}

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_seconds().max(0)
}

fn truncate_to_second(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive()
        .and_hms_opt(ts.time().hour(), ts.time().minute(), ts.time().second())
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
        .unwrap_or(ts)
}

pub struct SummaryStore {
    config: MysqlConfig,
    pool: RwLock<Option<MySqlPool>>,
    disabled_warned: AtomicBool,
}

impl SummaryStore {
    pub fn new(config: MysqlConfig) -> Self {
        Self {
            config,
            pool: RwLock::new(None),
            disabled_warned: AtomicBool::new(false),
        }
    }

    /// Drops the cached pool so the next `persist` call reinitializes it.
    /// Invoked by the control surface on every `/start`.
    pub async fn reset(&self) {
        *self.pool.write().await = None;
        self.disabled_warned.store(false, Ordering::Relaxed);
    }

    async fn pool(&self) -> Option<MySqlPool> {
        if let Some(pool) = self.pool.read().await.clone() {
            return Some(pool);
        }

        let mut guard = self.pool.write().await;
        if let Some(pool) = guard.clone() {
            return Some(pool);
        }

        match MySqlPoolOptions::new()
            .max_connections(5)
            .connect(&self.config.connect_url())
            .await
        {
            Ok(pool) => {
                info!("persistence pool initialized");
                *guard = Some(pool.clone());
                Some(pool)
            }
            Err(err) => {
                if !self.disabled_warned.swap(true, Ordering::Relaxed) {
                    warn!(error = %err, "persistence pool unavailable, disabling persistence for this run");
                }
                None
            }
        }
    }

    pub async fn persist(&self, call_id: Uuid, summary: CallSummary) {
        let Some(pool) = self.pool().await else { return };

        let table = self.config.table.clone();
        let query = format!(
            "INSERT INTO {table} (
                call_id, recording_path,
                leg_a_status, leg_a_number, leg_a_channel, leg_a_paired_channel, leg_a_peer, leg_a_caller, leg_a_dial_string, leg_a_answered_by, leg_a_start, leg_a_answer, leg_a_end,
                leg_b_status, leg_b_number, leg_b_channel, leg_b_paired_channel, leg_b_peer, leg_b_caller, leg_b_dial_string, leg_b_answered_by, leg_b_start, leg_b_answer, leg_b_end
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                recording_path = VALUES(recording_path),
                leg_a_status = VALUES(leg_a_status), leg_a_number = VALUES(leg_a_number), leg_a_channel = VALUES(leg_a_channel),
                leg_a_paired_channel = VALUES(leg_a_paired_channel), leg_a_peer = VALUES(leg_a_peer), leg_a_caller = VALUES(leg_a_caller),
                leg_a_dial_string = VALUES(leg_a_dial_string), leg_a_answered_by = VALUES(leg_a_answered_by),
                leg_a_start = VALUES(leg_a_start), leg_a_answer = VALUES(leg_a_answer), leg_a_end = VALUES(leg_a_end),
                leg_b_status = VALUES(leg_b_status), leg_b_number = VALUES(leg_b_number), leg_b_channel = VALUES(leg_b_channel),
                leg_b_paired_channel = VALUES(leg_b_paired_channel), leg_b_peer = VALUES(leg_b_peer), leg_b_caller = VALUES(leg_b_caller),
                leg_b_dial_string = VALUES(leg_b_dial_string), leg_b_answered_by = VALUES(leg_b_answered_by),
                leg_b_start = VALUES(leg_b_start), leg_b_answer = VALUES(leg_b_answer), leg_b_end = VALUES(leg_b_end)"
        );

        let result = sqlx::query(&query)
            .bind(call_id.to_string())
            .bind(summary.recording_path)
            .bind(summary.leg_a.status)
            .bind(summary.leg_a.number)
            .bind(summary.leg_a.channel)
            .bind(summary.leg_a.paired_channel)
            .bind(summary.leg_a.peer)
            .bind(summary.leg_a.caller)
            .bind(summary.leg_a.dial_string)
            .bind(summary.leg_a.answered_by)
            .bind(summary.leg_a.start)
            .bind(summary.leg_a.answer)
            .bind(summary.leg_a.end)
            .bind(summary.leg_b.status)
            .bind(summary.leg_b.number)
            .bind(summary.leg_b.channel)
            .bind(summary.leg_b.paired_channel)
            .bind(summary.leg_b.peer)
            .bind(summary.leg_b.caller)
            .bind(summary.leg_b.dial_string)
            .bind(summary.leg_b.answered_by)
            .bind(summary.leg_b.start)
            .bind(summary.leg_b.answer)
            .bind(summary.leg_b.end)
            .execute(&pool)
            .await;

        if let Err(err) = result {
            warn!(error = %err, call_id = %call_id, "failed to upsert call summary");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::state::AnsweredBySource;
    use chrono::Duration;

    fn base_call() -> Call {
        Call::new(Uuid::new_v4(), "15551234567".to_string())
    }

    #[test]
    fn answered_call_reports_answered_and_nonnegative_seconds() {
        let mut call = base_call();
        let t0 = call.created_at;
        call.dialer_connected_at = Some(t0 + Duration::seconds(2));
        call.dialed_connected_at = Some(t0 + Duration::seconds(3));
        call.agent_answered_at = Some(t0 + Duration::seconds(5));
        call.dialer_hangup_at = Some(t0 + Duration::seconds(65));
        call.set_answered_by("18005550123", AnsweredBySource::Agent);
        call.recompute_connected_at();

        let summary = compute_summary(&call);
        assert_eq!(summary.leg_a.status, "ANSWERED");
        assert!(summary.leg_a.wait_seconds >= 0);
        assert!(summary.leg_a.talk_seconds >= 0);
        assert_eq!(summary.leg_a.talk_seconds, 60);
    }

    #[test]
    fn unanswered_call_falls_back_to_no_answer() {
        let mut call = base_call();
        call.completed_at = Some(call.created_at + Duration::seconds(30));
        let summary = compute_summary(&call);
        assert_eq!(summary.leg_a.status, "NO ANSWER");
        assert_eq!(summary.leg_a.talk_seconds, 0);
    }
}
