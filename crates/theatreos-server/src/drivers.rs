// SPDX-License-Identifier: Apache-2.0
//! Background drivers (spec §5 "a small fixed set of background drivers:
//! per theatre: scheduler tick, gate lifecycle driver, snapshot timer,
//! expiry sweeper"). Each driver owns one [`tokio::time::interval`] loop,
//! iterates every known theatre, and never aborts the process on a single
//! theatre's failure (spec §7 "Background drivers catch, log, and retry on
//! the next tick").
//!
//! One `tokio::spawn`ed task per concern, independent of the main process's
//! shutdown signal handling.

use std::sync::Arc;

use theatreos_scheduler::OverrideSet;
use theatreos_storage::Storage;
use theatreos_types::rumor::RumorStatus;
use tokio::time::{interval, Duration};
use tracing::{error, info, instrument, warn};

use crate::state::AppState;

/// Scheduler tick cadence. The scheduler itself plans slots up to
/// `SCHEDULE_LOOKAHEAD_HOURS` ahead; ticking every minute is cheap because
/// `generate_plan` only ever produces *one* slot's plan and callers decide
/// which slot to ask for.
const SCHEDULER_TICK: Duration = Duration::from_secs(60);
/// Gate lifecycle driver cadence (spec §4.4 "background driver checks per
/// tick").
const GATE_TICK: Duration = Duration::from_secs(5);
/// Snapshot timer cadence (spec §4.2 "Taken on schedule (default hourly)").
const SNAPSHOT_TICK: Duration = Duration::from_secs(3600);
/// Expiry sweeper cadence.
const EXPIRY_TICK: Duration = Duration::from_secs(300);
/// Window ahead of `now` within which evidence triggers `evidence_expiring`.
const EVIDENCE_EXPIRING_WINDOW: chrono::Duration = chrono::Duration::hours(1);

/// Spawn all four background drivers over `state`, returning their join
/// handles so the caller can await or abort them on shutdown.
pub fn spawn_all<S: Storage>(state: Arc<AppState<S>>) -> Vec<tokio::task::JoinHandle<()>> {
    vec![
        tokio::spawn(scheduler_driver(state.clone())),
        tokio::spawn(gate_driver(state.clone())),
        tokio::spawn(snapshot_driver(state.clone())),
        tokio::spawn(expiry_driver(state)),
    ]
}

/// Plans the next slot for every theatre once the current slot is due to
/// roll over. Determinism (P8) lives in `Scheduler::generate_plan` itself;
/// this driver only decides *when* to ask for the next slot.
async fn scheduler_driver<S: Storage>(state: Arc<AppState<S>>) {
    let mut ticker = interval(SCHEDULER_TICK);
    loop {
        ticker.tick().await;
        let theatres = match state.storage.list_theatres().await {
            Ok(t) => t,
            Err(err) => {
                warn!(?err, "scheduler driver: failed to list theatres");
                continue;
            }
        };
        for theatre in theatres {
            if let Err(err) = tick_scheduler(&state, &theatre.theatre_id).await {
                warn!(?err, theatre_id = %theatre.theatre_id, "scheduler tick failed, retrying next cycle");
            }
        }
    }
}

#[instrument(skip(state), fields(theatre_id = %theatre_id))]
async fn tick_scheduler<S: Storage>(
    state: &AppState<S>,
    theatre_id: &theatreos_types::TheatreId,
) -> anyhow::Result<()> {
    let slot_minutes = i64::from(state.settings.slot_duration_minutes.max(1));
    let now = chrono::Utc::now();
    let slot_start = floor_to_slot(now, slot_minutes);

    let recent = state.storage.recent_plans(theatre_id, 1).await?;
    if recent.iter().any(|p| p.slot_start == slot_start) {
        return Ok(());
    }

    state
        .scheduler
        .generate_plan(theatre_id, slot_start, &OverrideSet::default())
        .await?;
    info!(theatre_id = %theatre_id, %slot_start, "hour plan generated");
    Ok(())
}

fn floor_to_slot(now: theatreos_types::Instant, slot_minutes: i64) -> theatreos_types::Instant {
    let epoch_minutes = now.timestamp() / 60;
    let floored = (epoch_minutes / slot_minutes) * slot_minutes;
    chrono::DateTime::from_timestamp(floored * 60, 0).unwrap_or(now)
}

/// Drives every theatre's gates through `scheduled -> open -> closing ->
/// resolved` via `GateEngine::process_due` (spec §4.4).
async fn gate_driver<S: Storage>(state: Arc<AppState<S>>) {
    let mut ticker = interval(GATE_TICK);
    loop {
        ticker.tick().await;
        let theatres = match state.storage.list_theatres().await {
            Ok(t) => t,
            Err(err) => {
                warn!(?err, "gate driver: failed to list theatres");
                continue;
            }
        };
        let now = chrono::Utc::now();
        for theatre in theatres {
            match state.gate.process_due(&theatre.theatre_id, now).await {
                Ok(transitioned) if !transitioned.is_empty() => {
                    info!(theatre_id = %theatre.theatre_id, count = transitioned.len(), "gates transitioned");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(?err, theatre_id = %theatre.theatre_id, "gate driver tick failed, retrying next cycle");
                }
            }
        }
    }
}

/// Takes an hourly snapshot of every theatre's world state (spec §4.2).
async fn snapshot_driver<S: Storage>(state: Arc<AppState<S>>) {
    let mut ticker = interval(SNAPSHOT_TICK);
    loop {
        ticker.tick().await;
        let theatres = match state.storage.list_theatres().await {
            Ok(t) => t,
            Err(err) => {
                warn!(?err, "snapshot driver: failed to list theatres");
                continue;
            }
        };
        for theatre in theatres {
            match state.kernel.snapshot(&theatre.theatre_id).await {
                Ok(snap) => info!(theatre_id = %theatre.theatre_id, snapshot_id = %snap.snapshot_id, "snapshot taken"),
                Err(err) => error!(?err, theatre_id = %theatre.theatre_id, "snapshot failed, retrying next cycle"),
            }
        }
    }
}

/// Flips expired rumors to `Expired`, decays credibility on rumors that
/// weren't spread recently, and emits `evidence_expiring` notices (spec §3
/// "Lifecycles", §4.6, §6). Never mutates evidence/trace expiry state
/// itself — those stay read-only-past-expiry by construction (reads check
/// `is_expired` directly); this driver only pushes a heads-up notification.
async fn expiry_driver<S: Storage>(state: Arc<AppState<S>>) {
    let mut ticker = interval(EXPIRY_TICK);
    loop {
        ticker.tick().await;
        let theatres = match state.storage.list_theatres().await {
            Ok(t) => t,
            Err(err) => {
                warn!(?err, "expiry driver: failed to list theatres");
                continue;
            }
        };
        let now = chrono::Utc::now();
        for theatre in theatres {
            if let Err(err) = sweep_theatre(&state, &theatre.theatre_id, now).await {
                warn!(?err, theatre_id = %theatre.theatre_id, "expiry sweep failed, retrying next cycle");
            }
        }
    }
}

async fn sweep_theatre<S: Storage>(
    state: &AppState<S>,
    theatre_id: &theatreos_types::TheatreId,
    now: theatreos_types::Instant,
) -> anyhow::Result<()> {
    match state.rumor.sweep_expired(theatre_id, now).await {
        Ok(n) if n > 0 => info!(theatre_id = %theatre_id, count = n, "rumors expired"),
        Ok(_) => {}
        Err(err) => warn!(?err, theatre_id = %theatre_id, "rumor expiry sweep failed"),
    }

    for rumor in state
        .storage
        .list_rumors(theatre_id)
        .await?
        .into_iter()
        .filter(|r| matches!(r.status, RumorStatus::Active | RumorStatus::Viral))
    {
        if let Err(err) = state.rumor.decay_credibility(rumor).await {
            warn!(?err, theatre_id = %theatre_id, "rumor credibility decay failed");
        }
    }

    let expiring = state
        .evidence
        .expiring_within(theatre_id, now, EVIDENCE_EXPIRING_WINDOW)
        .await?;
    for evidence in &expiring {
        state.evidence.notify_expiring(evidence).await;
    }
    if !expiring.is_empty() {
        info!(theatre_id = %theatre_id, count = expiring.len(), "evidence expiring notices sent");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_to_slot_rounds_down_to_boundary() {
        let now = chrono::DateTime::parse_from_rfc3339("2026-01-01T10:47:12Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let floored = floor_to_slot(now, 60);
        assert_eq!(floored.to_rfc3339(), "2026-01-01T10:00:00+00:00");
    }

    #[test]
    fn floor_to_slot_is_idempotent_on_a_boundary() {
        let now = chrono::DateTime::parse_from_rfc3339("2026-01-01T11:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert_eq!(floor_to_slot(now, 60), now);
    }
}
