// SPDX-License-Identifier: Apache-2.0
//! Tunable scheduler parameters (spec §6 environment-variable contract).

/// Scheduler parameters, normally loaded from `theatreos-server`'s
/// `Settings` and passed in at construction.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Width of one slot, minutes (`SLOT_DURATION_MINUTES`, default 60).
    pub slot_duration_minutes: u32,
    /// Minutes into the slot a planned gate stops accepting votes/stakes
    /// (`GATE_RESOLVE_MINUTE`, default 55).
    pub gate_resolve_minute: u32,
    /// How many slots ahead the scheduler plans (`SCHEDULE_LOOKAHEAD_HOURS`,
    /// default 3).
    pub lookahead_hours: u32,
    /// Scene slots to fill per `HourPlan` (`DEFAULT_PARALLEL_SCENES`,
    /// default 3).
    pub beat_budget: usize,
    /// Support threads selected alongside the primary, default 2.
    pub support_thread_count: usize,
    /// How many recent plans are consulted for variety weighting.
    pub variety_window: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            slot_duration_minutes: 60,
            gate_resolve_minute: 55,
            lookahead_hours: 3,
            beat_budget: 3,
            support_thread_count: 2,
            variety_window: 10,
        }
    }
}
