// SPDX-License-Identifier: Apache-2.0
//! The Hourly Scheduler (spec §4.3): generates the `HourPlan` for one slot
//! from current world state, the bound theme pack, and recent plan
//! history.
//!
//! Deterministic thread/beat/stage/gate selection seeded from
//! `(theatre_id, slot_start, state_hash)` (spec §4.3 step 6, P8).

pub mod config;
pub mod overrides;
pub mod rng;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use overrides::OverrideSet;
pub use scheduler::Scheduler;
