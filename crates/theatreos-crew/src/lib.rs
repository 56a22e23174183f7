// SPDX-License-Identifier: Apache-2.0
//! The Crew Engine (spec §4.8): membership, tiered permissions, collective
//! actions, shared resource pool.
//!
//! Membership/invite/leave rules, the tier-gated action-kind check, and
//! the `quantity * 10` contribution formula, over one engine-over-`Storage`
//! shape.

pub mod engine;

pub use engine::CrewEngine;
