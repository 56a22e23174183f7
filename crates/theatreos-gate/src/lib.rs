// SPDX-License-Identifier: Apache-2.0
//! The Gate Engine (spec §4.4): vote/stake lifecycle, time-driven state
//! machine, resolution, settlement, and the Explain Card.
//!
//! One lock per gate rather than one per theatre (spec §5: "within one
//! `(gate, user)`: votes and stakes are serialized"; "`GateInstance` state:
//! writable only by the gate driver at state transitions").

pub mod consequence;
pub mod engine;
pub mod weight;

pub use engine::GateEngine;
