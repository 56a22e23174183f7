// SPDX-License-Identifier: Apache-2.0
//! The Trace Engine (spec §4.7): leave/discover stage-local markers and
//! report stage density as a heat level.
//!
//! TTL/difficulty-by-type, a random discovery roll, and heat-bucket
//! density boundaries, over one engine-over-`Storage` shape.

pub mod engine;

pub use engine::TraceEngine;
