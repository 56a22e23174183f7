// SPDX-License-Identifier: Apache-2.0
//! The World Kernel (spec §4.2): the only writer of a theatre's current
//! state. Every other engine reads `WorldState` (or the events an applied
//! delta produces) and never mutates current-state rows directly.
//!
//! One lock per theatre (spec §5: "within one theatre, delta application
//! is serialized ... across theatres: independent, no ordering").

pub mod hash;
pub mod kernel;

pub use kernel::WorldKernel;
