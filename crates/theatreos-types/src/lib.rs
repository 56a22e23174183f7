// SPDX-License-Identifier: Apache-2.0
//! Shared domain types for TheatreOS.
//!
//! Every engine crate (`theatreos-kernel`, `theatreos-gate`, ...) depends on
//! this crate for entity ids, the role hierarchy, the error-kind taxonomy,
//! and the event-log wire shape, so that no two engines invent a second
//! definition of "what a user is".

pub mod crew;
pub mod error;
pub mod evidence;
pub mod event;
pub mod gate;
pub mod ids;
pub mod plan;
pub mod role;
pub mod rumor;
pub mod stage;
pub mod theatre;
pub mod trace;
pub mod user;
pub mod world;

pub use error::EngineError;
pub use event::{Event, EventKind, EventTarget};
pub use ids::*;
pub use plan::{Beat, HourPlan, PlanSource, Slot};
pub use role::Role;
pub use stage::Stage;
pub use theatre::Theatre;
pub use user::User;

/// UTC instant used throughout the domain model.
pub type Instant = chrono::DateTime<chrono::Utc>;
