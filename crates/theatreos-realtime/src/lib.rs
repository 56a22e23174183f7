// SPDX-License-Identifier: Apache-2.0
//! Realtime Fanout (spec §4.9): a subscriber registry and selector-based
//! dispatcher sitting behind [`theatreos_storage::EventSink`].
//!
//! Per-connection `mpsc::Sender` fed by a single shared lock over the
//! connection registry, with the dispatch-selector priority `target_users` >
//! `target_stage` > `target_theatre` > broadcast, and a 30-second
//! heartbeat loop.

pub mod hub;

pub use hub::{RealtimeHub, Subscriber, SubscriberId, Subscription};
