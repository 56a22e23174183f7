// SPDX-License-Identifier: Apache-2.0
//! Rumor entities (spec §3, §4.6): draft/publish/spread/debunk, virality.

use crate::ids::{CharacterId, RumorId, SpreadId, StageId, ThreadId, TheatreId, UserId};
use crate::Instant;
use serde::{Deserialize, Serialize};

/// Maximum rumor content length in characters (spec §3).
pub const MAX_CONTENT_CHARS: usize = 280;

/// Default rumor expiry, hours (spec §3).
pub const DEFAULT_EXPIRE_HOURS: i64 = 48;

/// Per-author cooldown between drafts, minutes (spec §4.6).
pub const DRAFT_COOLDOWN_MINUTES: i64 = 10;

/// Spread count at which a rumor auto-transitions `active -> viral`
/// (spec §4.6).
pub const VIRAL_THRESHOLD: u32 = 10;

/// Credibility decay applied per scheduler tick to un-spread rumors
/// (spec §4; default, pack overridable).
pub const CREDIBILITY_DECAY_PER_TICK: f64 = 0.1;

/// A rumor's lifecycle stage (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RumorStatus {
    /// Authored, not yet published.
    Draft,
    /// Published, spreadable.
    Active,
    /// Spread count crossed `VIRAL_THRESHOLD`.
    Viral,
    /// Successfully debunked; credibility forced to zero.
    Debunked,
    /// Past `expires_at`.
    Expired,
}

/// A short published claim (spec §3 "Rumor").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rumor {
    /// Stable identifier.
    pub rumor_id: RumorId,
    /// Owning theatre.
    pub theatre_id: TheatreId,
    /// Authoring user.
    pub author_id: UserId,
    /// Rumor text, at most `MAX_CONTENT_CHARS` characters.
    pub content: String,
    /// The thread this rumor concerns, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_thread: Option<ThreadId>,
    /// The character this rumor concerns, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_character: Option<CharacterId>,
    /// Current lifecycle status.
    pub status: RumorStatus,
    /// Believability in `[0,1]`; forced to `0.0` once debunked.
    pub credibility: f64,
    /// Count of distinct spreaders.
    pub spread_count: u32,
    /// When this rumor was drafted, used by the per-author draft cooldown.
    pub created_at: Instant,
    /// When this rumor was published, if it has been.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<Instant>,
    /// TTL boundary.
    pub expires_at: Instant,
}

impl Rumor {
    /// Whether `now` is past `expires_at`.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// One `(rumor, spreader)` spread event (spec §3 "Spread"); at most one
/// per pair (P6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spread {
    /// Stable identifier.
    pub spread_id: SpreadId,
    /// The rumor spread.
    pub rumor_id: RumorId,
    /// The spreading user.
    pub spreader_id: UserId,
    /// The stage this spread happened at, if any (feeds per-stage heat).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<StageId>,
    /// When this spread was recorded.
    pub at: Instant,
}
