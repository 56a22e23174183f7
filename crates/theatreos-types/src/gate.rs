// SPDX-License-Identifier: Apache-2.0
//! Gate lifecycle entities (spec §3, §4.4): `GateInstance`, `Vote`, `Stake`,
//! `Wallet`, and the Explain Card.

use crate::ids::{
    GateId, GateTemplateId, IdempotencyKey, OptionId, SlotId, StakeId, TheatreId, UserId, VoteId,
};
use crate::Instant;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a `GateInstance` sits in its time-driven lifecycle (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    /// Not yet open; waiting for `open_at`.
    Scheduled,
    /// Accepting votes and stakes.
    Open,
    /// Past `close_at`: no new votes/stakes, waiting for `resolve_at`.
    Closing,
    /// Resolved: winner computed, stakes settled, Kernel delta applied.
    Resolved,
    /// Cancelled by an operator; all stakes refunded.
    Cancelled,
}

/// A time-bounded decision market (spec §3 "GateInstance").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateInstance {
    /// Stable identifier.
    pub gate_id: GateId,
    /// Owning theatre.
    pub theatre_id: TheatreId,
    /// The slot this gate belongs to.
    pub slot_id: SlotId,
    /// The theme-pack gate template this instance was planned from.
    pub template_id: GateTemplateId,
    /// Voteable/stakeable option ids.
    pub options: Vec<OptionId>,
    /// Voting/staking opens.
    pub open_at: Instant,
    /// Voting/staking closes (`open_at < close_at <= resolve_at`).
    pub close_at: Instant,
    /// Winner computed and Kernel delta applied at this instant.
    pub resolve_at: Instant,
    /// Current lifecycle state.
    pub state: GateState,
    /// Running vote tally, `option_id -> count`. Visibility to
    /// non-participants while open is a per-template policy (§9 open
    /// question), enforced by the transport boundary, not this struct.
    pub vote_tally: BTreeMap<String, u64>,
    /// Winning option, set once `state == Resolved`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winning_option: Option<OptionId>,
    /// When settlement completed, set once `state == Resolved`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<Instant>,
}

/// One user's live vote on a gate (spec §3 "Vote"). At most one per
/// `(gate, user)` (P5): re-casting supersedes the previous row in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    /// Stable identifier (reassigned on supersession).
    pub vote_id: VoteId,
    /// Gate this vote is cast on.
    pub gate_id: GateId,
    /// Casting user.
    pub user_id: UserId,
    /// Chosen option.
    pub option_id: OptionId,
    /// When this vote (or its latest supersession) was cast.
    pub cast_at: Instant,
    /// Dedup key for the casting request.
    pub idempotency_key: IdempotencyKey,
}

/// A placed stake, escrowed until resolution (spec §3 "Stake").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stake {
    /// Stable identifier.
    pub stake_id: StakeId,
    /// Gate this stake is placed on.
    pub gate_id: GateId,
    /// Staking user.
    pub user_id: UserId,
    /// Chosen option.
    pub option_id: OptionId,
    /// Amount debited from the wallet at place-time.
    pub amount: u64,
    /// When this stake was placed.
    pub placed_at: Instant,
    /// Dedup key for the placing request.
    pub idempotency_key: IdempotencyKey,
    /// Whether this stake has been refunded (gate cancellation only; a
    /// resolved gate settles, it never refunds).
    #[serde(default)]
    pub refunded: bool,
}

/// A user's non-negative ticket balance within one theatre (spec §3
/// "Wallet"). Tickets have no external settlement (spec §1 Non-goals).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// Wallet owner.
    pub user_id: UserId,
    /// Owning theatre.
    pub theatre_id: TheatreId,
    /// Current balance. Never negative (I: debit only succeeds if
    /// `balance >= amount`).
    pub ticket_balance: u64,
}

/// One completed settlement row: the payout (or forfeiture, `payout = 0`)
/// for a single resolved stake. The `(gate_id, stake_id)` pair is the
/// idempotency key for wallet credit at settlement time (spec §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    /// The gate this settlement belongs to.
    pub gate_id: GateId,
    /// The stake being settled.
    pub stake_id: StakeId,
    /// The stake's owner.
    pub user_id: UserId,
    /// Amount credited back to the wallet (`0` for a forfeited stake on a
    /// losing option).
    pub payout: u64,
    /// When this settlement was recorded.
    pub settled_at: Instant,
}

/// The human-readable receipt of a gate's outcome (spec §4.4 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainCard {
    /// Gate this card explains.
    pub gate_id: GateId,
    /// Card title, from the template's `explain_card_title` (or a default).
    pub title: String,
    /// The winning option.
    pub winning_option: OptionId,
    /// Final vote tally by option.
    pub option_tally: BTreeMap<String, u64>,
    /// Final stake weight by option (post `weight_rule`).
    pub stake_tally: BTreeMap<String, f64>,
    /// Evidence ids consulted by the resolution, if any.
    #[serde(default)]
    pub evidence_used: Vec<String>,
    /// Human-readable consequence bullets applied to the Kernel.
    #[serde(default)]
    pub consequences_applied: Vec<String>,
    /// When this card was generated.
    pub generated_at: Instant,
}
