// SPDX-License-Identifier: Apache-2.0
//! The theme-pack data model (spec §3 "ThemePack", §4.1).
//!
//! A theme pack is a versioned, author-supplied bundle of content: world
//! variables, key objects, factions, characters, story threads, beat
//! templates, gate templates, and evidence types. The scheduler and gate
//! engine only ever read packs through [`crate::registry::ThemePackRegistry`];
//! nothing outside this crate constructs these types from raw JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pack-level metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemePackMetadata {
    /// Stable pack identifier (also the directory/file stem it was loaded from).
    pub pack_id: String,
    /// Display name.
    pub name: String,
    /// Semver-ish version string, author-supplied.
    pub version: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Season this pack belongs to, if seasonal.
    #[serde(default)]
    pub season_id: String,
    /// City setting (theme packs are city-scoped, spec §1).
    #[serde(default)]
    pub city: String,
    /// Author-supplied creation timestamp, opaque (not parsed as an `Instant`).
    #[serde(default)]
    pub created_at: String,
    /// Author-supplied last-update timestamp, opaque.
    #[serde(default)]
    pub updated_at: String,
}

/// A declared world variable: its id, bounds, and the default it seeds into
/// a theatre's `WorldState` (spec §4.2 I2 "declared bounds").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldVariable {
    /// Stable id, referenced from `theatreos_types::VarId`.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name_cn: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Value a fresh theatre starts with.
    #[serde(default = "default_var_value")]
    pub default_value: f64,
    /// Declared lower bound (I2 clamp floor).
    #[serde(default)]
    pub min_value: f64,
    /// Declared upper bound (I2 clamp ceiling).
    #[serde(default = "default_var_max")]
    pub max_value: f64,
    /// Declared per-hour magnitude budget (I2 rate limit).
    #[serde(default = "default_max_change")]
    pub max_change_per_hour: f64,
}

fn default_var_value() -> f64 {
    0.5
}
fn default_var_max() -> f64 {
    1.0
}
fn default_max_change() -> f64 {
    0.15
}

/// A key object tracked by `object_holders` (spec §3 "KeyObject").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyObject {
    /// Stable id, referenced from `theatreos_types::ObjectId`.
    pub object_id: String,
    /// Display name.
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Thread ids this object is thematically tied to.
    #[serde(default)]
    pub related_threads: Vec<String>,
}

/// A faction grouping characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Faction {
    /// Stable id, referenced from `theatreos_types::FactionId`.
    pub faction_id: String,
    /// Display name.
    pub name: String,
    /// Free-text style guide (tone, aesthetic).
    #[serde(default)]
    pub style: String,
    /// Character ids belonging to this faction.
    #[serde(default)]
    pub related_characters: Vec<String>,
}

/// A character template: presentation and content-generation guardrails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    /// Stable id, referenced from `theatreos_types::CharacterId`.
    pub character_id: String,
    /// Display name.
    pub name: String,
    /// Localized display name.
    #[serde(default)]
    pub name_cn: String,
    /// Owning faction, if any.
    #[serde(default)]
    pub faction: Option<String>,
    /// Narrative role (e.g. "informant", "antagonist").
    #[serde(default)]
    pub role: String,
    /// Public-facing goal, visible to players.
    #[serde(default)]
    pub public_goal: String,
    /// Hidden motive, never surfaced directly.
    #[serde(default)]
    pub hidden_secret: String,
    /// Voice/dialogue style guide.
    #[serde(default)]
    pub voice_style: String,
    /// Visual style guide.
    #[serde(default)]
    pub visual_style: String,
    /// Content this character must never produce.
    #[serde(default)]
    pub forbidden_content: Vec<String>,
    /// Beat types this character is allowed to appear in.
    #[serde(default)]
    pub allowed_beat_types: Vec<String>,
}

/// One phase within a [`Thread`]'s progression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadPhase {
    /// Phase name; stored verbatim as `ThreadState::phase` (spec I3).
    pub phase: String,
    /// Localized display name.
    #[serde(default)]
    pub name_cn: String,
    /// Narrative goal of this phase.
    #[serde(default)]
    pub goal: String,
    /// Beat types allowed while a thread sits in this phase (I3).
    #[serde(default)]
    pub allowed_beat_types: Vec<String>,
}

/// A story thread declaration (spec §3 "Thread").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    /// Stable id, referenced from `theatreos_types::ThreadId`.
    pub thread_id: String,
    /// Display name.
    pub name: String,
    /// One-line summary.
    #[serde(default)]
    pub logline: String,
    /// Key objects this thread can reference.
    #[serde(default)]
    pub key_objects: Vec<String>,
    /// Stages this thread can be staged at.
    #[serde(default)]
    pub key_stages: Vec<String>,
    /// World variables this thread's beats are allowed to move.
    #[serde(default)]
    pub world_vars: Vec<String>,
    /// Ordered phase declarations; phase transitions only ever move forward
    /// through this list (I3).
    #[serde(default)]
    pub phases: Vec<ThreadPhase>,
    /// Other thread ids this thread can cross-reference in its beats.
    #[serde(default)]
    pub crosslinks: Vec<String>,
}

impl Thread {
    /// Whether `phase` is one of this thread's declared phases.
    #[must_use]
    pub fn has_phase(&self, phase: &str) -> bool {
        self.phases.iter().any(|p| p.phase == phase)
    }

    /// The phase immediately following `phase` in declaration order, if any.
    #[must_use]
    pub fn next_phase(&self, phase: &str) -> Option<&str> {
        let idx = self.phases.iter().position(|p| p.phase == phase)?;
        self.phases.get(idx + 1).map(|p| p.phase.as_str())
    }
}

/// Referential preconditions gating whether a [`BeatTemplate`] can be
/// selected for a slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeatPreconditions {
    /// The thread must currently be in one of these phases.
    #[serde(default)]
    pub thread_phase_in: Vec<String>,
    /// `var_id -> (min, max)` bounds the current world state must satisfy.
    /// Encoded as a two-element array `[min, max]` in pack JSON.
    #[serde(default)]
    pub world_conditions: BTreeMap<String, serde_json::Value>,
}

/// Casting-slot tags a beat can be filled against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeatSlots {
    /// Acceptable stage tags (any match).
    #[serde(default)]
    pub stage_tag_any: Vec<String>,
    /// Acceptable camera styles (any match).
    #[serde(default)]
    pub camera_style_any: Vec<String>,
    /// Acceptable moods (any match).
    #[serde(default)]
    pub mood_any: Vec<String>,
    /// Acceptable props (any match).
    #[serde(default)]
    pub prop_any: Vec<String>,
}

/// The world/thread mutations a beat applies once selected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeatEffects {
    /// Progress added to the beat's thread, `[0,1]`-scaled.
    #[serde(default)]
    pub thread_progress_add: f64,
    /// `var_id -> delta`, subject to I2 clamping by the Kernel.
    #[serde(default)]
    pub world_var_changes: BTreeMap<String, f64>,
}

/// One piece of evidence a beat can mint (spec §4.5 "grant").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceOutput {
    /// The evidence type id this output grants.
    pub evidence_type: String,
    /// Grade, as a raw letter (`"A"`/`"B"`/`"C"`); parsed by the evidence
    /// engine, not here.
    #[serde(default = "default_tier")]
    pub tier: String,
    /// Free-text tags carried onto the minted `Evidence::tags`.
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_tier() -> String {
    "B".to_string()
}

/// A beat template (spec §3 "BeatTemplate", §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatTemplate {
    /// Stable id, referenced from `theatreos_types::BeatTemplateId`.
    pub beat_id: String,
    /// Narrative beat type (used for `allowed_beat_types` matching).
    #[serde(default)]
    pub beat_type: String,
    /// The thread this beat advances, empty if thread-agnostic.
    #[serde(default)]
    pub thread_id: String,
    /// Character ids eligible to be cast into this beat.
    #[serde(default)]
    pub cast_roles: Vec<String>,
    /// Gating conditions for selection.
    #[serde(default)]
    pub preconditions: BeatPreconditions,
    /// Casting-slot tags.
    #[serde(default)]
    pub slots: BeatSlots,
    /// State mutations applied once this beat fires.
    #[serde(default)]
    pub effects: BeatEffects,
    /// Evidence this beat can mint.
    #[serde(default)]
    pub evidence_outputs: Vec<EvidenceOutput>,
    /// Optional gate template this beat opens, `{"gate_template_id": ...}`.
    #[serde(default)]
    pub optional_gate: Option<serde_json::Value>,
    /// Beat ids to try, in order, if this beat's preconditions fail.
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

impl BeatTemplate {
    /// The gate template id this beat opens, if `optional_gate` names one.
    #[must_use]
    pub fn optional_gate_template_id(&self) -> Option<&str> {
        self.optional_gate
            .as_ref()
            .and_then(|v| v.get("gate_template_id"))
            .and_then(serde_json::Value::as_str)
    }
}

/// One voteable/stakeable choice within a [`GateTemplate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateOption {
    /// Stable id, referenced from `theatreos_types::OptionId`.
    pub option_id: String,
    /// Display label.
    #[serde(default)]
    pub label: String,
}

/// Staking configuration for a [`GateTemplate`] (spec §4.4 "stake").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateStake {
    /// Wallet currency staked (always `"ticket"` per spec §1 Non-goals).
    #[serde(default = "default_currency")]
    pub currency: String,
    /// How a stake's raw amount maps to counted weight (`"sqrt"`, `"linear"`).
    #[serde(default = "default_weight_rule")]
    pub weight_rule: String,
    /// Whether a staker's counted weight is capped by their credibility.
    #[serde(default = "default_true")]
    pub cap_by_cred: bool,
}

fn default_currency() -> String {
    "ticket".to_string()
}
fn default_weight_rule() -> String {
    "sqrt".to_string()
}
fn default_true() -> bool {
    true
}

/// A gate template (spec §3 "GateTemplate", §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateTemplate {
    /// Stable id, referenced from `theatreos_types::GateTemplateId`.
    pub gate_id: String,
    /// Gate kind (e.g. `"public_vote"`, `"crew_vote"`).
    #[serde(default = "default_gate_type")]
    pub gate_type: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Free-text tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Voteable/stakeable options.
    #[serde(default)]
    pub options: Vec<GateOption>,
    /// Staking configuration.
    #[serde(default)]
    pub stake: GateStake,
    /// World-variable ids the resolution algorithm weighs alongside votes.
    #[serde(default)]
    pub world_factors: Vec<String>,
    /// Resolution algorithm name (e.g. `"public_max_weight"`).
    #[serde(default = "default_resolve_algorithm")]
    pub resolve_algorithm: String,
    /// Consequence bullets applied to the Kernel on a win.
    #[serde(default)]
    pub consequences_win: Vec<String>,
    /// Consequence bullets applied to the Kernel on a loss.
    #[serde(default)]
    pub consequences_lose: Vec<String>,
    /// Explain-card title override.
    #[serde(default)]
    pub explain_card_title: String,
    /// Explain-card bullet templates.
    #[serde(default)]
    pub explain_card_bullets: Vec<String>,
}

impl Default for GateStake {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            weight_rule: default_weight_rule(),
            cap_by_cred: true,
        }
    }
}

fn default_gate_type() -> String {
    "public_vote".to_string()
}
fn default_resolve_algorithm() -> String {
    "public_max_weight".to_string()
}

/// An evidence type declaration (spec §3 "EvidenceType", §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceType {
    /// Stable id, referenced from `theatreos_types::EvidenceTypeId`.
    pub evidence_type_id: String,
    /// Display name.
    pub name: String,
    /// Category (e.g. "document", "photo", "testimony").
    #[serde(default)]
    pub category: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Default grade letter for evidence minted of this type.
    #[serde(default = "default_tier")]
    pub default_tier: String,
    /// Default provenance tag (e.g. `"onsite"`).
    #[serde(default = "default_provenance")]
    pub provenance_default: String,
    /// Gates/threads this evidence type is narratively useful for.
    #[serde(default)]
    pub used_for: Vec<String>,
    /// How easily this evidence type can be forged (`"low"`/`"medium"`/`"high"`).
    #[serde(default = "default_forgeability")]
    pub forgeability: String,
    /// Author-authored default TTL, free text (e.g. `"48h"`); the evidence
    /// engine uses `EvidenceGrade::ttl_hours` instead, this is descriptive.
    #[serde(default = "default_expiry")]
    pub expiry: String,
    /// Free-text notes.
    #[serde(default)]
    pub notes: String,
}

fn default_provenance() -> String {
    "onsite".to_string()
}
fn default_forgeability() -> String {
    "medium".to_string()
}
fn default_expiry() -> String {
    "48h".to_string()
}

/// A fully loaded, immutable theme pack (spec §3 "ThemePack").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemePack {
    /// Pack-level metadata.
    pub metadata: ThemePackMetadata,
    /// Declared world variables.
    #[serde(default)]
    pub world_variables: Vec<WorldVariable>,
    /// Tracked key objects.
    #[serde(default)]
    pub key_objects: Vec<KeyObject>,
    /// Factions.
    #[serde(default)]
    pub factions: Vec<Faction>,
    /// Characters.
    #[serde(default)]
    pub characters: Vec<Character>,
    /// Story threads.
    #[serde(default)]
    pub threads: Vec<Thread>,
    /// Beat templates.
    #[serde(default)]
    pub beat_templates: Vec<BeatTemplate>,
    /// Gate templates.
    #[serde(default)]
    pub gate_templates: Vec<GateTemplate>,
    /// Evidence types.
    #[serde(default)]
    pub evidence_types: Vec<EvidenceType>,
    /// Beats eligible as a fallback fill when a slot has no valid candidate
    /// (spec §4.3 failure model).
    #[serde(default)]
    pub rescue_beats: Vec<BeatTemplate>,
}

impl ThemePack {
    /// Look up a character by id.
    #[must_use]
    pub fn character(&self, id: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.character_id == id)
    }

    /// All characters belonging to `faction_id`.
    #[must_use]
    pub fn characters_by_faction<'a>(&'a self, faction_id: &'a str) -> Vec<&'a Character> {
        self.characters
            .iter()
            .filter(|c| c.faction.as_deref() == Some(faction_id))
            .collect()
    }

    /// Look up a thread by id.
    #[must_use]
    pub fn thread(&self, id: &str) -> Option<&Thread> {
        self.threads.iter().find(|t| t.thread_id == id)
    }

    /// Look up a beat template by id, searching regular templates then
    /// rescue beats.
    #[must_use]
    pub fn beat_template(&self, id: &str) -> Option<&BeatTemplate> {
        self.beat_templates
            .iter()
            .chain(self.rescue_beats.iter())
            .find(|b| b.beat_id == id)
    }

    /// All beat templates (excluding rescue beats) for `thread_id`.
    #[must_use]
    pub fn beats_by_thread<'a>(&'a self, thread_id: &'a str) -> Vec<&'a BeatTemplate> {
        self.beat_templates
            .iter()
            .filter(|b| b.thread_id == thread_id)
            .collect()
    }

    /// All beat templates (excluding rescue beats) of a given `beat_type`.
    #[must_use]
    pub fn beats_by_type<'a>(&'a self, beat_type: &'a str) -> Vec<&'a BeatTemplate> {
        self.beat_templates
            .iter()
            .filter(|b| b.beat_type == beat_type)
            .collect()
    }

    /// Look up a gate template by id.
    #[must_use]
    pub fn gate_template(&self, id: &str) -> Option<&GateTemplate> {
        self.gate_templates.iter().find(|g| g.gate_id == id)
    }

    /// Look up an evidence type by id.
    #[must_use]
    pub fn evidence_type(&self, id: &str) -> Option<&EvidenceType> {
        self.evidence_types
            .iter()
            .find(|e| e.evidence_type_id == id)
    }

    /// Look up a world variable declaration by id.
    #[must_use]
    pub fn world_variable(&self, id: &str) -> Option<&WorldVariable> {
        self.world_variables.iter().find(|v| v.id == id)
    }

    /// Look up a key object declaration by id.
    #[must_use]
    pub fn key_object(&self, id: &str) -> Option<&KeyObject> {
        self.key_objects.iter().find(|o| o.object_id == id)
    }

    /// The default `var_id -> value` world state a fresh theatre seeds from.
    #[must_use]
    pub fn default_world_state(&self) -> BTreeMap<String, f64> {
        self.world_variables
            .iter()
            .map(|v| (v.id.clone(), v.default_value))
            .collect()
    }
}
