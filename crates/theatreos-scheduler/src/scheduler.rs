// SPDX-License-Identifier: Apache-2.0
//! `Scheduler::generate_plan` (spec §4.3 steps 1-6).

use crate::config::SchedulerConfig;
use crate::overrides::OverrideSet;
use crate::rng::seeded_rng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use theatreos_kernel::hash::state_hash;
use theatreos_storage::Storage;
use theatreos_themepack::pack::{BeatTemplate, Thread};
use theatreos_themepack::registry::ThemePackRegistry;
use theatreos_types::plan::{Beat, HourPlan, PlanSource, Slot};
use theatreos_types::{EngineError, GateId, Instant, PlanId, SlotId, ThreadId};
use tracing::{info, instrument};

type EngineResult<T> = Result<T, EngineError>;

/// Generates `HourPlan`s over a [`Storage`] backend and a
/// [`ThemePackRegistry`] allow-list.
pub struct Scheduler<S: Storage> {
    storage: Arc<S>,
    registry: Arc<ThemePackRegistry>,
    config: SchedulerConfig,
}

struct ScoredThread {
    thread_id: String,
    score: f64,
}

impl<S: Storage> Scheduler<S> {
    /// Construct a Scheduler over `storage` and `registry`.
    #[must_use]
    pub fn new(storage: Arc<S>, registry: Arc<ThemePackRegistry>, config: SchedulerConfig) -> Self {
        Self {
            storage,
            registry,
            config,
        }
    }

    /// Generate the `HourPlan` covering `slot_start` (spec §4.3).
    #[instrument(skip(self, overrides), fields(theatre_id = %theatre_id))]
    pub async fn generate_plan(
        &self,
        theatre_id: &theatreos_types::TheatreId,
        slot_start: Instant,
        overrides: &OverrideSet,
    ) -> EngineResult<HourPlan> {
        let pack = self
            .registry
            .get_theatre_pack(theatre_id)
            .map_err(|e| EngineError::Validation(e.to_string()))?;
        let world_state = self
            .storage
            .get_world_state(theatre_id)
            .await
            .map_err(EngineError::from)?;
        let recent_plans = self
            .storage
            .recent_plans(theatre_id, self.config.variety_window)
            .await
            .map_err(EngineError::from)?;
        let stages = self
            .storage
            .list_stages(theatre_id)
            .await
            .map_err(EngineError::from)?;

        let hash = state_hash(&world_state);
        let mut rng = seeded_rng(theatre_id, slot_start, &hash);

        // --- step 1: thread scoring -----------------------------------
        let mut scored: Vec<ScoredThread> = pack
            .threads
            .iter()
            .filter(|t| {
                overrides
                    .exclude_threads
                    .iter()
                    .all(|ex| ex.as_str() != t.thread_id)
            })
            .map(|t| ScoredThread {
                thread_id: t.thread_id.clone(),
                score: score_thread(t, &world_state, &recent_plans),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.thread_id.cmp(&b.thread_id))
        });

        let primary_id = if let Some(pinned) = &overrides.pin_thread {
            pinned.as_str().to_string()
        } else if let Some(top) = scored.first() {
            top.thread_id.clone()
        } else {
            String::new()
        };

        let support_ids: Vec<String> = scored
            .iter()
            .map(|s| s.thread_id.clone())
            .filter(|id| id != &primary_id)
            .take(self.config.support_thread_count)
            .collect();

        let selected_threads: Vec<&Thread> = pack
            .threads
            .iter()
            .filter(|t| t.thread_id == primary_id || support_ids.contains(&t.thread_id))
            .collect();

        // --- step 2: allowed beat types from current phases -------------
        let mut allowed_beat_types: HashSet<String> = HashSet::new();
        let mut thread_phase: std::collections::HashMap<String, String> =
            std::collections::HashMap::new();
        for t in &selected_threads {
            let phase = world_state
                .threads
                .get(&t.thread_id)
                .map(|ts| ts.phase.clone())
                .or_else(|| t.phases.first().map(|p| p.phase.clone()))
                .unwrap_or_default();
            if let Some(decl) = t.phases.iter().find(|p| p.phase == phase) {
                allowed_beat_types.extend(decl.allowed_beat_types.iter().cloned());
            }
            thread_phase.insert(t.thread_id.clone(), phase);
        }

        // --- step 3: beat selection --------------------------------------
        let mut chosen_beats: Vec<BeatTemplate> = Vec::new();
        let mut is_rescue: Vec<bool> = Vec::new();

        for injected_id in &overrides.inject_beats {
            if let Some(tmpl) = pack.beat_template(injected_id.as_str()) {
                chosen_beats.push(tmpl.clone());
                is_rescue.push(false);
            }
        }

        if !overrides.force_rescue {
            let recent_beat_ids: Vec<String> = recent_plans
                .iter()
                .flat_map(|p| p.slots.iter())
                .flat_map(|s| s.beats.iter())
                .map(|b| b.template_id.as_str().to_string())
                .collect();

            let mut candidates: Vec<BeatTemplate> = pack
                .beat_templates
                .iter()
                .filter(|b| {
                    (b.thread_id.is_empty() || selected_threads.iter().any(|t| t.thread_id == b.thread_id))
                        && (allowed_beat_types.is_empty() || allowed_beat_types.contains(&b.beat_type))
                        && beat_preconditions_satisfied(b, &thread_phase, &world_state, &pack)
                })
                .cloned()
                .collect();

            while chosen_beats.len() < self.config.beat_budget && !candidates.is_empty() {
                let weights: Vec<f64> = candidates
                    .iter()
                    .map(|b| {
                        let reuse = recent_beat_ids.iter().filter(|id| *id == &b.beat_id).count();
                        1.0 / (1.0 + reuse as f64)
                    })
                    .collect();
                let Ok(idx_dist) = rand::distributions::WeightedIndex::new(&weights) else {
                    break;
                };
                let idx = rng.sample(idx_dist);
                chosen_beats.push(candidates.remove(idx));
                is_rescue.push(false);
            }
        }

        if chosen_beats.len() < self.config.beat_budget {
            let mut rescue = pack.rescue_beats.clone();
            rescue.shuffle(&mut rng);
            for r in rescue {
                if chosen_beats.len() >= self.config.beat_budget {
                    break;
                }
                chosen_beats.push(r);
                is_rescue.push(true);
            }
        }

        // --- step 4 & 5: stage assignment and gate planning --------------
        let mut used_stage_ids: HashSet<String> = HashSet::new();
        let mut beats = Vec::new();
        let mut planned_gates = Vec::new();
        let slot_id = SlotId::from(uuid::Uuid::new_v4().to_string());
        let gate_margin_min = self.config.gate_resolve_minute;

        for (i, template) in chosen_beats.iter().enumerate() {
            let Some(stage) = pick_stage(&stages, template, &used_stage_ids, &recent_plans) else {
                continue;
            };
            used_stage_ids.insert(stage.stage_id.as_str().to_string());

            let mut gate_id = None;
            if let Some(gate_template_id) = template.optional_gate_template_id() {
                if pack.gate_template(gate_template_id).is_some() {
                    let gid = GateId::from(uuid::Uuid::new_v4().to_string());
                    let open_at = slot_start;
                    let close_at =
                        slot_start + chrono::Duration::minutes(i64::from(gate_margin_min));
                    let resolve_at = slot_start
                        + chrono::Duration::minutes(i64::from(self.config.slot_duration_minutes));
                    let template_options = pack
                        .gate_template(gate_template_id)
                        .map(|g| {
                            g.options
                                .iter()
                                .map(|o| o.option_id.clone().into())
                                .collect()
                        })
                        .unwrap_or_default();
                    let instance = theatreos_types::gate::GateInstance {
                        gate_id: gid.clone(),
                        theatre_id: theatre_id.clone(),
                        slot_id: slot_id.clone(),
                        template_id: gate_template_id.to_string().into(),
                        options: template_options,
                        open_at,
                        close_at,
                        resolve_at,
                        state: theatreos_types::gate::GateState::Scheduled,
                        vote_tally: std::collections::BTreeMap::new(),
                        winning_option: None,
                        settled_at: None,
                    };
                    self.storage
                        .put_gate(instance)
                        .await
                        .map_err(EngineError::from)?;
                    planned_gates.push(gate_template_id.to_string().into());
                    gate_id = Some(gid);
                }
            }

            beats.push(Beat {
                template_id: template.beat_id.clone().into(),
                thread_id: if template.thread_id.is_empty() {
                    None
                } else {
                    Some(template.thread_id.clone().into())
                },
                stage_id: stage.stage_id.clone(),
                gate_id,
                is_rescue: is_rescue[i],
            });
        }

        let explain_note = if beats.is_empty() {
            Some("no valid beat candidates and no rescue beats available; silent slot".to_string())
        } else {
            None
        };

        let slot = Slot {
            slot_id,
            start: slot_start,
            duration_minutes: self.config.slot_duration_minutes,
            beats,
            planned_gates,
            explain_note,
        };

        let plan = HourPlan {
            plan_id: PlanId::from(uuid::Uuid::new_v4().to_string()),
            theatre_id: theatre_id.clone(),
            slot_start,
            primary_thread_id: if primary_id.is_empty() {
                None
            } else {
                Some(ThreadId::from(primary_id))
            },
            support_thread_ids: support_ids.into_iter().map(ThreadId::from).collect(),
            slots: vec![slot],
            generated_at: chrono::Utc::now(),
            source: if overrides.is_empty() {
                PlanSource::Auto
            } else {
                PlanSource::Override
            },
        };

        self.storage
            .put_plan(plan.clone())
            .await
            .map_err(EngineError::from)?;
        info!(plan_id = %plan.plan_id, beats = plan.slots[0].beats.len(), "plan generated");
        Ok(plan)
    }
}

fn score_thread(
    thread: &Thread,
    world_state: &theatreos_types::world::WorldState,
    recent_plans: &[HourPlan],
) -> f64 {
    let thread_state = world_state.threads.get(&thread.thread_id);
    let terminal = thread
        .phases
        .last()
        .is_some_and(|p| thread_state.map(|ts| ts.phase == p.phase).unwrap_or(false));
    let progress = thread_state.map(|ts| ts.progress).unwrap_or(0.0);
    let advanceability = if terminal { 0.0 } else { 1.0 - progress };

    let alignment = if thread.world_vars.is_empty() {
        0.5
    } else {
        let sum: f64 = thread
            .world_vars
            .iter()
            .map(|v| world_state.variables.get(v).copied().unwrap_or(0.5))
            .sum();
        sum / thread.world_vars.len() as f64
    };

    let slots_since_featured = recent_plans
        .iter()
        .position(|p| {
            p.primary_thread_id.as_ref().map(theatreos_types::ThreadId::as_str) == Some(thread.thread_id.as_str())
                || p.support_thread_ids
                    .iter()
                    .any(|t| t.as_str() == thread.thread_id)
        })
        .map(|idx| idx as f64 + 1.0)
        .unwrap_or(f64::from(u16::MAX));
    let staleness = (slots_since_featured / 24.0).min(1.0);

    0.4 * advanceability + 0.3 * alignment + 0.3 * staleness
}

fn beat_preconditions_satisfied(
    beat: &BeatTemplate,
    thread_phase: &std::collections::HashMap<String, String>,
    world_state: &theatreos_types::world::WorldState,
    pack: &theatreos_themepack::pack::ThemePack,
) -> bool {
    if !beat.preconditions.thread_phase_in.is_empty() {
        let Some(phase) = thread_phase.get(&beat.thread_id) else {
            return false;
        };
        if !beat.preconditions.thread_phase_in.contains(phase) {
            return false;
        }
    }
    for (var_id, bounds) in &beat.preconditions.world_conditions {
        let Some([min, max]) = bounds.as_array().map(|a| {
            [
                a.first().and_then(serde_json::Value::as_f64).unwrap_or(f64::MIN),
                a.get(1).and_then(serde_json::Value::as_f64).unwrap_or(f64::MAX),
            ]
        }) else {
            continue;
        };
        let default = pack.world_variable(var_id).map_or(0.5, |v| v.default_value);
        let value = world_state.variables.get(var_id).copied().unwrap_or(default);
        if value < min || value > max {
            return false;
        }
    }
    true
}

fn pick_stage<'a>(
    stages: &'a [theatreos_types::Stage],
    template: &BeatTemplate,
    used: &HashSet<String>,
    recent_plans: &[HourPlan],
) -> Option<&'a theatreos_types::Stage> {
    let tags = &template.slots.stage_tag_any;
    let mut eligible: Vec<&theatreos_types::Stage> = stages
        .iter()
        .filter(|s| !used.contains(s.stage_id.as_str()))
        .filter(|s| tags.is_empty() || s.tags.iter().any(|t| tags.contains(t)))
        .collect();
    if eligible.is_empty() {
        eligible = stages
            .iter()
            .filter(|s| !used.contains(s.stage_id.as_str()))
            .collect();
    }
    eligible.sort_by_key(|s| {
        let last_used = recent_plans
            .iter()
            .position(|p| {
                p.slots
                    .iter()
                    .flat_map(|slot| slot.beats.iter())
                    .any(|b| b.stage_id.as_str() == s.stage_id.as_str())
            })
            .map(|idx| idx as i64)
            .unwrap_or(i64::MAX);
        (std::cmp::Reverse(last_used), s.stage_id.as_str().to_string())
    });
    eligible.into_iter().next_back()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use theatreos_storage::memory::InMemoryStorage;
    use theatreos_types::{Stage, TheatreId};

    fn write_pack(dir: &std::path::Path, body: &str) {
        let mut f = fs::File::create(dir.join("p1.json")).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    }

    async fn test_scheduler() -> (Scheduler<InMemoryStorage>, tempfile::TempDir, TheatreId) {
        let dir = tempfile::tempdir().unwrap();
        write_pack(
            dir.path(),
            r#"{
                "metadata": {"pack_id": "p1", "name": "Test"},
                "world_variables": [{"id": "v1", "default_value": 0.5, "min_value": 0.0, "max_value": 1.0, "max_change_per_hour": 0.2}],
                "threads": [
                    {"thread_id": "t1", "name": "Main", "world_vars": ["v1"],
                     "phases": [{"phase": "open", "allowed_beat_types": ["scene"]}]},
                    {"thread_id": "t2", "name": "Side",
                     "phases": [{"phase": "open", "allowed_beat_types": ["scene"]}]}
                ],
                "characters": [{"character_id": "c1", "name": "Ada"}],
                "beat_templates": [
                    {"beat_id": "b1", "thread_id": "t1", "beat_type": "scene",
                     "slots": {"stage_tag_any": ["plaza"]}}
                ],
                "rescue_beats": [
                    {"beat_id": "rescue1", "beat_type": "scene"}
                ]
            }"#,
        );
        let registry = Arc::new(ThemePackRegistry::new(dir.path(), "p1"));
        let storage = Arc::new(InMemoryStorage::new());
        let theatre_id: TheatreId = "t1".into();
        registry.bind_theatre(&theatre_id, Some("p1")).unwrap();
        storage
            .put_stage(Stage {
                stage_id: "s1".into(),
                theatre_id: theatre_id.clone(),
                name: "Plaza".to_string(),
                lat: 0.0,
                lng: 0.0,
                ring_c_m: 300.0,
                ring_b_m: 150.0,
                ring_a_m: 50.0,
                tags: vec!["plaza".to_string()],
            })
            .await
            .unwrap();
        (
            Scheduler::new(storage, registry, SchedulerConfig::default()),
            dir,
            theatre_id,
        )
    }

    #[tokio::test]
    async fn generates_a_deterministic_plan() {
        let (scheduler, _dir, theatre_id) = test_scheduler().await;
        let slot_start = chrono::Utc::now();
        let plan1 = scheduler
            .generate_plan(&theatre_id, slot_start, &OverrideSet::default())
            .await
            .unwrap();
        assert_eq!(plan1.primary_thread_id.as_ref().unwrap().as_str(), "t1");
        assert_eq!(plan1.slots[0].beats.len(), 1);
        assert_eq!(plan1.slots[0].beats[0].stage_id.as_str(), "s1");
    }

    #[tokio::test]
    async fn pinned_override_forces_primary_thread() {
        let (scheduler, _dir, theatre_id) = test_scheduler().await;
        let overrides = OverrideSet {
            pin_thread: Some("t2".into()),
            ..OverrideSet::default()
        };
        let plan = scheduler
            .generate_plan(&theatre_id, chrono::Utc::now(), &overrides)
            .await
            .unwrap();
        assert_eq!(plan.primary_thread_id.as_ref().unwrap().as_str(), "t2");
        assert_eq!(plan.source, PlanSource::Override);
    }

    #[tokio::test]
    async fn forced_rescue_fills_from_rescue_beats_only() {
        let (scheduler, _dir, theatre_id) = test_scheduler().await;
        let overrides = OverrideSet {
            force_rescue: true,
            ..OverrideSet::default()
        };
        let plan = scheduler
            .generate_plan(&theatre_id, chrono::Utc::now(), &overrides)
            .await
            .unwrap();
        assert!(plan.slots[0].beats.iter().all(|b| b.is_rescue));
    }
}
