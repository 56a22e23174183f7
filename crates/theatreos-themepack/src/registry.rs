// SPDX-License-Identifier: Apache-2.0
//! The theatre-to-pack binding registry (spec §4.1, §10 redesign flag: no
//! process-global singleton — callers hold an `Arc<ThemePackRegistry>` and
//! share it explicitly).
//!
//! This registry only tracks the *in-process* binding (which loaded
//! [`ThemePack`] a theatre currently reads through); the durable record of
//! which pack id a theatre is bound to lives in `Theatre::bound_theme_pack_id`
//! via `theatreos_storage::Storage::set_bound_pack`. Callers that change a
//! binding are expected to persist it there too.

use crate::error::{ThemePackError, ThemePackResult};
use crate::loader::ThemePackLoader;
use crate::pack::{
    BeatTemplate, Character, EvidenceType, Faction, GateTemplate, KeyObject, Thread, ThemePack,
    WorldVariable,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use theatreos_types::TheatreId;
use tracing::info;

/// Validation results for one pack (spec §4.1 "validate").
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ValidationReport {
    /// Whether the pack has zero errors.
    pub valid: bool,
    /// The pack id validated.
    pub pack_id: String,
    /// Missing-required-content and broken-reference problems.
    pub errors: Vec<String>,
    /// Missing-optional-content and soft-reference problems.
    pub warnings: Vec<String>,
    /// Per-component counts.
    pub stats: BTreeMap<String, usize>,
}

/// Binds theatres to loaded theme packs and serves the content-query surface
/// every engine reads theme-pack data through (spec §4.1).
///
/// Typed lookup-by-id plus `all_*` enumeration over owned data, since packs
/// are loaded at runtime rather than compiled in.
pub struct ThemePackRegistry {
    loader: ThemePackLoader,
    active_packs: RwLock<HashMap<TheatreId, Arc<ThemePack>>>,
    default_pack_id: RwLock<String>,
}

impl ThemePackRegistry {
    /// Create a registry rooted at `packs_directory`, with `default_pack_id`
    /// used for any theatre bound without an explicit pack id.
    #[must_use]
    pub fn new(packs_directory: impl Into<std::path::PathBuf>, default_pack_id: impl Into<String>) -> Self {
        Self {
            loader: ThemePackLoader::new(packs_directory),
            active_packs: RwLock::new(HashMap::new()),
            default_pack_id: RwLock::new(default_pack_id.into()),
        }
    }

    /// Every pack id discoverable on disk.
    #[must_use]
    pub fn list_available_packs(&self) -> Vec<String> {
        self.loader.list_available_packs()
    }

    /// Change the fallback pack id used by [`Self::bind_theatre`] when no
    /// explicit `pack_id` is given. Fails if `pack_id` doesn't load.
    pub fn set_default_pack(&self, pack_id: &str) -> ThemePackResult<()> {
        self.loader.load_pack(pack_id, false)?;
        *self
            .default_pack_id
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = pack_id.to_string();
        Ok(())
    }

    /// Bind `theatre_id` to `pack_id` (or the default pack if `None`).
    pub fn bind_theatre(
        &self,
        theatre_id: &TheatreId,
        pack_id: Option<&str>,
    ) -> ThemePackResult<Arc<ThemePack>> {
        let pack_id = match pack_id {
            Some(id) => id.to_string(),
            None => self
                .default_pack_id
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone(),
        };
        let pack = Arc::new(self.loader.load_pack(&pack_id, false)?);
        self.active_packs
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(theatre_id.clone(), pack.clone());
        info!(theatre_id = %theatre_id, pack_id, "theatre bound to theme pack");
        Ok(pack)
    }

    /// The pack currently bound to `theatre_id`, auto-binding the default
    /// pack if this theatre has never been bound.
    pub fn get_theatre_pack(&self, theatre_id: &TheatreId) -> ThemePackResult<Arc<ThemePack>> {
        if let Some(pack) = self
            .active_packs
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(theatre_id)
        {
            return Ok(pack.clone());
        }
        self.bind_theatre(theatre_id, None)
    }

    /// Rebind `theatre_id` to `new_pack_id`. Callers own persisting this to
    /// `Theatre::bound_theme_pack_id` and handling any outstanding gates or
    /// draft rumors the old pack's content underlies (spec §10 open question:
    /// rebinding does not itself cancel them).
    pub fn switch_theatre_pack(
        &self,
        theatre_id: &TheatreId,
        new_pack_id: &str,
    ) -> ThemePackResult<Arc<ThemePack>> {
        self.bind_theatre(theatre_id, Some(new_pack_id))
    }

    /// Unbind `theatre_id`; a later lookup auto-binds the default pack again.
    pub fn unbind_theatre(&self, theatre_id: &TheatreId) {
        self.active_packs
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(theatre_id);
        info!(theatre_id = %theatre_id, "theatre unbound from theme pack");
    }

    // ---- content-query surface -----------------------------------------

    /// Look up a character in `theatre_id`'s bound pack.
    pub fn character(&self, theatre_id: &TheatreId, character_id: &str) -> ThemePackResult<Option<Character>> {
        Ok(self.get_theatre_pack(theatre_id)?.character(character_id).cloned())
    }

    /// Whether `character_id` exists in `theatre_id`'s bound pack.
    pub fn is_valid_character(&self, theatre_id: &TheatreId, character_id: &str) -> ThemePackResult<bool> {
        Ok(self.character(theatre_id, character_id)?.is_some())
    }

    /// Look up a thread in `theatre_id`'s bound pack.
    pub fn thread(&self, theatre_id: &TheatreId, thread_id: &str) -> ThemePackResult<Option<Thread>> {
        Ok(self.get_theatre_pack(theatre_id)?.thread(thread_id).cloned())
    }

    /// Whether `thread_id` exists in `theatre_id`'s bound pack.
    pub fn is_valid_thread(&self, theatre_id: &TheatreId, thread_id: &str) -> ThemePackResult<bool> {
        Ok(self.thread(theatre_id, thread_id)?.is_some())
    }

    /// Look up a beat template (including rescue beats) in `theatre_id`'s
    /// bound pack.
    pub fn beat_template(&self, theatre_id: &TheatreId, beat_id: &str) -> ThemePackResult<Option<BeatTemplate>> {
        Ok(self.get_theatre_pack(theatre_id)?.beat_template(beat_id).cloned())
    }

    /// All non-rescue beat templates belonging to `thread_id`.
    pub fn beats_by_thread(&self, theatre_id: &TheatreId, thread_id: &str) -> ThemePackResult<Vec<BeatTemplate>> {
        Ok(self
            .get_theatre_pack(theatre_id)?
            .beats_by_thread(thread_id)
            .into_iter()
            .cloned()
            .collect())
    }

    /// All non-rescue beat templates of `beat_type`.
    pub fn beats_by_type(&self, theatre_id: &TheatreId, beat_type: &str) -> ThemePackResult<Vec<BeatTemplate>> {
        Ok(self
            .get_theatre_pack(theatre_id)?
            .beats_by_type(beat_type)
            .into_iter()
            .cloned()
            .collect())
    }

    /// The rescue-beat fallback set for `theatre_id`'s bound pack.
    pub fn rescue_beats(&self, theatre_id: &TheatreId) -> ThemePackResult<Vec<BeatTemplate>> {
        Ok(self.get_theatre_pack(theatre_id)?.rescue_beats.clone())
    }

    /// Look up a gate template in `theatre_id`'s bound pack.
    pub fn gate_template(&self, theatre_id: &TheatreId, gate_id: &str) -> ThemePackResult<Option<GateTemplate>> {
        Ok(self.get_theatre_pack(theatre_id)?.gate_template(gate_id).cloned())
    }

    /// Whether `gate_id` names a gate template in `theatre_id`'s bound pack.
    pub fn is_valid_gate_template(&self, theatre_id: &TheatreId, gate_id: &str) -> ThemePackResult<bool> {
        Ok(self.gate_template(theatre_id, gate_id)?.is_some())
    }

    /// Look up an evidence type in `theatre_id`'s bound pack.
    pub fn evidence_type(&self, theatre_id: &TheatreId, evidence_type_id: &str) -> ThemePackResult<Option<EvidenceType>> {
        Ok(self.get_theatre_pack(theatre_id)?.evidence_type(evidence_type_id).cloned())
    }

    /// Whether `evidence_type_id` names an evidence type in `theatre_id`'s
    /// bound pack.
    pub fn is_valid_evidence_type(&self, theatre_id: &TheatreId, evidence_type_id: &str) -> ThemePackResult<bool> {
        Ok(self.evidence_type(theatre_id, evidence_type_id)?.is_some())
    }

    /// Look up a world variable declaration in `theatre_id`'s bound pack.
    pub fn world_variable(&self, theatre_id: &TheatreId, var_id: &str) -> ThemePackResult<Option<WorldVariable>> {
        Ok(self.get_theatre_pack(theatre_id)?.world_variable(var_id).cloned())
    }

    /// The `var_id -> default_value` seed state for a freshly bound theatre.
    pub fn default_world_state(&self, theatre_id: &TheatreId) -> ThemePackResult<BTreeMap<String, f64>> {
        Ok(self.get_theatre_pack(theatre_id)?.default_world_state())
    }

    /// Look up a key object declaration in `theatre_id`'s bound pack.
    pub fn key_object(&self, theatre_id: &TheatreId, object_id: &str) -> ThemePackResult<Option<KeyObject>> {
        Ok(self.get_theatre_pack(theatre_id)?.key_object(object_id).cloned())
    }

    /// Whether `object_id` names a key object in `theatre_id`'s bound pack.
    pub fn is_valid_object(&self, theatre_id: &TheatreId, object_id: &str) -> ThemePackResult<bool> {
        Ok(self.key_object(theatre_id, object_id)?.is_some())
    }

    /// All factions declared by `theatre_id`'s bound pack.
    pub fn list_factions(&self, theatre_id: &TheatreId) -> ThemePackResult<Vec<Faction>> {
        Ok(self.get_theatre_pack(theatre_id)?.factions.clone())
    }

    /// Per-component counts for `theatre_id`'s bound pack.
    pub fn pack_stats(&self, theatre_id: &TheatreId) -> ThemePackResult<BTreeMap<String, usize>> {
        let pack = self.get_theatre_pack(theatre_id)?;
        Ok(component_stats(&pack))
    }

    /// Validate `pack_id`'s internal consistency: required-content and
    /// referential-integrity checks (spec §4.1 "validate").
    ///
    /// Missing characters, threads, or beat templates are errors (a pack
    /// with none of these can never produce a plan). Missing gate
    /// templates, evidence types, or rescue beats are warnings (the pack
    /// still functions, degraded). A beat referencing an unknown thread is
    /// an error; a beat referencing an unknown gate template is a warning.
    pub fn validate_pack(&self, pack_id: &str) -> ThemePackResult<ValidationReport> {
        let pack = self.loader.load_pack(pack_id, false)?;

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if pack.characters.is_empty() {
            errors.push("No characters defined".to_string());
        }
        if pack.threads.is_empty() {
            errors.push("No threads defined".to_string());
        }
        if pack.beat_templates.is_empty() {
            errors.push("No beat templates defined".to_string());
        }
        if pack.gate_templates.is_empty() {
            warnings.push("No gate templates defined".to_string());
        }
        if pack.evidence_types.is_empty() {
            warnings.push("No evidence types defined".to_string());
        }
        if pack.rescue_beats.is_empty() {
            warnings.push("No rescue beats defined (fallback may fail)".to_string());
        }

        for beat in &pack.beat_templates {
            if !beat.thread_id.is_empty() && pack.thread(&beat.thread_id).is_none() {
                errors.push(format!(
                    "Beat {} references unknown thread {}",
                    beat.beat_id, beat.thread_id
                ));
            }
            if let Some(gate_id) = beat.optional_gate_template_id() {
                if pack.gate_template(gate_id).is_none() {
                    warnings.push(format!(
                        "Beat {} references unknown gate {}",
                        beat.beat_id, gate_id
                    ));
                }
            }
        }

        Ok(ValidationReport {
            valid: errors.is_empty(),
            pack_id: pack_id.to_string(),
            errors,
            warnings,
            stats: component_stats(&pack),
        })
    }
}

fn component_stats(pack: &ThemePack) -> BTreeMap<String, usize> {
    BTreeMap::from([
        ("world_variables".to_string(), pack.world_variables.len()),
        ("key_objects".to_string(), pack.key_objects.len()),
        ("factions".to_string(), pack.factions.len()),
        ("characters".to_string(), pack.characters.len()),
        ("threads".to_string(), pack.threads.len()),
        ("beat_templates".to_string(), pack.beat_templates.len()),
        ("gate_templates".to_string(), pack.gate_templates.len()),
        ("evidence_types".to_string(), pack.evidence_types.len()),
        ("rescue_beats".to_string(), pack.rescue_beats.len()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    fn write_pack(dir: &std::path::Path, pack_id: &str, body: &str) {
        let mut f = fs::File::create(dir.join(format!("{pack_id}.json"))).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    }

    fn minimal_pack_json(pack_id: &str) -> String {
        format!(
            r#"{{
                "metadata": {{"pack_id": "{pack_id}", "name": "Test"}},
                "characters": [{{"character_id": "c1", "name": "Ada"}}],
                "threads": [{{"thread_id": "t1", "name": "Main"}}],
                "beat_templates": [{{"beat_id": "b1", "thread_id": "t1"}}]
            }}"#
        )
    }

    #[test]
    fn auto_binds_default_pack_on_first_lookup() {
        let dir = tempfile::tempdir().unwrap();
        write_pack(dir.path(), "default_pack", &minimal_pack_json("default_pack"));
        let registry = ThemePackRegistry::new(dir.path(), "default_pack");
        let theatre_id = TheatreId::from("theatre-1");
        let pack = registry.get_theatre_pack(&theatre_id).unwrap();
        assert_eq!(pack.metadata.pack_id, "default_pack");
    }

    #[test]
    fn switch_rebinds_to_new_pack() {
        let dir = tempfile::tempdir().unwrap();
        write_pack(dir.path(), "pack_a", &minimal_pack_json("pack_a"));
        write_pack(dir.path(), "pack_b", &minimal_pack_json("pack_b"));
        let registry = ThemePackRegistry::new(dir.path(), "pack_a");
        let theatre_id = TheatreId::from("theatre-1");
        registry.bind_theatre(&theatre_id, None).unwrap();
        let switched = registry.switch_theatre_pack(&theatre_id, "pack_b").unwrap();
        assert_eq!(switched.metadata.pack_id, "pack_b");
    }

    #[test]
    fn unbind_then_lookup_rebinds_default() {
        let dir = tempfile::tempdir().unwrap();
        write_pack(dir.path(), "default_pack", &minimal_pack_json("default_pack"));
        let registry = ThemePackRegistry::new(dir.path(), "default_pack");
        let theatre_id = TheatreId::from("theatre-1");
        registry.bind_theatre(&theatre_id, None).unwrap();
        registry.unbind_theatre(&theatre_id);
        let pack = registry.get_theatre_pack(&theatre_id).unwrap();
        assert_eq!(pack.metadata.pack_id, "default_pack");
    }

    #[test]
    fn validate_pack_flags_missing_required_content() {
        let dir = tempfile::tempdir().unwrap();
        write_pack(
            dir.path(),
            "empty_pack",
            r#"{"metadata": {"pack_id": "empty_pack", "name": "Empty"}}"#,
        );
        let registry = ThemePackRegistry::new(dir.path(), "empty_pack");
        let report = registry.validate_pack("empty_pack").unwrap();
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("No characters")));
        assert!(report.warnings.iter().any(|w| w.contains("No gate templates")));
    }

    #[test]
    fn validate_pack_flags_dangling_thread_reference() {
        let dir = tempfile::tempdir().unwrap();
        write_pack(
            dir.path(),
            "broken_pack",
            r#"{
                "metadata": {"pack_id": "broken_pack", "name": "Broken"},
                "characters": [{"character_id": "c1", "name": "Ada"}],
                "threads": [{"thread_id": "t1", "name": "Main"}],
                "beat_templates": [{"beat_id": "b1", "thread_id": "missing_thread"}]
            }"#,
        );
        let registry = ThemePackRegistry::new(dir.path(), "broken_pack");
        let report = registry.validate_pack("broken_pack").unwrap();
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("unknown thread missing_thread")));
    }
}
