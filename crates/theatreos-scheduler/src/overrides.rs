// SPDX-License-Identifier: Apache-2.0
//! Operator overrides (spec §4.3 "Overrides"): pin or exclude a thread,
//! inject a beat, or force the rescue fallback. Applied in thread scoring
//! (step 1) and beat selection (step 3); recorded on the generated plan's
//! `source` field.

use theatreos_types::{BeatTemplateId, ThreadId};

/// An operator's manual adjustments to one slot's plan generation.
#[derive(Debug, Clone, Default)]
pub struct OverrideSet {
    /// Force this thread to be the primary thread, skipping scoring.
    pub pin_thread: Option<ThreadId>,
    /// Never select these threads as primary or support.
    pub exclude_threads: Vec<ThreadId>,
    /// Force these beat templates into the slot ahead of scored selection.
    pub inject_beats: Vec<BeatTemplateId>,
    /// Skip scored beat selection entirely and fill only from rescue beats.
    pub force_rescue: bool,
}

impl OverrideSet {
    /// Whether any field departs from the all-automatic default.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pin_thread.is_none()
            && self.exclude_threads.is_empty()
            && self.inject_beats.is_empty()
            && !self.force_rescue
    }
}
