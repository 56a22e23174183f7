// SPDX-License-Identifier: Apache-2.0
//! The `Theatre` entity (spec §3): one independent world instance.

use crate::ids::{TheatreId, ThemePackId};
use crate::Instant;
use serde::{Deserialize, Serialize};

/// One independent world instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theatre {
    /// Stable identifier.
    pub theatre_id: TheatreId,
    /// Display name.
    pub name: String,
    /// Real-world city this theatre is staged in.
    pub city: String,
    /// IANA timezone name (e.g. "Asia/Shanghai").
    pub timezone: String,
    /// The theme pack currently bound to this theatre, if any.
    pub bound_theme_pack_id: Option<ThemePackId>,
    /// Creation time.
    pub created_at: Instant,
}
