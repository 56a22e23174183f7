// SPDX-License-Identifier: Apache-2.0
//! The `User` entity (spec §3). Auth primitives are out of scope (spec §1,
//! §9): this crate only needs the id, role, and active flag.

use crate::ids::UserId;
use crate::role::Role;
use serde::{Deserialize, Serialize};

/// An authenticated account. Password hashing and token issuance live
/// outside this crate's scope; engines only ever see a `UserId` and `Role`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Stable identifier.
    pub user_id: UserId,
    /// Display name shown to other players.
    pub display_name: String,
    /// Role within the role hierarchy.
    pub role: Role,
    /// Whether the account is active (inactive accounts cannot act).
    pub active: bool,
}
