// SPDX-License-Identifier: Apache-2.0
//! The player role hierarchy (spec §3): a single total order, encoded once
//! per the redesign guidance against stringly-typed roles.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A user's role within a theatre. Ordered: `Guest < Player < CrewLeader <
/// Moderator < Operator < Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Unauthenticated or unregistered visitor.
    Guest,
    /// Ordinary authenticated player.
    Player,
    /// A crew's leader; inherits player privileges plus crew administration.
    CrewLeader,
    /// Content/community moderator.
    Moderator,
    /// Operator able to cancel gates, pin/exclude scheduler threads, etc.
    Operator,
    /// Full administrative access.
    Admin,
}

impl Role {
    const ORDER: [Role; 6] = [
        Role::Guest,
        Role::Player,
        Role::CrewLeader,
        Role::Moderator,
        Role::Operator,
        Role::Admin,
    ];

    fn rank(self) -> usize {
        Self::ORDER.iter().position(|r| *r == self).unwrap_or(0)
    }

    /// Whether `self` meets or exceeds the privilege of `required`.
    #[must_use]
    pub fn at_least(self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    /// Parse a role from its wire name. Total: every name this type can
    /// serialize to round-trips through here.
    #[must_use]
    pub fn from_str_opt(s: &str) -> Option<Role> {
        match s {
            "guest" => Some(Role::Guest),
            "player" => Some(Role::Player),
            "crew_leader" => Some(Role::CrewLeader),
            "moderator" => Some(Role::Moderator),
            "operator" => Some(Role::Operator),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Render the role's wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::Player => "player",
            Role::CrewLeader => "crew_leader",
            Role::Moderator => "moderator",
            Role::Operator => "operator",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialOrd for Role {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Role {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_hierarchy_is_total_order() {
        assert!(Role::Admin > Role::Operator);
        assert!(Role::Operator > Role::Moderator);
        assert!(Role::Moderator > Role::CrewLeader);
        assert!(Role::CrewLeader > Role::Player);
        assert!(Role::Player > Role::Guest);
    }

    #[test]
    fn at_least_is_reflexive() {
        for role in Role::ORDER {
            assert!(role.at_least(role));
        }
    }

    #[test]
    fn round_trips_through_wire_name() {
        for role in Role::ORDER {
            assert_eq!(Role::from_str_opt(role.as_str()), Some(role));
        }
    }
}
