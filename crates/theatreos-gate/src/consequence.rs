// SPDX-License-Identifier: Apache-2.0
//! Parses a `GateTemplate`'s `consequences_win` / `consequences_lose`
//! bullets into Kernel changes (spec §4.4 step 5: "Variable and thread
//! changes come from the template's `consequences_win / consequences_lose`").
//!
//! Theme packs carry these bullets as free text with no declared machine
//! grammar (open question, recorded in `DESIGN.md`). This engine adopts the
//! same `var:<id>:<delta>` / `thread:<id>:<phase>:<progress_delta>` shape
//! `BeatEffects::world_var_changes` already uses elsewhere in the pack
//! format; a bullet that doesn't match either prefix is carried onto the
//! Explain Card as descriptive text only, with no Kernel effect.

use theatreos_types::world::{ThreadChange, VarChange};

/// One bullet's parsed Kernel effect, if it has one.
pub enum ParsedBullet {
    /// `var:<var_id>:<delta>`.
    Var(VarChange),
    /// `thread:<thread_id>:<phase>:<progress_delta>`.
    Thread(ThreadChange),
    /// Descriptive only; no Kernel effect.
    None,
}

/// Parse one bullet string.
#[must_use]
pub fn parse_bullet(bullet: &str) -> ParsedBullet {
    let parts: Vec<&str> = bullet.splitn(4, ':').collect();
    match parts.as_slice() {
        ["var", var_id, delta] => match delta.trim().parse::<f64>() {
            Ok(delta) => ParsedBullet::Var(VarChange {
                var_id: (*var_id).into(),
                delta,
            }),
            Err(_) => ParsedBullet::None,
        },
        ["thread", thread_id, phase, progress_delta] => {
            match progress_delta.trim().parse::<f64>() {
                Ok(progress_delta) => ParsedBullet::Thread(ThreadChange {
                    thread_id: (*thread_id).into(),
                    new_phase: if phase.is_empty() {
                        None
                    } else {
                        Some((*phase).to_string())
                    },
                    progress_delta,
                }),
                Err(_) => ParsedBullet::None,
            }
        }
        _ => ParsedBullet::None,
    }
}

/// Parse a full bullet list into the Kernel changes it carries.
#[must_use]
pub fn parse_bullets(bullets: &[String]) -> (Vec<VarChange>, Vec<ThreadChange>) {
    let mut var_changes = Vec::new();
    let mut thread_changes = Vec::new();
    for bullet in bullets {
        match parse_bullet(bullet) {
            ParsedBullet::Var(v) => var_changes.push(v),
            ParsedBullet::Thread(t) => thread_changes.push(t),
            ParsedBullet::None => {}
        }
    }
    (var_changes, thread_changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_var_bullet() {
        let (vars, threads) = parse_bullets(&["var:tension:0.1".to_string()]);
        assert_eq!(vars.len(), 1);
        assert!((vars[0].delta - 0.1).abs() < 1e-9);
        assert!(threads.is_empty());
    }

    #[test]
    fn parses_thread_bullet() {
        let (vars, threads) = parse_bullets(&["thread:t1:climax:0.2".to_string()]);
        assert!(vars.is_empty());
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].new_phase.as_deref(), Some("climax"));
    }

    #[test]
    fn descriptive_bullet_has_no_effect() {
        let (vars, threads) = parse_bullets(&["The syndicate tightens its grip on the docks.".to_string()]);
        assert!(vars.is_empty());
        assert!(threads.is_empty());
    }
}
