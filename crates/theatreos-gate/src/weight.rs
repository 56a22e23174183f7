// SPDX-License-Identifier: Apache-2.0
//! Stake-weight and composite-score math (spec §4.4 "Resolution algorithm").

/// Map a raw staked amount to counted weight per a template's `weight_rule`
/// (`"sqrt"` default, limiting whale influence; `"linear"` otherwise).
#[must_use]
pub fn stake_weight(weight_rule: &str, amount: u64) -> f64 {
    match weight_rule {
        "linear" => amount as f64,
        _ => (amount as f64).sqrt(),
    }
}

/// Composite score for one option: `0.5 * vote_share + 0.5 * stake_weight_share`
/// (spec §4.4 step 2). The 0.5/0.5 split is the source-inferred default;
/// `GateTemplate` exposes it as a per-template override (spec §9 open
/// question).
#[must_use]
pub fn composite_score(vote_share: f64, stake_weight_share: f64) -> f64 {
    0.5 * vote_share + 0.5 * stake_weight_share
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqrt_rule_matches_scenario_4() {
        assert!((stake_weight("sqrt", 100) - 10.0).abs() < 1e-9);
        assert!((stake_weight("sqrt", 400) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn composite_matches_scenario_4() {
        // A: vote_share 0.5, stake_weight_share 10/30
        let a = composite_score(0.5, 10.0 / 30.0);
        // B: vote_share 0.5, stake_weight_share 20/30
        let b = composite_score(0.5, 20.0 / 30.0);
        assert!((a - 0.416_666_666_666_666_7).abs() < 1e-9);
        assert!((b - 0.583_333_333_333_333_3).abs() < 1e-9);
        assert!(b > a);
    }
}
