//! Reward for a single hypothetical charge on one plan.
//!
//! Minimum spend is an all-or-nothing gate on the projected cycle total, so
//! one charge can cross the threshold and earn reward itself. The cap is a
//! partial limit: only the part of the charge inside the remaining cap earns.

use serde::Serialize;

use crate::models::RewardPlan;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RewardEstimate {
    pub reward: f64,
    pub eligible_amount: f64,
    pub min_spend_met_after_charge: bool,
}

pub fn estimate_reward(plan: &RewardPlan, spend_before_charge: f64, charge: f64) -> RewardEstimate {
    let charge = sanitize_amount(charge);
    let projected_total = spend_before_charge + charge;
    let min_spend_met_after_charge = projected_total >= plan.min_spend;
    let eligible_amount = charge.min(plan.remaining_cap(spend_before_charge));

    let reward = if min_spend_met_after_charge {
        eligible_amount * plan.rate()
    } else {
        0.0
    };

    RewardEstimate {
        reward: reward.max(0.0),
        eligible_amount,
        min_spend_met_after_charge,
    }
}

/// Amounts typed into a form may be negative or NaN mid-edit; treat them as 0.
pub fn sanitize_amount(amount: f64) -> f64 {
    if amount.is_finite() && amount > 0.0 {
        amount
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::plan;
    use proptest::prelude::*;

    #[test]
    fn test_cap_limits_eligible_portion() {
        let p = plan(1, 1, 10.0, 10_000.0, 0.0);
        let est = estimate_reward(&p, 9_800.0, 500.0);
        assert_eq!(est.eligible_amount, 200.0);
        assert_eq!(est.reward, 20.0);
        assert!(est.min_spend_met_after_charge);
    }

    #[test]
    fn test_projected_total_below_min_spend() {
        let p = plan(1, 1, 5.0, 6_000.0, 3_000.0);
        let est = estimate_reward(&p, 2_000.0, 500.0);
        assert!(!est.min_spend_met_after_charge);
        assert_eq!(est.reward, 0.0);
        assert_eq!(est.eligible_amount, 500.0);
    }

    #[test]
    fn test_charge_crosses_min_spend_and_earns() {
        let p = plan(1, 1, 5.0, 6_000.0, 3_000.0);
        let est = estimate_reward(&p, 2_800.0, 500.0);
        assert!(est.min_spend_met_after_charge);
        assert_eq!(est.eligible_amount, 500.0);
        assert_eq!(est.reward, 25.0);
    }

    #[test]
    fn test_exhausted_cap_earns_nothing() {
        let p = plan(1, 1, 10.0, 1_000.0, 0.0);
        let est = estimate_reward(&p, 1_200.0, 300.0);
        assert_eq!(est.eligible_amount, 0.0);
        assert_eq!(est.reward, 0.0);
    }

    #[test]
    fn test_invalid_charge_clamps_to_zero() {
        let p = plan(1, 1, 10.0, 0.0, 0.0);
        for charge in [-50.0, f64::NAN, f64::NEG_INFINITY] {
            let est = estimate_reward(&p, 0.0, charge);
            assert_eq!(est.reward, 0.0);
            assert_eq!(est.eligible_amount, 0.0);
        }
    }

    proptest! {
        #[test]
        fn uncapped_plan_never_caps(
            pct in 0.0f64..20.0,
            min_spend in 0.0f64..5_000.0,
            spent in 0.0f64..50_000.0,
            charge in 0.0f64..50_000.0,
        ) {
            let p = plan(1, 1, pct, 0.0, min_spend);
            prop_assert_eq!(estimate_reward(&p, spent, charge).eligible_amount, charge);
        }

        #[test]
        fn non_positive_charge_earns_nothing(
            pct in 0.0f64..20.0,
            cap in 0.0f64..20_000.0,
            spent in 0.0f64..50_000.0,
            charge in -10_000.0f64..=0.0,
        ) {
            let p = plan(1, 1, pct, cap, 0.0);
            prop_assert_eq!(estimate_reward(&p, spent, charge).reward, 0.0);
        }

        #[test]
        fn below_min_spend_earns_nothing(
            pct in 0.0f64..20.0,
            cap in 0.0f64..20_000.0,
            spent in 0.0f64..5_000.0,
            charge in 0.0f64..5_000.0,
        ) {
            let p = plan(1, 1, pct, cap, spent + charge + 1.0);
            prop_assert_eq!(estimate_reward(&p, spent, charge).reward, 0.0);
        }

        #[test]
        fn eligible_never_exceeds_remaining_cap(
            cap in 1.0f64..20_000.0,
            spent in 0.0f64..30_000.0,
            charge in 0.0f64..30_000.0,
        ) {
            let p = plan(1, 1, 5.0, cap, 0.0);
            let est = estimate_reward(&p, spent, charge);
            prop_assert!(est.eligible_amount <= (cap - spent).max(0.0));
            prop_assert!(est.reward >= 0.0);
        }
    }
}
