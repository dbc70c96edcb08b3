//! Progress of a plan through its current billing cycle.

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

use crate::cycle::card_cycle;
use crate::models::{CreditCard, RewardPlan, SpendingRecord, find_card};
use crate::spend::aggregate_spend;

/// Progress bar scale for plans with neither cap nor minimum spend.
pub const FALLBACK_REFERENCE: f64 = 10_000.0;
/// Headroom above the minimum spend when it sets the progress bar scale.
const MIN_SPEND_HEADROOM: f64 = 1.2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub spend: f64,
    /// Spend relative to the display scale; may exceed 100
    pub percent: f64,
    /// Cap left this cycle, `None` when the plan is uncapped
    pub remaining: Option<f64>,
    pub min_spend_met: bool,
    pub min_spend_left: f64,
    pub min_spend: f64,
    pub min_spend_percent: f64,
    pub days_left: i64,
    pub cap: f64,
}

impl ProgressSnapshot {
    /// Percent for a progress bar, clamped to 0..=100.
    pub fn bar_percent(&self) -> f64 {
        self.percent.clamp(0.0, 100.0)
    }
}

pub fn evaluate_progress(plan: &RewardPlan, spend: f64, days_left: i64) -> ProgressSnapshot {
    let max_reference = if plan.has_cap() {
        plan.cap
    } else if plan.min_spend > 0.0 {
        spend.max(plan.min_spend * MIN_SPEND_HEADROOM)
    } else {
        FALLBACK_REFERENCE
    };

    ProgressSnapshot {
        spend,
        percent: percent_of(spend, max_reference),
        remaining: plan.has_cap().then(|| plan.remaining_cap(spend)),
        min_spend_met: spend >= plan.min_spend,
        min_spend_left: (plan.min_spend - spend).max(0.0),
        min_spend: plan.min_spend,
        min_spend_percent: percent_of(plan.min_spend, max_reference),
        days_left,
        cap: plan.cap,
    }
}

/// Resolves the plan's card and cycle, then evaluates progress.
///
/// A plan whose card is missing gets an empty snapshot rather than an error.
pub fn plan_progress(
    plan: &RewardPlan,
    cards: &[CreditCard],
    records: &[SpendingRecord],
    reference: NaiveDateTime,
) -> ProgressSnapshot {
    let Some(card) = find_card(cards, plan.card_id) else {
        debug!(plan_id = plan.id, card_id = plan.card_id, "plan has no card, empty progress");
        return ProgressSnapshot {
            spend: 0.0,
            percent: 0.0,
            remaining: plan.has_cap().then_some(plan.cap),
            min_spend_met: true,
            min_spend_left: 0.0,
            min_spend: 0.0,
            min_spend_percent: 0.0,
            days_left: 0,
            cap: 0.0,
        };
    };

    let cycle = card_cycle(card, reference);
    let spend = aggregate_spend(records, plan.id, cycle.cycle_start);
    evaluate_progress(plan, spend, cycle.days_until_next_cycle)
}

/// Reward earned by the whole cycle's spend so far.
pub fn cycle_reward(plan: &RewardPlan, spend: f64) -> f64 {
    if spend < plan.min_spend {
        return 0.0;
    }
    let eligible = if plan.has_cap() { spend.min(plan.cap) } else { spend };
    (eligible * plan.rate()).max(0.0)
}

fn percent_of(value: f64, reference: f64) -> f64 {
    if reference > 0.0 && reference.is_finite() {
        value / reference * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{card, date, plan, record};

    #[test]
    fn test_capped_plan_uses_cap_as_scale() {
        let p = plan(1, 1, 10.0, 10_000.0, 0.0);
        let snap = evaluate_progress(&p, 2_500.0, 8);
        assert_eq!(snap.percent, 25.0);
        assert_eq!(snap.remaining, Some(7_500.0));
        assert!(snap.min_spend_met);
        assert_eq!(snap.min_spend_left, 0.0);
        assert_eq!(snap.days_left, 8);
        assert_eq!(snap.cap, 10_000.0);
    }

    #[test]
    fn test_min_spend_sets_scale_when_uncapped() {
        let p = plan(1, 1, 5.0, 0.0, 3_000.0);
        let snap = evaluate_progress(&p, 1_800.0, 3);
        // 3000 * 1.2 = 3600
        assert!((snap.percent - 50.0).abs() < 1e-9);
        assert!((snap.min_spend_percent - 3_000.0 / 3_600.0 * 100.0).abs() < 1e-9);
        assert!(!snap.min_spend_met);
        assert_eq!(snap.min_spend_left, 1_200.0);
        assert_eq!(snap.remaining, None);
    }

    #[test]
    fn test_spend_beyond_headroom_fills_bar() {
        let p = plan(1, 1, 5.0, 0.0, 1_000.0);
        let snap = evaluate_progress(&p, 5_000.0, 3);
        assert_eq!(snap.percent, 100.0);
        assert!(snap.min_spend_met);
    }

    #[test]
    fn test_fallback_scale() {
        let p = plan(1, 1, 1.0, 0.0, 0.0);
        let snap = evaluate_progress(&p, 2_000.0, 10);
        assert_eq!(snap.percent, 20.0);
        assert_eq!(snap.min_spend_percent, 0.0);
    }

    #[test]
    fn test_percent_is_not_clamped_but_bar_is() {
        let p = plan(1, 1, 10.0, 1_000.0, 0.0);
        let snap = evaluate_progress(&p, 1_500.0, 1);
        assert_eq!(snap.percent, 150.0);
        assert_eq!(snap.bar_percent(), 100.0);
        assert_eq!(snap.remaining, Some(0.0));
    }

    #[test]
    fn test_zero_spend_zero_percent() {
        let p = plan(1, 1, 5.0, 0.0, 0.0);
        let snap = evaluate_progress(&p, 0.0, 30);
        assert_eq!(snap.percent, 0.0);
        assert!(snap.percent.is_finite());
    }

    #[test]
    fn test_plan_progress_resolves_cycle() {
        let p = plan(1, 1, 10.0, 10_000.0, 0.0);
        let cards = vec![card(1, 15, vec![p.clone()])];
        let records = vec![
            record(1, &p, date(2026, 1, 7), 500.0),
            record(2, &p, date(2026, 1, 5), 500.0),
            record(3, &p, date(2025, 12, 1), 700.0),
        ];
        let now = date(2026, 1, 7).and_hms_opt(12, 0, 0).unwrap();
        let snap = plan_progress(&p, &cards, &records, now);
        assert_eq!(snap.spend, 1_000.0);
        assert_eq!(snap.remaining, Some(9_000.0));
        assert_eq!(snap.days_left, 8);
    }

    #[test]
    fn test_plan_progress_missing_card() {
        let p = plan(1, 99, 10.0, 500.0, 200.0);
        let now = date(2026, 1, 7).and_hms_opt(0, 0, 0).unwrap();
        let snap = plan_progress(&p, &[], &[], now);
        assert_eq!(snap.spend, 0.0);
        assert!(snap.min_spend_met);
        assert_eq!(snap.remaining, Some(500.0));
        assert_eq!(snap.days_left, 0);
    }

    #[test]
    fn test_cycle_reward() {
        let capped = plan(1, 1, 10.0, 10_000.0, 0.0);
        assert_eq!(cycle_reward(&capped, 1_000.0), 100.0);
        assert_eq!(cycle_reward(&capped, 12_000.0), 1_000.0);

        let gated = plan(2, 1, 5.0, 6_000.0, 3_000.0);
        assert_eq!(cycle_reward(&gated, 2_999.0), 0.0);
        assert_eq!(cycle_reward(&gated, 3_000.0), 150.0);
    }
}
