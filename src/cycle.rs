//! Billing cycle date arithmetic.
//!
//! A cycle starts on the card's billing day. Months shorter than the billing
//! day clamp it to their last day, so a day-31 card resets on Feb 28 and
//! again on Mar 31.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::models::CreditCard;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BillingCycle {
    /// First day of the current cycle (local midnight)
    pub cycle_start: NaiveDate,
    /// First day of the following cycle
    pub next_cycle_start: NaiveDate,
    /// Whole days until the next cycle starts, rounded up, never negative
    pub days_until_next_cycle: i64,
}

/// Resolves the billing cycle that `reference` falls in.
pub fn resolve_cycle(reference: NaiveDateTime, billing_day: u32) -> BillingCycle {
    let billing_day = billing_day.clamp(1, 31);
    let today = reference.date();

    let this_month = anchor(today.year(), today.month(), billing_day, today);
    let cycle_start = if today.day() < this_month.day() {
        let (year, month) = shift_month(today.year(), today.month(), -1);
        anchor(year, month, billing_day, today)
    } else {
        this_month
    };

    let (year, month) = shift_month(cycle_start.year(), cycle_start.month(), 1);
    let next_cycle_start = anchor(year, month, billing_day, cycle_start);

    let seconds = (next_cycle_start.and_time(NaiveTime::MIN) - reference).num_seconds();
    let days_until_next_cycle = ((seconds as f64) / SECONDS_PER_DAY).ceil().max(0.0) as i64;

    BillingCycle {
        cycle_start,
        next_cycle_start,
        days_until_next_cycle,
    }
}

pub fn card_cycle(card: &CreditCard, reference: NaiveDateTime) -> BillingCycle {
    resolve_cycle(reference, card.billing_day)
}

/// Billing day of the given month, clamped to the month's length.
fn anchor(year: i32, month: u32, billing_day: u32, fallback: NaiveDate) -> NaiveDate {
    let day = billing_day.min(last_day_of_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(fallback)
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = shift_month(year, month, 1);
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(28, |last| last.day())
}

fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let index = year * 12 + month as i32 - 1 + delta;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}
