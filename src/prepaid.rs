//! Prepaid item pacing and coupon listing.

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{Coupon, PrepaidItem, is_no_expiry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Urgency {
    None,
    Normal,
    Medium,
    High,
    Critical,
}

/// How fast an item has to be used up to beat its expiry date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Pace {
    NoExpiry,
    Expired { days_overdue: i64 },
    Exhausted { days_left: i64 },
    /// One unit every `days_per_unit` days uses the balance before expiry
    Every { days_per_unit: f64, days_left: i64 },
}

impl Pace {
    pub fn urgency(&self) -> Urgency {
        match *self {
            Pace::NoExpiry | Pace::Exhausted { .. } => Urgency::None,
            Pace::Expired { .. } => Urgency::Critical,
            Pace::Every { days_per_unit, .. } if days_per_unit <= 1.0 => Urgency::High,
            Pace::Every { days_per_unit, .. } if days_per_unit <= 3.0 => Urgency::Medium,
            Pace::Every { .. } => Urgency::Normal,
        }
    }

    /// Days between uses for sorting: expired first, nothing-to-do last.
    fn sort_key(&self) -> f64 {
        match *self {
            Pace::Expired { .. } => 0.0,
            Pace::Every { days_per_unit, .. } => days_per_unit,
            Pace::NoExpiry | Pace::Exhausted { .. } => f64::INFINITY,
        }
    }
}

pub fn pace(item: &PrepaidItem, today: NaiveDate) -> Pace {
    if is_no_expiry(item.expiry_date) {
        return Pace::NoExpiry;
    }
    let days_left = (item.expiry_date - today).num_days();
    // Nothing left to use, so an expiry date no longer matters.
    if item.count <= 0 {
        return Pace::Exhausted { days_left };
    }
    if days_left < 0 {
        return Pace::Expired {
            days_overdue: -days_left,
        };
    }
    Pace::Every {
        days_per_unit: days_left as f64 / item.count as f64,
        days_left,
    }
}

/// Orders items most pressing first, then by name.
pub fn sort_by_urgency<'a>(items: &'a [PrepaidItem], today: NaiveDate) -> Vec<(&'a PrepaidItem, Pace)> {
    let mut paced: Vec<_> = items.iter().map(|item| (item, pace(item, today))).collect();
    paced.sort_by(|(a, pa), (b, pb)| {
        pa.sort_key()
            .partial_cmp(&pb.sort_key())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    paced
}

/// Applies a usage (negative) or top-up (positive) to the balance, never below zero.
pub fn apply_change(count: i64, change: i64) -> i64 {
    (count + change).max(0)
}

/// Unused coupons that have not expired, soonest expiry first.
pub fn active_coupons(coupons: &[Coupon], today: NaiveDate) -> Vec<&Coupon> {
    let mut active: Vec<_> = coupons
        .iter()
        .filter(|c| !c.is_used && c.expiry_date >= today)
        .collect();
    active.sort_by_key(|c| c.expiry_date);
    active
}
