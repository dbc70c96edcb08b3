//! Cycle spend aggregation and per-plan record views.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::models::{PlanId, SpendingRecord};

/// Sums a plan's spend from `cycle_start` onwards.
///
/// The window has no upper bound: records dated after today still count
/// toward the current cycle.
pub fn aggregate_spend(records: &[SpendingRecord], plan_id: PlanId, cycle_start: NaiveDate) -> f64 {
    records
        .iter()
        .filter(|r| in_cycle(r, plan_id, cycle_start))
        .map(|r| r.amount)
        .sum()
}

/// Records of the current cycle, newest first.
pub fn cycle_records<'a>(
    records: &'a [SpendingRecord],
    plan_id: PlanId,
    cycle_start: NaiveDate,
) -> Vec<&'a SpendingRecord> {
    let mut current: Vec<_> = records
        .iter()
        .filter(|r| in_cycle(r, plan_id, cycle_start))
        .collect();
    current.sort_by(|a, b| b.date.cmp(&a.date));
    current
}

/// A calendar month of records that predate the current cycle.
#[derive(Debug, Clone, Serialize)]
pub struct MonthGroup<'a> {
    /// `YYYY-MM`
    pub month: String,
    pub total: f64,
    pub records: Vec<&'a SpendingRecord>,
}

/// Groups a plan's pre-cycle records by month, newest month first.
pub fn history_by_month<'a>(
    records: &'a [SpendingRecord],
    plan_id: PlanId,
    cycle_start: NaiveDate,
) -> Vec<MonthGroup<'a>> {
    let mut months: BTreeMap<(i32, u32), Vec<&'a SpendingRecord>> = BTreeMap::new();
    for record in records
        .iter()
        .filter(|r| r.plan_id == plan_id && r.date < cycle_start)
    {
        months
            .entry((record.date.year(), record.date.month()))
            .or_default()
            .push(record);
    }

    months
        .into_iter()
        .rev()
        .map(|((year, month), mut records)| {
            records.sort_by(|a, b| b.date.cmp(&a.date));
            MonthGroup {
                month: format!("{year}-{month:02}"),
                total: records.iter().map(|r| r.amount).sum(),
                records,
            }
        })
        .collect()
}

fn in_cycle(record: &SpendingRecord, plan_id: PlanId, cycle_start: NaiveDate) -> bool {
    record.plan_id == plan_id && record.date >= cycle_start
}
