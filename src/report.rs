//! Table rows for CLI output.

use tabled::Tabled;

use crate::channel::ChannelScope;
use crate::models::{Coupon, CreditCard, PrepaidItem, RewardPlan, SpendingRecord, Tag, is_no_expiry};
use crate::prepaid::{Pace, Urgency};
use crate::progress::ProgressSnapshot;
use crate::recommend::{Allocation, PlanRanking};

#[derive(Debug, Clone, Tabled)]
pub struct TagRow {
    pub id: i64,
    pub name: String,
}

impl From<&Tag> for TagRow {
    fn from(tag: &Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct CardRow {
    pub id: i64,
    pub name: String,
    pub billing_day: u32,
    pub valid: String,
    pub plans: usize,
}

impl From<&CreditCard> for CardRow {
    fn from(card: &CreditCard) -> Self {
        Self {
            id: card.id,
            name: card.name.clone(),
            billing_day: card.billing_day,
            valid: format!("{} ~ {}", card.valid_from, card.valid_until),
            plans: card.plans.len(),
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct PlanRow {
    pub id: i64,
    pub card: String,
    pub rate: String,
    pub channels: String,
    pub cap: String,
    pub min_spend: String,
    pub note: String,
}

impl PlanRow {
    pub fn new(plan: &RewardPlan, card: &CreditCard, tags: &[Tag]) -> Self {
        Self {
            id: plan.id,
            card: card.name.clone(),
            rate: rate(plan),
            channels: channels(plan, tags),
            cap: if plan.has_cap() { money(plan.cap) } else { "unlimited".into() },
            min_spend: if plan.min_spend > 0.0 { money(plan.min_spend) } else { "none".into() },
            note: plan.note.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct WalletRow {
    pub plan: i64,
    pub card: String,
    pub rate: String,
    pub channels: String,
    pub spent: String,
    pub progress: String,
    pub min_spend: String,
    pub remaining: String,
    pub days_left: i64,
}

impl WalletRow {
    pub fn new(plan: &RewardPlan, card: &CreditCard, progress: &ProgressSnapshot, tags: &[Tag]) -> Self {
        Self {
            plan: plan.id,
            card: card.name.clone(),
            rate: rate(plan),
            channels: channels(plan, tags),
            spent: money(progress.spend),
            progress: format!("{:.0}%", progress.bar_percent()),
            min_spend: min_spend_status(progress),
            remaining: progress.remaining.map_or_else(|| "unlimited".into(), money),
            days_left: progress.days_left,
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct RankingRow {
    pub rank: usize,
    pub card: String,
    pub plan: i64,
    pub rate: String,
    pub channels: String,
    pub reward: String,
    pub min_spend: String,
}

impl RankingRow {
    pub fn new(rank: usize, ranking: &PlanRanking<'_>, tags: &[Tag]) -> Self {
        Self {
            rank,
            card: ranking.card.name.clone(),
            plan: ranking.plan.id,
            rate: rate(ranking.plan),
            channels: channels(ranking.plan, tags),
            reward: reward(ranking.reward),
            min_spend: gate_status(ranking.plan, ranking.min_spend_met),
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct SplitRow {
    pub card: String,
    pub plan: i64,
    pub rate: String,
    pub channels: String,
    pub charge: String,
    pub reward: String,
    pub min_spend: String,
}

impl SplitRow {
    pub fn new(allocation: &Allocation<'_>, tags: &[Tag]) -> Self {
        Self {
            card: allocation.card.name.clone(),
            plan: allocation.plan.id,
            rate: rate(allocation.plan),
            channels: channels(allocation.plan, tags),
            charge: money(allocation.amount_used),
            reward: reward(allocation.reward),
            min_spend: gate_status(allocation.plan, allocation.min_spend_met),
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct RecordRow {
    pub id: i64,
    pub date: String,
    pub amount: String,
    pub note: String,
}

impl From<&SpendingRecord> for RecordRow {
    fn from(record: &SpendingRecord) -> Self {
        Self {
            id: record.id,
            date: record.date.to_string(),
            amount: money(record.amount),
            note: record.note.clone(),
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct PrepaidRow {
    pub id: i64,
    pub name: String,
    pub count: i64,
    pub expiry: String,
    pub pace: String,
    pub urgency: String,
}

impl PrepaidRow {
    pub fn new(item: &PrepaidItem, pace: Pace) -> Self {
        Self {
            id: item.id,
            name: item.name.clone(),
            count: item.count,
            expiry: expiry(item.expiry_date),
            pace: match pace {
                Pace::NoExpiry => "no expiry".into(),
                Pace::Expired { days_overdue } => format!("expired {days_overdue}d ago"),
                Pace::Exhausted { .. } => "all used".into(),
                Pace::Every { days_per_unit, .. } => format!("1 every {days_per_unit:.1}d"),
            },
            urgency: match pace.urgency() {
                Urgency::None => "-",
                Urgency::Normal => "normal",
                Urgency::Medium => "medium",
                Urgency::High => "high",
                Urgency::Critical => "critical",
            }
            .into(),
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct CouponRow {
    pub id: i64,
    pub shop: String,
    pub amount: String,
    pub expiry: String,
    pub link: String,
}

impl From<&Coupon> for CouponRow {
    fn from(coupon: &Coupon) -> Self {
        Self {
            id: coupon.id,
            shop: coupon.shop.clone(),
            amount: money(coupon.amount),
            expiry: expiry(coupon.expiry_date),
            link: coupon.link_url.clone().unwrap_or_default(),
        }
    }
}

pub fn money(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("${amount:.0}")
    } else {
        format!("${amount:.2}")
    }
}

pub fn reward(amount: f64) -> String {
    format!("+${amount:.1}")
}

fn rate(plan: &RewardPlan) -> String {
    format!("{}%", plan.percentage)
}

fn channels(plan: &RewardPlan, tags: &[Tag]) -> String {
    ChannelScope::of(plan, tags).label(tags)
}

fn expiry(date: chrono::NaiveDate) -> String {
    if is_no_expiry(date) {
        "none".into()
    } else {
        date.to_string()
    }
}

fn min_spend_status(progress: &ProgressSnapshot) -> String {
    if progress.min_spend <= 0.0 {
        "-".into()
    } else if progress.min_spend_met {
        "met".into()
    } else {
        format!("short {}", money(progress.min_spend_left))
    }
}

fn gate_status(plan: &RewardPlan, met: bool) -> String {
    if met {
        "met".into()
    } else {
        format!("below {}", money(plan.min_spend))
    }
}
