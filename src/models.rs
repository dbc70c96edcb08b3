use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type TagId = i64;
pub type CardId = i64;
pub type PlanId = i64;
pub type RecordId = i64;

/// Channels seeded into an empty database, in display order.
pub const DEFAULT_TAGS: &[&str] = &[
    "Line Pay",
    "Apple Pay",
    "全支付",
    "悠遊卡",
    "蝦皮",
    "一般刷卡",
    "日本",
];

/// Expiry date the app uses to mean "never expires" (2099-12-31).
pub fn no_expiry() -> NaiveDate {
    NaiveDate::from_ymd_opt(2099, 12, 31).unwrap_or(NaiveDate::MAX)
}

pub fn is_no_expiry(date: NaiveDate) -> bool {
    date == no_expiry()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardPlan {
    pub id: PlanId,
    pub card_id: CardId,
    pub note: Option<String>,
    /// Reward rate as a percent (3.5 means 3.5%)
    pub percentage: f64,
    /// Maximum eligible spend per billing cycle (0 = unlimited)
    pub cap: f64,
    /// Cycle spend required before any reward accrues (0 = none)
    pub min_spend: f64,
    /// Channels this plan applies to (empty = general)
    #[serde(default)]
    pub tag_ids: Vec<TagId>,
}

impl RewardPlan {
    pub fn has_cap(&self) -> bool {
        self.cap > 0.0
    }

    /// Spend still eligible for reward this cycle; infinite when uncapped.
    pub fn remaining_cap(&self, spent: f64) -> f64 {
        if self.has_cap() {
            (self.cap - spent).max(0.0)
        } else {
            f64::INFINITY
        }
    }

    pub fn rate(&self) -> f64 {
        self.percentage / 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditCard {
    pub id: CardId,
    pub name: String,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,
    /// Day of month the billing cycle resets (1-31)
    pub billing_day: u32,
    pub plans: Vec<RewardPlan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendingRecord {
    pub id: RecordId,
    pub card_id: CardId,
    pub plan_id: PlanId,
    pub date: NaiveDate,
    pub amount: f64,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepaidChange {
    pub date: NaiveDate,
    pub change: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepaidItem {
    pub id: i64,
    pub name: String,
    pub expiry_date: NaiveDate,
    pub count: i64,
    pub history: Vec<PrepaidChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: i64,
    pub shop: String,
    pub expiry_date: NaiveDate,
    pub amount: f64,
    pub barcode_url: Option<String>,
    pub image_url: Option<String>,
    pub link_url: Option<String>,
    pub is_used: bool,
}

/// Everything the store knows, handed to the engine as one immutable value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub cards: Vec<CreditCard>,
    pub records: Vec<SpendingRecord>,
    pub prepaid_items: Vec<PrepaidItem>,
    pub coupons: Vec<Coupon>,
    pub tags: Vec<Tag>,
}

impl Snapshot {
    /// Looks up a plan and its owning card.
    pub fn find_plan(&self, id: PlanId) -> Option<(&RewardPlan, &CreditCard)> {
        self.cards
            .iter()
            .flat_map(|card| card.plans.iter().map(move |plan| (plan, card)))
            .find(|(plan, _)| plan.id == id)
    }
}

pub fn find_card(cards: &[CreditCard], id: CardId) -> Option<&CreditCard> {
    cards.iter().find(|card| card.id == id)
}
