//! Credit-card reward tracking: billing cycles, plan progress, and which
//! card (or combination of cards) to use for a planned purchase.

pub mod channel;
pub mod config;
pub mod cycle;
pub mod db;
pub mod error;
pub mod models;
pub mod prepaid;
pub mod progress;
pub mod recommend;
pub mod report;
pub mod reward;
pub mod spend;

pub use channel::{ChannelFilter, ChannelScope};
pub use cycle::{BillingCycle, resolve_cycle};
pub use error::{Result, TrackerError};
pub use progress::{ProgressSnapshot, evaluate_progress};
pub use recommend::{Allocation, PlanRanking, allocate_multiway, rank_plans};
pub use reward::{RewardEstimate, estimate_reward};
pub use spend::aggregate_spend;
