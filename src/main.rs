use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tabled::Table;
use tracing::info;

use reward_tracker::channel::filter_from_names;
use reward_tracker::config::Config;
use reward_tracker::models::{Snapshot, Tag, TagId, no_expiry};
use reward_tracker::report::{
    CardRow, CouponRow, PlanRow, PrepaidRow, RankingRow, RecordRow, SplitRow, TagRow, WalletRow,
    money, reward,
};
use reward_tracker::{cycle, db, prepaid, progress, recommend, spend};

/// Credit card reward tracker: find the best card (or split) for every purchase
#[derive(Parser)]
#[command(name = "reward-tracker", version, about)]
struct Cli {
    /// Config file (default: ./reward-tracker.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new credit card
    AddCard {
        /// Card name
        #[arg(long)]
        name: String,
        /// Day of month the billing cycle resets (1-31)
        #[arg(long, default_value_t = 1)]
        billing_day: u32,
        /// First valid date (YYYY-MM-DD, default: today)
        #[arg(long)]
        valid_from: Option<NaiveDate>,
        /// Expiry date (YYYY-MM-DD, default: no expiry)
        #[arg(long)]
        valid_until: Option<NaiveDate>,
    },

    /// Change a card's name, billing day or validity dates
    EditCard {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        billing_day: Option<u32>,
        #[arg(long)]
        valid_from: Option<NaiveDate>,
        #[arg(long)]
        valid_until: Option<NaiveDate>,
    },

    /// List all cards
    ListCards,

    /// Remove a card with its plans and records
    RemoveCard {
        #[arg(long)]
        id: i64,
    },

    /// Add a reward plan to a card
    AddPlan {
        #[arg(long)]
        card: i64,
        /// Reward rate in percent (e.g. 3.5)
        #[arg(long)]
        percentage: f64,
        /// Maximum eligible spend per cycle (0 = unlimited)
        #[arg(long, default_value_t = 0.0)]
        cap: f64,
        /// Cycle spend required before any reward (0 = none)
        #[arg(long, default_value_t = 0.0)]
        min_spend: f64,
        /// Channels the plan applies to (omit for general spend)
        #[arg(long, num_args = 1..)]
        tag: Vec<String>,
        #[arg(long)]
        note: Option<String>,
    },

    /// Change a plan's rate, limits, channels or note
    EditPlan {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        percentage: Option<f64>,
        /// Maximum eligible spend per cycle (0 = unlimited)
        #[arg(long)]
        cap: Option<f64>,
        #[arg(long)]
        min_spend: Option<f64>,
        /// Replace the plan's channels
        #[arg(long, num_args = 1.., conflicts_with = "general")]
        tag: Vec<String>,
        /// Clear the plan's channels
        #[arg(long)]
        general: bool,
        #[arg(long)]
        note: Option<String>,
    },

    /// Remove a plan and its records
    RemovePlan {
        #[arg(long)]
        id: i64,
    },

    /// Record a charge against a plan
    AddRecord {
        #[arg(long)]
        plan: i64,
        #[arg(long)]
        amount: f64,
        /// Charge date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "")]
        note: String,
    },

    /// Change a spending record's amount, date or note
    EditRecord {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        note: Option<String>,
    },

    /// Remove a spending record
    RemoveRecord {
        #[arg(long)]
        id: i64,
    },

    /// List channel tags
    Tags,

    /// Add a channel tag
    AddTag {
        #[arg(long)]
        name: String,
    },

    /// Rename a channel tag
    RenameTag {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: String,
    },

    /// Remove a channel tag from the list and from every plan
    RemoveTag {
        #[arg(long)]
        id: i64,
    },

    /// Cycle progress of every plan, grouped by card
    Wallet {
        #[arg(long, num_args = 1..)]
        tag: Vec<String>,
    },

    /// Current cycle and history of one plan
    Plan {
        #[arg(long)]
        id: i64,
    },

    /// Rank plans by the reward they would earn on a purchase
    Simulate {
        #[arg(long)]
        amount: f64,
        /// Payment channels used (omit for any)
        #[arg(long, num_args = 1..)]
        tag: Vec<String>,
    },

    /// Split a purchase across plans, best rate first
    Split {
        #[arg(long)]
        amount: f64,
        #[arg(long, num_args = 1..)]
        tag: Vec<String>,
    },

    /// Add a prepaid item balance
    AddPrepaid {
        #[arg(long)]
        name: String,
        #[arg(long)]
        count: i64,
        /// Expiry date (YYYY-MM-DD, default: no expiry)
        #[arg(long)]
        expiry: Option<NaiveDate>,
    },

    /// Use (negative) or top up (positive) a prepaid item
    UsePrepaid {
        #[arg(long)]
        id: i64,
        #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
        change: i64,
    },

    /// Prepaid items, most urgent first
    Prepaid,

    /// Add a discount coupon
    AddCoupon {
        #[arg(long)]
        shop: String,
        #[arg(long, default_value_t = 0.0)]
        amount: f64,
        #[arg(long)]
        expiry: Option<NaiveDate>,
        #[arg(long)]
        link: Option<String>,
    },

    /// Mark a coupon as redeemed
    RedeemCoupon {
        #[arg(long)]
        id: i64,
    },

    /// Unused, unexpired coupons
    Coupons,

    /// Print every stored record as JSON
    Export,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reward_tracker=info".into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load config")?;
    let conn = db::init_db(&config.database_path).context("Failed to initialize database")?;

    run(cli.command, &conn, &config)
}

fn run(command: Commands, conn: &Connection, config: &Config) -> Result<()> {
    let now = Local::now().naive_local();
    let today = now.date();

    match command {
        Commands::AddCard {
            name,
            billing_day,
            valid_from,
            valid_until,
        } => {
            let valid_until = valid_until.unwrap_or_else(no_expiry);
            let id = db::add_card(conn, &name, valid_from.unwrap_or(today), valid_until, billing_day)
                .context("Failed to add card")?;
            info!(card_id = id, "added card");
            println!("Added card '{}' with ID {} (billing day {})", name, id, billing_day);
        }

        Commands::EditCard {
            id,
            name,
            billing_day,
            valid_from,
            valid_until,
        } => {
            let cards = db::list_cards(conn).context("Failed to list cards")?;
            let Some(mut card) = cards.into_iter().find(|c| c.id == id) else {
                bail!("No card found with ID {}", id);
            };
            if let Some(name) = name {
                card.name = name;
            }
            card.billing_day = billing_day.unwrap_or(card.billing_day);
            card.valid_from = valid_from.unwrap_or(card.valid_from);
            card.valid_until = valid_until.unwrap_or(card.valid_until);
            db::update_card(conn, &card).context("Failed to update card")?;
            info!(card_id = id, "updated card");
            println!("{}", Table::new([CardRow::from(&card)]));
        }

        Commands::ListCards => {
            let cards = db::list_cards(conn).context("Failed to list cards")?;
            if cards.is_empty() {
                println!("No cards found. Add one with: reward-tracker add-card --name \"...\" --billing-day 15");
            } else {
                println!("{}", Table::new(cards.iter().map(CardRow::from)));
                let tags = db::list_tags(conn).context("Failed to list tags")?;
                let tags = &tags;
                let plans: Vec<_> = cards
                    .iter()
                    .flat_map(|card| card.plans.iter().map(move |plan| PlanRow::new(plan, card, tags)))
                    .collect();
                if !plans.is_empty() {
                    println!("{}", Table::new(plans));
                }
            }
        }

        Commands::RemoveCard { id } => {
            if db::remove_card(conn, id).context("Failed to remove card")? {
                println!("Removed card with ID {}", id);
            } else {
                println!("No card found with ID {}", id);
            }
        }

        Commands::AddPlan {
            card,
            percentage,
            cap,
            min_spend,
            tag,
            note,
        } => {
            let tags = db::list_tags(conn).context("Failed to list tags")?;
            let tag_ids = resolve_tags(&tag, &tags)?;
            let id = db::add_plan(conn, card, note.as_deref(), percentage, cap, min_spend, &tag_ids)
                .context("Failed to add plan")?;
            println!("Added plan {} to card {} ({}%)", id, card, percentage);
        }

        Commands::EditPlan {
            id,
            percentage,
            cap,
            min_spend,
            tag,
            general,
            note,
        } => {
            let snapshot = snapshot(conn)?;
            let Some((plan, card)) = snapshot.find_plan(id) else {
                bail!("No plan found with ID {}", id);
            };
            let mut plan = plan.clone();
            plan.percentage = percentage.unwrap_or(plan.percentage);
            plan.cap = cap.unwrap_or(plan.cap);
            plan.min_spend = min_spend.unwrap_or(plan.min_spend);
            if general {
                plan.tag_ids.clear();
            } else if !tag.is_empty() {
                plan.tag_ids = resolve_tags(&tag, &snapshot.tags)?;
            }
            if let Some(note) = note {
                plan.note = (!note.is_empty()).then_some(note);
            }
            db::update_plan(conn, &plan).context("Failed to update plan")?;
            info!(plan_id = id, "updated plan");
            println!("{}", Table::new([PlanRow::new(&plan, card, &snapshot.tags)]));
        }

        Commands::RemovePlan { id } => {
            if db::remove_plan(conn, id).context("Failed to remove plan")? {
                println!("Removed plan with ID {}", id);
            } else {
                println!("No plan found with ID {}", id);
            }
        }

        Commands::AddRecord {
            plan,
            amount,
            date,
            note,
        } => {
            let id = db::add_record(conn, plan, date.unwrap_or(today), amount, &note)
                .context("Failed to add record")?;
            println!("Recorded {} on plan {} (record {})", money(amount), plan, id);
        }

        Commands::EditRecord {
            id,
            amount,
            date,
            note,
        } => {
            let records = db::list_records(conn).context("Failed to list records")?;
            let Some(mut record) = records.into_iter().find(|r| r.id == id) else {
                bail!("No record found with ID {}", id);
            };
            record.amount = amount.unwrap_or(record.amount);
            record.date = date.unwrap_or(record.date);
            if let Some(note) = note {
                record.note = note;
            }
            db::update_record(conn, &record).context("Failed to update record")?;
            println!("{}", Table::new([RecordRow::from(&record)]));
        }

        Commands::RemoveRecord { id } => {
            if db::remove_record(conn, id).context("Failed to remove record")? {
                println!("Removed record with ID {}", id);
            } else {
                println!("No record found with ID {}", id);
            }
        }

        Commands::Tags => {
            let tags = db::list_tags(conn).context("Failed to list tags")?;
            println!("{}", Table::new(tags.iter().map(TagRow::from)));
        }

        Commands::AddTag { name } => {
            let id = db::add_tag(conn, &name).context("Failed to add tag")?;
            println!("Added tag '{}' with ID {}", name, id);
        }

        Commands::RenameTag { id, name } => {
            if db::rename_tag(conn, id, &name).context("Failed to rename tag")? {
                println!("Renamed tag {} to '{}'", id, name.trim());
            } else {
                println!("No tag found with ID {}", id);
            }
        }

        Commands::RemoveTag { id } => {
            if db::remove_tag(conn, id).context("Failed to remove tag")? {
                println!("Removed tag with ID {}", id);
            } else {
                println!("No tag found with ID {}", id);
            }
        }

        Commands::Wallet { tag } => {
            let snapshot = snapshot(conn)?;
            let filter = filter_from_names(&tag, &snapshot.tags);
            let groups = recommend::wallet(&snapshot, &filter, now);
            let tags = &snapshot.tags;
            if groups.is_empty() {
                println!("No plans match the selected channels");
                return Ok(());
            }
            let rows: Vec<_> = groups
                .iter()
                .flat_map(|group| {
                    group
                        .plans
                        .iter()
                        .map(move |(plan, prog)| WalletRow::new(plan, group.card, prog, tags))
                })
                .collect();
            println!("{}", Table::new(rows));
        }

        Commands::Plan { id } => {
            let snapshot = snapshot(conn)?;
            let Some((plan, card)) = snapshot.find_plan(id) else {
                bail!("No plan found with ID {}", id);
            };
            let cycle = cycle::card_cycle(card, now);
            let current = spend::cycle_records(&snapshot.records, plan.id, cycle.cycle_start);
            let prog = progress::plan_progress(plan, &snapshot.cards, &snapshot.records, now);

            println!("{}", Table::new([PlanRow::new(plan, card, &snapshot.tags)]));
            println!(
                "Cycle since {} ({} days left): spent {}, estimated reward {}",
                cycle.cycle_start,
                cycle.days_until_next_cycle,
                money(prog.spend),
                reward(progress::cycle_reward(plan, prog.spend)),
            );
            if current.is_empty() {
                println!("No records this cycle");
            } else {
                println!("{}", Table::new(current.into_iter().map(RecordRow::from)));
            }
            for month in spend::history_by_month(&snapshot.records, plan.id, cycle.cycle_start) {
                println!("{}  total {}", month.month, money(month.total));
                println!("{}", Table::new(month.records.into_iter().map(RecordRow::from)));
            }
        }

        Commands::Simulate { amount, tag } => {
            let snapshot = snapshot(conn)?;
            let filter = filter_from_names(&tag, &snapshot.tags);
            let ranked = recommend::rank_plans(&snapshot, amount, &filter, now);
            if ranked.is_empty() {
                println!("No plans match the selected channels");
                return Ok(());
            }
            let rows: Vec<_> = ranked
                .iter()
                .take(config.single_results_limit)
                .enumerate()
                .map(|(i, r)| RankingRow::new(i + 1, r, &snapshot.tags))
                .collect();
            println!("{}", Table::new(rows));
            if ranked.len() > config.single_results_limit {
                println!("Showing top {} of {} plans", config.single_results_limit, ranked.len());
            }
        }

        Commands::Split { amount, tag } => {
            let snapshot = snapshot(conn)?;
            let filter = filter_from_names(&tag, &snapshot.tags);
            let split = recommend::allocate_multiway(&snapshot, amount, &filter, now);
            if split.is_empty() {
                println!("No viable split for {}", money(amount));
                return Ok(());
            }
            let shown = &split[..split.len().min(config.split_results_limit)];
            println!("{}", Table::new(shown.iter().map(|a| SplitRow::new(a, &snapshot.tags))));
            if split.len() > shown.len() {
                println!("{} more plans take only small remainders", split.len() - shown.len());
            }
            println!(
                "Total reward {} on {} of {}",
                reward(recommend::total_reward(shown)),
                money(recommend::total_allocated(shown)),
                money(amount),
            );
        }

        Commands::AddPrepaid { name, count, expiry } => {
            let expiry = expiry.unwrap_or_else(no_expiry);
            let id = db::add_prepaid(conn, &name, expiry, count, today)
                .context("Failed to add prepaid item")?;
            println!("Added prepaid '{}' x{} with ID {}", name, count, id);
        }

        Commands::UsePrepaid { id, change } => {
            let count = db::adjust_prepaid(conn, id, change, today)
                .context("Failed to update prepaid item")?;
            println!("Prepaid item {} now has {} left", id, count);
        }

        Commands::Prepaid => {
            let items = db::list_prepaid(conn).context("Failed to list prepaid items")?;
            if items.is_empty() {
                println!("No prepaid items");
            } else {
                let rows = prepaid::sort_by_urgency(&items, today)
                    .into_iter()
                    .map(|(item, pace)| PrepaidRow::new(item, pace));
                println!("{}", Table::new(rows));
            }
        }

        Commands::AddCoupon {
            shop,
            amount,
            expiry,
            link,
        } => {
            let expiry = expiry.unwrap_or_else(no_expiry);
            let id = db::add_coupon(conn, &shop, expiry, amount, link.as_deref())
                .context("Failed to add coupon")?;
            println!("Added coupon '{}' with ID {}", shop, id);
        }

        Commands::RedeemCoupon { id } => {
            if db::set_coupon_used(conn, id, true).context("Failed to redeem coupon")? {
                println!("Coupon {} marked as used", id);
            } else {
                println!("No coupon found with ID {}", id);
            }
        }

        Commands::Coupons => {
            let coupons = db::list_coupons(conn).context("Failed to list coupons")?;
            let active = prepaid::active_coupons(&coupons, today);
            if active.is_empty() {
                println!("No active coupons");
            } else {
                println!("{}", Table::new(active.into_iter().map(CouponRow::from)));
            }
        }

        Commands::Export => {
            let snapshot = snapshot(conn)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    Ok(())
}

fn snapshot(conn: &Connection) -> Result<Snapshot> {
    db::load_snapshot(conn).context("Failed to load data")
}

fn resolve_tags(names: &[String], tags: &[Tag]) -> Result<Vec<TagId>> {
    let filter = filter_from_names(names, tags);
    if filter.len() < names.len() {
        let known: Vec<_> = tags.iter().map(|t| t.name.as_str()).collect();
        bail!("Unknown tag in {:?}; known tags: {}", names, known.join(", "));
    }
    Ok(filter.into_iter().collect())
}
