use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use crate::error::{Result, TrackerError};
use crate::models::{
    CardId, Coupon, CreditCard, DEFAULT_TAGS, PlanId, PrepaidChange, PrepaidItem, RecordId,
    RewardPlan, Snapshot, SpendingRecord, Tag, TagId,
};
use crate::prepaid::apply_change;

/// Creates tables on the given connection.
pub fn init_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tags (
            id      INTEGER PRIMARY KEY AUTOINCREMENT,
            name    TEXT NOT NULL UNIQUE
        );
        CREATE TABLE IF NOT EXISTS cards (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            valid_from  TEXT NOT NULL,
            valid_until TEXT NOT NULL,
            billing_day INTEGER NOT NULL DEFAULT 1
        );
        CREATE TABLE IF NOT EXISTS plans (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            card_id     INTEGER NOT NULL,
            note        TEXT,
            percentage  REAL NOT NULL,
            cap         REAL NOT NULL DEFAULT 0.0,
            min_spend   REAL NOT NULL DEFAULT 0.0,
            tag_ids     TEXT NOT NULL DEFAULT '[]'
        );
        CREATE TABLE IF NOT EXISTS records (
            id      INTEGER PRIMARY KEY AUTOINCREMENT,
            card_id INTEGER NOT NULL,
            plan_id INTEGER NOT NULL,
            date    TEXT NOT NULL,
            amount  REAL NOT NULL,
            note    TEXT NOT NULL DEFAULT ''
        );
        CREATE TABLE IF NOT EXISTS prepaid_items (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            expiry_date TEXT NOT NULL,
            count       INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE IF NOT EXISTS prepaid_history (
            id      INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id INTEGER NOT NULL,
            date    TEXT NOT NULL,
            change  INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS coupons (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            shop        TEXT NOT NULL,
            expiry_date TEXT NOT NULL,
            amount      REAL NOT NULL DEFAULT 0.0,
            barcode_url TEXT,
            image_url   TEXT,
            link_url    TEXT,
            is_used     INTEGER NOT NULL DEFAULT 0
        );",
    )?;
    Ok(())
}

/// Opens (or creates) the SQLite database file, ensures tables exist and
/// seeds the default channel tags into an empty database.
pub fn init_db(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    init_tables(&conn)?;
    let seeded = seed_default_tags(&conn)?;
    if seeded > 0 {
        info!(path = %path.display(), seeded, "initialized new database");
    }
    Ok(conn)
}

/// Inserts [`DEFAULT_TAGS`] when no tags exist. Returns how many were added.
pub fn seed_default_tags(conn: &Connection) -> Result<usize> {
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))?;
    if existing > 0 {
        return Ok(0);
    }
    for name in DEFAULT_TAGS {
        conn.execute("INSERT INTO tags (name) VALUES (?1)", params![name])?;
    }
    Ok(DEFAULT_TAGS.len())
}

// --- Tags ---

pub fn add_tag(conn: &Connection, name: &str) -> Result<TagId> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TrackerError::InvalidInput("tag name is empty".into()));
    }
    conn.execute("INSERT INTO tags (name) VALUES (?1)", params![name])?;
    Ok(conn.last_insert_rowid())
}

pub fn rename_tag(conn: &Connection, id: TagId, name: &str) -> Result<bool> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TrackerError::InvalidInput("tag name is empty".into()));
    }
    let changed = conn.execute("UPDATE tags SET name = ?2 WHERE id = ?1", params![id, name])?;
    Ok(changed > 0)
}

/// Deletes a tag and drops it from every plan's channel list.
///
/// A plan left with no channels becomes a general plan.
pub fn remove_tag(conn: &Connection, id: TagId) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    let mut untagged = 0;
    for mut plan in list_plans(&tx)? {
        let before = plan.tag_ids.len();
        plan.tag_ids.retain(|tag| *tag != id);
        if plan.tag_ids.len() != before {
            let tag_ids_json = serde_json::to_string(&plan.tag_ids)?;
            tx.execute(
                "UPDATE plans SET tag_ids = ?2 WHERE id = ?1",
                params![plan.id, tag_ids_json],
            )?;
            untagged += 1;
        }
    }
    let changed = tx.execute("DELETE FROM tags WHERE id = ?1", params![id])?;
    tx.commit()?;
    if changed > 0 {
        debug!(tag_id = id, plans = untagged, "removed tag");
    }
    Ok(changed > 0)
}

pub fn list_tags(conn: &Connection) -> Result<Vec<Tag>> {
    let mut stmt = conn.prepare("SELECT id, name FROM tags ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok(Tag {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

// --- Cards and plans ---

pub fn add_card(
    conn: &Connection,
    name: &str,
    valid_from: NaiveDate,
    valid_until: NaiveDate,
    billing_day: u32,
) -> Result<CardId> {
    validate_billing_day(billing_day)?;
    conn.execute(
        "INSERT INTO cards (name, valid_from, valid_until, billing_day)
         VALUES (?1, ?2, ?3, ?4)",
        params![name, valid_from, valid_until, billing_day],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Lists cards with their plans nested, in insertion order.
pub fn list_cards(conn: &Connection) -> Result<Vec<CreditCard>> {
    let mut plans_by_card: HashMap<CardId, Vec<RewardPlan>> = HashMap::new();
    for plan in list_plans(conn)? {
        plans_by_card.entry(plan.card_id).or_default().push(plan);
    }

    let mut stmt = conn.prepare(
        "SELECT id, name, valid_from, valid_until, billing_day
         FROM cards ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(CreditCard {
            id: row.get(0)?,
            name: row.get(1)?,
            valid_from: row.get(2)?,
            valid_until: row.get(3)?,
            billing_day: row.get(4)?,
            plans: Vec::new(),
        })
    })?;

    let mut cards = Vec::new();
    for card in rows {
        let mut card = card?;
        card.plans = plans_by_card.remove(&card.id).unwrap_or_default();
        cards.push(card);
    }
    Ok(cards)
}

/// Updates a card's name, validity dates and billing day. Plans are untouched.
pub fn update_card(conn: &Connection, card: &CreditCard) -> Result<bool> {
    validate_billing_day(card.billing_day)?;
    let changed = conn.execute(
        "UPDATE cards SET name = ?2, valid_from = ?3, valid_until = ?4, billing_day = ?5
         WHERE id = ?1",
        params![card.id, card.name, card.valid_from, card.valid_until, card.billing_day],
    )?;
    Ok(changed > 0)
}

fn validate_billing_day(billing_day: u32) -> Result<()> {
    if !(1..=31).contains(&billing_day) {
        return Err(TrackerError::InvalidInput(format!(
            "billing day must be 1-31, got {billing_day}"
        )));
    }
    Ok(())
}

/// Removes a card together with its plans and their records.
pub fn remove_card(conn: &Connection, id: CardId) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    let records = tx.execute("DELETE FROM records WHERE card_id = ?1", params![id])?;
    let plans = tx.execute("DELETE FROM plans WHERE card_id = ?1", params![id])?;
    let changed = tx.execute("DELETE FROM cards WHERE id = ?1", params![id])?;
    tx.commit()?;
    if changed > 0 {
        debug!(card_id = id, plans, records, "removed card");
    }
    Ok(changed > 0)
}

pub fn add_plan(
    conn: &Connection,
    card_id: CardId,
    note: Option<&str>,
    percentage: f64,
    cap: f64,
    min_spend: f64,
    tag_ids: &[TagId],
) -> Result<PlanId> {
    ensure_exists(conn, "cards", "card", card_id)?;
    validate_plan_numbers(percentage, cap, min_spend)?;
    let tag_ids_json = serde_json::to_string(tag_ids)?;
    conn.execute(
        "INSERT INTO plans (card_id, note, percentage, cap, min_spend, tag_ids)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![card_id, note, percentage, cap, min_spend, tag_ids_json],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_plan(conn: &Connection, plan: &RewardPlan) -> Result<bool> {
    validate_plan_numbers(plan.percentage, plan.cap, plan.min_spend)?;
    let tag_ids_json = serde_json::to_string(&plan.tag_ids)?;
    let changed = conn.execute(
        "UPDATE plans SET note = ?2, percentage = ?3, cap = ?4, min_spend = ?5, tag_ids = ?6
         WHERE id = ?1",
        params![plan.id, plan.note, plan.percentage, plan.cap, plan.min_spend, tag_ids_json],
    )?;
    Ok(changed > 0)
}

/// Removes a plan and the records booked against it.
pub fn remove_plan(conn: &Connection, id: PlanId) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM records WHERE plan_id = ?1", params![id])?;
    let changed = tx.execute("DELETE FROM plans WHERE id = ?1", params![id])?;
    tx.commit()?;
    Ok(changed > 0)
}

fn list_plans(conn: &Connection) -> Result<Vec<RewardPlan>> {
    let mut stmt = conn.prepare(
        "SELECT id, card_id, note, percentage, cap, min_spend, tag_ids
         FROM plans ORDER BY id",
    )?;
    let mut rows = stmt.query([])?;
    let mut plans = Vec::new();
    while let Some(row) = rows.next()? {
        let tag_ids: String = row.get(6)?;
        plans.push(RewardPlan {
            id: row.get(0)?,
            card_id: row.get(1)?,
            note: row.get(2)?,
            percentage: row.get(3)?,
            cap: row.get(4)?,
            min_spend: row.get(5)?,
            tag_ids: serde_json::from_str(&tag_ids)?,
        });
    }
    Ok(plans)
}

fn validate_plan_numbers(percentage: f64, cap: f64, min_spend: f64) -> Result<()> {
    for (field, value) in [("percentage", percentage), ("cap", cap), ("min spend", min_spend)] {
        if !value.is_finite() || value < 0.0 {
            return Err(TrackerError::InvalidInput(format!(
                "{field} must be a non-negative number, got {value}"
            )));
        }
    }
    Ok(())
}

// --- Spending records ---

/// Books a charge against a plan; the card is taken from the plan.
pub fn add_record(
    conn: &Connection,
    plan_id: PlanId,
    date: NaiveDate,
    amount: f64,
    note: &str,
) -> Result<RecordId> {
    if !amount.is_finite() {
        return Err(TrackerError::InvalidInput(format!("amount must be a number, got {amount}")));
    }
    let card_id: CardId = conn
        .query_row("SELECT card_id FROM plans WHERE id = ?1", params![plan_id], |row| row.get(0))
        .optional()?
        .ok_or(TrackerError::NotFound {
            entity: "plan",
            id: plan_id,
        })?;
    conn.execute(
        "INSERT INTO records (card_id, plan_id, date, amount, note)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![card_id, plan_id, date, amount, note],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_record(conn: &Connection, record: &SpendingRecord) -> Result<bool> {
    if !record.amount.is_finite() {
        return Err(TrackerError::InvalidInput(format!(
            "amount must be a number, got {}",
            record.amount
        )));
    }
    let changed = conn.execute(
        "UPDATE records SET date = ?2, amount = ?3, note = ?4 WHERE id = ?1",
        params![record.id, record.date, record.amount, record.note],
    )?;
    Ok(changed > 0)
}

pub fn list_records(conn: &Connection) -> Result<Vec<SpendingRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, card_id, plan_id, date, amount, note
         FROM records ORDER BY date DESC, id DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(SpendingRecord {
            id: row.get(0)?,
            card_id: row.get(1)?,
            plan_id: row.get(2)?,
            date: row.get(3)?,
            amount: row.get(4)?,
            note: row.get(5)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

pub fn remove_record(conn: &Connection, id: RecordId) -> Result<bool> {
    let changed = conn.execute("DELETE FROM records WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

// --- Prepaid items ---

pub fn add_prepaid(
    conn: &Connection,
    name: &str,
    expiry_date: NaiveDate,
    count: i64,
    today: NaiveDate,
) -> Result<i64> {
    if count < 0 {
        return Err(TrackerError::InvalidInput(format!("count must not be negative, got {count}")));
    }
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO prepaid_items (name, expiry_date, count) VALUES (?1, ?2, ?3)",
        params![name, expiry_date, count],
    )?;
    let id = tx.last_insert_rowid();
    tx.execute(
        "INSERT INTO prepaid_history (item_id, date, change) VALUES (?1, ?2, ?3)",
        params![id, today, count],
    )?;
    tx.commit()?;
    Ok(id)
}

/// Records a usage (negative) or top-up (positive). Returns the new balance.
pub fn adjust_prepaid(conn: &Connection, id: i64, change: i64, date: NaiveDate) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    let count: i64 = tx
        .query_row("SELECT count FROM prepaid_items WHERE id = ?1", params![id], |row| row.get(0))
        .optional()?
        .ok_or(TrackerError::NotFound {
            entity: "prepaid item",
            id,
        })?;
    let new_count = apply_change(count, change);
    tx.execute(
        "UPDATE prepaid_items SET count = ?2 WHERE id = ?1",
        params![id, new_count],
    )?;
    tx.execute(
        "INSERT INTO prepaid_history (item_id, date, change) VALUES (?1, ?2, ?3)",
        params![id, date, change],
    )?;
    tx.commit()?;
    Ok(new_count)
}

pub fn list_prepaid(conn: &Connection) -> Result<Vec<PrepaidItem>> {
    let mut history: HashMap<i64, Vec<PrepaidChange>> = HashMap::new();
    let mut stmt = conn.prepare("SELECT item_id, date, change FROM prepaid_history ORDER BY id")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        history.entry(row.get(0)?).or_default().push(PrepaidChange {
            date: row.get(1)?,
            change: row.get(2)?,
        });
    }

    let mut stmt = conn.prepare("SELECT id, name, expiry_date, count FROM prepaid_items ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok(PrepaidItem {
            id: row.get(0)?,
            name: row.get(1)?,
            expiry_date: row.get(2)?,
            count: row.get(3)?,
            history: Vec::new(),
        })
    })?;

    let mut items = Vec::new();
    for item in rows {
        let mut item = item?;
        item.history = history.remove(&item.id).unwrap_or_default();
        items.push(item);
    }
    Ok(items)
}

pub fn remove_prepaid(conn: &Connection, id: i64) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM prepaid_history WHERE item_id = ?1", params![id])?;
    let changed = tx.execute("DELETE FROM prepaid_items WHERE id = ?1", params![id])?;
    tx.commit()?;
    Ok(changed > 0)
}

// --- Coupons ---

pub fn add_coupon(
    conn: &Connection,
    shop: &str,
    expiry_date: NaiveDate,
    amount: f64,
    link_url: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO coupons (shop, expiry_date, amount, link_url) VALUES (?1, ?2, ?3, ?4)",
        params![shop, expiry_date, amount, link_url],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn set_coupon_used(conn: &Connection, id: i64, used: bool) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE coupons SET is_used = ?2 WHERE id = ?1",
        params![id, used],
    )?;
    Ok(changed > 0)
}

pub fn list_coupons(conn: &Connection) -> Result<Vec<Coupon>> {
    let mut stmt = conn.prepare(
        "SELECT id, shop, expiry_date, amount, barcode_url, image_url, link_url, is_used
         FROM coupons ORDER BY id",
    )?;
    let rows = stmt.query_map([], coupon_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

pub fn remove_coupon(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute("DELETE FROM coupons WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

fn coupon_from_row(row: &Row<'_>) -> rusqlite::Result<Coupon> {
    Ok(Coupon {
        id: row.get(0)?,
        shop: row.get(1)?,
        expiry_date: row.get(2)?,
        amount: row.get(3)?,
        barcode_url: row.get(4)?,
        image_url: row.get(5)?,
        link_url: row.get(6)?,
        is_used: row.get(7)?,
    })
}

// --- Snapshot ---

/// Reads everything into one immutable [`Snapshot`] for the engine.
pub fn load_snapshot(conn: &Connection) -> Result<Snapshot> {
    let snapshot = Snapshot {
        cards: list_cards(conn)?,
        records: list_records(conn)?,
        prepaid_items: list_prepaid(conn)?,
        coupons: list_coupons(conn)?,
        tags: list_tags(conn)?,
    };
    debug!(
        cards = snapshot.cards.len(),
        records = snapshot.records.len(),
        tags = snapshot.tags.len(),
        "loaded snapshot"
    );
    Ok(snapshot)
}

fn ensure_exists(conn: &Connection, table: &str, entity: &'static str, id: i64) -> Result<()> {
    let found = conn
        .query_row(&format!("SELECT 1 FROM {table} WHERE id = ?1"), params![id], |_| Ok(()))
        .optional()?;
    found.ok_or(TrackerError::NotFound { entity, id })
}
