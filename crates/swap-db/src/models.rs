//! Database row types, mapped straight from SQLite columns, plus the
//! outcome types returned by multi-step operations.
//!
//! Rows keep ids and timestamps as TEXT; conversion into the `swap-types`
//! models happens once, here, so a corrupt value fails loudly instead of
//! leaking defaults to clients.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Row;
use uuid::Uuid;

use swap_types::models::{Decision, Item, Match, Message};

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    value.parse().with_context(|| format!("corrupt id '{}'", value))
}

pub(crate) fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .with_context(|| format!("corrupt timestamp '{}'", value))
}

pub(crate) struct ItemRow {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub location: String,
    pub image_url: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ItemRow {
    pub const COLUMNS: &'static str =
        "i.id, i.owner_id, i.name, i.description, i.location, i.image_url, i.created_at, i.updated_at";
    pub const WIDTH: usize = 8;

    pub fn from_row(row: &Row<'_>, start: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(start)?,
            owner_id: row.get(start + 1)?,
            name: row.get(start + 2)?,
            description: row.get(start + 3)?,
            location: row.get(start + 4)?,
            image_url: row.get(start + 5)?,
            created_at: row.get(start + 6)?,
            updated_at: row.get(start + 7)?,
        })
    }
}

impl TryFrom<ItemRow> for Item {
    type Error = anyhow::Error;

    fn try_from(row: ItemRow) -> Result<Self> {
        Ok(Self {
            id: parse_uuid(&row.id)?,
            owner_id: parse_uuid(&row.owner_id)?,
            name: row.name,
            description: row.description,
            location: row.location,
            image_url: row.image_url,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

pub(crate) struct DecisionRow {
    pub id: String,
    pub user_id: String,
    pub item_id: String,
    pub liked: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl DecisionRow {
    pub const COLUMNS: &'static str =
        "d.id, d.user_id, d.item_id, d.liked, d.created_at, d.updated_at";
    pub const WIDTH: usize = 6;

    pub fn from_row(row: &Row<'_>, start: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(start)?,
            user_id: row.get(start + 1)?,
            item_id: row.get(start + 2)?,
            liked: row.get(start + 3)?,
            created_at: row.get(start + 4)?,
            updated_at: row.get(start + 5)?,
        })
    }
}

impl TryFrom<DecisionRow> for Decision {
    type Error = anyhow::Error;

    fn try_from(row: DecisionRow) -> Result<Self> {
        Ok(Self {
            id: parse_uuid(&row.id)?,
            user_id: parse_uuid(&row.user_id)?,
            item_id: parse_uuid(&row.item_id)?,
            liked: row.liked,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

pub(crate) struct MatchRow {
    pub id: String,
    pub user1_id: String,
    pub user2_id: String,
    pub item1_id: String,
    pub item2_id: String,
    pub created_at: String,
    pub updated_at: String,
}

impl MatchRow {
    pub const COLUMNS: &'static str =
        "m.id, m.user1_id, m.user2_id, m.item1_id, m.item2_id, m.created_at, m.updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user1_id: row.get(1)?,
            user2_id: row.get(2)?,
            item1_id: row.get(3)?,
            item2_id: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

impl TryFrom<MatchRow> for Match {
    type Error = anyhow::Error;

    fn try_from(row: MatchRow) -> Result<Self> {
        Ok(Self {
            id: parse_uuid(&row.id)?,
            user1_id: parse_uuid(&row.user1_id)?,
            user2_id: parse_uuid(&row.user2_id)?,
            item1_id: parse_uuid(&row.item1_id)?,
            item2_id: parse_uuid(&row.item2_id)?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

pub(crate) struct MessageRow {
    pub id: String,
    pub match_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: String,
    pub read: bool,
}

impl MessageRow {
    pub const COLUMNS: &'static str = "id, match_id, sender_id, content, created_at, read";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            match_id: row.get(1)?,
            sender_id: row.get(2)?,
            content: row.get(3)?,
            created_at: row.get(4)?,
            read: row.get(5)?,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Self {
            id: parse_uuid(&row.id)?,
            match_id: parse_uuid(&row.match_id)?,
            sender_id: parse_uuid(&row.sender_id)?,
            content: row.content,
            created_at: parse_ts(&row.created_at)?,
            read: row.read,
        })
    }
}

// -- Outcomes --

/// Result of looking up a resource that only its owner may touch.
#[derive(Debug)]
pub enum Ownership<T> {
    Owned(T),
    NotOwner,
    Missing,
}

#[derive(Debug)]
pub enum RecordOutcome {
    Recorded(Recorded),
    ItemMissing,
    OwnItem,
}

#[derive(Debug)]
pub struct Recorded {
    pub decision: Decision,
    pub matched: Option<Match>,
    /// False when `matched` is a pre-existing match over the same item pair.
    pub created_match: bool,
    /// Matches dropped because a like was turned into a dislike.
    pub removed_matches: Vec<Uuid>,
}

#[derive(Debug, Default)]
pub struct UndoOutcome {
    pub removed_matches: Vec<Uuid>,
}

#[derive(Debug, Default)]
pub struct UnmatchOutcome {
    pub removed_matches: Vec<Uuid>,
    pub removed_decisions: usize,
}

#[derive(Debug)]
pub struct DeletedItem {
    pub image_url: String,
    pub removed_matches: Vec<Uuid>,
}
