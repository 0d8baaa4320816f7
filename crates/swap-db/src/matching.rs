//! Decisions and the match lifecycle.
//!
//! Every entry point here runs as one transaction on the writer connection:
//! either the whole sequence commits or none of it does. The writer is a
//! single mutex-guarded connection, so detection and insertion of a match
//! cannot interleave with an opposite like arriving at the same time.

use anyhow::Result;
use rusqlite::{Connection, TransactionBehavior, params};
use tracing::{debug, info};
use uuid::Uuid;

use swap_types::models::{Decision, Identity, Match};

use crate::models::{
    DecisionRow, MatchRow, RecordOutcome, Recorded, UndoOutcome, UnmatchOutcome, parse_uuid,
};
use crate::queries::{OptionalExt, query_match_for, upsert_user};
use crate::{Database, now_ts};

impl Database {
    /// Record (or revise) the user's verdict on an item and, for a like,
    /// run match detection.
    ///
    /// A second verdict on the same item updates the existing row. Turning
    /// a like into a dislike drops any match that depended on it.
    pub fn record_decision(
        &self,
        user: &Identity,
        item_id: Uuid,
        liked: bool,
    ) -> Result<RecordOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let me = user.user_id.to_string();
            let item = item_id.to_string();

            let owner: Option<String> = tx
                .query_row("SELECT owner_id FROM items WHERE id = ?1", [&item], |row| row.get(0))
                .optional()?;
            let Some(owner) = owner else {
                return Ok(RecordOutcome::ItemMissing);
            };
            if owner == me {
                return Ok(RecordOutcome::OwnItem);
            }

            upsert_user(&tx, user)?;

            let now = now_ts();
            tx.execute(
                "INSERT INTO decisions (id, user_id, item_id, liked, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(user_id, item_id)
                 DO UPDATE SET liked = excluded.liked, updated_at = excluded.updated_at",
                params![Uuid::new_v4().to_string(), me, item, liked, now],
            )?;
            let decision = query_decision(&tx, &me, &item)?
                .ok_or_else(|| anyhow::anyhow!("Decision on {} vanished after upsert", item))?;

            let (matched, created_match, removed_matches) = if liked {
                let (matched, created) = detect_match(&tx, &me, &owner, &item)?;
                (matched, created, Vec::new())
            } else {
                (None, false, remove_pair_matches(&tx, &me, &owner, &item)?)
            };

            tx.commit()?;

            if let Some(m) = matched.as_ref().filter(|_| created_match) {
                info!("Match {} created between {} and {}", m.id, m.user1_id, m.user2_id);
            }

            Ok(RecordOutcome::Recorded(Recorded {
                decision,
                matched,
                created_match,
                removed_matches,
            }))
        })
    }

    /// Undo one of the user's decisions, together with any match between the
    /// user and the item's owner over that item. Returns `None` when the
    /// decision does not exist or belongs to someone else.
    pub fn undo_decision(&self, user_id: Uuid, decision_id: Uuid) -> Result<Option<UndoOutcome>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let me = user_id.to_string();

            let found: Option<(String, Option<String>)> = tx
                .query_row(
                    "SELECT d.item_id, i.owner_id
                     FROM decisions d
                     LEFT JOIN items i ON i.id = d.item_id
                     WHERE d.id = ?1 AND d.user_id = ?2",
                    params![decision_id.to_string(), me],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((item, owner)) = found else {
                return Ok(None);
            };

            let removed_matches = match owner {
                Some(owner) => remove_pair_matches(&tx, &me, &owner, &item)?,
                None => Vec::new(),
            };

            tx.execute("DELETE FROM decisions WHERE id = ?1", [decision_id.to_string()])?;
            tx.commit()?;

            debug!(
                "Decision {} undone by {} ({} matches removed)",
                decision_id,
                user_id,
                removed_matches.len()
            );
            Ok(Some(UndoOutcome { removed_matches }))
        })
    }

    /// Full relationship reset between the caller and the other participant
    /// of `match_id`: every match between the two and every decision either
    /// made on the other's items. Returns `None` when the caller is not a
    /// participant.
    pub fn unmatch(&self, user_id: Uuid, match_id: Uuid) -> Result<Option<UnmatchOutcome>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let Some(target) = query_match_for(&tx, user_id, match_id)? else {
                return Ok(None);
            };
            let me = user_id.to_string();
            let other = target.counterpart(user_id).to_string();

            let removed_matches = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM matches
                     WHERE (user1_id = ?1 AND user2_id = ?2) OR (user1_id = ?2 AND user2_id = ?1)",
                )?;
                let ids = stmt
                    .query_map(params![me, other], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                ids.iter().map(|id| parse_uuid(id)).collect::<Result<Vec<_>>>()?
            };

            tx.execute(
                "DELETE FROM matches
                 WHERE (user1_id = ?1 AND user2_id = ?2) OR (user1_id = ?2 AND user2_id = ?1)",
                params![me, other],
            )?;

            let mut removed_decisions = 0;
            for (decider, owner) in [(&me, &other), (&other, &me)] {
                removed_decisions += tx.execute(
                    "DELETE FROM decisions
                     WHERE user_id = ?1
                       AND item_id IN (SELECT id FROM items WHERE owner_id = ?2)",
                    params![decider, owner],
                )?;
            }

            tx.commit()?;

            info!(
                "Unmatch {} by {}: {} matches, {} decisions removed",
                match_id,
                user_id,
                removed_matches.len(),
                removed_decisions
            );
            Ok(Some(UnmatchOutcome {
                removed_matches,
                removed_decisions,
            }))
        })
    }
}

fn query_decision(conn: &Connection, user_id: &str, item_id: &str) -> Result<Option<Decision>> {
    let sql = format!(
        "SELECT {} FROM decisions d WHERE d.user_id = ?1 AND d.item_id = ?2",
        DecisionRow::COLUMNS
    );
    let row = conn
        .query_row(&sql, params![user_id, item_id], |row| DecisionRow::from_row(row, 0))
        .optional()?;
    row.map(Decision::try_from).transpose()
}

/// `me` just liked `liked_item`, owned by `other`. Look for `other`'s
/// earliest like on any of `me`'s items and materialise the match, unless
/// one already links the same item pair.
///
/// Returns the match and whether it was created by this call.
fn detect_match(
    conn: &Connection,
    me: &str,
    other: &str,
    liked_item: &str,
) -> Result<(Option<Match>, bool)> {
    let reciprocal: Option<String> = conn
        .query_row(
            "SELECT d.item_id
             FROM decisions d
             JOIN items i ON i.id = d.item_id
             WHERE d.user_id = ?1 AND d.liked = 1 AND i.owner_id = ?2
             ORDER BY d.created_at ASC, d.id ASC
             LIMIT 1",
            params![other, me],
            |row| row.get(0),
        )
        .optional()?;
    let Some(my_item) = reciprocal else {
        return Ok((None, false));
    };

    let sql = format!(
        "SELECT {} FROM matches m
         WHERE (m.user1_id = ?1 AND m.user2_id = ?2 AND m.item1_id = ?3 AND m.item2_id = ?4)
            OR (m.user1_id = ?2 AND m.user2_id = ?1 AND m.item1_id = ?4 AND m.item2_id = ?3)
         LIMIT 1",
        MatchRow::COLUMNS
    );
    let existing = conn
        .query_row(&sql, params![me, other, my_item, liked_item], MatchRow::from_row)
        .optional()?;
    if let Some(row) = existing {
        return Ok((Some(Match::try_from(row)?), false));
    }

    let id = Uuid::new_v4().to_string();
    let now = now_ts();
    conn.execute(
        "INSERT INTO matches (id, user1_id, user2_id, item1_id, item2_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![id, me, other, my_item, liked_item, now],
    )?;

    let created = conn.query_row(
        &format!("SELECT {} FROM matches m WHERE m.id = ?1", MatchRow::COLUMNS),
        [&id],
        MatchRow::from_row,
    )?;
    Ok((Some(Match::try_from(created)?), true))
}

/// Delete the matches linking `me` and `other` in which `item` (owned by
/// `other`) is the item `me` liked. Rows are not canonicalised, so both
/// side orderings are checked.
fn remove_pair_matches(conn: &Connection, me: &str, other: &str, item: &str) -> Result<Vec<Uuid>> {
    const PAIR_FILTER: &str = "(user1_id = ?1 AND user2_id = ?2 AND item2_id = ?3)
                               OR (user2_id = ?1 AND user1_id = ?2 AND item1_id = ?3)";

    let ids = {
        let mut stmt = conn.prepare(&format!("SELECT id FROM matches WHERE {}", PAIR_FILTER))?;
        let ids = stmt
            .query_map(params![me, other, item], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        ids
    };

    if !ids.is_empty() {
        conn.execute(
            &format!("DELETE FROM matches WHERE {}", PAIR_FILTER),
            params![me, other, item],
        )?;
    }

    ids.iter().map(|id| parse_uuid(id)).collect()
}
