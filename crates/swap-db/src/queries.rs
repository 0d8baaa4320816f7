use anyhow::Result;
use rusqlite::{Connection, params};
use uuid::Uuid;

use swap_types::api::{DecisionHistoryEntry, ItemSummary, MatchSummary, UserSummary};
use swap_types::models::{Decision, Identity, Item, ItemFields, Match};

use crate::models::{
    DecisionRow, DeletedItem, ItemRow, MatchRow, Ownership, parse_ts, parse_uuid,
};
use crate::{Database, now_ts};

impl Database {
    // -- Items --

    pub fn create_item(&self, owner: &Identity, fields: &ItemFields) -> Result<Item> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            upsert_user(&tx, owner)?;

            let id = Uuid::new_v4().to_string();
            let now = now_ts();
            tx.execute(
                "INSERT INTO items (id, owner_id, name, description, location, image_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    id,
                    owner.user_id.to_string(),
                    fields.name,
                    fields.description,
                    fields.location,
                    fields.image_url,
                    now,
                ],
            )?;

            let item = query_item(&tx, &id)?
                .ok_or_else(|| anyhow::anyhow!("Item {} vanished after insert", id))?;
            tx.commit()?;
            Ok(item)
        })
    }

    /// The caller's own items, newest first.
    pub fn list_items(&self, owner_id: Uuid) -> Result<Vec<Item>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM items i WHERE i.owner_id = ?1 ORDER BY i.created_at DESC, i.rowid DESC",
                ItemRow::COLUMNS
            );
            collect_items(conn, &sql, params![owner_id.to_string()])
        })
    }

    pub fn get_item(&self, id: Uuid) -> Result<Option<Item>> {
        self.with_conn(|conn| query_item(conn, &id.to_string()))
    }

    pub fn owned_item(&self, owner_id: Uuid, id: Uuid) -> Result<Ownership<Item>> {
        Ok(match self.get_item(id)? {
            None => Ownership::Missing,
            Some(item) if item.owner_id != owner_id => Ownership::NotOwner,
            Some(item) => Ownership::Owned(item),
        })
    }

    pub fn update_item(
        &self,
        owner_id: Uuid,
        id: Uuid,
        fields: &ItemFields,
    ) -> Result<Ownership<Item>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id = id.to_string();

            match query_item(&tx, &id)? {
                None => return Ok(Ownership::Missing),
                Some(item) if item.owner_id != owner_id => return Ok(Ownership::NotOwner),
                Some(_) => {}
            }

            tx.execute(
                "UPDATE items SET name = ?2, description = ?3, location = ?4, image_url = ?5, updated_at = ?6
                 WHERE id = ?1",
                params![
                    id,
                    fields.name,
                    fields.description,
                    fields.location,
                    fields.image_url,
                    now_ts(),
                ],
            )?;

            let item = query_item(&tx, &id)?
                .ok_or_else(|| anyhow::anyhow!("Item {} vanished during update", id))?;
            tx.commit()?;
            Ok(Ownership::Owned(item))
        })
    }

    /// Deletes an item. Its decisions, matches and those matches' messages
    /// go with it through the schema's cascades.
    pub fn delete_item(&self, owner_id: Uuid, id: Uuid) -> Result<Ownership<DeletedItem>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id = id.to_string();

            let item = match query_item(&tx, &id)? {
                None => return Ok(Ownership::Missing),
                Some(item) if item.owner_id != owner_id => return Ok(Ownership::NotOwner),
                Some(item) => item,
            };

            let removed_matches = {
                let mut stmt =
                    tx.prepare("SELECT id FROM matches WHERE item1_id = ?1 OR item2_id = ?1")?;
                let ids = stmt
                    .query_map([&id], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                ids.iter().map(|m| parse_uuid(m)).collect::<Result<Vec<_>>>()?
            };

            tx.execute("DELETE FROM items WHERE id = ?1", [&id])?;
            tx.commit()?;

            Ok(Ownership::Owned(DeletedItem {
                image_url: item.image_url,
                removed_matches,
            }))
        })
    }

    // -- Feed --

    /// Items the user neither owns nor has already decided on. No cursor:
    /// the only thing that moves the window is recording decisions.
    pub fn feed(&self, user_id: Uuid, limit: u32) -> Result<Vec<Item>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM items i
                 WHERE i.owner_id != ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM decisions d WHERE d.user_id = ?1 AND d.item_id = i.id
                   )
                 ORDER BY i.created_at DESC, i.rowid DESC
                 LIMIT ?2",
                ItemRow::COLUMNS
            );
            collect_items(conn, &sql, params![user_id.to_string(), limit])
        })
    }

    // -- Decisions --

    /// The user's decisions, newest first, joined with the item and its owner.
    pub fn decision_history(&self, user_id: Uuid) -> Result<Vec<DecisionHistoryEntry>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, {}, u.id, u.name, u.image
                 FROM decisions d
                 JOIN items i ON i.id = d.item_id
                 JOIN users u ON u.id = i.owner_id
                 WHERE d.user_id = ?1
                 ORDER BY d.created_at DESC, d.id DESC",
                DecisionRow::COLUMNS,
                ItemRow::COLUMNS
            );
            let owner_at = DecisionRow::WIDTH + ItemRow::WIDTH;

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok((
                        DecisionRow::from_row(row, 0)?,
                        ItemRow::from_row(row, DecisionRow::WIDTH)?,
                        row.get::<_, String>(owner_at)?,
                        row.get::<_, String>(owner_at + 1)?,
                        row.get::<_, Option<String>>(owner_at + 2)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(decision, item, owner_id, name, image)| {
                    Ok(DecisionHistoryEntry {
                        decision: Decision::try_from(decision)?,
                        item: Item::try_from(item)?,
                        owner: UserSummary {
                            id: parse_uuid(&owner_id)?,
                            name,
                            image,
                        },
                    })
                })
                .collect()
        })
    }

    // -- Matches --

    /// Matches the user takes part in, oldest first, resolved from the
    /// user's side in a single query.
    pub fn list_matches(&self, user_id: Uuid) -> Result<Vec<MatchSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.created_at,
                        ou.id, ou.name, ou.image,
                        mi.id, mi.name, mi.image_url,
                        oi.id, oi.name, oi.image_url
                 FROM matches m
                 JOIN users ou ON ou.id = CASE WHEN m.user1_id = ?1 THEN m.user2_id ELSE m.user1_id END
                 JOIN items mi ON mi.id = CASE WHEN m.user1_id = ?1 THEN m.item1_id ELSE m.item2_id END
                 JOIN items oi ON oi.id = CASE WHEN m.user1_id = ?1 THEN m.item2_id ELSE m.item1_id END
                 WHERE m.user1_id = ?1 OR m.user2_id = ?1
                 ORDER BY m.created_at ASC, m.id ASC",
            )?;

            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok((
                        (row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                        (
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, Option<String>>(4)?,
                        ),
                        (
                            row.get::<_, String>(5)?,
                            row.get::<_, String>(6)?,
                            row.get::<_, String>(7)?,
                        ),
                        (
                            row.get::<_, String>(8)?,
                            row.get::<_, String>(9)?,
                            row.get::<_, String>(10)?,
                        ),
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|((id, created_at), (ou_id, ou_name, ou_image), mine, theirs)| {
                    Ok(MatchSummary {
                        id: parse_uuid(&id)?,
                        created_at: parse_ts(&created_at)?,
                        other_user: UserSummary {
                            id: parse_uuid(&ou_id)?,
                            name: ou_name,
                            image: ou_image,
                        },
                        user_item: item_summary(mine)?,
                        other_user_item: item_summary(theirs)?,
                    })
                })
                .collect()
        })
    }

    /// A match, only if `user_id` is one of its participants.
    pub fn find_match_for(&self, user_id: Uuid, match_id: Uuid) -> Result<Option<Match>> {
        self.with_conn(|conn| query_match_for(conn, user_id, match_id))
    }
}

pub(crate) fn upsert_user(conn: &Connection, user: &Identity) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, name, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        params![user.user_id.to_string(), user.name, now_ts()],
    )?;
    Ok(())
}

pub(crate) fn query_item(conn: &Connection, id: &str) -> Result<Option<Item>> {
    let sql = format!("SELECT {} FROM items i WHERE i.id = ?1", ItemRow::COLUMNS);
    let row = conn
        .query_row(&sql, [id], |row| ItemRow::from_row(row, 0))
        .optional()?;
    row.map(Item::try_from).transpose()
}

pub(crate) fn query_match_for(
    conn: &Connection,
    user_id: Uuid,
    match_id: Uuid,
) -> Result<Option<Match>> {
    let sql = format!(
        "SELECT {} FROM matches m WHERE m.id = ?1 AND (m.user1_id = ?2 OR m.user2_id = ?2)",
        MatchRow::COLUMNS
    );
    let row = conn
        .query_row(
            &sql,
            params![match_id.to_string(), user_id.to_string()],
            MatchRow::from_row,
        )
        .optional()?;
    row.map(Match::try_from).transpose()
}

fn item_summary((id, name, image_url): (String, String, String)) -> Result<ItemSummary> {
    Ok(ItemSummary {
        id: parse_uuid(&id)?,
        name,
        image_url,
    })
}

fn collect_items(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Item>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| ItemRow::from_row(row, 0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(Item::try_from).collect()
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
