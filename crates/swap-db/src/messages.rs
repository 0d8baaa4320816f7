use anyhow::Result;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use swap_types::models::Message;

use crate::models::{MessageRow, parse_ts};
use crate::queries::query_match_for;
use crate::{Database, format_ts};

impl Database {
    /// Append a message to a match's log. Returns `None` when `sender_id`
    /// is not a participant of the match.
    pub fn post_message(
        &self,
        sender_id: Uuid,
        match_id: Uuid,
        content: &str,
    ) -> Result<Option<Message>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if query_match_for(&tx, sender_id, match_id)?.is_none() {
                return Ok(None);
            }

            let created_at = next_timestamp(&tx, match_id)?;
            let message = Message {
                id: Uuid::new_v4(),
                match_id,
                sender_id,
                content: content.to_string(),
                created_at,
                read: false,
            };

            tx.execute(
                "INSERT INTO messages (id, match_id, sender_id, content, created_at, read)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                params![
                    message.id.to_string(),
                    match_id.to_string(),
                    sender_id.to_string(),
                    message.content,
                    format_ts(&created_at),
                ],
            )?;
            tx.commit()?;

            Ok(Some(message))
        })
    }

    /// Messages of a match, oldest first, optionally only those strictly
    /// newer than `since`.
    ///
    /// Reading is what produces read receipts: every unread message from
    /// the counterpart in the returned batch is flagged read in the same
    /// transaction, and the batch reflects the new state. Returns `None`
    /// when `reader_id` is not a participant.
    pub fn read_messages(
        &self,
        reader_id: Uuid,
        match_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<Vec<Message>>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if query_match_for(&tx, reader_id, match_id)?.is_none() {
                return Ok(None);
            }

            let mut messages = query_messages(&tx, match_id, since.as_ref())?;

            let unread: Vec<String> = messages
                .iter()
                .filter(|m| m.sender_id != reader_id && !m.read)
                .map(|m| m.id.to_string())
                .collect();

            if !unread.is_empty() {
                let placeholders: Vec<String> =
                    (2..=unread.len() + 1).map(|i| format!("?{}", i)).collect();
                let sql = format!(
                    "UPDATE messages SET read = 1 WHERE match_id = ?1 AND id IN ({})",
                    placeholders.join(", ")
                );

                let match_param = match_id.to_string();
                let mut bound: Vec<&dyn rusqlite::types::ToSql> = vec![&match_param];
                bound.extend(unread.iter().map(|id| id as &dyn rusqlite::types::ToSql));
                tx.execute(&sql, bound.as_slice())?;

                for message in messages.iter_mut().filter(|m| m.sender_id != reader_id) {
                    message.read = true;
                }
            }

            tx.commit()?;
            Ok(Some(messages))
        })
    }

    #[cfg(test)]
    pub(crate) fn message_count(&self, match_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE match_id = ?1",
                [match_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }
}

fn query_messages(
    conn: &Connection,
    match_id: Uuid,
    since: Option<&DateTime<Utc>>,
) -> Result<Vec<Message>> {
    let match_param = match_id.to_string();
    let rows = match since {
        Some(since) => {
            let sql = format!(
                "SELECT {} FROM messages WHERE match_id = ?1 AND created_at > ?2
                 ORDER BY created_at ASC, id ASC",
                MessageRow::COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![match_param, format_ts(since)], MessageRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let sql = format!(
                "SELECT {} FROM messages WHERE match_id = ?1 ORDER BY created_at ASC, id ASC",
                MessageRow::COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([&match_param], MessageRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
    };

    rows.into_iter().map(Message::try_from).collect()
}

/// Creation time for the next message of a match. Strictly later than the
/// previous one so that "since <timestamp>" cursors never skip a message
/// that shares a clock tick with its predecessor.
fn next_timestamp(conn: &Connection, match_id: Uuid) -> Result<DateTime<Utc>> {
    let last: Option<String> = conn.query_row(
        "SELECT MAX(created_at) FROM messages WHERE match_id = ?1",
        [match_id.to_string()],
        |row| row.get(0),
    )?;

    // Stored with microsecond precision; compare at the same precision
    let now = Utc::now().trunc_subsecs(6);
    let Some(last) = last else {
        return Ok(now);
    };
    let last = parse_ts(&last)?;
    Ok(if now > last { now } else { last + Duration::microseconds(1) })
}
