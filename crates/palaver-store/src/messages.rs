//! CRUD operations for [`Message`] records.

use rusqlite::params;
use uuid::Uuid;

use palaver_shared::types::MessageKind;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Message;
use crate::users::{parse_timestamp, parse_uuid};

impl Database {
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (id, channel_id, user_id, username, body, kind, is_deleted, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                message.id.to_string(),
                message.channel_id.to_string(),
                message.user_id.map(|u| u.to_string()),
                message.username,
                message.body,
                message.kind.as_str(),
                message.is_deleted,
                message.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// The newest `limit` non-deleted messages of a channel, returned
    /// oldest-first so they can be rendered top-to-bottom.
    pub fn recent_messages(&self, channel_id: Uuid, limit: u32) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, channel_id, user_id, username, body, kind, is_deleted, timestamp
             FROM messages
             WHERE channel_id = ?1 AND is_deleted = 0
             ORDER BY timestamp DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![channel_id.to_string(), limit], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        messages.reverse();
        Ok(messages)
    }

    pub fn get_message(&self, id: Uuid) -> Result<Message> {
        self.conn()
            .query_row(
                "SELECT id, channel_id, user_id, username, body, kind, is_deleted, timestamp
                 FROM messages WHERE id = ?1",
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => other.into(),
            })
    }

    /// Soft-delete a message. Returns `true` if a row was updated.
    pub fn mark_message_deleted(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET is_deleted = 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let channel_str: String = row.get(1)?;
    let user_str: Option<String> = row.get(2)?;
    let username: String = row.get(3)?;
    let body: String = row.get(4)?;
    let kind_str: String = row.get(5)?;
    let is_deleted: bool = row.get(6)?;
    let ts_str: String = row.get(7)?;

    Ok(Message {
        id: parse_uuid(&id_str, 0)?,
        channel_id: parse_uuid(&channel_str, 1)?,
        user_id: user_str.as_deref().map(|s| parse_uuid(s, 2)).transpose()?,
        username,
        body,
        kind: MessageKind::parse(&kind_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                rusqlite::types::Type::Text,
                format!("unknown message kind: {kind_str}").into(),
            )
        })?,
        is_deleted,
        timestamp: parse_timestamp(&ts_str, 7)?,
    })
}
