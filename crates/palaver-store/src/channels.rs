//! CRUD operations for [`Channel`] records.

use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Channel;
use crate::users::{parse_timestamp, parse_uuid};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new channel. Fails with [`StoreError::Conflict`] when the
    /// name is taken.
    pub fn create_channel(&self, channel: &Channel) -> Result<()> {
        self.conn().execute(
            "INSERT INTO channels (id, name, description, icon, is_default, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                channel.id.to_string(),
                channel.name,
                channel.description,
                channel.icon,
                channel.is_default,
                channel.created_by.map(|u| u.to_string()),
                channel.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single channel by UUID.
    pub fn get_channel(&self, id: Uuid) -> Result<Channel> {
        self.conn()
            .query_row(
                &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?1"),
                params![id.to_string()],
                row_to_channel,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => other.into(),
            })
    }

    /// Fetch a channel by its unique name.
    pub fn get_channel_by_name(&self, name: &str) -> Result<Channel> {
        self.conn()
            .query_row(
                &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE name = ?1"),
                params![name],
                row_to_channel,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => other.into(),
            })
    }

    /// The channel new users auto-join, if one has been seeded.
    pub fn default_channel(&self) -> Result<Option<Channel>> {
        match self.conn().query_row(
            &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE is_default = 1"),
            [],
            row_to_channel,
        ) {
            Ok(channel) => Ok(Some(channel)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(other) => Err(other.into()),
        }
    }

    /// List all channels, default channel first, then name ascending.
    pub fn list_channels(&self) -> Result<Vec<Channel>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels
             ORDER BY is_default DESC, name ASC"
        ))?;

        let rows = stmt.query_map([], row_to_channel)?;

        let mut channels = Vec::new();
        for row in rows {
            channels.push(row?);
        }
        Ok(channels)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) const CHANNEL_COLUMNS: &str =
    "id, name, description, icon, is_default, created_by, created_at";

/// Map a `rusqlite::Row` to a [`Channel`].
pub(crate) fn row_to_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
    let id_str: String = row.get(0)?;
    let name: String = row.get(1)?;
    let description: String = row.get(2)?;
    let icon: String = row.get(3)?;
    let is_default: bool = row.get(4)?;
    let created_by_str: Option<String> = row.get(5)?;
    let created_str: String = row.get(6)?;

    Ok(Channel {
        id: parse_uuid(&id_str, 0)?,
        name,
        description,
        icon,
        is_default,
        created_by: created_by_str
            .as_deref()
            .map(|s| parse_uuid(s, 5))
            .transpose()?,
        created_at: parse_timestamp(&created_str, 6)?,
    })
}
