//! The membership directory: which channels a user belongs to.

use rusqlite::params;
use uuid::Uuid;

use crate::channels::{row_to_channel, CHANNEL_COLUMNS};
use crate::database::Database;
use crate::error::Result;
use crate::models::{Channel, ChannelMember};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a membership. Fails with [`StoreError::Conflict`] when the
    /// (user, channel) pair already exists.
    ///
    /// [`StoreError::Conflict`]: crate::StoreError::Conflict
    pub fn add_member(&self, member: &ChannelMember) -> Result<()> {
        self.conn().execute(
            "INSERT INTO channel_members (user_id, channel_id, joined_at, last_read_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                member.user_id.to_string(),
                member.channel_id.to_string(),
                member.joined_at.to_rfc3339(),
                member.last_read_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Insert a membership if it does not already exist. Returns `true` when
    /// a row was inserted. Used by registration and startup backfill, where
    /// an existing membership is not an error.
    pub fn ensure_member(&self, member: &ChannelMember) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO channel_members (user_id, channel_id, joined_at, last_read_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                member.user_id.to_string(),
                member.channel_id.to_string(),
                member.joined_at.to_rfc3339(),
                member.last_read_at.to_rfc3339(),
            ],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Whether the user belongs to the channel.
    pub fn is_member(&self, user_id: Uuid, channel_id: Uuid) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM channel_members WHERE user_id = ?1 AND channel_id = ?2",
            params![user_id.to_string(), channel_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Channels the user has joined, default channel first, then name
    /// ascending. Memberships pointing at deleted channels are dropped by
    /// the join rather than surfaced as errors.
    pub fn channels_for_user(&self, user_id: Uuid) -> Result<Vec<Channel>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels
             JOIN channel_members ON channel_members.channel_id = channels.id
             WHERE channel_members.user_id = ?1
             ORDER BY channels.is_default DESC, channels.name ASC"
        ))?;

        let rows = stmt.query_map(params![user_id.to_string()], row_to_channel)?;

        let mut channels = Vec::new();
        for row in rows {
            channels.push(row?);
        }
        Ok(channels)
    }

    /// Channels the user has not joined yet, same ordering as
    /// [`channels_for_user`](Self::channels_for_user).
    pub fn available_channels(&self, user_id: Uuid) -> Result<Vec<Channel>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels
             WHERE id NOT IN (SELECT channel_id FROM channel_members WHERE user_id = ?1)
             ORDER BY is_default DESC, name ASC"
        ))?;

        let rows = stmt.query_map(params![user_id.to_string()], row_to_channel)?;

        let mut channels = Vec::new();
        for row in rows {
            channels.push(row?);
        }
        Ok(channels)
    }

    /// Fetch the membership row for a (user, channel) pair, if any.
    pub fn membership(&self, user_id: Uuid, channel_id: Uuid) -> Result<Option<ChannelMember>> {
        match self.conn().query_row(
            "SELECT user_id, channel_id, joined_at, last_read_at
             FROM channel_members WHERE user_id = ?1 AND channel_id = ?2",
            params![user_id.to_string(), channel_id.to_string()],
            row_to_member,
        ) {
            Ok(member) => Ok(Some(member)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(other) => Err(other.into()),
        }
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a membership. Returns `true` if a row was deleted; removing a
    /// non-membership is a no-op, not an error.
    pub fn remove_member(&self, user_id: Uuid, channel_id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM channel_members WHERE user_id = ?1 AND channel_id = ?2",
            params![user_id.to_string(), channel_id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`ChannelMember`].
fn row_to_member(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChannelMember> {
    use crate::users::{parse_timestamp, parse_uuid};

    let user_str: String = row.get(0)?;
    let channel_str: String = row.get(1)?;
    let joined_str: String = row.get(2)?;
    let read_str: String = row.get(3)?;

    Ok(ChannelMember {
        user_id: parse_uuid(&user_str, 0)?,
        channel_id: parse_uuid(&channel_str, 1)?,
        joined_at: parse_timestamp(&joined_str, 2)?,
        last_read_at: parse_timestamp(&read_str, 3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::test_support::{sample_channel, sample_user};

    #[test]
    fn join_twice_is_conflict() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user("ada");
        let channel = sample_channel("general", true);
        db.create_user(&user).unwrap();
        db.create_channel(&channel).unwrap();

        db.add_member(&ChannelMember::new(user.id, channel.id))
            .unwrap();
        let err = db
            .add_member(&ChannelMember::new(user.id, channel.id))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[test]
    fn ensure_member_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user("ada");
        let channel = sample_channel("general", true);
        db.create_user(&user).unwrap();
        db.create_channel(&channel).unwrap();

        let first = ChannelMember::new(user.id, channel.id);
        assert!(db.ensure_member(&first).unwrap());
        assert!(!db
            .ensure_member(&ChannelMember::new(user.id, channel.id))
            .unwrap());

        // The original membership row survives the second insert.
        let stored = db.membership(user.id, channel.id).unwrap().unwrap();
        assert_eq!(stored, first);
        assert!(db.membership(user.id, Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn joined_and_available_partition_all_channels() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user("ada");
        let general = sample_channel("general", true);
        let rust = sample_channel("rust", false);
        let art = sample_channel("art", false);
        db.create_user(&user).unwrap();
        for ch in [&general, &rust, &art] {
            db.create_channel(ch).unwrap();
        }
        db.add_member(&ChannelMember::new(user.id, general.id))
            .unwrap();
        db.add_member(&ChannelMember::new(user.id, rust.id)).unwrap();

        let joined: Vec<String> = db
            .channels_for_user(user.id)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(joined, vec!["general", "rust"]);

        let available: Vec<String> = db
            .available_channels(user.id)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(available, vec!["art"]);
    }

    #[test]
    fn remove_member_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user("ada");
        let channel = sample_channel("general", true);
        db.create_user(&user).unwrap();
        db.create_channel(&channel).unwrap();
        db.add_member(&ChannelMember::new(user.id, channel.id))
            .unwrap();

        assert!(db.remove_member(user.id, channel.id).unwrap());
        assert!(!db.remove_member(user.id, channel.id).unwrap());
        assert!(!db.is_member(user.id, channel.id).unwrap());
    }
}
