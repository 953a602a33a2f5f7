//! CRUD operations for [`User`] records.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use palaver_shared::types::Role;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::User;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new user. Fails with [`StoreError::Conflict`] when the
    /// username is taken.
    pub fn create_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, username, password_hash, role, created_at, last_login,
                                is_muted, muted_until, muted_by, muted_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                user.id.to_string(),
                user.username,
                user.password_hash,
                user.role.as_str(),
                user.created_at.to_rfc3339(),
                user.last_login.to_rfc3339(),
                user.is_muted,
                user.muted_until.map(|t| t.to_rfc3339()),
                user.muted_by.map(|u| u.to_string()),
                user.muted_reason,
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single user by UUID.
    pub fn get_user(&self, id: Uuid) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                row_to_user,
            )
            .map_err(not_found)
    }

    /// Fetch a single user by username.
    pub fn get_user_by_username(&self, username: &str) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                row_to_user,
            )
            .map_err(not_found)
    }

    /// List all users, newest first.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
        ))?;

        let rows = stmt.query_map([], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Record a successful login.
    pub fn touch_last_login(&self, id: Uuid) -> Result<()> {
        self.conn().execute(
            "UPDATE users SET last_login = ?2 WHERE id = ?1",
            params![id.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Change a user's role.
    pub fn set_role(&self, id: Uuid, role: Role) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users SET role = ?2 WHERE id = ?1",
            params![id.to_string(), role.as_str()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Mute a user. `muted_until = None` means permanent.
    pub fn set_mute(
        &self,
        id: Uuid,
        muted_by: Uuid,
        muted_until: Option<DateTime<Utc>>,
        reason: &str,
    ) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users
             SET is_muted = 1, muted_until = ?2, muted_by = ?3, muted_reason = ?4
             WHERE id = ?1",
            params![
                id.to_string(),
                muted_until.map(|t| t.to_rfc3339()),
                muted_by.to_string(),
                reason,
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Clear all four mute fields. Idempotent: clearing an unmuted user is
    /// a no-op, so concurrent expiry checks may race this safely.
    pub fn clear_mute(&self, id: Uuid) -> Result<()> {
        self.conn().execute(
            "UPDATE users
             SET is_muted = 0, muted_until = NULL, muted_by = NULL, muted_reason = NULL
             WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const USER_COLUMNS: &str = "id, username, password_hash, role, created_at, last_login, \
                            is_muted, muted_until, muted_by, muted_reason";

fn not_found(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        other => other.into(),
    }
}

/// Map a `rusqlite::Row` to a [`User`].
fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let username: String = row.get(1)?;
    let password_hash: String = row.get(2)?;
    let role_str: String = row.get(3)?;
    let created_str: String = row.get(4)?;
    let login_str: String = row.get(5)?;
    let is_muted: bool = row.get(6)?;
    let until_str: Option<String> = row.get(7)?;
    let by_str: Option<String> = row.get(8)?;
    let muted_reason: Option<String> = row.get(9)?;

    Ok(User {
        id: parse_uuid(&id_str, 0)?,
        username,
        password_hash,
        role: Role::parse(&role_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("unknown role: {role_str}").into(),
            )
        })?,
        created_at: parse_timestamp(&created_str, 4)?,
        last_login: parse_timestamp(&login_str, 5)?,
        is_muted,
        muted_until: until_str.as_deref().map(|s| parse_timestamp(s, 7)).transpose()?,
        muted_by: by_str.as_deref().map(|s| parse_uuid(s, 8)).transpose()?,
        muted_reason,
    })
}

pub(crate) fn parse_uuid(s: &str, idx: usize) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn parse_timestamp(s: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_user;

    #[test]
    fn create_and_fetch_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user("ada");
        db.create_user(&user).unwrap();

        let fetched = db.get_user(user.id).unwrap();
        assert_eq!(fetched, user);

        let by_name = db.get_user_by_username("ada").unwrap();
        assert_eq!(by_name.id, user.id);
    }

    #[test]
    fn duplicate_username_is_conflict() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&sample_user("ada")).unwrap();

        let err = db.create_user(&sample_user("ada")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[test]
    fn unknown_user_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = db.get_user(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn mute_and_clear() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user("ada");
        let admin = sample_user("root");
        db.create_user(&user).unwrap();
        db.create_user(&admin).unwrap();

        db.set_mute(user.id, admin.id, None, "spam").unwrap();
        let muted = db.get_user(user.id).unwrap();
        assert!(muted.is_muted);
        assert_eq!(muted.muted_reason.as_deref(), Some("spam"));
        assert!(muted.muted_until.is_none());

        db.clear_mute(user.id).unwrap();
        // Second clear is a harmless no-op.
        db.clear_mute(user.id).unwrap();
        let cleared = db.get_user(user.id).unwrap();
        assert!(!cleared.is_muted);
        assert!(cleared.muted_by.is_none());
        assert!(cleared.muted_reason.is_none());
    }
}
