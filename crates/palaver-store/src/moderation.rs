//! Moderation state: word-filter terms and the global mute singleton.

use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::models::{GlobalMuteStatus, ModerationTerm};
use crate::users::{parse_timestamp, parse_uuid};

impl Database {
    // ------------------------------------------------------------------
    // Word-filter terms
    // ------------------------------------------------------------------

    /// Insert a new term. The word is stored lowercase; fails with
    /// [`StoreError::Conflict`] on a duplicate.
    ///
    /// [`StoreError::Conflict`]: crate::StoreError::Conflict
    pub fn add_term(&self, term: &ModerationTerm) -> Result<()> {
        self.conn().execute(
            "INSERT INTO moderation_terms (id, word, added_by, added_at, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                term.id.to_string(),
                term.word.to_lowercase(),
                term.added_by.to_string(),
                term.added_at.to_rfc3339(),
                term.is_active,
            ],
        )?;
        Ok(())
    }

    /// All active words, for the filter cache.
    pub fn active_term_words(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT word FROM moderation_terms WHERE is_active = 1")?;

        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut words = Vec::new();
        for row in rows {
            words.push(row?);
        }
        Ok(words)
    }

    /// Active terms with full metadata, newest first (admin listing).
    pub fn list_active_terms(&self) -> Result<Vec<ModerationTerm>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, word, added_by, added_at, is_active
             FROM moderation_terms
             WHERE is_active = 1
             ORDER BY added_at DESC",
        )?;

        let rows = stmt.query_map([], row_to_term)?;

        let mut terms = Vec::new();
        for row in rows {
            terms.push(row?);
        }
        Ok(terms)
    }

    /// Soft-deactivate a term. Returns `true` if a row was updated.
    pub fn deactivate_term(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE moderation_terms SET is_active = 0 WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Global mute
    // ------------------------------------------------------------------

    /// The current global mute status. An absent row reads as disabled.
    pub fn global_mute(&self) -> Result<GlobalMuteStatus> {
        match self.conn().query_row(
            "SELECT is_enabled, enabled_by, enabled_at, reason FROM global_mute WHERE id = 1",
            [],
            row_to_global_mute,
        ) {
            Ok(status) => Ok(status),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(GlobalMuteStatus::disabled()),
            Err(other) => Err(other.into()),
        }
    }

    /// Upsert the global mute singleton.
    pub fn set_global_mute(&self, status: &GlobalMuteStatus) -> Result<()> {
        self.conn().execute(
            "INSERT INTO global_mute (id, is_enabled, enabled_by, enabled_at, reason)
             VALUES (1, ?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 is_enabled = excluded.is_enabled,
                 enabled_by = excluded.enabled_by,
                 enabled_at = excluded.enabled_at,
                 reason = excluded.reason",
            params![
                status.is_enabled,
                status.enabled_by.map(|u| u.to_string()),
                status.enabled_at.map(|t| t.to_rfc3339()),
                status.reason,
            ],
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_term(row: &rusqlite::Row<'_>) -> rusqlite::Result<ModerationTerm> {
    let id_str: String = row.get(0)?;
    let word: String = row.get(1)?;
    let by_str: String = row.get(2)?;
    let at_str: String = row.get(3)?;
    let is_active: bool = row.get(4)?;

    Ok(ModerationTerm {
        id: parse_uuid(&id_str, 0)?,
        word,
        added_by: parse_uuid(&by_str, 2)?,
        added_at: parse_timestamp(&at_str, 3)?,
        is_active,
    })
}

fn row_to_global_mute(row: &rusqlite::Row<'_>) -> rusqlite::Result<GlobalMuteStatus> {
    let is_enabled: bool = row.get(0)?;
    let by_str: Option<String> = row.get(1)?;
    let at_str: Option<String> = row.get(2)?;
    let reason: String = row.get(3)?;

    Ok(GlobalMuteStatus {
        is_enabled,
        enabled_by: by_str.as_deref().map(|s| parse_uuid(s, 1)).transpose()?,
        enabled_at: at_str.as_deref().map(|s| parse_timestamp(s, 2)).transpose()?,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::test_support::sample_user;
    use chrono::Utc;

    fn term(word: &str, added_by: Uuid) -> ModerationTerm {
        ModerationTerm {
            id: Uuid::new_v4(),
            word: word.to_string(),
            added_by,
            added_at: Utc::now(),
            is_active: true,
        }
    }

    #[test]
    fn terms_are_stored_lowercase() {
        let db = Database::open_in_memory().unwrap();
        let admin = sample_user("root");
        db.create_user(&admin).unwrap();

        db.add_term(&term("BadWord", admin.id)).unwrap();
        assert_eq!(db.active_term_words().unwrap(), vec!["badword"]);
    }

    #[test]
    fn duplicate_term_is_conflict() {
        let db = Database::open_in_memory().unwrap();
        let admin = sample_user("root");
        db.create_user(&admin).unwrap();

        db.add_term(&term("spam", admin.id)).unwrap();
        let err = db.add_term(&term("SPAM", admin.id)).unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[test]
    fn deactivated_terms_disappear_from_active_set() {
        let db = Database::open_in_memory().unwrap();
        let admin = sample_user("root");
        db.create_user(&admin).unwrap();

        let t = term("spam", admin.id);
        db.add_term(&t).unwrap();
        assert!(db.deactivate_term(t.id).unwrap());
        assert!(db.active_term_words().unwrap().is_empty());
        assert!(db.list_active_terms().unwrap().is_empty());
    }

    #[test]
    fn global_mute_absent_row_reads_disabled() {
        let db = Database::open_in_memory().unwrap();
        let status = db.global_mute().unwrap();
        assert!(!status.is_enabled);
    }

    #[test]
    fn global_mute_upsert_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let admin = sample_user("root");
        db.create_user(&admin).unwrap();

        let enabled = GlobalMuteStatus {
            is_enabled: true,
            enabled_by: Some(admin.id),
            enabled_at: Some(Utc::now()),
            reason: "maintenance".to_string(),
        };
        db.set_global_mute(&enabled).unwrap();
        assert!(db.global_mute().unwrap().is_enabled);

        db.set_global_mute(&GlobalMuteStatus::disabled()).unwrap();
        let status = db.global_mute().unwrap();
        assert!(!status.is_enabled);
        assert!(status.enabled_by.is_none());
    }
}
