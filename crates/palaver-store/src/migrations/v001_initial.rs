//! v001 -- Initial schema creation.
//!
//! Creates the six core tables: `users`, `channels`, `channel_members`,
//! `messages`, `moderation_terms`, and `global_mute`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    username      TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role          TEXT NOT NULL DEFAULT 'user', -- 'user' | 'admin'
    created_at    TEXT NOT NULL,                -- ISO-8601 / RFC-3339
    last_login    TEXT NOT NULL,
    is_muted      INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1
    muted_until   TEXT,                         -- NULL = permanent (when muted)
    muted_by      TEXT,                         -- nullable FK -> users(id)
    muted_reason  TEXT
);

CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);

-- ----------------------------------------------------------------
-- Channels
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS channels (
    id          TEXT PRIMARY KEY NOT NULL,      -- UUID v4
    name        TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    icon        TEXT NOT NULL DEFAULT 'ph-hash',
    is_default  INTEGER NOT NULL DEFAULT 0,
    created_by  TEXT,                           -- NULL = system-created
    created_at  TEXT NOT NULL,

    FOREIGN KEY (created_by) REFERENCES users(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_channels_is_default ON channels(is_default);

-- ----------------------------------------------------------------
-- Channel memberships
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS channel_members (
    user_id      TEXT NOT NULL,                 -- FK -> users(id)
    channel_id   TEXT NOT NULL,                 -- FK -> channels(id)
    joined_at    TEXT NOT NULL,
    last_read_at TEXT NOT NULL,

    PRIMARY KEY (user_id, channel_id),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (channel_id) REFERENCES channels(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_members_channel ON channel_members(channel_id);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id         TEXT PRIMARY KEY NOT NULL,       -- UUID v4
    channel_id TEXT NOT NULL,                   -- FK -> channels(id)
    user_id    TEXT,                            -- NULL for AI-authored messages
    username   TEXT NOT NULL,                   -- sender display name
    body       TEXT NOT NULL,
    kind       TEXT NOT NULL DEFAULT 'user',    -- 'user' | 'system' | 'ai'
    is_deleted INTEGER NOT NULL DEFAULT 0,      -- soft delete
    timestamp  TEXT NOT NULL,                   -- ISO-8601

    FOREIGN KEY (channel_id) REFERENCES channels(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_channel_ts
    ON messages(channel_id, timestamp DESC);

CREATE INDEX IF NOT EXISTS idx_messages_user ON messages(user_id);

-- ----------------------------------------------------------------
-- Moderation terms (word filter)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS moderation_terms (
    id        TEXT PRIMARY KEY NOT NULL,        -- UUID v4
    word      TEXT NOT NULL UNIQUE,             -- stored lowercase
    added_by  TEXT NOT NULL,                    -- FK -> users(id)
    added_at  TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,

    FOREIGN KEY (added_by) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_terms_active ON moderation_terms(is_active);

-- ----------------------------------------------------------------
-- Global mute (singleton row)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS global_mute (
    id         INTEGER PRIMARY KEY CHECK (id = 1),
    is_enabled INTEGER NOT NULL DEFAULT 0,
    enabled_by TEXT,                            -- nullable FK -> users(id)
    enabled_at TEXT,
    reason     TEXT NOT NULL DEFAULT ''
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
