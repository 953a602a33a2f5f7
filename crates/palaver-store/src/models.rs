//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to API responses where the wire shape matches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use palaver_shared::types::{MessageKind, Role};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered account, including its moderation (mute) state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    /// Unique display name, 2-20 characters.
    pub username: String,
    /// bcrypt hash; never leaves the store layer.
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
    /// Whether the user is currently muted.
    pub is_muted: bool,
    /// End of a time-bounded mute. `None` while muted means permanent.
    pub muted_until: Option<DateTime<Utc>>,
    /// Admin who issued the mute.
    pub muted_by: Option<Uuid>,
    pub muted_reason: Option<String>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// A named room messages belong to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    pub id: Uuid,
    /// Unique name, 2-50 characters.
    pub name: String,
    pub description: String,
    pub icon: String,
    /// Exactly one channel carries this flag after initialization; new users
    /// auto-join it and nobody may leave it.
    pub is_default: bool,
    /// `None` for the system-created default channel.
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Channel membership
// ---------------------------------------------------------------------------

/// The join relation between a user and a channel, unique per pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelMember {
    pub user_id: Uuid,
    pub channel_id: Uuid,
    pub joined_at: DateTime<Utc>,
    pub last_read_at: DateTime<Utc>,
}

impl ChannelMember {
    /// A membership created right now.
    pub fn new(user_id: Uuid, channel_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            channel_id,
            joined_at: now,
            last_read_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub channel_id: Uuid,
    /// `None` for AI-authored messages.
    pub user_id: Option<Uuid>,
    /// Sender display name, denormalized at send time.
    pub username: String,
    pub body: String,
    pub kind: MessageKind,
    pub is_deleted: bool,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Moderation term
// ---------------------------------------------------------------------------

/// A disallowed word or phrase, stored lowercase. Only active terms are
/// enforced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModerationTerm {
    pub id: Uuid,
    pub word: String,
    pub added_by: Uuid,
    pub added_at: DateTime<Utc>,
    pub is_active: bool,
}

// ---------------------------------------------------------------------------
// Global mute
// ---------------------------------------------------------------------------

/// Singleton lockdown switch. An absent row is equivalent to disabled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GlobalMuteStatus {
    pub is_enabled: bool,
    pub enabled_by: Option<Uuid>,
    pub enabled_at: Option<DateTime<Utc>>,
    pub reason: String,
}

impl GlobalMuteStatus {
    pub fn disabled() -> Self {
        Self {
            is_enabled: false,
            enabled_by: None,
            enabled_at: None,
            reason: String::new(),
        }
    }
}
