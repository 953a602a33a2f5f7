//! Shared fixtures for the store tests.

use chrono::Utc;
use uuid::Uuid;

use palaver_shared::types::{MessageKind, Role};

use crate::models::{Channel, Message, User};

pub(crate) fn sample_user(username: &str) -> User {
    let now = Utc::now();
    User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        password_hash: "$2b$12$fixture-hash".to_string(),
        role: Role::User,
        created_at: now,
        last_login: now,
        is_muted: false,
        muted_until: None,
        muted_by: None,
        muted_reason: None,
    }
}

pub(crate) fn sample_channel(name: &str, is_default: bool) -> Channel {
    Channel {
        id: Uuid::new_v4(),
        name: name.to_string(),
        description: String::new(),
        icon: "ph-hash".to_string(),
        is_default,
        created_by: None,
        created_at: Utc::now(),
    }
}

pub(crate) fn sample_message(channel_id: Uuid, user: &User, body: &str) -> Message {
    Message {
        id: Uuid::new_v4(),
        channel_id,
        user_id: Some(user.id),
        username: user.username.clone(),
        body: body.to_string(),
        kind: MessageKind::User,
        is_deleted: false,
        timestamp: Utc::now(),
    }
}
