//! WebSocket wire protocol.
//!
//! Every frame is a JSON object `{"event": <name>, "data": {...}}` with
//! kebab-case event names and camelCase payload fields, so browser clients
//! can consume the stream without translation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::MessageKind;

/// Events a client may emit over its socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Request the recent history of a joined channel.
    #[serde(rename_all = "camelCase")]
    SwitchChannel { channel_id: Uuid },

    /// Submit a message to a channel.
    ///
    /// `channel_id` is optional at the wire level so the server can answer
    /// a missing id with a scoped error instead of a parse failure.
    #[serde(rename_all = "camelCase")]
    SendMessage {
        message: String,
        channel_id: Option<Uuid>,
    },

    /// Fire-and-forget typing indicator.
    #[serde(rename_all = "camelCase")]
    Typing { channel_id: Option<Uuid> },

    #[serde(rename_all = "camelCase")]
    StopTyping { channel_id: Option<Uuid> },
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// First frame after a successful handshake.
    InitialData(InitialData),

    /// Recent history for one channel, oldest first. Sent only to the
    /// connection that asked.
    #[serde(rename_all = "camelCase")]
    ChannelHistory { messages: Vec<MessagePayload> },

    /// A message accepted into a channel, fanned out to the whole room
    /// (including the sender).
    NewMessage(MessagePayload),

    #[serde(rename_all = "camelCase")]
    UserTyping { username: String, channel_id: Uuid },

    #[serde(rename_all = "camelCase")]
    UserStopTyping { username: String, channel_id: Uuid },

    /// Another member came online in one of the recipient's channels.
    #[serde(rename_all = "camelCase")]
    UserJoinedChannel { username: String, channel_id: Uuid },

    /// The sender's message was rejected by moderation. Sent to the sender
    /// only; the room never learns about it.
    #[serde(rename_all = "camelCase")]
    MessageBlocked { reason: String, is_global: bool },

    /// Full snapshot of online usernames, broadcast on every connect and
    /// disconnect.
    #[serde(rename_all = "camelCase")]
    UserList { usernames: Vec<String> },

    /// Scoped failure; the connection stays open.
    #[serde(rename_all = "camelCase")]
    Error { message: String },
}

/// Channel summary as shown in sidebars and the initial snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSummary {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub is_default: bool,
    pub icon: String,
}

/// Snapshot pushed once per connection, right after the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialData {
    pub channels: Vec<ChannelSummary>,
    pub available_channels: Vec<ChannelSummary>,
    pub is_admin: bool,
    pub username: String,
    pub user_id: Uuid,
}

/// A single chat message on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: Uuid,
    pub username: String,
    /// `None` for AI-authored messages.
    pub user_id: Option<Uuid>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub message_type: MessageKind,
    pub channel_id: Uuid,
}

impl ServerEvent {
    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ClientEvent {
    /// Deserialize from a JSON text frame.
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}
