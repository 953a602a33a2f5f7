//! AI collaborator client.
//!
//! One request/response exchange per invocation with a fixed timeout. The
//! assistant's typing indicator is raised before the call and always
//! cleared afterwards, so a timeout or refused connection never leaves a
//! dangling "is typing" state in the room.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use palaver_shared::constants::ASSISTANT_TIMEOUT_SECS;
use palaver_shared::events::{MessagePayload, ServerEvent};
use palaver_shared::types::MessageKind;
use palaver_store::Message;

use crate::api::AppState;
use crate::auth::Identity;
use crate::rooms::ConnectionId;

/// User-facing failures of the AI collaborator.
#[derive(Debug, Error)]
pub enum AssistantError {
    /// The service actively refused the connection.
    #[error("AI service is not running")]
    Unreachable,

    /// Timeout, bad status, or malformed reply.
    #[error("AI service is temporarily unavailable")]
    Unavailable,
}

impl From<reqwest::Error> for AssistantError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            AssistantError::Unreachable
        } else {
            warn!(error = %e, "assistant request failed");
            AssistantError::Unavailable
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AssistantRequest<'a> {
    message: &'a str,
    channel_id: Uuid,
    username: &'a str,
}

#[derive(Deserialize)]
struct AssistantResponse {
    response: String,
}

/// HTTP client for the external AI service.
#[derive(Clone)]
pub struct AssistantClient {
    http: reqwest::Client,
    chat_url: String,
    name: String,
}

impl AssistantClient {
    pub fn new(base_url: &str, name: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(ASSISTANT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            chat_url: format!("{}/chat", base_url.trim_end_matches('/')),
            name: name.to_string(),
        })
    }

    /// Display name the assistant posts under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// One question, one answer.
    pub async fn ask(
        &self,
        message: &str,
        channel_id: Uuid,
        username: &str,
    ) -> Result<String, AssistantError> {
        let response = self
            .http
            .post(&self.chat_url)
            .json(&AssistantRequest {
                message,
                channel_id,
                username,
            })
            .send()
            .await?
            .error_for_status()?;

        let body: AssistantResponse = response.json().await?;
        Ok(body.response)
    }
}

/// Handle a `/chat ...` invocation from a session.
///
/// The prompt is a command, not a broadcastable message, so it skips the
/// moderation pipeline; the assistant's reply is trusted and not
/// re-moderated either.
pub async fn handle_command(
    state: &AppState,
    identity: &Identity,
    conn_id: ConnectionId,
    channel_id: Uuid,
    prompt: &str,
) {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        state
            .rooms
            .send_to(
                conn_id,
                ServerEvent::Error {
                    message: "Provide a message after /chat".to_string(),
                },
            )
            .await;
        return;
    }

    let name = state.assistant.name().to_string();

    // The whole room, originator included, sees the assistant typing.
    state
        .rooms
        .publish_to_channel(
            channel_id,
            ServerEvent::UserTyping {
                username: name.clone(),
                channel_id,
            },
            None,
        )
        .await;

    let result = state.assistant.ask(prompt, channel_id, &identity.username).await;

    // Cleared on success and on every failure path.
    state
        .rooms
        .publish_to_channel(
            channel_id,
            ServerEvent::UserStopTyping {
                username: name.clone(),
                channel_id,
            },
            None,
        )
        .await;

    match result {
        Ok(reply) => {
            let message = Message {
                id: Uuid::new_v4(),
                channel_id,
                user_id: None,
                username: name,
                body: reply,
                kind: MessageKind::Ai,
                is_deleted: false,
                timestamp: Utc::now(),
            };

            let stored = {
                let db = state.store.lock().await;
                db.insert_message(&message)
            };
            if let Err(e) = stored {
                error!(error = %e, "failed to persist assistant reply");
                state
                    .rooms
                    .send_to(
                        conn_id,
                        ServerEvent::Error {
                            message: "Failed to send message".to_string(),
                        },
                    )
                    .await;
                return;
            }

            state
                .rooms
                .publish_to_channel(
                    channel_id,
                    ServerEvent::NewMessage(MessagePayload {
                        id: message.id,
                        username: message.username.clone(),
                        user_id: None,
                        message: message.body.clone(),
                        timestamp: message.timestamp,
                        message_type: MessageKind::Ai,
                        channel_id,
                    }),
                    None,
                )
                .await;

            info!(channel = %channel_id, asked_by = %identity.username, "assistant replied");
        }
        Err(e) => {
            state
                .rooms
                .send_to(
                    conn_id,
                    ServerEvent::Error {
                        message: e.to_string(),
                    },
                )
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_payload_uses_camel_case() {
        let req = AssistantRequest {
            message: "hello",
            channel_id: Uuid::new_v4(),
            username: "ada",
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"channelId\""));
        assert!(json.contains("\"username\":\"ada\""));
    }

    #[test]
    fn chat_url_strips_trailing_slash() {
        let client = AssistantClient::new("http://localhost:5000/", "Assistant").unwrap();
        assert_eq!(client.chat_url, "http://localhost:5000/chat");
    }
}
