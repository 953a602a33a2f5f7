//! Channel routes: the membership directory plus thin CRUD wrappers.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use palaver_shared::constants::{
    CHANNEL_DESC_MAX_LEN, CHANNEL_NAME_MAX_LEN, CHANNEL_NAME_MIN_LEN, DEFAULT_CHANNEL_ICON,
};
use palaver_shared::events::{ChannelSummary, MessagePayload};
use palaver_shared::types::MessageKind;
use palaver_store::{Channel, ChannelMember, Message, StoreError};

use crate::api::AppState;
use crate::auth::{authenticate, require_admin};
use crate::error::ApiError;
use crate::session::message_payload;

pub(crate) fn channel_summary(channel: &Channel) -> ChannelSummary {
    ChannelSummary {
        id: channel.id,
        name: channel.name.clone(),
        description: channel.description.clone(),
        is_default: channel.is_default,
        icon: channel.icon.clone(),
    }
}

/// GET /api/channels -- channels the caller has joined.
pub async fn list_channels(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<ChannelSummary>>, ApiError> {
    let identity = authenticate(&headers, &state.config.jwt_secret)?;

    let channels = {
        let db = state.store.lock().await;
        db.channels_for_user(identity.user_id)?
    };

    Ok(Json(channels.iter().map(channel_summary).collect()))
}

/// GET /api/channels/available -- channels the caller has not joined yet.
pub async fn available_channels(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<ChannelSummary>>, ApiError> {
    let identity = authenticate(&headers, &state.config.jwt_secret)?;

    let channels = {
        let db = state.store.lock().await;
        db.available_channels(identity.user_id)?
    };

    Ok(Json(channels.iter().map(channel_summary).collect()))
}

#[derive(Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
}

#[derive(Serialize)]
pub struct CreateChannelResponse {
    pub message: &'static str,
    pub channel: ChannelSummary,
}

/// POST /api/channels -- create a channel (admin only). The creator joins it
/// immediately.
pub async fn create_channel(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<(StatusCode, Json<CreateChannelResponse>), ApiError> {
    let identity = authenticate(&headers, &state.config.jwt_secret)?;
    require_admin(&state.store, &identity).await?;

    let name = req.name.trim().to_string();
    if name.len() < CHANNEL_NAME_MIN_LEN || name.len() > CHANNEL_NAME_MAX_LEN {
        return Err(ApiError::BadRequest(format!(
            "Channel name must be {CHANNEL_NAME_MIN_LEN}-{CHANNEL_NAME_MAX_LEN} characters"
        )));
    }
    let description = req.description.unwrap_or_default();
    if description.len() > CHANNEL_DESC_MAX_LEN {
        return Err(ApiError::BadRequest(format!(
            "Channel description is limited to {CHANNEL_DESC_MAX_LEN} characters"
        )));
    }

    let channel = Channel {
        id: Uuid::new_v4(),
        name,
        description,
        icon: req
            .icon
            .filter(|icon| !icon.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CHANNEL_ICON.to_string()),
        is_default: false,
        created_by: Some(identity.user_id),
        created_at: Utc::now(),
    };

    {
        let db = state.store.lock().await;
        match db.create_channel(&channel) {
            Err(StoreError::Conflict) => {
                return Err(ApiError::Conflict("Channel name already exists".into()))
            }
            other => other?,
        }
        db.ensure_member(&ChannelMember::new(identity.user_id, channel.id))?;
    }

    info!(channel = %channel.name, created_by = %identity.username, "channel created");

    Ok((
        StatusCode::CREATED,
        Json(CreateChannelResponse {
            message: "Channel created",
            channel: channel_summary(&channel),
        }),
    ))
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// POST /api/channels/{id}/join
pub async fn join_channel(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let identity = authenticate(&headers, &state.config.jwt_secret)?;

    {
        let db = state.store.lock().await;
        match db.get_channel(channel_id) {
            Err(StoreError::NotFound) => {
                return Err(ApiError::NotFound("Channel not found".into()))
            }
            other => other?,
        };

        match db.add_member(&ChannelMember::new(identity.user_id, channel_id)) {
            Err(StoreError::Conflict) => {
                return Err(ApiError::Conflict("Already a member of this channel".into()))
            }
            other => other?,
        }
    }

    info!(channel = %channel_id, username = %identity.username, "joined channel");

    Ok(Json(MessageResponse {
        message: "Joined channel",
    }))
}

/// POST /api/channels/{id}/leave
///
/// Leaving the default channel is forbidden; leaving a channel the caller
/// never joined is a no-op.
pub async fn leave_channel(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let identity = authenticate(&headers, &state.config.jwt_secret)?;

    {
        let db = state.store.lock().await;
        match db.get_channel(channel_id) {
            Ok(channel) if channel.is_default => {
                return Err(ApiError::BadRequest(
                    "Cannot leave the default channel".into(),
                ))
            }
            Ok(_) | Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        db.remove_member(identity.user_id, channel_id)?;
    }

    info!(channel = %channel_id, username = %identity.username, "left channel");

    Ok(Json(MessageResponse {
        message: "Left channel",
    }))
}

#[derive(Deserialize)]
pub struct HistoryParams {
    pub limit: Option<u32>,
}

/// GET /api/channels/{id}/messages -- recent history, members only.
pub async fn channel_messages(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<MessagePayload>>, ApiError> {
    let identity = authenticate(&headers, &state.config.jwt_secret)?;
    let limit = params.limit.unwrap_or(state.config.history_limit);

    let messages = {
        let db = state.store.lock().await;
        if !db.is_member(identity.user_id, channel_id)? {
            return Err(ApiError::Forbidden(
                "You are not a member of this channel".into(),
            ));
        }
        db.recent_messages(channel_id, limit)?
    };

    Ok(Json(messages.iter().map(message_payload).collect()))
}

#[derive(Deserialize)]
pub struct PostMessageRequest {
    pub message: String,
}

/// POST /api/channels/{id}/messages -- REST twin of send-message. Persists
/// without broadcasting; real-time delivery goes through the socket.
pub async fn post_message(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Json(req): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<MessagePayload>), ApiError> {
    let identity = authenticate(&headers, &state.config.jwt_secret)?;

    let text = req.message.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("Message cannot be empty".into()));
    }

    let msg = Message {
        id: Uuid::new_v4(),
        channel_id,
        user_id: Some(identity.user_id),
        username: identity.username.clone(),
        body: text.to_string(),
        kind: MessageKind::User,
        is_deleted: false,
        timestamp: Utc::now(),
    };

    {
        let db = state.store.lock().await;
        if !db.is_member(identity.user_id, channel_id)? {
            return Err(ApiError::Forbidden(
                "You are not a member of this channel".into(),
            ));
        }
        db.insert_message(&msg)?;
    }

    Ok((StatusCode::CREATED, Json(message_payload(&msg))))
}
