//! Admin routes: word filters, user moderation, and the global mute switch.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use palaver_shared::types::Role;
use palaver_store::{GlobalMuteStatus, ModerationTerm, StoreError};

use crate::api::AppState;
use crate::auth::{authenticate, require_admin};
use crate::error::ApiError;

/// Reason recorded when a mute request carries none.
const DEFAULT_MUTE_REASON: &str = "Violation of chat rules";

/// Reason recorded when a global mute is enabled without one.
const DEFAULT_GLOBAL_MUTE_REASON: &str = "Global mute enabled by an administrator";

// ---------------------------------------------------------------------------
// Word filters
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterResponse {
    pub id: Uuid,
    pub word: String,
    pub added_at: DateTime<Utc>,
}

fn filter_response(term: &ModerationTerm) -> FilterResponse {
    FilterResponse {
        id: term.id,
        word: term.word.clone(),
        added_at: term.added_at,
    }
}

/// GET /api/admin/word-filters -- active terms, newest first.
pub async fn list_filters(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<FilterResponse>>, ApiError> {
    let identity = authenticate(&headers, &state.config.jwt_secret)?;
    require_admin(&state.store, &identity).await?;

    let terms = {
        let db = state.store.lock().await;
        db.list_active_terms()?
    };

    Ok(Json(terms.iter().map(filter_response).collect()))
}

#[derive(Deserialize)]
pub struct AddFilterRequest {
    pub word: String,
}

#[derive(Serialize)]
pub struct AddFilterResponse {
    pub message: &'static str,
    pub filter: FilterResponse,
}

/// POST /api/admin/word-filters -- add a term. Writes through to the store,
/// then forces a cache refresh so the term is enforced on the very next
/// message instead of after the TTL.
pub async fn add_filter(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<AddFilterRequest>,
) -> Result<(StatusCode, Json<AddFilterResponse>), ApiError> {
    let identity = authenticate(&headers, &state.config.jwt_secret)?;
    require_admin(&state.store, &identity).await?;

    let word = req.word.trim().to_lowercase();
    if word.is_empty() {
        return Err(ApiError::BadRequest("Filter word cannot be empty".into()));
    }

    let term = ModerationTerm {
        id: Uuid::new_v4(),
        word,
        added_by: identity.user_id,
        added_at: Utc::now(),
        is_active: true,
    };

    {
        let db = state.store.lock().await;
        match db.add_term(&term) {
            Err(StoreError::Conflict) => {
                return Err(ApiError::Conflict("That filter word already exists".into()))
            }
            other => other?,
        }
    }
    state.filter.refresh().await;

    info!(word = %term.word, added_by = %identity.username, "filter word added");

    Ok((
        StatusCode::CREATED,
        Json(AddFilterResponse {
            message: "Filter word added",
            filter: filter_response(&term),
        }),
    ))
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// DELETE /api/admin/word-filters/{id} -- soft-deactivate a term, then force
/// a cache refresh.
pub async fn remove_filter(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(filter_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let identity = authenticate(&headers, &state.config.jwt_secret)?;
    require_admin(&state.store, &identity).await?;

    let removed = {
        let db = state.store.lock().await;
        db.deactivate_term(filter_id)?
    };
    if !removed {
        return Err(ApiError::NotFound("Unknown filter id".into()));
    }
    state.filter.refresh().await;

    info!(filter = %filter_id, removed_by = %identity.username, "filter word removed");

    Ok(Json(MessageResponse {
        message: "Filter word removed",
    }))
}

// ---------------------------------------------------------------------------
// Users and mutes
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserResponse {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub is_muted: bool,
    pub muted_until: Option<DateTime<Utc>>,
    pub muted_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// GET /api/admin/users -- every account with its mute state, newest first.
pub async fn list_users(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<AdminUserResponse>>, ApiError> {
    let identity = authenticate(&headers, &state.config.jwt_secret)?;
    require_admin(&state.store, &identity).await?;

    let users = {
        let db = state.store.lock().await;
        db.list_users()?
    };

    Ok(Json(
        users
            .into_iter()
            .map(|u| AdminUserResponse {
                id: u.id,
                username: u.username,
                role: u.role,
                is_muted: u.is_muted,
                muted_until: u.muted_until,
                muted_reason: u.muted_reason,
                created_at: u.created_at,
            })
            .collect(),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuteUserRequest {
    pub user_id: Uuid,
    /// Mute duration in minutes; zero or absent means permanent.
    pub duration: Option<i64>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MuteUserResponse {
    pub message: &'static str,
    pub muted_until: Option<DateTime<Utc>>,
}

/// POST /api/admin/mute-user
pub async fn mute_user(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<MuteUserRequest>,
) -> Result<Json<MuteUserResponse>, ApiError> {
    let identity = authenticate(&headers, &state.config.jwt_secret)?;
    require_admin(&state.store, &identity).await?;

    let muted_until = match req.duration {
        Some(minutes) if minutes > 0 => Some(Utc::now() + Duration::minutes(minutes)),
        _ => None,
    };
    let reason = req
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MUTE_REASON.to_string());

    {
        let db = state.store.lock().await;
        let target = match db.get_user(req.user_id) {
            Err(StoreError::NotFound) => return Err(ApiError::NotFound("User not found".into())),
            other => other?,
        };

        // Admins can never be muted.
        if target.is_admin() {
            return Err(ApiError::Forbidden("Cannot mute an administrator".into()));
        }

        db.set_mute(target.id, identity.user_id, muted_until, &reason)?;
    }

    info!(
        target = %req.user_id,
        muted_by = %identity.username,
        permanent = muted_until.is_none(),
        "user muted"
    );

    Ok(Json(MuteUserResponse {
        message: "User muted",
        muted_until,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmuteUserRequest {
    pub user_id: Uuid,
}

/// POST /api/admin/unmute-user -- clears all four mute fields.
pub async fn unmute_user(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<UnmuteUserRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let identity = authenticate(&headers, &state.config.jwt_secret)?;
    require_admin(&state.store, &identity).await?;

    {
        let db = state.store.lock().await;
        match db.get_user(req.user_id) {
            Err(StoreError::NotFound) => return Err(ApiError::NotFound("User not found".into())),
            other => other?,
        };
        db.clear_mute(req.user_id)?;
    }

    info!(target = %req.user_id, unmuted_by = %identity.username, "user unmuted");

    Ok(Json(MessageResponse {
        message: "User unmuted",
    }))
}

// ---------------------------------------------------------------------------
// Global mute
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct GlobalMuteRequest {
    pub enabled: bool,
    pub reason: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalMuteResponse {
    pub is_enabled: bool,
    pub reason: String,
}

/// POST /api/admin/global-mute -- flip the lockdown switch.
pub async fn set_global_mute(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<GlobalMuteRequest>,
) -> Result<Json<GlobalMuteResponse>, ApiError> {
    let identity = authenticate(&headers, &state.config.jwt_secret)?;
    require_admin(&state.store, &identity).await?;

    let status = if req.enabled {
        GlobalMuteStatus {
            is_enabled: true,
            enabled_by: Some(identity.user_id),
            enabled_at: Some(Utc::now()),
            reason: req
                .reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GLOBAL_MUTE_REASON.to_string()),
        }
    } else {
        GlobalMuteStatus::disabled()
    };

    {
        let db = state.store.lock().await;
        db.set_global_mute(&status)?;
    }

    info!(
        enabled = status.is_enabled,
        changed_by = %identity.username,
        "global mute updated"
    );

    Ok(Json(GlobalMuteResponse {
        is_enabled: status.is_enabled,
        reason: status.reason,
    }))
}

/// GET /api/admin/global-mute -- readable by any authenticated user, so
/// clients can show the lockdown banner.
pub async fn global_mute_status(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<GlobalMuteResponse>, ApiError> {
    authenticate(&headers, &state.config.jwt_secret)?;

    let status = {
        let db = state.store.lock().await;
        db.global_mute()?
    };

    Ok(Json(GlobalMuteResponse {
        is_enabled: status.is_enabled,
        reason: status.reason,
    }))
}
