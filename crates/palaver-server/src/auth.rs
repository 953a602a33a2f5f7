//! Authentication: password hashing, signed tokens, and the auth endpoints.
//!
//! The token and hash primitives are opaque to the rest of the server: the
//! session and route layers only ever call [`issue_token`] / [`verify_token`]
//! and the bcrypt helpers here.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use palaver_shared::constants::{
    PASSWORD_MIN_LEN, TOKEN_VALIDITY_DAYS, USERNAME_MAX_LEN, USERNAME_MIN_LEN,
};
use palaver_shared::types::Role;
use palaver_store::{ChannelMember, StoreError, User};

use crate::api::{AppState, SharedStore};
use crate::error::ApiError;

/// Claims carried by the signed token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: Uuid,
    pub username: String,
    /// Expiry, seconds since the epoch.
    pub exp: usize,
}

/// The authenticated identity attached to a request or connection.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
}

/// Sign a token for a user, valid for seven days.
pub fn issue_token(secret: &str, user: &User) -> Result<String, ApiError> {
    let exp = (Utc::now() + Duration::days(TOKEN_VALIDITY_DAYS)).timestamp() as usize;
    let claims = Claims {
        sub: user.id,
        username: user.username.clone(),
        exp,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("Token signing failed: {e}")))
}

/// Verify a token and extract the identity it carries.
pub fn verify_token(secret: &str, token: &str) -> Result<Identity, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized("Invalid authentication token".into()))?;

    Ok(Identity {
        user_id: data.claims.sub,
        username: data.claims.username,
    })
}

/// Extract and verify the bearer token from request headers.
pub fn authenticate(headers: &HeaderMap, secret: &str) -> Result<Identity, ApiError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);
    if token.is_empty() {
        return Err(ApiError::Unauthorized(
            "No authentication token provided".into(),
        ));
    }

    verify_token(secret, token)
}

/// Load the caller's user record and require the admin role.
pub async fn require_admin(store: &SharedStore, identity: &Identity) -> Result<User, ApiError> {
    let user = {
        let db = store.lock().await;
        db.get_user(identity.user_id)?
    };

    if !user.is_admin() {
        return Err(ApiError::Forbidden("Admin privileges required".into()));
    }
    Ok(user)
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: Uuid,
    pub username: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let username = req.username.trim().to_string();

    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Username and password are required".into(),
        ));
    }
    if username.len() < USERNAME_MIN_LEN || username.len() > USERNAME_MAX_LEN {
        return Err(ApiError::BadRequest(format!(
            "Username must be {USERNAME_MIN_LEN}-{USERNAME_MAX_LEN} characters"
        )));
    }
    if req.password.len() < PASSWORD_MIN_LEN {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {PASSWORD_MIN_LEN} characters"
        )));
    }

    let password_hash = bcrypt::hash(&req.password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::Internal(format!("Password hashing failed: {e}")))?;

    let role = if state.config.admin_users.iter().any(|a| a == &username) {
        Role::Admin
    } else {
        Role::User
    };

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        username: username.clone(),
        password_hash,
        role,
        created_at: now,
        last_login: now,
        is_muted: false,
        muted_until: None,
        muted_by: None,
        muted_reason: None,
    };

    {
        let db = state.store.lock().await;
        match db.create_user(&user) {
            Err(StoreError::Conflict) => {
                return Err(ApiError::Conflict("Username already exists".into()))
            }
            other => other?,
        }

        // Every account starts in the default channel.
        if let Some(default) = db.default_channel()? {
            db.ensure_member(&ChannelMember::new(user.id, default.id))?;
        }
    }

    let token = issue_token(&state.config.jwt_secret, &user)?;

    info!(username = %user.username, role = %user.role, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: UserInfo {
                id: user.id,
                username: user.username,
            },
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Username and password are required".into(),
        ));
    }

    // One uniform error for unknown-user and wrong-password, so login
    // attempts cannot probe which usernames exist.
    let invalid = || ApiError::Unauthorized("Invalid username or password".into());

    let user = {
        let db = state.store.lock().await;
        match db.get_user_by_username(req.username.trim()) {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Err(invalid()),
            Err(e) => return Err(e.into()),
        }
    };

    let matches = bcrypt::verify(&req.password, &user.password_hash)
        .map_err(|e| ApiError::Internal(format!("Password verification failed: {e}")))?;
    if !matches {
        return Err(invalid());
    }

    {
        let db = state.store.lock().await;
        db.touch_last_login(user.id)?;
    }

    let token = issue_token(&state.config.jwt_secret, &user)?;

    info!(username = %user.username, "user logged in");

    Ok(Json(AuthResponse {
        token,
        user: UserInfo {
            id: user.id,
            username: user.username,
        },
    }))
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub user: UserInfo,
}

/// GET /api/auth/verify
pub async fn verify(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let identity = authenticate(&headers, &state.config.jwt_secret)?;

    let user = {
        let db = state.store.lock().await;
        match db.get_user(identity.user_id) {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Err(ApiError::NotFound("Unknown user".into())),
            Err(e) => return Err(e.into()),
        }
    };

    Ok(Json(VerifyResponse {
        user: UserInfo {
            id: user.id,
            username: user.username,
        },
    }))
}
