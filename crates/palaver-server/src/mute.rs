//! Mute resolution.
//!
//! Decides whether a user may currently post. The decision itself
//! ([`evaluate`]) is pure; the effectful part -- clearing an expired mute --
//! lives in [`MuteResolver::check`] and is an idempotent write, so two
//! messages from the same user racing the check may both clear harmlessly.

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use palaver_store::{GlobalMuteStatus, StoreError, User};

use crate::api::SharedStore;

/// Fallback reason when a global mute was enabled without one.
const GLOBAL_MUTE_REASON: &str = "Global mute is enabled";

/// Fallback reason when a user was muted without one.
const USER_MUTE_REASON: &str = "You have been muted";

/// What a mute check concluded for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuteStatus {
    pub is_muted: bool,
    pub reason: Option<String>,
    pub until: Option<DateTime<Utc>>,
    pub is_global: bool,
}

impl MuteStatus {
    pub fn allowed() -> Self {
        Self {
            is_muted: false,
            reason: None,
            until: None,
            is_global: false,
        }
    }
}

/// Outcome of the pure decision step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuteDecision {
    Allowed,
    Muted {
        reason: String,
        until: Option<DateTime<Utc>>,
        is_global: bool,
    },
    /// A time-bounded mute whose deadline has passed; the caller should
    /// clear the mute fields and treat the user as allowed.
    Expired,
}

/// Pure mute decision. Ordering is a hard contract: global mute is checked
/// before, and independently of, the individual mute, and the admin
/// exemption applies only to the global mute.
pub fn evaluate(user: &User, global: &GlobalMuteStatus, now: DateTime<Utc>) -> MuteDecision {
    if !user.is_admin() && global.is_enabled {
        let reason = if global.reason.is_empty() {
            GLOBAL_MUTE_REASON.to_string()
        } else {
            global.reason.clone()
        };
        return MuteDecision::Muted {
            reason,
            until: None,
            is_global: true,
        };
    }

    if !user.is_muted {
        return MuteDecision::Allowed;
    }

    if let Some(until) = user.muted_until {
        if now > until {
            return MuteDecision::Expired;
        }
    }

    MuteDecision::Muted {
        reason: user
            .muted_reason
            .clone()
            .unwrap_or_else(|| USER_MUTE_REASON.to_string()),
        until: user.muted_until,
        is_global: false,
    }
}

/// Loads mute state from the store and applies expiry cleanup.
#[derive(Clone)]
pub struct MuteResolver {
    store: SharedStore,
}

impl MuteResolver {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Decide whether the user may post right now.
    ///
    /// An expired time-bounded mute is cleared on the spot as a side effect
    /// of this read path; the clear is idempotent, so concurrent checks for
    /// the same user are safe.
    pub async fn check(&self, user_id: Uuid) -> Result<MuteStatus, StoreError> {
        let (user, global) = {
            let db = self.store.lock().await;
            (db.get_user(user_id)?, db.global_mute()?)
        };

        match evaluate(&user, &global, Utc::now()) {
            MuteDecision::Allowed => Ok(MuteStatus::allowed()),
            MuteDecision::Expired => {
                {
                    let db = self.store.lock().await;
                    db.clear_mute(user_id)?;
                }
                info!(username = %user.username, "mute expired, cleared");
                Ok(MuteStatus::allowed())
            }
            MuteDecision::Muted {
                reason,
                until,
                is_global,
            } => Ok(MuteStatus {
                is_muted: true,
                reason: Some(reason),
                until,
                is_global,
            }),
        }
    }
}
