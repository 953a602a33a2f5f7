//! Word-filter cache.
//!
//! Serves "does this text contain a disallowed term" without hitting the
//! store on every message. The active term set is loaded wholesale and
//! replaced under a write lock, so readers see either the old set or the
//! fully new one, never a partial view.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use palaver_shared::constants::FILTER_CACHE_TTL_SECS;

use crate::api::SharedStore;

#[derive(Debug, Default)]
struct CacheState {
    /// Active terms, lowercase.
    terms: Vec<String>,
    /// When the set was last loaded from the store. `None` until the first
    /// successful refresh.
    last_refreshed: Option<Instant>,
}

impl CacheState {
    /// Whether the cached set needs a reload: never refreshed, empty, or
    /// older than the TTL.
    fn is_stale(&self, now: Instant, ttl: Duration) -> bool {
        match self.last_refreshed {
            None => true,
            Some(at) => self.terms.is_empty() || now.duration_since(at) > ttl,
        }
    }
}

/// Time-expiring cache of active moderation terms.
#[derive(Clone)]
pub struct ModerationCache {
    store: SharedStore,
    ttl: Duration,
    inner: Arc<RwLock<CacheState>>,
}

impl ModerationCache {
    pub fn new(store: SharedStore) -> Self {
        Self::with_ttl(store, Duration::from_secs(FILTER_CACHE_TTL_SECS))
    }

    pub fn with_ttl(store: SharedStore, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            inner: Arc::new(RwLock::new(CacheState::default())),
        }
    }

    /// Reload the set when it is stale.
    pub async fn ensure_fresh(&self) {
        let stale = {
            let state = self.inner.read().await;
            state.is_stale(Instant::now(), self.ttl)
        };
        if stale {
            self.refresh().await;
        }
    }

    /// Reload the active terms from the store, replacing the set atomically.
    ///
    /// Called unconditionally after an admin adds or deactivates a term, so
    /// the change is live for the very next message instead of after the
    /// TTL. A store failure keeps the previous contents in place (fail open
    /// to last-known-good rather than fail closed).
    pub async fn refresh(&self) {
        let loaded = {
            let db = self.store.lock().await;
            db.active_term_words()
        };

        match loaded {
            Ok(words) => {
                let terms: Vec<String> = words.into_iter().map(|w| w.to_lowercase()).collect();
                let mut state = self.inner.write().await;
                debug!(count = terms.len(), "word filter cache refreshed");
                state.terms = terms;
                state.last_refreshed = Some(Instant::now());
            }
            Err(e) => {
                warn!(error = %e, "word filter refresh failed, keeping previous terms");
            }
        }
    }

    /// Case-insensitive substring test against every cached term.
    ///
    /// O(terms x text length); term lists are small and messages are short.
    pub async fn contains(&self, text: &str) -> bool {
        self.ensure_fresh().await;

        let lower = text.to_lowercase();
        let state = self.inner.read().await;
        state.terms.iter().any(|term| lower.contains(term.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use palaver_shared::types::Role;
    use palaver_store::{Database, ModerationTerm, User};
    use tokio::sync::Mutex;
    use uuid::Uuid;

    fn store_with_terms(words: &[&str]) -> SharedStore {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let admin = User {
            id: Uuid::new_v4(),
            username: "root".to_string(),
            password_hash: String::new(),
            role: Role::Admin,
            created_at: now,
            last_login: now,
            is_muted: false,
            muted_until: None,
            muted_by: None,
            muted_reason: None,
        };
        db.create_user(&admin).unwrap();
        for word in words {
            db.add_term(&ModerationTerm {
                id: Uuid::new_v4(),
                word: word.to_string(),
                added_by: admin.id,
                added_at: now,
                is_active: true,
            })
            .unwrap();
        }
        Arc::new(Mutex::new(db))
    }

    #[tokio::test]
    async fn contains_is_case_insensitive_substring() {
        let cache = ModerationCache::new(store_with_terms(&["badword"]));
        assert!(cache.contains("this has BADWORD in it").await);
        assert!(cache.contains("prefixbadwordsuffix").await);
        assert!(!cache.contains("perfectly fine").await);
    }

    #[tokio::test]
    async fn admin_write_is_visible_after_forced_refresh() {
        let store = store_with_terms(&["existing"]);
        let cache = ModerationCache::new(store.clone());
        assert!(!cache.contains("foo bar").await);

        {
            let db = store.lock().await;
            let admin = db.get_user_by_username("root").unwrap();
            db.add_term(&ModerationTerm {
                id: Uuid::new_v4(),
                word: "foo".to_string(),
                added_by: admin.id,
                added_at: Utc::now(),
                is_active: true,
            })
            .unwrap();
        }

        // The set is non-empty and the TTL has not elapsed, so the new term
        // is not seen until the forced refresh.
        assert!(!cache.contains("foo bar").await);
        cache.refresh().await;
        assert!(cache.contains("foo bar").await);
    }

    #[tokio::test]
    async fn refresh_failure_keeps_previous_terms() {
        let store = store_with_terms(&["badword"]);
        let cache = ModerationCache::new(store.clone());
        cache.refresh().await;
        assert!(cache.contains("badword").await);

        // Break the store so the next reload fails.
        {
            let db = store.lock().await;
            db.conn().execute_batch("DROP TABLE moderation_terms").unwrap();
        }
        cache.refresh().await;

        // Fail open: the last-known-good set still filters.
        assert!(cache.contains("badword").await);
    }

    #[tokio::test]
    async fn stale_predicate_drives_reload() {
        let store = store_with_terms(&[]);
        let cache = ModerationCache::with_ttl(store.clone(), Duration::from_secs(0));
        assert!(!cache.contains("badword").await);

        // No forced refresh here: the zero TTL marks the set stale, so the
        // next check reloads on its own.
        {
            let db = store.lock().await;
            let admin = db.get_user_by_username("root").unwrap();
            db.add_term(&ModerationTerm {
                id: Uuid::new_v4(),
                word: "badword".to_string(),
                added_by: admin.id,
                added_at: Utc::now(),
                is_active: true,
            })
            .unwrap();
        }

        assert!(cache.contains("BadWord!").await);
    }
}
