//! # palaver-server
//!
//! Multi-channel chat server.
//!
//! This binary provides:
//! - **REST API** (axum) for registration, login, channel CRUD, and
//!   moderation administration
//! - **WebSocket gateway** carrying the real-time chat protocol: room
//!   fan-out, typing indicators, presence broadcasts
//! - **Moderation core**: cached word filter, mute resolution with
//!   auto-expiry, and the global lockdown switch
//! - **AI collaborator bridge** for `/chat` invocations

mod admin;
mod api;
mod assistant;
mod auth;
mod channels;
mod config;
mod error;
mod filter;
mod mute;
mod presence;
mod rooms;
mod session;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use palaver_shared::constants::DEFAULT_CHANNEL_ICON;
use palaver_shared::types::Role;
use palaver_store::{Channel, ChannelMember, Database, StoreError};

use crate::api::{AppState, SharedStore};
use crate::assistant::AssistantClient;
use crate::config::ServerConfig;
use crate::filter::ModerationCache;
use crate::mute::MuteResolver;
use crate::presence::PresenceRegistry;
use crate::rooms::Rooms;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,palaver_server=debug")),
        )
        .init();

    info!("Starting Palaver chat server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        addr = %config.http_addr,
        database = %config.database_path.display(),
        ai_service = %config.ai_service_url,
        default_channel = %config.default_channel,
        admins = config.admin_users.len(),
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Open the store (fatal on failure) and seed baseline data
    // -----------------------------------------------------------------------
    let database = Database::open_at(&config.database_path)?;
    let store: SharedStore = Arc::new(Mutex::new(database));
    let config = Arc::new(config);

    seed_database(&store, &config).await?;

    // -----------------------------------------------------------------------
    // 4. Initialize subsystems
    // -----------------------------------------------------------------------
    let filter = ModerationCache::new(store.clone());
    // Warm the cache so the first message does not pay the load.
    filter.refresh().await;

    let assistant = AssistantClient::new(&config.ai_service_url, &config.assistant_name)?;

    let state = AppState {
        filter,
        mutes: MuteResolver::new(store.clone()),
        presence: PresenceRegistry::new(),
        rooms: Rooms::new(),
        assistant,
        store,
        config: config.clone(),
    };

    // -----------------------------------------------------------------------
    // 5. Run the server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

/// Baseline data every deployment needs: the default channel, memberships
/// for accounts that predate it, and admin promotions from configuration.
pub(crate) async fn seed_database(
    store: &SharedStore,
    config: &ServerConfig,
) -> anyhow::Result<()> {
    let db = store.lock().await;

    let default = match db.default_channel()? {
        Some(channel) => {
            info!(name = %channel.name, "default channel already exists");
            channel
        }
        None => {
            let channel = Channel {
                id: Uuid::new_v4(),
                name: config.default_channel.clone(),
                description: "Default channel, every user joins automatically".to_string(),
                icon: DEFAULT_CHANNEL_ICON.to_string(),
                is_default: true,
                created_by: None,
                created_at: Utc::now(),
            };
            db.create_channel(&channel)?;
            info!(name = %channel.name, "created default channel");
            channel
        }
    };

    // Accounts registered before the default channel existed get joined now.
    let mut backfilled = 0;
    for user in db.list_users()? {
        if db.ensure_member(&ChannelMember::new(user.id, default.id))? {
            backfilled += 1;
        }
    }
    if backfilled > 0 {
        info!(backfilled, "joined existing users to the default channel");
    }

    for username in &config.admin_users {
        match db.get_user_by_username(username) {
            Ok(user) if !user.is_admin() => {
                db.set_role(user.id, Role::Admin)?;
                info!(username = %username, "promoted to admin");
            }
            Ok(_) => {}
            // Not registered yet; the role is granted at registration.
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ServerConfig {
        ServerConfig {
            admin_users: vec!["root".to_string()],
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn seeding_is_idempotent_and_backfills() {
        let store: SharedStore = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let config = test_config();

        // A user that exists before the first boot.
        {
            let db = store.lock().await;
            let now = Utc::now();
            db.create_user(&palaver_store::User {
                id: Uuid::new_v4(),
                username: "root".to_string(),
                password_hash: String::new(),
                role: Role::User,
                created_at: now,
                last_login: now,
                is_muted: false,
                muted_until: None,
                muted_by: None,
                muted_reason: None,
            })
            .unwrap();
        }

        seed_database(&store, &config).await.unwrap();
        seed_database(&store, &config).await.unwrap();

        let db = store.lock().await;
        let default = db.default_channel().unwrap().expect("default channel");
        assert_eq!(default.name, "general");

        let root = db.get_user_by_username("root").unwrap();
        assert!(root.is_admin());
        assert!(db.is_member(root.id, default.id).unwrap());

        // Still exactly one default channel.
        let defaults = db
            .list_channels()
            .unwrap()
            .into_iter()
            .filter(|c| c.is_default)
            .count();
        assert_eq!(defaults, 1);
    }
}
