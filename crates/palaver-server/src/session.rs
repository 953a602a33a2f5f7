//! Per-connection channel session.
//!
//! Lifecycle: `Connecting -> Authenticated -> Ready -> Closed`. The token is
//! checked at upgrade time, before any session state exists; once accepted,
//! the session registers presence, subscribes the connection to one room per
//! joined channel, pushes the initial snapshot, and then processes client
//! events in arrival order until the transport drops.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use palaver_shared::constants::ASSISTANT_PREFIX;
use palaver_shared::events::{ClientEvent, InitialData, MessagePayload, ServerEvent};
use palaver_shared::types::MessageKind;
use palaver_store::Message;

use crate::api::AppState;
use crate::assistant;
use crate::auth::{self, Identity};
use crate::channels::channel_summary;
use crate::error::ApiError;
use crate::rooms::ConnectionId;

#[derive(Deserialize)]
pub struct WsParams {
    token: Option<String>,
}

/// GET /ws -- authenticate the handshake, then upgrade.
///
/// The credential arrives out-of-band as a query parameter; a missing or
/// invalid token rejects the HTTP upgrade outright, so no partial session
/// ever exists.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let identity = match params.token.as_deref() {
        None => {
            return ApiError::Unauthorized("No authentication token provided".into())
                .into_response()
        }
        Some(token) => match auth::verify_token(&state.config.jwt_secret, token) {
            Ok(identity) => identity,
            Err(e) => return e.into_response(),
        },
    };

    ws.on_upgrade(move |socket| run_session(state, identity, socket))
}

async fn run_session(state: AppState, identity: Identity, socket: WebSocket) {
    let conn_id: ConnectionId = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.rooms.register(conn_id, tx).await;

    info!(username = %identity.username, conn = %conn_id, "connection established");

    if let Err(e) = init_session(&state, &identity, conn_id).await {
        error!(error = %e, username = %identity.username, "session init failed");
        state
            .rooms
            .send_to(
                conn_id,
                ServerEvent::Error {
                    message: "Connection setup failed".to_string(),
                },
            )
            .await;
    }

    let (mut sink, mut stream) = socket.split();

    // Outbound pump: events queued by the routers become JSON text frames.
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let frame = match event.to_json() {
                Ok(frame) => frame,
                Err(_) => continue,
            };
            if sink.send(WsMessage::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = stream.next().await {
        match frame {
            WsMessage::Text(text) => match ClientEvent::from_json(&text) {
                Ok(event) => dispatch_event(&state, &identity, conn_id, event).await,
                Err(_) => {
                    state
                        .rooms
                        .send_to(
                            conn_id,
                            ServerEvent::Error {
                                message: "Invalid event payload".to_string(),
                            },
                        )
                        .await;
                }
            },
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    // Ready -> Closed: unwind the derived state and tell everyone.
    state.rooms.unregister(conn_id).await;
    state.presence.remove(conn_id).await;
    let usernames = state.presence.snapshot().await;
    state
        .rooms
        .publish_to_all(ServerEvent::UserList { usernames })
        .await;
    writer.abort();

    info!(username = %identity.username, conn = %conn_id, "disconnected");
}

/// Authenticated -> Ready: presence, room subscriptions, initial snapshot,
/// join notices, presence broadcast.
pub(crate) async fn init_session(
    state: &AppState,
    identity: &Identity,
    conn_id: ConnectionId,
) -> Result<(), ApiError> {
    let (user, joined, available) = {
        let db = state.store.lock().await;
        (
            db.get_user(identity.user_id)?,
            db.channels_for_user(identity.user_id)?,
            db.available_channels(identity.user_id)?,
        )
    };

    state.presence.add(conn_id, identity.clone()).await;

    for channel in &joined {
        state.rooms.subscribe(conn_id, channel.id).await;
    }

    state
        .rooms
        .send_to(
            conn_id,
            ServerEvent::InitialData(InitialData {
                channels: joined.iter().map(channel_summary).collect(),
                available_channels: available.iter().map(channel_summary).collect(),
                is_admin: user.is_admin(),
                username: identity.username.clone(),
                user_id: identity.user_id,
            }),
        )
        .await;

    for channel in &joined {
        state
            .rooms
            .publish_to_channel(
                channel.id,
                ServerEvent::UserJoinedChannel {
                    username: identity.username.clone(),
                    channel_id: channel.id,
                },
                Some(conn_id),
            )
            .await;
    }

    let usernames = state.presence.snapshot().await;
    state
        .rooms
        .publish_to_all(ServerEvent::UserList { usernames })
        .await;

    info!(username = %identity.username, channels = joined.len(), "session ready");
    Ok(())
}

async fn dispatch_event(
    state: &AppState,
    identity: &Identity,
    conn_id: ConnectionId,
    event: ClientEvent,
) {
    match event {
        ClientEvent::SwitchChannel { channel_id } => {
            if let Err(e) = switch_channel(state, identity, conn_id, channel_id).await {
                error!(error = %e, username = %identity.username, "switch-channel failed");
                state
                    .rooms
                    .send_to(
                        conn_id,
                        ServerEvent::Error {
                            message: "Failed to switch channel".to_string(),
                        },
                    )
                    .await;
            }
        }
        ClientEvent::SendMessage {
            message,
            channel_id,
        } => {
            if let Err(e) = send_message(state, identity, conn_id, &message, channel_id).await {
                error!(error = %e, username = %identity.username, "send-message failed");
                state
                    .rooms
                    .send_to(
                        conn_id,
                        ServerEvent::Error {
                            message: "Failed to send message".to_string(),
                        },
                    )
                    .await;
            }
        }
        ClientEvent::Typing { channel_id } => {
            if let Some(channel_id) = channel_id {
                state
                    .rooms
                    .publish_to_channel(
                        channel_id,
                        ServerEvent::UserTyping {
                            username: identity.username.clone(),
                            channel_id,
                        },
                        Some(conn_id),
                    )
                    .await;
            }
        }
        ClientEvent::StopTyping { channel_id } => {
            if let Some(channel_id) = channel_id {
                state
                    .rooms
                    .publish_to_channel(
                        channel_id,
                        ServerEvent::UserStopTyping {
                            username: identity.username.clone(),
                            channel_id,
                        },
                        Some(conn_id),
                    )
                    .await;
            }
        }
    }
}

/// switch-channel: verify membership, then resend the recent history to the
/// requesting connection only. Other room subscriptions are untouched;
/// "current channel" is a client-display concept.
pub(crate) async fn switch_channel(
    state: &AppState,
    identity: &Identity,
    conn_id: ConnectionId,
    channel_id: Uuid,
) -> Result<(), ApiError> {
    let messages = {
        let db = state.store.lock().await;
        if !db.is_member(identity.user_id, channel_id)? {
            None
        } else {
            Some(db.recent_messages(channel_id, state.config.history_limit)?)
        }
    };

    let Some(messages) = messages else {
        state
            .rooms
            .send_to(
                conn_id,
                ServerEvent::Error {
                    message: "You are not a member of this channel".to_string(),
                },
            )
            .await;
        return Ok(());
    };

    state
        .rooms
        .send_to(
            conn_id,
            ServerEvent::ChannelHistory {
                messages: messages.iter().map(message_payload).collect(),
            },
        )
        .await;

    debug!(username = %identity.username, channel = %channel_id, "switched channel");
    Ok(())
}

/// send-message admission pipeline. The validation order is a hard
/// contract: input checks, membership, AI routing, mute, word filter,
/// persist + fan out.
pub(crate) async fn send_message(
    state: &AppState,
    identity: &Identity,
    conn_id: ConnectionId,
    message: &str,
    channel_id: Option<Uuid>,
) -> Result<(), ApiError> {
    let text = message.trim();
    if text.is_empty() {
        state
            .rooms
            .send_to(
                conn_id,
                ServerEvent::Error {
                    message: "Message cannot be empty".to_string(),
                },
            )
            .await;
        return Ok(());
    }
    let Some(channel_id) = channel_id else {
        state
            .rooms
            .send_to(
                conn_id,
                ServerEvent::Error {
                    message: "No channel specified".to_string(),
                },
            )
            .await;
        return Ok(());
    };

    let member = {
        let db = state.store.lock().await;
        db.is_member(identity.user_id, channel_id)?
    };
    if !member {
        state
            .rooms
            .send_to(
                conn_id,
                ServerEvent::Error {
                    message: "You are not a member of this channel".to_string(),
                },
            )
            .await;
        return Ok(());
    }

    // AI-directed text is a command, not a broadcastable message, so the
    // moderation checks below do not apply to it.
    if let Some(prompt) = text.strip_prefix(ASSISTANT_PREFIX) {
        assistant::handle_command(state, identity, conn_id, channel_id, prompt).await;
        return Ok(());
    }

    let status = state.mutes.check(identity.user_id).await?;
    if status.is_muted {
        state
            .rooms
            .send_to(
                conn_id,
                ServerEvent::MessageBlocked {
                    reason: status
                        .reason
                        .unwrap_or_else(|| "You have been muted".to_string()),
                    is_global: status.is_global,
                },
            )
            .await;
        return Ok(());
    }

    if state.filter.contains(text).await {
        state
            .rooms
            .send_to(
                conn_id,
                ServerEvent::MessageBlocked {
                    reason: "Message contains a disallowed term".to_string(),
                    is_global: false,
                },
            )
            .await;
        return Ok(());
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
        db.insert_message(&msg)?;
    }

    // The sender's own view updates via the room broadcast, not a local
    // echo, so the room includes the sender.
    state
        .rooms
        .publish_to_channel(channel_id, ServerEvent::NewMessage(message_payload(&msg)), None)
        .await;

    debug!(channel = %channel_id, username = %identity.username, "message delivered");
    Ok(())
}

pub(crate) fn message_payload(message: &Message) -> MessagePayload {
    MessagePayload {
        id: message.id,
        username: message.username.clone(),
        user_id: message.user_id,
        message: message.body.clone(),
        timestamp: message.timestamp,
        message_type: message.kind,
        channel_id: message.channel_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SharedStore;
    use crate::assistant::AssistantClient;
    use crate::auth::{self, CredentialsRequest};
    use crate::config::ServerConfig;
    use crate::filter::ModerationCache;
    use crate::mute::MuteResolver;
    use crate::presence::PresenceRegistry;
    use crate::rooms::Rooms;
    use axum::extract::State;
    use axum::Json;
    use chrono::Duration;
    use palaver_store::{Database, GlobalMuteStatus, ModerationTerm};
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::sync::Mutex;

    fn test_state() -> AppState {
        let db = Database::open_in_memory().unwrap();
        let store: SharedStore = Arc::new(Mutex::new(db));
        AppState {
            filter: ModerationCache::new(store.clone()),
            mutes: MuteResolver::new(store.clone()),
            presence: PresenceRegistry::new(),
            rooms: Rooms::new(),
            assistant: AssistantClient::new("http://localhost:5000", "Assistant").unwrap(),
            config: Arc::new(ServerConfig::default()),
            store,
        }
    }

    async fn seed_default_channel(state: &AppState) -> Uuid {
        let channel = palaver_store::Channel {
            id: Uuid::new_v4(),
            name: "general".to_string(),
            description: String::new(),
            icon: "ph-hash".to_string(),
            is_default: true,
            created_by: None,
            created_at: Utc::now(),
        };
        state.store.lock().await.create_channel(&channel).unwrap();
        channel.id
    }

    /// Register through the real handler (hashing, auto-join, token) and
    /// attach a fake connection to the room registry.
    async fn connect_user(
        state: &AppState,
        username: &str,
    ) -> (Identity, ConnectionId, UnboundedReceiver<ServerEvent>) {
        let response = auth::register(
            State(state.clone()),
            Json(CredentialsRequest {
                username: username.to_string(),
                password: "hunter2secret".to_string(),
            }),
        )
        .await
        .unwrap();
        let identity = auth::verify_token(&state.config.jwt_secret, &response.1.token).unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let conn_id = Uuid::new_v4();
        state.rooms.register(conn_id, tx).await;
        init_session(state, &identity, conn_id).await.unwrap();
        (identity, conn_id, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn registered_user_receives_own_message_via_room() {
        let state = test_state();
        let channel_id = seed_default_channel(&state).await;
        let (identity, conn_id, mut rx) = connect_user(&state, "ada").await;

        // The initial snapshot arrives before anything else.
        let events = drain(&mut rx);
        assert!(matches!(events[0], ServerEvent::InitialData(ref d) if d.channels.len() == 1));
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::UserList { usernames } if usernames == &["ada"])));

        send_message(&state, &identity, conn_id, "hello", Some(channel_id))
            .await
            .unwrap();

        let events = drain(&mut rx);
        match &events[..] {
            [ServerEvent::NewMessage(msg)] => {
                assert_eq!(msg.username, "ada");
                assert_eq!(msg.message, "hello");
                assert_eq!(msg.message_type, MessageKind::User);
                assert_eq!(msg.channel_id, channel_id);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn muted_user_is_blocked_and_nothing_is_broadcast() {
        let state = test_state();
        let channel_id = seed_default_channel(&state).await;
        let (admin, _admin_conn, _admin_rx) = connect_user(&state, "root").await;
        let (bob, bob_conn, mut bob_rx) = connect_user(&state, "bob").await;
        let (_peer, _peer_conn, mut peer_rx) = connect_user(&state, "carol").await;

        // Permanent mute: no duration, reason "spam".
        state
            .store
            .lock()
            .await
            .set_mute(bob.user_id, admin.user_id, None, "spam")
            .unwrap();

        drain(&mut bob_rx);
        drain(&mut peer_rx);

        send_message(&state, &bob, bob_conn, "hi there", Some(channel_id))
            .await
            .unwrap();

        let events = drain(&mut bob_rx);
        match &events[..] {
            [ServerEvent::MessageBlocked { reason, is_global }] => {
                assert_eq!(reason, "spam");
                assert!(!is_global);
            }
            other => panic!("unexpected events: {other:?}"),
        }
        assert!(drain(&mut peer_rx).is_empty());

        // Nothing was persisted either.
        let stored = state
            .store
            .lock()
            .await
            .recent_messages(channel_id, 10)
            .unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn filtered_term_blocks_with_generic_reason() {
        let state = test_state();
        let channel_id = seed_default_channel(&state).await;
        let (ada, conn_id, mut rx) = connect_user(&state, "ada").await;

        // Admin path: write through, then force a refresh so the term is
        // live for the very next message.
        {
            let db = state.store.lock().await;
            db.add_term(&ModerationTerm {
                id: Uuid::new_v4(),
                word: "foo".to_string(),
                added_by: ada.user_id,
                added_at: Utc::now(),
                is_active: true,
            })
            .unwrap();
        }
        state.filter.refresh().await;

        drain(&mut rx);
        send_message(&state, &ada, conn_id, "this has foo in it", Some(channel_id))
            .await
            .unwrap();

        let events = drain(&mut rx);
        match &events[..] {
            [ServerEvent::MessageBlocked { reason, is_global }] => {
                assert_eq!(reason, "Message contains a disallowed term");
                assert!(!is_global);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn filter_matches_case_insensitively() {
        let state = test_state();
        let channel_id = seed_default_channel(&state).await;
        let (ada, conn_id, mut rx) = connect_user(&state, "ada").await;

        {
            let db = state.store.lock().await;
            db.add_term(&ModerationTerm {
                id: Uuid::new_v4(),
                word: "badword".to_string(),
                added_by: ada.user_id,
                added_at: Utc::now(),
                is_active: true,
            })
            .unwrap();
        }
        state.filter.refresh().await;

        drain(&mut rx);
        send_message(&state, &ada, conn_id, "BADWORD ahead", Some(channel_id))
            .await
            .unwrap();

        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerEvent::MessageBlocked { .. }]
        ));
    }

    #[tokio::test]
    async fn global_mute_blocks_users_but_not_admins() {
        let state = test_state();
        let channel_id = seed_default_channel(&state).await;
        let (admin, admin_conn, mut admin_rx) = connect_user(&state, "root").await;
        let (ada, ada_conn, mut ada_rx) = connect_user(&state, "ada").await;

        {
            let db = state.store.lock().await;
            db.set_role(admin.user_id, palaver_shared::types::Role::Admin)
                .unwrap();
            db.set_global_mute(&GlobalMuteStatus {
                is_enabled: true,
                enabled_by: Some(admin.user_id),
                enabled_at: Some(Utc::now()),
                reason: "lockdown".to_string(),
            })
            .unwrap();
        }

        drain(&mut ada_rx);
        drain(&mut admin_rx);

        send_message(&state, &ada, ada_conn, "hello?", Some(channel_id))
            .await
            .unwrap();
        match drain(&mut ada_rx).as_slice() {
            [ServerEvent::MessageBlocked { reason, is_global }] => {
                assert_eq!(reason, "lockdown");
                assert!(is_global);
            }
            other => panic!("unexpected events: {other:?}"),
        }

        // Admins are exempt from the global mute.
        send_message(&state, &admin, admin_conn, "announcement", Some(channel_id))
            .await
            .unwrap();
        assert!(drain(&mut admin_rx)
            .iter()
            .any(|e| matches!(e, ServerEvent::NewMessage(_))));

        // Disabling it unblocks everyone.
        state
            .store
            .lock()
            .await
            .set_global_mute(&GlobalMuteStatus::disabled())
            .unwrap();
        send_message(&state, &ada, ada_conn, "back again", Some(channel_id))
            .await
            .unwrap();
        assert!(drain(&mut ada_rx)
            .iter()
            .any(|e| matches!(e, ServerEvent::NewMessage(_))));
    }

    #[tokio::test]
    async fn expired_mute_clears_and_send_succeeds() {
        let state = test_state();
        let channel_id = seed_default_channel(&state).await;
        let (admin, _c, _r) = connect_user(&state, "root").await;
        let (bob, bob_conn, mut bob_rx) = connect_user(&state, "bob").await;

        state
            .store
            .lock()
            .await
            .set_mute(
                bob.user_id,
                admin.user_id,
                Some(Utc::now() - Duration::minutes(1)),
                "cooldown",
            )
            .unwrap();

        drain(&mut bob_rx);
        send_message(&state, &bob, bob_conn, "am I back?", Some(channel_id))
            .await
            .unwrap();

        assert!(drain(&mut bob_rx)
            .iter()
            .any(|e| matches!(e, ServerEvent::NewMessage(_))));
        let user = state.store.lock().await.get_user(bob.user_id).unwrap();
        assert!(!user.is_muted);
    }

    #[tokio::test]
    async fn switch_channel_requires_membership() {
        let state = test_state();
        seed_default_channel(&state).await;
        let (ada, conn_id, mut rx) = connect_user(&state, "ada").await;

        let private = palaver_store::Channel {
            id: Uuid::new_v4(),
            name: "private".to_string(),
            description: String::new(),
            icon: "ph-hash".to_string(),
            is_default: false,
            created_by: None,
            created_at: Utc::now(),
        };
        state.store.lock().await.create_channel(&private).unwrap();

        drain(&mut rx);
        switch_channel(&state, &ada, conn_id, private.id)
            .await
            .unwrap();

        let events = drain(&mut rx);
        match &events[..] {
            [ServerEvent::Error { message }] => {
                assert_eq!(message, "You are not a member of this channel");
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn switch_channel_returns_history_oldest_first() {
        let state = test_state();
        let channel_id = seed_default_channel(&state).await;
        let (ada, conn_id, mut rx) = connect_user(&state, "ada").await;

        for i in 0..3 {
            send_message(&state, &ada, conn_id, &format!("msg-{i}"), Some(channel_id))
                .await
                .unwrap();
        }

        drain(&mut rx);
        switch_channel(&state, &ada, conn_id, channel_id)
            .await
            .unwrap();

        let events = drain(&mut rx);
        match &events[..] {
            [ServerEvent::ChannelHistory { messages }] => {
                let bodies: Vec<&str> = messages.iter().map(|m| m.message.as_str()).collect();
                assert_eq!(bodies, vec!["msg-0", "msg-1", "msg-2"]);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_requires_membership_too() {
        let state = test_state();
        seed_default_channel(&state).await;
        let (ada, conn_id, mut rx) = connect_user(&state, "ada").await;

        let private = palaver_store::Channel {
            id: Uuid::new_v4(),
            name: "private".to_string(),
            description: String::new(),
            icon: "ph-hash".to_string(),
            is_default: false,
            created_by: None,
            created_at: Utc::now(),
        };
        state.store.lock().await.create_channel(&private).unwrap();

        drain(&mut rx);
        send_message(&state, &ada, conn_id, "sneaky", Some(private.id))
            .await
            .unwrap();

        let events = drain(&mut rx);
        assert!(matches!(&events[..], [ServerEvent::Error { .. }]));
        let stored = state
            .store
            .lock()
            .await
            .recent_messages(private.id, 10)
            .unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn empty_message_and_missing_channel_are_rejected() {
        let state = test_state();
        let channel_id = seed_default_channel(&state).await;
        let (ada, conn_id, mut rx) = connect_user(&state, "ada").await;

        drain(&mut rx);
        send_message(&state, &ada, conn_id, "   ", Some(channel_id))
            .await
            .unwrap();
        match drain(&mut rx).as_slice() {
            [ServerEvent::Error { message }] => assert_eq!(message, "Message cannot be empty"),
            other => panic!("unexpected events: {other:?}"),
        }

        send_message(&state, &ada, conn_id, "hello", None).await.unwrap();
        match drain(&mut rx).as_slice() {
            [ServerEvent::Error { message }] => assert_eq!(message, "No channel specified"),
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn typing_reaches_other_members_only() {
        let state = test_state();
        let channel_id = seed_default_channel(&state).await;
        let (ada, ada_conn, mut ada_rx) = connect_user(&state, "ada").await;
        let (_bob, _bob_conn, mut bob_rx) = connect_user(&state, "bob").await;

        drain(&mut ada_rx);
        drain(&mut bob_rx);

        dispatch_event(
            &state,
            &ada,
            ada_conn,
            ClientEvent::Typing {
                channel_id: Some(channel_id),
            },
        )
        .await;

        assert!(drain(&mut ada_rx).is_empty());
        match drain(&mut bob_rx).as_slice() {
            [ServerEvent::UserTyping { username, .. }] => assert_eq!(username, "ada"),
            other => panic!("unexpected events: {other:?}"),
        }
    }
}
