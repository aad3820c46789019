use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::StreamExt;
use serde_json::json;
use tracing::{debug, warn};

use hubbub_core::store::{NewMessage, StoreError};
use hubbub_core::{AppState, ConnectionId, Transport};
use hubbub_models::event;
use hubbub_models::{ChatOp, Topic, UserProfile};

use crate::limits::user_rate_limits;
use crate::session::{close_with_policy, pump_outbound, ChannelTransport};

pub async fn handle_chat(socket: WebSocket, state: AppState, token: String) {
    let (sink, mut receiver) = socket.split();

    let user = match state.auth.authenticate(&token).await {
        Ok(user) => user,
        Err(err) => {
            debug!(%err, "chat connection rejected");
            close_with_policy(sink, "authentication failed").await;
            return;
        }
    };

    let (transport, outbound) = ChannelTransport::new();
    let transport = Arc::new(transport);
    tokio::spawn(pump_outbound(outbound, sink));

    let conn = state.hub.register(user.clone(), transport.clone()).await;
    state.hub.subscribe(conn, Topic::Presence).await;
    state.hub.broadcast_presence().await;

    let ready = json!({
        "t": event::EVENT_READY,
        "user": user,
        "online": state.hub.online_ids().await,
    });
    if transport.send_text(&ready.to_string()).is_err() {
        state.hub.disconnect(conn).await;
        return;
    }
    debug!(user_id = user.id, %conn, "chat session open");

    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => {
                let Ok(op) = serde_json::from_str::<ChatOp>(&text) else {
                    let _ = transport.send_text(&event::error("unrecognized frame").to_string());
                    continue;
                };
                handle_chat_op(op, conn, &user, &transport, &state).await;
            }
            Message::Close(_) => break,
            // Binary has no meaning on the chat socket; pings are
            // answered by axum itself.
            _ => {}
        }
    }

    state.hub.disconnect(conn).await;
    debug!(user_id = user.id, %conn, "chat session closed");
}

async fn handle_chat_op(
    op: ChatOp,
    conn: ConnectionId,
    user: &UserProfile,
    transport: &Arc<ChannelTransport>,
    state: &AppState,
) {
    match op {
        ChatOp::Ping => {
            let pong = json!({
                "t": event::EVENT_PONG,
                "ts": chrono::Utc::now().timestamp_millis(),
            });
            let _ = transport.send_text(&pong.to_string());
        }
        ChatOp::Join { kind, target_id } => {
            if !state.store.can_access(user.id, kind, target_id).await {
                let _ = transport.send_text(&event::error("not a member of this room").to_string());
                return;
            }
            state.hub.subscribe(conn, kind.topic(target_id)).await;
            match state
                .store
                .recent_messages(kind, target_id, state.limits.history_limit)
                .await
            {
                Ok(messages) => {
                    let history = json!({
                        "t": event::EVENT_HISTORY,
                        "kind": kind,
                        "target_id": target_id,
                        "messages": messages,
                    });
                    let _ = transport.send_text(&history.to_string());
                }
                Err(err) => {
                    warn!(%err, kind = ?kind, target_id, "history fetch failed");
                    let _ = transport.send_text(&event::error("history unavailable").to_string());
                }
            }
        }
        ChatOp::Leave { kind, target_id } => {
            state.hub.unsubscribe(conn, &kind.topic(target_id)).await;
        }
        ChatOp::Say {
            kind,
            target_id,
            content,
            attachments,
        } => {
            if !user_rate_limits().allow_message(user.id) {
                let _ = transport.send_text(&event::error("rate limited").to_string());
                return;
            }
            let content = clamp_content(content, state.limits.max_content_chars);
            if content.trim().is_empty() && attachments.is_empty() {
                let _ = transport.send_text(&event::error("empty message").to_string());
                return;
            }
            if !state.store.can_access(user.id, kind, target_id).await {
                let _ = transport.send_text(&event::error("not a member of this room").to_string());
                return;
            }
            let new = NewMessage {
                kind,
                target_id,
                author: user.clone(),
                content,
                attachments,
            };
            match state.store.append_message(new).await {
                Ok(message) => {
                    state
                        .hub
                        .broadcast(&kind.topic(target_id), &event::message(&message))
                        .await;
                }
                Err(err) => {
                    warn!(%err, "message append failed");
                    let _ = transport.send_text(&event::error("message not saved").to_string());
                }
            }
        }
        ChatOp::React { msg_id, emoji, add } => {
            // High-frequency op: over-budget reactions drop silently.
            if !user_rate_limits().allow_reaction(user.id) {
                debug!(user_id = user.id, "reaction rate limited (silent drop)");
                return;
            }
            let (kind, target_id) = match state.store.locate_message(msg_id).await {
                Ok(room) => room,
                Err(StoreError::UnknownMessage(_)) => {
                    let _ = transport.send_text(&event::error("unknown message").to_string());
                    return;
                }
                Err(err) => {
                    warn!(%err, msg_id, "message lookup failed");
                    return;
                }
            };
            if !state.store.can_access(user.id, kind, target_id).await {
                debug!(user_id = user.id, msg_id, "reaction on inaccessible room dropped");
                return;
            }
            match state.store.toggle_reaction(user.id, msg_id, &emoji, add).await {
                Ok(update) => {
                    state
                        .hub
                        .broadcast(
                            &kind.topic(target_id),
                            &event::reactions(update.msg_id, &update.reactions),
                        )
                        .await;
                }
                Err(StoreError::UnknownMessage(_)) => {
                    let _ = transport.send_text(&event::error("unknown message").to_string());
                }
                Err(err) => {
                    warn!(%err, msg_id, "reaction toggle failed");
                }
            }
        }
        ChatOp::Presence => {
            let online = state.hub.online_ids().await;
            let _ = transport.send_text(&event::online(&online).to_string());
        }
        ChatOp::GuildState { guild_id } => {
            if !state.store.in_guild(user.id, guild_id).await {
                let _ =
                    transport.send_text(&event::error("not a member of this guild").to_string());
                return;
            }
            // Opening a guild enters its feed, so the member list
            // reflects who currently has the guild open.
            state.hub.subscribe(conn, Topic::Guild(guild_id)).await;
            let presence = state.hub.room_presence(&Topic::Guild(guild_id)).await;
            let voice: Vec<serde_json::Value> = presence
                .voice
                .iter()
                .map(|occupancy| {
                    json!({
                        "room": occupancy.room.to_string(),
                        "user_ids": occupancy.user_ids,
                    })
                })
                .collect();
            let reply = json!({
                "t": event::EVENT_GUILD_STATE,
                "guild_id": guild_id,
                "members": presence.members,
                "voice": voice,
                "online": state.hub.online_ids().await,
            });
            let _ = transport.send_text(&reply.to_string());
        }
    }
}

/// Truncate on a character boundary; byte-indexed truncation could
/// split a multi-byte character.
fn clamp_content(content: String, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content;
    }
    content.chars().take(max_chars).collect()
}
