use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::StreamExt;
use serde_json::json;
use tracing::debug;

use hubbub_core::{AppState, Transport};
use hubbub_models::event;
use hubbub_models::{VoiceOp, VoiceRoomKey};
use hubbub_relay::{RateWindow, SessionToken};

use crate::limits::user_rate_limits;
use crate::session::{close_with_policy, pump_outbound, ChannelTransport};

/// Audio frames admitted per connection per second; overflow drops
/// silently without touching the hub.
const AUDIO_FRAMES_PER_SECOND: usize = 60;

pub async fn handle_voice(socket: WebSocket, state: AppState, token: String, room: String) {
    let (sink, mut receiver) = socket.split();

    let Ok(room) = room.parse::<VoiceRoomKey>() else {
        close_with_policy(sink, "room must be <guild>:<channel>").await;
        return;
    };
    let user = match state.auth.authenticate(&token).await {
        Ok(user) => user,
        Err(err) => {
            debug!(%err, "voice connection rejected");
            close_with_policy(sink, "authentication failed").await;
            return;
        }
    };
    if !state.store.can_join_voice(user.id, room).await {
        close_with_policy(sink, "not a member of this guild").await;
        return;
    }

    let (transport, outbound) = ChannelTransport::new();
    let transport = Arc::new(transport);
    tokio::spawn(pump_outbound(outbound, sink));

    let conn = state.hub.register(user.clone(), transport.clone()).await;
    let Some(join) = state.hub.join_voice(conn, room).await else {
        state.hub.disconnect(conn).await;
        return;
    };

    // Mint a datagram session if the UDP path is up.
    let dgram_token = state.voice_dgram.as_ref().map(|dgram| {
        let token = SessionToken::generate();
        dgram.table.register(token, room, user.id);
        token
    });
    let dgram_json = match (&state.voice_dgram, dgram_token) {
        (Some(dgram), Some(token)) => json!({
            "addr": dgram.public_addr,
            "token": token.to_hex(),
        }),
        _ => serde_json::Value::Null,
    };

    let ready = json!({
        "t": event::EVENT_VOICE_READY,
        "room": room.to_string(),
        "peers": join.peers,
        "active_speaker": join.active_speaker,
        "dgram": dgram_json,
    });
    if transport.send_text(&ready.to_string()).is_err() {
        if let (Some(dgram), Some(token)) = (&state.voice_dgram, dgram_token) {
            dgram.table.revoke(token);
        }
        state.hub.disconnect(conn).await;
        return;
    }
    debug!(user_id = user.id, %conn, room = %room, "voice session open");

    let mut audio_budget = RateWindow::new(AUDIO_FRAMES_PER_SECOND, Duration::from_secs(1));
    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Binary(frame) => {
                if audio_budget.allow() {
                    state.hub.relay_audio(conn, frame).await;
                }
            }
            Message::Text(text) => {
                let Ok(op) = serde_json::from_str::<VoiceOp>(&text) else {
                    let _ = transport.send_text(&event::error("unrecognized frame").to_string());
                    continue;
                };
                match op {
                    VoiceOp::VoiceBegin => {
                        if user_rate_limits().allow_voice_update(user.id) {
                            state.hub.begin_speaking(room, user.id).await;
                        }
                    }
                    VoiceOp::VoiceEnd => {
                        if user_rate_limits().allow_voice_update(user.id) {
                            state.hub.end_speaking(room, user.id).await;
                        }
                    }
                    VoiceOp::Signal { to, payload } => {
                        state.hub.relay_signal(room, user.id, to, &payload).await;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    if let (Some(dgram), Some(token)) = (&state.voice_dgram, dgram_token) {
        dgram.table.revoke(token);
    }
    state.hub.disconnect(conn).await;
    debug!(user_id = user.id, %conn, room = %room, "voice session closed");
}
