//! WebSocket gateway: the chat socket and the voice socket, both
//! authenticated by a `token` query parameter before the hub ever
//! sees the connection.

mod chat;
mod limits;
mod session;
mod voice;

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;

use hubbub_core::AppState;

pub fn gateway_router() -> Router<AppState> {
    Router::new()
        .route("/ws/chat", get(chat_upgrade))
        .route("/ws/voice", get(voice_upgrade))
}

#[derive(Deserialize)]
struct ChatQuery {
    #[serde(default)]
    token: String,
}

#[derive(Deserialize)]
struct VoiceQuery {
    #[serde(default)]
    token: String,
    #[serde(default)]
    room: String,
}

async fn chat_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<ChatQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| chat::handle_chat(socket, state, query.token))
}

async fn voice_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<VoiceQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| voice::handle_voice(socket, state, query.token, query.room))
}
