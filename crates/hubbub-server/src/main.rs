use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use hubbub_core::{AppState, GatewayLimits, Hub, HubConfig, VoiceDatagram};
use hubbub_models::UserProfile;
use hubbub_relay::{DatagramRelay, DatagramTable};

mod cli;
mod config;
mod mem;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("hubbub_server=info,hubbub_ws=info,hubbub_core=info,hubbub_relay=info")
            }),
        )
        .init();

    let args = cli::Args::parse();
    let config = config::Config::load(&args.config)?;

    let hub = Arc::new(Hub::new(HubConfig {
        max_voice_frame_bytes: config.gateway.max_voice_frame_bytes,
    }));

    let auth = Arc::new(mem::StaticAuth::new(config.auth.users.iter().map(|user| {
        (
            user.token.clone(),
            UserProfile {
                id: user.id,
                username: user.username.clone(),
                avatar: user.avatar.clone(),
            },
        )
    })));

    let store = Arc::new(seed_store(&config));

    let voice_dgram = if config.datagram.enabled {
        let table = Arc::new(DatagramTable::new());
        let relay = DatagramRelay::bind(&config.datagram.bind_address, table.clone()).await?;
        let public_addr = match &config.datagram.public_addr {
            Some(addr) => addr.clone(),
            None => relay.local_addr()?.to_string(),
        };
        tracing::info!(addr = %public_addr, "voice datagram relay up");
        tokio::spawn(relay.run());
        Some(VoiceDatagram { table, public_addr })
    } else {
        None
    };

    let state = AppState {
        hub,
        auth,
        store,
        limits: GatewayLimits {
            max_content_chars: config.gateway.max_content_chars,
            history_limit: config.gateway.history_limit,
        },
        voice_dgram,
    };

    let app = Router::new()
        .route("/health", get(health))
        .merge(hubbub_ws::gateway_router())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(addr = %config.server.bind_address, "hubbub listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down (ctrl-c)");
        })
        .await?;

    Ok(())
}

/// One development guild containing every configured user, a few text
/// channels, and a DM between the first two users.
fn seed_store(config: &config::Config) -> mem::MemStore {
    let store = mem::MemStore::new();
    let user_ids: Vec<i64> = config.auth.users.iter().map(|user| user.id).collect();
    store.add_guild(1, user_ids.iter().copied());
    for channel_id in [1, 2, 3] {
        store.add_channel(channel_id, 1);
    }
    if let [first, second, ..] = user_ids[..] {
        store.add_dm(1, [first, second]);
    }
    store
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "online": state.hub.online_ids().await.len(),
    }))
}
