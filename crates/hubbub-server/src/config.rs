use std::fs;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub datagram: DatagramConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".into(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_max_voice_frame_bytes")]
    pub max_voice_frame_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_content_chars: default_max_content_chars(),
            history_limit: default_history_limit(),
            max_voice_frame_bytes: default_max_voice_frame_bytes(),
        }
    }
}

/// Optional UDP voice path. Disabled unless enabled explicitly;
/// everything works over the WebSocket without it.
#[derive(Debug, Deserialize, Serialize)]
pub struct DatagramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_datagram_bind")]
    pub bind_address: String,
    /// Address advertised to clients. Defaults to the bind address,
    /// which is only right when clients can reach it directly.
    pub public_addr: Option<String>,
}

impl Default for DatagramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_datagram_bind(),
            public_addr: None,
        }
    }
}

/// Static token table. Each entry maps one bearer token to a user;
/// the default config seeds a few development users.
#[derive(Debug, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub users: Vec<StaticUser>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaticUser {
    pub token: String,
    pub id: i64,
    pub username: String,
    pub avatar: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            users: vec![
                StaticUser {
                    token: "dev-alice".into(),
                    id: 1,
                    username: "alice".into(),
                    avatar: None,
                },
                StaticUser {
                    token: "dev-bob".into(),
                    id: 2,
                    username: "bob".into(),
                    avatar: None,
                },
            ],
        }
    }
}

fn default_max_content_chars() -> usize {
    4000
}

fn default_history_limit() -> usize {
    50
}

fn default_max_voice_frame_bytes() -> usize {
    64 * 1024
}

fn default_datagram_bind() -> String {
    "0.0.0.0:8443".into()
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::info!("config file not found at '{path}', generating defaults");
            let config = Config::default();
            if let Some(parent) = std::path::Path::new(path).parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, toml::to_string_pretty(&config)?)?;
            config
        };

        // Environment variable overrides
        if let Ok(value) = std::env::var("HUBBUB_BIND_ADDRESS") {
            config.server.bind_address = value;
        }
        if let Ok(value) = std::env::var("HUBBUB_DATAGRAM_BIND_ADDRESS") {
            config.datagram.bind_address = value;
        }
        if let Ok(value) = std::env::var("HUBBUB_DATAGRAM_PUBLIC_ADDR") {
            config.datagram.public_addr = Some(value);
        }

        Ok(config)
    }
}
