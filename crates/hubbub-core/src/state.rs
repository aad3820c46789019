use std::sync::Arc;

use hubbub_relay::DatagramTable;

use crate::auth::AuthGate;
use crate::hub::Hub;
use crate::store::ChatStore;

/// Tunables the gateway handlers consult per message.
#[derive(Debug, Clone, Copy)]
pub struct GatewayLimits {
    /// Chat message content is truncated to this many characters.
    pub max_content_chars: usize,
    /// How many messages a `join` replays as history.
    pub history_limit: usize,
}

impl Default for GatewayLimits {
    fn default() -> Self {
        Self {
            max_content_chars: 4000,
            history_limit: 50,
        }
    }
}

/// Handle to the optional UDP voice path: the session table voice
/// joins mint tokens into, plus the address clients should send
/// datagrams to.
#[derive(Clone)]
pub struct VoiceDatagram {
    pub table: Arc<DatagramTable>,
    pub public_addr: String,
}

/// Shared state cloned into every gateway handler.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub auth: Arc<dyn AuthGate>,
    pub store: Arc<dyn ChatStore>,
    pub limits: GatewayLimits,
    pub voice_dgram: Option<VoiceDatagram>,
}
