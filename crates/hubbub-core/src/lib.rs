//! The realtime hub: connection registry, topic subscriptions, fanout,
//! presence aggregation and voice coordination, all behind one
//! mutual-exclusion domain. Persistence, auth and the wire protocol
//! live behind the collaborator traits in [`auth`] and [`store`].

pub mod auth;
pub mod hub;
pub mod presence;
pub mod registry;
pub mod state;
pub mod store;
pub mod topics;
pub mod transport;
pub mod voice;

pub use hub::{Hub, HubConfig, VoiceJoin};
pub use state::{AppState, GatewayLimits, VoiceDatagram};
pub use transport::{ConnectionId, Transport, TransportError};
