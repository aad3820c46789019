use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::RngCore;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use hubbub_models::VoiceRoomKey;

/// Fixed wire size of [`DatagramHeader`].
pub const HEADER_SIZE: usize = 32;

/// Fixed wire size of [`ForwardHeader`].
pub const FORWARD_HEADER_SIZE: usize = 24;

/// Datagrams above this size are dropped without relaying.
pub const MAX_DATAGRAM_BYTES: usize = 65_536;

/// How long an address-table entry stays valid without traffic.
const PEER_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("datagram shorter than header ({0} bytes)")]
    Truncated(usize),
    #[error("datagram exceeds {MAX_DATAGRAM_BYTES} bytes")]
    Oversized,
    #[error("unknown or revoked session token")]
    UnknownToken,
    #[error("token is not registered for room {0}")]
    RoomMismatch(VoiceRoomKey),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Opaque per-session credential minted when a user enters a voice
/// room. Datagram relaying is keyed by this token rather than by any
/// client-claimed identity, so a datagram can only steer the address
/// entry of the session it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken([u8; 16]);

impl SessionToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Cleartext prefix of every relay datagram:
/// 16-byte session token, then guild and channel ids as big-endian i64.
/// Everything after the header is opaque audio payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramHeader {
    pub token: SessionToken,
    pub room: VoiceRoomKey,
}

impl DatagramHeader {
    pub fn new(token: SessionToken, room: VoiceRoomKey) -> Self {
        Self { token, room }
    }

    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
        out.extend_from_slice(self.token.as_bytes());
        out.extend_from_slice(&self.room.guild_id.to_be_bytes());
        out.extend_from_slice(&self.room.channel_id.to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    /// Split a raw datagram into its header and payload.
    pub fn decode(datagram: &[u8]) -> Result<(Self, &[u8]), RelayError> {
        if datagram.len() > MAX_DATAGRAM_BYTES {
            return Err(RelayError::Oversized);
        }
        if datagram.len() < HEADER_SIZE {
            return Err(RelayError::Truncated(datagram.len()));
        }
        let mut token = [0u8; 16];
        token.copy_from_slice(&datagram[..16]);
        let guild_id = i64::from_be_bytes(datagram[16..24].try_into().expect("8-byte slice"));
        let channel_id = i64::from_be_bytes(datagram[24..32].try_into().expect("8-byte slice"));
        Ok((
            Self {
                token: SessionToken::from_bytes(token),
                room: VoiceRoomKey::new(guild_id, channel_id),
            },
            &datagram[HEADER_SIZE..],
        ))
    }
}

/// Server -> client prefix of a forwarded datagram: guild and channel
/// ids, then the sender's user id, all big-endian i64. The sender's
/// session token never leaves the server; recipients only learn who
/// is talking, not the credential behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardHeader {
    pub room: VoiceRoomKey,
    pub sender: i64,
}

impl ForwardHeader {
    pub fn new(room: VoiceRoomKey, sender: i64) -> Self {
        Self { room, sender }
    }

    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(FORWARD_HEADER_SIZE + payload.len());
        out.extend_from_slice(&self.room.guild_id.to_be_bytes());
        out.extend_from_slice(&self.room.channel_id.to_be_bytes());
        out.extend_from_slice(&self.sender.to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    pub fn decode(datagram: &[u8]) -> Result<(Self, &[u8]), RelayError> {
        if datagram.len() < FORWARD_HEADER_SIZE {
            return Err(RelayError::Truncated(datagram.len()));
        }
        let guild_id = i64::from_be_bytes(datagram[..8].try_into().expect("8-byte slice"));
        let channel_id = i64::from_be_bytes(datagram[8..16].try_into().expect("8-byte slice"));
        let sender = i64::from_be_bytes(datagram[16..24].try_into().expect("8-byte slice"));
        Ok((
            Self {
                room: VoiceRoomKey::new(guild_id, channel_id),
                sender,
            },
            &datagram[FORWARD_HEADER_SIZE..],
        ))
    }
}

#[derive(Debug, Clone)]
struct PeerEntry {
    room: VoiceRoomKey,
    user_id: i64,
    addr: Option<SocketAddr>,
    last_seen: Instant,
}

/// Address table for the datagram path.
///
/// Tokens are registered when a session joins a voice room and revoked
/// when it leaves; the peer's UDP address is learned opportunistically
/// from its most recent valid datagram. Nothing here is persisted.
#[derive(Default)]
pub struct DatagramTable {
    peers: DashMap<SessionToken, PeerEntry>,
}

impl DatagramTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a token for one voice room, bound to the user it was
    /// minted for. Re-registering moves the token to the new room and
    /// forgets the old address.
    pub fn register(&self, token: SessionToken, room: VoiceRoomKey, user_id: i64) {
        self.peers.insert(
            token,
            PeerEntry {
                room,
                user_id,
                addr: None,
                last_seen: Instant::now(),
            },
        );
    }

    pub fn revoke(&self, token: SessionToken) {
        self.peers.remove(&token);
    }

    /// Validate an inbound datagram's credentials, refresh the
    /// sender's address entry from its source address and return the
    /// user id the token was minted for.
    pub fn observe(
        &self,
        token: SessionToken,
        room: VoiceRoomKey,
        addr: SocketAddr,
    ) -> Result<i64, RelayError> {
        let mut entry = self.peers.get_mut(&token).ok_or(RelayError::UnknownToken)?;
        if entry.room != room {
            return Err(RelayError::RoomMismatch(room));
        }
        entry.addr = Some(addr);
        entry.last_seen = Instant::now();
        Ok(entry.user_id)
    }

    /// Addresses of every other live member of `room`.
    pub fn targets(&self, room: VoiceRoomKey, sender: SessionToken) -> Vec<SocketAddr> {
        let now = Instant::now();
        self.peers
            .iter()
            .filter(|entry| {
                *entry.key() != sender
                    && entry.room == room
                    && now.duration_since(entry.last_seen) <= PEER_TTL
            })
            .filter_map(|entry| entry.addr)
            .collect()
    }

    /// Drop entries that have gone silent past the TTL.
    pub fn prune_stale(&self) {
        let now = Instant::now();
        self.peers
            .retain(|_, entry| now.duration_since(entry.last_seen) <= PEER_TTL);
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// UDP fan-out loop for the datagram path.
///
/// Each inbound datagram is validated against the table, its token
/// header rewritten into a [`ForwardHeader`], and the result sent to
/// every other member of its room. Invalid datagrams are dropped
/// without a reply; one bad sender never stalls relaying for the rest
/// of the room.
pub struct DatagramRelay {
    socket: UdpSocket,
    table: Arc<DatagramTable>,
}

impl DatagramRelay {
    pub async fn bind(addr: &str, table: Arc<DatagramTable>) -> Result<Self, RelayError> {
        let socket = UdpSocket::bind(addr).await?;
        info!(addr = %socket.local_addr()?, "datagram relay listening");
        Ok(Self { socket, table })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.socket.local_addr()?)
    }

    pub async fn run(self) {
        let mut buf = vec![0u8; MAX_DATAGRAM_BYTES + 1];
        let mut prune_tick = tokio::time::interval(PEER_TTL);
        loop {
            tokio::select! {
                recv = self.socket.recv_from(&mut buf) => {
                    let (len, src) = match recv {
                        Ok(pair) => pair,
                        Err(err) => {
                            warn!(%err, "datagram receive failed");
                            continue;
                        }
                    };
                    self.relay_one(&buf[..len], src).await;
                }
                _ = prune_tick.tick() => {
                    self.table.prune_stale();
                }
            }
        }
    }

    async fn relay_one(&self, datagram: &[u8], src: SocketAddr) {
        let (header, payload) = match DatagramHeader::decode(datagram) {
            Ok(parts) => parts,
            Err(err) => {
                debug!(%src, %err, "dropping malformed datagram");
                return;
            }
        };
        let sender = match self.table.observe(header.token, header.room, src) {
            Ok(user_id) => user_id,
            Err(err) => {
                debug!(%src, %err, "dropping unauthorized datagram");
                return;
            }
        };
        let forward = ForwardHeader::new(header.room, sender).encode(payload);
        for addr in self.table.targets(header.room, header.token) {
            if let Err(err) = self.socket.send_to(&forward, addr).await {
                debug!(%addr, %err, "datagram forward failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn header_round_trips() {
        let token = SessionToken::generate();
        let room = VoiceRoomKey::new(7, 42);
        let wire = DatagramHeader::new(token, room).encode(b"opus");
        let (header, payload) = DatagramHeader::decode(&wire).unwrap();
        assert_eq!(header.token, token);
        assert_eq!(header.room, room);
        assert_eq!(payload, b"opus");
    }

    #[test]
    fn decode_rejects_short_and_oversized() {
        assert!(matches!(
            DatagramHeader::decode(&[0u8; 10]),
            Err(RelayError::Truncated(10))
        ));
        let huge = vec![0u8; MAX_DATAGRAM_BYTES + 1];
        assert!(matches!(
            DatagramHeader::decode(&huge),
            Err(RelayError::Oversized)
        ));
    }

    #[test]
    fn observe_requires_registration() {
        let table = DatagramTable::new();
        let token = SessionToken::generate();
        let room = VoiceRoomKey::new(1, 2);
        assert!(matches!(
            table.observe(token, room, addr(4000)),
            Err(RelayError::UnknownToken)
        ));

        table.register(token, room, 41);
        assert_eq!(table.observe(token, room, addr(4000)).unwrap(), 41);

        // A token only works for the room it was minted for.
        assert!(matches!(
            table.observe(token, VoiceRoomKey::new(1, 3), addr(4000)),
            Err(RelayError::RoomMismatch(_))
        ));
    }

    #[test]
    fn targets_exclude_sender_and_other_rooms() {
        let table = DatagramTable::new();
        let room_a = VoiceRoomKey::new(1, 1);
        let room_b = VoiceRoomKey::new(1, 2);
        let (t1, t2, t3) = (
            SessionToken::generate(),
            SessionToken::generate(),
            SessionToken::generate(),
        );
        table.register(t1, room_a, 1);
        table.register(t2, room_a, 2);
        table.register(t3, room_b, 3);
        table.observe(t1, room_a, addr(4001)).unwrap();
        table.observe(t2, room_a, addr(4002)).unwrap();
        table.observe(t3, room_b, addr(4003)).unwrap();

        let targets = table.targets(room_a, t1);
        assert_eq!(targets, vec![addr(4002)]);
    }

    #[test]
    fn registered_but_silent_peer_has_no_address() {
        let table = DatagramTable::new();
        let room = VoiceRoomKey::new(1, 1);
        let (t1, t2) = (SessionToken::generate(), SessionToken::generate());
        table.register(t1, room, 1);
        table.register(t2, room, 2);
        table.observe(t1, room, addr(4001)).unwrap();
        // t2 never sent a datagram, so it cannot be targeted yet.
        assert!(table.targets(room, t1).is_empty());
    }

    #[test]
    fn revoke_removes_peer() {
        let table = DatagramTable::new();
        let room = VoiceRoomKey::new(1, 1);
        let token = SessionToken::generate();
        table.register(token, room, 1);
        table.revoke(token);
        assert!(table.is_empty());
        assert!(matches!(
            table.observe(token, room, addr(4000)),
            Err(RelayError::UnknownToken)
        ));
    }

    #[test]
    fn token_hex_is_stable() {
        let token = SessionToken::from_bytes([0xab; 16]);
        assert_eq!(token.to_hex(), "ab".repeat(16));
    }

    #[tokio::test]
    async fn forwarded_datagrams_carry_the_sender_id_not_the_token() {
        let table = Arc::new(DatagramTable::new());
        let relay = DatagramRelay::bind("127.0.0.1:0", table.clone())
            .await
            .unwrap();
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let room = VoiceRoomKey::new(1, 1);
        let (sender_tok, recv_tok) = (SessionToken::generate(), SessionToken::generate());
        table.register(sender_tok, room, 41);
        table.register(recv_tok, room, 42);
        table
            .observe(recv_tok, room, receiver.local_addr().unwrap())
            .unwrap();

        let wire = DatagramHeader::new(sender_tok, room).encode(b"opus");
        relay.relay_one(&wire, addr(50_000)).await;

        let mut buf = [0u8; 128];
        let (len, _) = tokio::time::timeout(Duration::from_secs(5), receiver.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let (forward, payload) = ForwardHeader::decode(&buf[..len]).unwrap();
        assert_eq!(forward.room, room);
        assert_eq!(forward.sender, 41);
        assert_eq!(payload, b"opus");
        assert_eq!(len, FORWARD_HEADER_SIZE + 4);
    }

    #[test]
    fn forward_header_round_trips() {
        let room = VoiceRoomKey::new(9, 3);
        let wire = ForwardHeader::new(room, 77).encode(b"pcm");
        let (header, payload) = ForwardHeader::decode(&wire).unwrap();
        assert_eq!(header, ForwardHeader::new(room, 77));
        assert_eq!(payload, b"pcm");
        assert!(matches!(
            ForwardHeader::decode(&wire[..10]),
            Err(RelayError::Truncated(10))
        ));
    }
}
