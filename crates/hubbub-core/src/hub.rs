use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use hubbub_models::event;
use hubbub_models::{Topic, UserProfile, VoiceRoomKey};

use crate::presence::{normalize_members, RoomPresence, VoiceOccupancy};
use crate::registry::ConnectionRegistry;
use crate::topics::TopicTable;
use crate::transport::{ConnectionId, Transport};
use crate::voice::{SpeakerSlots, SpeakerTransition};

#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Binary voice frames above this size are dropped before relay.
    pub max_voice_frame_bytes: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_voice_frame_bytes: 64 * 1024,
        }
    }
}

/// What a connection gets back when it enters a voice room: the
/// current peers (excluding itself) and whoever holds the
/// push-to-talk slot.
#[derive(Debug, Clone)]
pub struct VoiceJoin {
    pub peers: Vec<UserProfile>,
    pub active_speaker: Option<i64>,
}

struct ConnEntry {
    user: UserProfile,
    transport: Arc<dyn Transport>,
    voice_room: Option<VoiceRoomKey>,
}

/// A payload serialized once, paired with the point-in-time target
/// snapshot it is headed for. Connections that subscribe after the
/// snapshot was taken do not receive the event; that race is accepted.
struct Fanout {
    targets: Vec<(ConnectionId, Arc<dyn Transport>)>,
    frame: Frame,
}

#[derive(Clone)]
enum Frame {
    Text(Arc<str>),
    Binary(Bytes),
}

impl Frame {
    fn text(event: &Value) -> Self {
        Frame::Text(event.to_string().into())
    }
}

/// Joint mutable state of the hub. Everything that presence must see
/// as one consistent view lives here, behind a single lock: partial
/// updates visible mid-transition would produce wrong occupancy.
#[derive(Default)]
struct HubState {
    registry: ConnectionRegistry,
    topics: TopicTable,
    speakers: SpeakerSlots,
    conns: HashMap<ConnectionId, ConnEntry>,
}

impl HubState {
    fn targets(&self, topic: &Topic) -> Vec<(ConnectionId, Arc<dyn Transport>)> {
        self.topics
            .subscribers(topic)
            .filter_map(|conn| {
                self.conns
                    .get(&conn)
                    .map(|entry| (conn, entry.transport.clone()))
            })
            .collect()
    }

    fn targets_except(
        &self,
        topic: &Topic,
        skip: ConnectionId,
    ) -> Vec<(ConnectionId, Arc<dyn Transport>)> {
        self.topics
            .subscribers(topic)
            .filter(|&conn| conn != skip)
            .filter_map(|conn| {
                self.conns
                    .get(&conn)
                    .map(|entry| (conn, entry.transport.clone()))
            })
            .collect()
    }

    fn fanout(&self, topic: &Topic, event: &Value) -> Fanout {
        Fanout {
            targets: self.targets(topic),
            frame: Frame::text(event),
        }
    }

    fn presence_fanout(&self) -> Fanout {
        self.fanout(&Topic::Presence, &event::online(&self.registry.online_ids()))
    }

    fn voice_occupancy(&self, room: VoiceRoomKey) -> VoiceOccupancy {
        let mut user_ids: Vec<i64> = self
            .topics
            .subscribers(&Topic::Voice(room))
            .filter_map(|conn| self.conns.get(&conn).map(|entry| entry.user.id))
            .collect();
        user_ids.sort_unstable();
        user_ids.dedup();
        VoiceOccupancy { room, user_ids }
    }

    fn user_in_voice_room(&self, room: VoiceRoomKey, user_id: i64) -> bool {
        self.topics
            .subscribers(&Topic::Voice(room))
            .any(|conn| self.conns.get(&conn).is_some_and(|e| e.user.id == user_id))
    }

    /// Take a connection out of one voice room. Broadcasts peer-left
    /// and, if the leaver held the speaker slot, the idle transition,
    /// but only once the user has no other connection in the room.
    fn leave_voice_inner(
        &mut self,
        conn: ConnectionId,
        room: VoiceRoomKey,
        user: &UserProfile,
    ) -> Vec<Fanout> {
        let topic = Topic::Voice(room);
        self.topics.unsubscribe(&topic, conn);

        let mut out = Vec::new();
        if !self.user_in_voice_room(room, user.id) {
            if self.topics.contains(&topic) {
                out.push(self.fanout(&topic, &event::peer_left(room, user.id)));
            }
            if self.speakers.end(room, user.id) && self.topics.contains(&topic) {
                out.push(self.fanout(&topic, &event::voice_active(room, None)));
            }
        }
        if !self.topics.contains(&topic) {
            self.speakers.remove_room(room);
        }
        out
    }

    /// The single teardown path: idempotent, safe to reach both from
    /// an explicit close and from a failed send during fanout. A
    /// second invocation finds no entry and does nothing.
    fn cleanup(&mut self, conn: ConnectionId) -> Vec<Fanout> {
        let Some(entry) = self.conns.remove(&conn) else {
            return Vec::new();
        };
        debug!(user_id = entry.user.id, %conn, "connection removed");

        let mut out = Vec::new();
        if let Some(room) = entry.voice_room {
            out.extend(self.leave_voice_inner(conn, room, &entry.user));
        }
        self.topics.unsubscribe_all(conn);
        self.registry.unregister(entry.user.id, conn);
        out.push(self.presence_fanout());
        out
    }
}

/// Perform the sends for a batch of fanouts, never while holding the
/// hub lock. A failure on one connection does not abort delivery to
/// the rest; failed connections are reported back for cleanup.
fn deliver(batches: Vec<Fanout>) -> Vec<ConnectionId> {
    let mut dead = Vec::new();
    for batch in batches {
        for (conn, transport) in batch.targets {
            let result = match &batch.frame {
                Frame::Text(text) => transport.send_text(text),
                Frame::Binary(data) => transport.send_binary(data.clone()),
            };
            if let Err(err) = result {
                trace!(%conn, %err, "delivery failed, connection will be reaped");
                dead.push(conn);
            }
        }
    }
    dead.sort_unstable();
    dead.dedup();
    dead
}

/// The realtime hub. All mutation is serialized through one lock; all
/// network sends happen after the lock is released, from a snapshot
/// taken under it, so one slow or broken peer can never stall
/// delivery to the rest of a room.
pub struct Hub {
    cfg: HubConfig,
    state: Mutex<HubState>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl Hub {
    pub fn new(cfg: HubConfig) -> Self {
        Self {
            cfg,
            state: Mutex::new(HubState::default()),
        }
    }

    // ── Connection registry ───────────────────────────────────────────

    /// Admit an authenticated connection. Does not broadcast anything;
    /// the caller invokes [`Hub::broadcast_presence`] afterwards so
    /// registry state can be asserted independently of fanout effects.
    pub async fn register(&self, user: UserProfile, transport: Arc<dyn Transport>) -> ConnectionId {
        let conn = ConnectionId::next();
        let mut state = self.state.lock().await;
        debug!(user_id = user.id, %conn, "connection registered");
        state.registry.register(user.id, conn);
        state.conns.insert(
            conn,
            ConnEntry {
                user,
                transport,
                voice_room: None,
            },
        );
        conn
    }

    /// Tear a connection out of every index and re-broadcast presence.
    /// Idempotent, and safe to race against an in-flight fanout that
    /// is failing on the same connection.
    pub async fn disconnect(&self, conn: ConnectionId) {
        let batches = { self.state.lock().await.cleanup(conn) };
        self.flush(batches).await;
    }

    pub async fn is_online(&self, user_id: i64) -> bool {
        self.state.lock().await.registry.is_online(user_id)
    }

    pub async fn online_ids(&self) -> Vec<i64> {
        self.state.lock().await.registry.online_ids()
    }

    // ── Topic subscriptions ───────────────────────────────────────────

    /// Subscribe a connection to a topic. Authorization is the calling
    /// handler's job; the hub only does bookkeeping. Subscribing a
    /// connection that already disconnected is a no-op.
    pub async fn subscribe(&self, conn: ConnectionId, topic: Topic) {
        let mut state = self.state.lock().await;
        if state.conns.contains_key(&conn) {
            state.topics.subscribe(topic, conn);
        }
    }

    /// Drop one subscription. A voice topic goes through the same
    /// departure path as [`Hub::leave_voice`], so remaining members
    /// still see peer-left and a released speaker slot.
    pub async fn unsubscribe(&self, conn: ConnectionId, topic: &Topic) {
        let batches = {
            let mut state = self.state.lock().await;
            match topic {
                Topic::Voice(room) => {
                    let room = *room;
                    let was_member = state.topics.is_subscribed(topic, conn);
                    match state.conns.get_mut(&conn) {
                        Some(entry) if was_member => {
                            if entry.voice_room == Some(room) {
                                entry.voice_room = None;
                            }
                            let user = entry.user.clone();
                            state.leave_voice_inner(conn, room, &user)
                        }
                        _ => {
                            state.topics.unsubscribe(topic, conn);
                            if !state.topics.contains(topic) {
                                state.speakers.remove_room(room);
                            }
                            Vec::new()
                        }
                    }
                }
                _ => {
                    state.topics.unsubscribe(topic, conn);
                    Vec::new()
                }
            }
        };
        self.flush(batches).await;
    }

    // ── Fanout engine ─────────────────────────────────────────────────

    /// Serialize `event` once and deliver it to every connection
    /// subscribed to `topic` at this instant. Connections that fail to
    /// receive are removed from all indices after the pass completes,
    /// as if they had disconnected.
    pub async fn broadcast(&self, topic: &Topic, event: &Value) {
        let batch = { self.state.lock().await.fanout(topic, event) };
        self.flush(vec![batch]).await;
    }

    /// Same delivery semantics as [`Hub::broadcast`], but targeting
    /// every connection owned by one user regardless of subscriptions.
    pub async fn send_to_user(&self, user_id: i64, event: &Value) {
        let batch = {
            let state = self.state.lock().await;
            let targets = state
                .registry
                .connections_of(user_id)
                .filter_map(|conn| {
                    state
                        .conns
                        .get(&conn)
                        .map(|entry| (conn, entry.transport.clone()))
                })
                .collect();
            Fanout {
                targets,
                frame: Frame::text(event),
            }
        };
        self.flush(vec![batch]).await;
    }

    // ── Presence aggregation ──────────────────────────────────────────

    /// Push the current online-id set to every `presence` subscriber.
    pub async fn broadcast_presence(&self) {
        let batch = { self.state.lock().await.presence_fanout() };
        self.flush(vec![batch]).await;
    }

    /// Recompute the derived occupancy view for one scope. Nothing is
    /// cached between calls.
    pub async fn room_presence(&self, topic: &Topic) -> RoomPresence {
        let state = self.state.lock().await;
        let members = normalize_members(
            state
                .topics
                .subscribers(topic)
                .filter_map(|conn| state.conns.get(&conn).map(|entry| entry.user.clone()))
                .collect(),
        );
        let voice = match topic {
            Topic::Guild(guild_id) => state
                .topics
                .voice_rooms_in_guild(*guild_id)
                .into_iter()
                .map(|room| state.voice_occupancy(room))
                .collect(),
            Topic::Voice(room) => vec![state.voice_occupancy(*room)],
            _ => Vec::new(),
        };
        RoomPresence { members, voice }
    }

    // ── Voice coordination ────────────────────────────────────────────

    /// Enter a voice room. Joining while in another room leaves that
    /// room first, so membership is always self-consistent. Existing
    /// members get a peer-joined event (only for the user's first
    /// connection in the room); returns `None` for an unknown
    /// connection.
    pub async fn join_voice(&self, conn: ConnectionId, room: VoiceRoomKey) -> Option<VoiceJoin> {
        let mut batches = Vec::new();
        let join = {
            let mut state = self.state.lock().await;
            let Some(entry) = state.conns.get_mut(&conn) else {
                return None;
            };
            let user = entry.user.clone();
            let previous = entry.voice_room.replace(room);
            if let Some(old) = previous {
                if old != room {
                    batches.extend(state.leave_voice_inner(conn, old, &user));
                }
            }

            let topic = Topic::Voice(room);
            let first_for_user = !state.user_in_voice_room(room, user.id);
            let peers = normalize_members(
                state
                    .topics
                    .subscribers(&topic)
                    .filter_map(|c| state.conns.get(&c))
                    .map(|e| e.user.clone())
                    .filter(|p| p.id != user.id)
                    .collect(),
            );
            let existing = state.targets(&topic);
            state.topics.subscribe(topic, conn);
            if first_for_user && !existing.is_empty() {
                batches.push(Fanout {
                    targets: existing,
                    frame: Frame::text(&event::peer_joined(room, &user)),
                });
            }
            VoiceJoin {
                peers,
                active_speaker: state.speakers.speaker(room),
            }
        };
        self.flush(batches).await;
        Some(join)
    }

    /// Leave the voice room this connection is in, if any.
    pub async fn leave_voice(&self, conn: ConnectionId) {
        let batches = {
            let mut state = self.state.lock().await;
            let Some(entry) = state.conns.get_mut(&conn) else {
                return;
            };
            let user = entry.user.clone();
            match entry.voice_room.take() {
                Some(room) => state.leave_voice_inner(conn, room, &user),
                None => Vec::new(),
            }
        };
        self.flush(batches).await;
    }

    /// Push-to-talk: try to take the speaker slot. Broadcasts the new
    /// active speaker only on an actual transition; a re-assert is
    /// silent and a denied attempt changes nothing.
    pub async fn begin_speaking(&self, room: VoiceRoomKey, user_id: i64) {
        let batch = {
            let mut state = self.state.lock().await;
            if !state.topics.contains(&Topic::Voice(room)) {
                return;
            }
            match state.speakers.begin(room, user_id) {
                SpeakerTransition::Granted => Some(state.fanout(
                    &Topic::Voice(room),
                    &event::voice_active(room, Some(user_id)),
                )),
                SpeakerTransition::Reasserted => None,
                SpeakerTransition::Denied { current } => {
                    trace!(user_id, current, room = %room, "speaker slot busy");
                    None
                }
            }
        };
        if let Some(batch) = batch {
            self.flush(vec![batch]).await;
        }
    }

    /// Push-to-talk: release the slot if held; broadcasts idle on the
    /// transition, no-op otherwise.
    pub async fn end_speaking(&self, room: VoiceRoomKey, user_id: i64) {
        let batch = {
            let mut state = self.state.lock().await;
            if state.speakers.end(room, user_id) {
                Some(state.fanout(&Topic::Voice(room), &event::voice_active(room, None)))
            } else {
                None
            }
        };
        if let Some(batch) = batch {
            self.flush(vec![batch]).await;
        }
    }

    /// Relay one binary audio frame to every other member of the
    /// sender's voice room, but only while the sender's user holds the
    /// speaker slot. Frames from non-speakers and frames over the size
    /// ceiling are dropped silently.
    pub async fn relay_audio(&self, conn: ConnectionId, frame: Bytes) {
        if frame.is_empty() || frame.len() > self.cfg.max_voice_frame_bytes {
            trace!(%conn, len = frame.len(), "audio frame dropped (size)");
            return;
        }
        let batch = {
            let state = self.state.lock().await;
            let Some(entry) = state.conns.get(&conn) else {
                return;
            };
            let Some(room) = entry.voice_room else {
                return;
            };
            if state.speakers.speaker(room) != Some(entry.user.id) {
                return;
            }
            Fanout {
                targets: state.targets_except(&Topic::Voice(room), conn),
                frame: Frame::Binary(frame),
            }
        };
        self.flush(vec![batch]).await;
    }

    /// Point-to-point signaling relay: deliver an opaque payload to
    /// the first connection of `to_user` currently in `room`, or drop
    /// it silently if the target is no longer a member.
    pub async fn relay_signal(
        &self,
        room: VoiceRoomKey,
        from_user: i64,
        to_user: i64,
        payload: &Value,
    ) {
        let target = {
            let state = self.state.lock().await;
            let found = state.topics.subscribers(&Topic::Voice(room)).find_map(|c| {
                state
                    .conns
                    .get(&c)
                    .filter(|entry| entry.user.id == to_user)
                    .map(|entry| (c, entry.transport.clone()))
            });
            found
        };
        let Some((conn, transport)) = target else {
            trace!(to_user, room = %room, "signal target not in room, dropped");
            return;
        };
        let frame = event::signal(room, from_user, payload).to_string();
        if transport.send_text(&frame).is_err() {
            self.reap(vec![conn]).await;
        }
    }

    // ── Failure containment ───────────────────────────────────────────

    async fn flush(&self, batches: Vec<Fanout>) {
        self.reap(deliver(batches)).await;
    }

    /// Run the disconnect path for every dead connection, then deliver
    /// the follow-up events (peer-left, idle speaker, presence) that
    /// cleanup produced, repeating until no new failures surface. The
    /// loop terminates because each pass permanently removes at least
    /// one connection.
    async fn reap(&self, mut dead: Vec<ConnectionId>) {
        while !dead.is_empty() {
            let batches = {
                let mut state = self.state.lock().await;
                let mut out = Vec::new();
                for conn in dead.drain(..) {
                    out.extend(state.cleanup(conn));
                }
                out
            };
            dead = deliver(batches);
        }
    }
}
