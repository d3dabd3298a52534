use std::collections::HashMap;
use std::sync::Arc;

use crate::log::log_sink::LogSink;
use crate::log::noop_log_sink::NoopLogSink;
use crate::signaling::envelope::{PeerJoined, RoomStatus};
use crate::signaling::{ConnectParams, Role, RoomCode, SignalEnvelope};
use crate::{sink_debug, sink_info, sink_warn};

pub type ClientId = u64;

/// What the relay loop must do after the router handled an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Envelope { target: ClientId, envelope: SignalEnvelope },
    /// Close the connection after anything queued for it went out.
    Close { target: ClientId },
}

/// Rooms are scoped by the optional signaling channel label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RoomKey {
    channel: Option<String>,
    code: RoomCode,
}

#[derive(Default)]
struct Room {
    initiator: Option<ClientId>,
    joiner: Option<ClientId>,
    /// Latest initiator offer, followed by the candidates it sent after it.
    cached_offer: Option<SignalEnvelope>,
    cached_candidates: Vec<SignalEnvelope>,
}

impl Room {
    fn slot(&mut self, role: Role) -> &mut Option<ClientId> {
        match role {
            Role::Initiator => &mut self.initiator,
            Role::Joiner => &mut self.joiner,
        }
    }

    fn occupant(&self, role: Role) -> Option<ClientId> {
        match role {
            Role::Initiator => self.initiator,
            Role::Joiner => self.joiner,
        }
    }

    fn is_empty(&self) -> bool {
        self.initiator.is_none() && self.joiner.is_none()
    }
}

/// Pure room bookkeeping of the rendezvous relay: no sockets, no threads.
/// Every call returns the deliveries it caused, in order.
pub struct Rooms {
    rooms: HashMap<RoomKey, Room>,
    members: HashMap<ClientId, (RoomKey, Role)>,
    log: Arc<dyn LogSink>,
}

impl Default for Rooms {
    fn default() -> Self {
        Self::new(Arc::new(NoopLogSink))
    }
}

impl Rooms {
    pub fn new(log: Arc<dyn LogSink>) -> Self {
        Self {
            rooms: HashMap::new(),
            members: HashMap::new(),
            log,
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn client_count(&self) -> usize {
        self.members.len()
    }

    /// `(initiator_online, joiner_online)` for a room, if it exists.
    pub fn presence(&self, channel: Option<&str>, code: &RoomCode) -> Option<(bool, bool)> {
        let key = RoomKey {
            channel: channel.map(str::to_string),
            code: code.clone(),
        };
        self.rooms
            .get(&key)
            .map(|r| (r.initiator.is_some(), r.joiner.is_some()))
    }

    pub fn join(&mut self, client: ClientId, params: &ConnectParams) -> Vec<Outgoing> {
        let mut out = self.leave(client);
        let key = RoomKey {
            channel: params.channel.clone(),
            code: params.code.clone(),
        };
        let role = params.role;
        let room = self.rooms.entry(key.clone()).or_default();

        if let Some(previous) = room.slot(role).replace(client) {
            sink_warn!(
                self.log,
                "room {}: {} slot taken over by client {} (was {})",
                key.code,
                role,
                client,
                previous
            );
            self.members.remove(&previous);
            out.push(Outgoing::Envelope {
                target: previous,
                envelope: SignalEnvelope::error("replaced by a newer connection"),
            });
            out.push(Outgoing::Close { target: previous });
        }
        if role == Role::Initiator && room.cached_offer.take().is_some() {
            sink_debug!(self.log, "room {}: new initiator, dropping cached offer", key.code);
            room.cached_candidates.clear();
        }

        out.push(Outgoing::Envelope {
            target: client,
            envelope: SignalEnvelope::RoomStatus(RoomStatus {
                code: key.code.to_string(),
                initiator_online: room.initiator.is_some(),
                joiner_online: room.joiner.is_some(),
            }),
        });
        if let Some(other) = room.occupant(role.other()) {
            out.push(Outgoing::Envelope {
                target: other,
                envelope: SignalEnvelope::PeerJoined(PeerJoined { role }),
            });
        }
        if role == Role::Joiner {
            if let Some(offer) = &room.cached_offer {
                sink_info!(
                    self.log,
                    "room {}: replaying cached offer and {} candidates to client {}",
                    key.code,
                    room.cached_candidates.len(),
                    client
                );
                out.push(Outgoing::Envelope {
                    target: client,
                    envelope: offer.clone(),
                });
                for c in &room.cached_candidates {
                    out.push(Outgoing::Envelope {
                        target: client,
                        envelope: c.clone(),
                    });
                }
            }
        }

        sink_info!(self.log, "client {} joined room {} as {}", client, key.code, role);
        self.members.insert(client, (key, role));
        out
    }

    /// Relays an envelope to the other side of the sender's room.
    pub fn handle(&mut self, client: ClientId, envelope: SignalEnvelope) -> Vec<Outgoing> {
        let Some((key, role)) = self.members.get(&client).cloned() else {
            sink_warn!(self.log, "client {} sent '{}' before joining a room", client, envelope.kind());
            return vec![Outgoing::Envelope {
                target: client,
                envelope: SignalEnvelope::error("not in a room"),
            }];
        };
        let Some(room) = self.rooms.get_mut(&key) else {
            return Vec::new();
        };

        match (&envelope, role) {
            (SignalEnvelope::Offer(_), Role::Initiator) => {
                room.cached_offer = Some(envelope.clone());
                room.cached_candidates.clear();
            }
            (SignalEnvelope::IceCandidate(_), Role::Initiator) if room.cached_offer.is_some() => {
                room.cached_candidates.push(envelope.clone());
            }
            (SignalEnvelope::PeerJoined(_) | SignalEnvelope::RoomStatus(_) | SignalEnvelope::Error(_), _) => {
                sink_warn!(
                    self.log,
                    "client {} sent relay-only '{}'; dropped",
                    client,
                    envelope.kind()
                );
                return Vec::new();
            }
            _ => {}
        }

        match room.occupant(role.other()) {
            Some(target) => {
                sink_debug!(self.log, "room {}: {} -> {} '{}'", key.code, client, target, envelope.kind());
                vec![Outgoing::Envelope { target, envelope }]
            }
            None => {
                sink_debug!(
                    self.log,
                    "room {}: no {} online for '{}'",
                    key.code,
                    role.other(),
                    envelope.kind()
                );
                Vec::new()
            }
        }
    }

    /// Frees the client's slot; an emptied room is removed.
    pub fn leave(&mut self, client: ClientId) -> Vec<Outgoing> {
        let Some((key, role)) = self.members.remove(&client) else {
            return Vec::new();
        };
        if let Some(room) = self.rooms.get_mut(&key) {
            if room.occupant(role) == Some(client) {
                *room.slot(role) = None;
            }
            if room.is_empty() {
                self.rooms.remove(&key);
                sink_info!(self.log, "room {} removed", key.code);
            }
        }
        sink_debug!(self.log, "client {} left room {}", client, key.code);
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::{LogLevel, MemoryLogSink};
    use crate::signaling::IceCandidate;

    fn params(code: &str, role: Role) -> ConnectParams {
        ConnectParams::new(RoomCode::parse(code).unwrap(), role).with_channel("shared")
    }

    fn candidate(c: &str) -> SignalEnvelope {
        SignalEnvelope::IceCandidate(IceCandidate {
            candidate: c.into(),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        })
    }

    fn to(target: ClientId, envelope: SignalEnvelope) -> Outgoing {
        Outgoing::Envelope { target, envelope }
    }

    fn status(init: bool, join: bool) -> SignalEnvelope {
        SignalEnvelope::RoomStatus(RoomStatus {
            code: "AB12CD".into(),
            initiator_online: init,
            joiner_online: join,
        })
    }

    #[test]
    fn joiner_gets_status_and_initiator_hears_about_it() {
        let mut rooms = Rooms::default();
        assert_eq!(rooms.join(1, &params("ab12cd", Role::Initiator)), vec![to(1, status(true, false))]);
        assert_eq!(
            rooms.join(2, &params("AB12CD", Role::Joiner)),
            vec![
                to(2, status(true, true)),
                to(1, SignalEnvelope::PeerJoined(PeerJoined { role: Role::Joiner })),
            ]
        );
        assert_eq!(rooms.presence(Some("shared"), &RoomCode::parse("AB12CD").unwrap()), Some((true, true)));
    }

    #[test]
    fn envelopes_cross_to_the_other_side() {
        let mut rooms = Rooms::default();
        rooms.join(1, &params("AB12CD", Role::Initiator));
        rooms.join(2, &params("AB12CD", Role::Joiner));

        assert_eq!(
            rooms.handle(1, SignalEnvelope::offer("o")),
            vec![to(2, SignalEnvelope::offer("o"))]
        );
        assert_eq!(
            rooms.handle(2, SignalEnvelope::answer("a")),
            vec![to(1, SignalEnvelope::answer("a"))]
        );
        assert_eq!(rooms.handle(2, candidate("c2")), vec![to(1, candidate("c2"))]);
    }

    #[test]
    fn late_joiner_gets_cached_offer_and_candidates_in_order() {
        let mut rooms = Rooms::default();
        rooms.join(1, &params("AB12CD", Role::Initiator));
        assert!(rooms.handle(1, SignalEnvelope::offer("o")).is_empty());
        rooms.handle(1, candidate("c1"));
        rooms.handle(1, candidate("c2"));

        let out = rooms.join(2, &params("AB12CD", Role::Joiner));
        assert_eq!(
            out[2..],
            [
                to(2, SignalEnvelope::offer("o")),
                to(2, candidate("c1")),
                to(2, candidate("c2")),
            ]
        );
    }

    #[test]
    fn new_offer_or_initiator_resets_the_cache() {
        let mut rooms = Rooms::default();
        rooms.join(1, &params("AB12CD", Role::Initiator));
        rooms.handle(1, SignalEnvelope::offer("old"));
        rooms.handle(1, candidate("c-old"));
        rooms.handle(1, SignalEnvelope::offer("new"));

        let out = rooms.join(2, &params("AB12CD", Role::Joiner));
        assert_eq!(out[2..], [to(2, SignalEnvelope::offer("new"))]);

        rooms.leave(2);
        rooms.join(3, &params("AB12CD", Role::Initiator));
        let out = rooms.join(4, &params("AB12CD", Role::Joiner));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn occupied_slot_is_taken_over() {
        let log = Arc::new(MemoryLogSink::new());
        let mut rooms = Rooms::new(log.clone());
        rooms.join(1, &params("AB12CD", Role::Joiner));
        let out = rooms.join(2, &params("AB12CD", Role::Joiner));

        assert_eq!(out[0], to(1, SignalEnvelope::error("replaced by a newer connection")));
        assert_eq!(out[1], Outgoing::Close { target: 1 });
        assert_eq!(rooms.client_count(), 1);
        assert!(log.contains(LogLevel::Warn, "taken over"));

        // The evicted client's disconnect must not free the new occupant.
        rooms.leave(1);
        assert_eq!(rooms.room_count(), 1);
    }

    #[test]
    fn empty_rooms_are_removed() {
        let mut rooms = Rooms::default();
        rooms.join(1, &params("AB12CD", Role::Initiator));
        rooms.join(2, &params("AB12CD", Role::Joiner));
        rooms.leave(1);
        assert_eq!(rooms.room_count(), 1);
        rooms.leave(2);
        assert_eq!(rooms.room_count(), 0);
        assert_eq!(rooms.presence(Some("shared"), &RoomCode::parse("AB12CD").unwrap()), None);
    }

    #[test]
    fn channels_keep_rooms_apart() {
        let mut rooms = Rooms::default();
        rooms.join(1, &params("AB12CD", Role::Initiator));
        let other = ConnectParams::new(RoomCode::parse("AB12CD").unwrap(), Role::Joiner);
        let out = rooms.join(2, &other);
        assert_eq!(out.len(), 1);
        assert_eq!(rooms.room_count(), 2);
    }

    #[test]
    fn strangers_and_relay_only_kinds_are_refused() {
        let mut rooms = Rooms::default();
        assert_eq!(
            rooms.handle(9, SignalEnvelope::offer("o")),
            vec![to(9, SignalEnvelope::error("not in a room"))]
        );
        rooms.join(1, &params("AB12CD", Role::Initiator));
        rooms.join(2, &params("AB12CD", Role::Joiner));
        assert!(rooms.handle(1, status(true, true)).is_empty());
    }
}
