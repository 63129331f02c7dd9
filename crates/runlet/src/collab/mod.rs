//! Collaboration rooms
//!
//! Room-scoped fan-out of code-sync and chat events. Entirely independent
//! of execution state: members run code under their own sessions while the
//! room only synchronizes shared source text and chat.

use std::collections::HashMap;

use dashmap::DashMap;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, instrument};

use crate::engine::{Envelope, Outbound};
use crate::types::SessionId;

#[derive(Debug)]
struct Room {
    code: String,
    language: String,
    host_id: String,
    members: HashMap<SessionId, mpsc::Sender<Envelope>>,
}

/// Fan-out hub for all collaboration rooms.
///
/// Rooms are purged once their last member leaves; a later join of the same
/// room id is a join of a room that no longer exists.
#[derive(Debug, Default)]
pub struct CollabHub {
    rooms: DashMap<String, Room>,
    /// session id → room it currently belongs to
    membership: DashMap<SessionId, String>,
}

impl CollabHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room and enroll the creator.
    #[instrument(skip(self, sender, code), fields(session = %session))]
    pub async fn create(
        &self,
        session: &SessionId,
        sender: mpsc::Sender<Envelope>,
        room_id: String,
        code: String,
        language: String,
        host_id: String,
    ) {
        let mut members = HashMap::new();
        members.insert(session.clone(), sender.clone());
        self.rooms.insert(
            room_id.clone(),
            Room {
                code,
                language,
                host_id: host_id.clone(),
                members,
            },
        );
        self.membership.insert(session.clone(), room_id.clone());

        debug!(room = %room_id, host = %host_id, "collab room created");
        let _ = sender
            .send(Envelope::new(Outbound::CollabSessionCreated(room_id)))
            .await;
    }

    /// Join an existing room.
    ///
    /// The joiner receives the room's current shared state; the other
    /// members are told who arrived.
    #[instrument(skip(self, sender), fields(session = %session))]
    pub async fn join(
        &self,
        session: &SessionId,
        sender: mpsc::Sender<Envelope>,
        room_id: String,
        display_name: Option<String>,
    ) {
        let snapshot = self.rooms.get_mut(&room_id).map(|mut room| {
            room.members.insert(session.clone(), sender.clone());
            let initial = json!({
                "code": room.code,
                "language": room.language,
                "hostId": room.host_id,
            });
            (initial, other_senders(&room, session))
        });

        let Some((initial, others)) = snapshot else {
            let _ = sender
                .send(Envelope::new(Outbound::error(
                    "Collaboration session not found or expired.",
                )))
                .await;
            return;
        };

        self.membership.insert(session.clone(), room_id.clone());
        let _ = sender
            .send(Envelope::new(Outbound::InitialCodeSync(initial)))
            .await;

        let name = display_name.unwrap_or_else(|| "User".to_owned());
        debug!(room = %room_id, "joined collab room");
        broadcast(
            others,
            Outbound::CollabUpdate(format!("{name} has joined the session.")),
        )
        .await;
    }

    /// Update the room's shared code and notify the other members.
    #[instrument(skip_all, fields(session = %session))]
    pub async fn sync_code(
        &self,
        session: &SessionId,
        sender: mpsc::Sender<Envelope>,
        code: String,
        language: String,
    ) {
        // Sync only makes sense from inside a room.
        let Some(room_id) = self.room_of(session) else {
            return;
        };

        let others = self.rooms.get_mut(&room_id).map(|mut room| {
            room.code = code.clone();
            room.language = language.clone();
            other_senders(&room, session)
        });

        let Some(others) = others else {
            let _ = sender
                .send(Envelope::new(Outbound::error(
                    "Collaboration session lost during sync.",
                )))
                .await;
            return;
        };

        let payload = json!({ "code": code, "language": language });
        broadcast(others, Outbound::CodeSync(payload)).await;
    }

    /// Broadcast a chat payload to every member, including the sender.
    #[instrument(skip_all, fields(session = %session))]
    pub async fn chat(&self, session: &SessionId, data: Value) {
        let Some(room_id) = self.room_of(session) else {
            return;
        };
        let members = match self.rooms.get(&room_id) {
            Some(room) => room.members.values().cloned().collect::<Vec<_>>(),
            None => return,
        };
        broadcast(members, Outbound::ChatMessage(data)).await;
    }

    /// Remove a session from its room, notifying the remaining members.
    #[instrument(skip(self), fields(session = %session))]
    pub async fn leave(&self, session: &SessionId) {
        let Some((_, room_id)) = self.membership.remove(session) else {
            return;
        };

        let remaining = match self.rooms.get_mut(&room_id) {
            Some(mut room) => {
                room.members.remove(session);
                if room.members.is_empty() {
                    None
                } else {
                    Some(room.members.values().cloned().collect::<Vec<_>>())
                }
            }
            None => return,
        };

        match remaining {
            None => {
                self.rooms.remove(&room_id);
                debug!(room = %room_id, "collab room empty, purged");
            }
            Some(rest) => {
                broadcast(
                    rest,
                    Outbound::CollabUpdate("A user has left the session.".to_owned()),
                )
                .await;
            }
        }
    }

    /// Number of live rooms, for observability.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn room_of(&self, session: &SessionId) -> Option<String> {
        self.membership.get(session).map(|r| r.value().clone())
    }
}

/// Deliver one event to a set of members. The guard into the room map must
/// be dropped before this is awaited.
async fn broadcast(members: Vec<mpsc::Sender<Envelope>>, payload: Outbound) {
    let envelope = Envelope::new(payload);
    for member in members {
        let _ = member.send(envelope.clone()).await;
    }
}

fn other_senders(room: &Room, excluded: &SessionId) -> Vec<mpsc::Sender<Envelope>> {
    room.members
        .iter()
        .filter(|(id, _)| *id != excluded)
        .map(|(_, tx)| tx.clone())
        .collect()
}
