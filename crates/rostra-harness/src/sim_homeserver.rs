//! In-memory homeserver implementing [`RoomApi`].
//!
//! Holds rooms, their occupants and their state events, and records every
//! call it receives so tests can assert on exactly what the service sent.
//! Failures can be scripted per call kind.
//!
//! Rules enforced, matching a real homeserver closely enough for the
//! synchronizer's needs:
//!
//! - unknown rooms answer `404 M_NOT_FOUND`
//! - inviting a present user or kicking an absent one answers `403 M_FORBIDDEN`
//! - reading a state event that was never written answers `404 M_NOT_FOUND`

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::{Arc, Mutex},
};

use rostra_core::{
    CreateRoomRequest, RemoteError, RoomApi, RoomId, StateContent, UserId, api::event_type,
};
use serde_json::Value;

/// Kind of a [`RoomApi`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CallKind {
    /// `whoami`
    Whoami,
    /// `create_room`
    CreateRoom,
    /// `invite_user`
    Invite,
    /// `kick_user`
    Kick,
    /// `get_state`
    GetState,
    /// `set_state`
    SetState,
    /// `list_occupants`
    ListOccupants,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    /// Identity lookup
    Whoami,
    /// Room creation with its full request
    CreateRoom(CreateRoomRequest),
    /// Invite
    Invite {
        /// Target room
        room_id: RoomId,
        /// Invited user
        user_id: UserId,
    },
    /// Kick
    Kick {
        /// Target room
        room_id: RoomId,
        /// Kicked user
        user_id: UserId,
    },
    /// State read
    GetState {
        /// Target room
        room_id: RoomId,
        /// Event type
        event_type: String,
    },
    /// State write
    SetState {
        /// Target room
        room_id: RoomId,
        /// Event type
        event_type: String,
        /// Written content
        content: StateContent,
    },
    /// Occupant listing
    ListOccupants {
        /// Target room
        room_id: RoomId,
    },
}

impl ApiCall {
    /// Kind of this call.
    pub fn kind(&self) -> CallKind {
        match self {
            Self::Whoami => CallKind::Whoami,
            Self::CreateRoom(_) => CallKind::CreateRoom,
            Self::Invite { .. } => CallKind::Invite,
            Self::Kick { .. } => CallKind::Kick,
            Self::GetState { .. } => CallKind::GetState,
            Self::SetState { .. } => CallKind::SetState,
            Self::ListOccupants { .. } => CallKind::ListOccupants,
        }
    }

    /// Whether the call changes room membership.
    pub fn is_membership_change(&self) -> bool {
        matches!(self, Self::Invite { .. } | Self::Kick { .. })
    }
}

/// A room as the homeserver holds it.
#[derive(Debug, Clone)]
pub struct SimRoom {
    /// Request the room was created with; `None` for seeded rooms
    pub creation: Option<CreateRoomRequest>,
    /// Joined and invited users
    pub occupants: BTreeSet<UserId>,
    /// State events by `(type, state key)`
    pub state: BTreeMap<(String, String), StateContent>,
}

impl SimRoom {
    /// Explicit user levels from `m.room.power_levels`.
    pub fn power_users(&self) -> BTreeMap<String, i64> {
        self.state
            .get(&(event_type::POWER_LEVELS.to_string(), String::new()))
            .and_then(|content| content.get("users"))
            .and_then(Value::as_object)
            .map(|users| {
                users
                    .iter()
                    .filter_map(|(user, level)| Some((user.clone(), level.as_i64()?)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A string field of a state event with an empty state key.
    pub fn state_text(&self, event_type: &str, field: &str) -> Option<String> {
        self.state
            .get(&(event_type.to_string(), String::new()))
            .and_then(|content| content.get(field))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

struct State {
    agent: UserId,
    server_name: String,
    rooms: BTreeMap<RoomId, SimRoom>,
    next_room: u64,
    calls: Vec<ApiCall>,
    failures: BTreeMap<CallKind, VecDeque<RemoteError>>,
}

impl State {
    fn room_mut(&mut self, room_id: &RoomId) -> Result<&mut SimRoom, RemoteError> {
        self.rooms.get_mut(room_id).ok_or_else(|| not_found(room_id))
    }

    fn mint_room_id(&mut self) -> RoomId {
        self.next_room += 1;
        let raw = format!("!room{}:{}", self.next_room, self.server_name);
        RoomId::parse(raw.as_str()).unwrap_or_else(|_| unreachable!("generated room ids are valid"))
    }

    /// Record the call, then pop a scripted failure for its kind.
    fn begin(&mut self, call: ApiCall) -> Result<(), RemoteError> {
        let kind = call.kind();
        self.calls.push(call);
        match self.failures.get_mut(&kind).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Simulated homeserver. Clones share the same server.
#[derive(Clone)]
pub struct SimHomeserver {
    state: Arc<Mutex<State>>,
}

impl SimHomeserver {
    /// Homeserver whose access token belongs to `agent`.
    pub fn new(agent: UserId) -> Self {
        let server_name = agent.server_name().to_string();
        Self {
            state: Arc::new(Mutex::new(State {
                agent,
                server_name,
                rooms: BTreeMap::new(),
                next_room: 0,
                calls: Vec::new(),
                failures: BTreeMap::new(),
            })),
        }
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("Mutex poisoned")
    }

    /// The agent's identity.
    pub fn agent(&self) -> UserId {
        self.lock().agent.clone()
    }

    /// Create a room outside the API, holding the agent plus `occupants`.
    ///
    /// The room gets a power-level event granting the agent 100. No call is
    /// recorded.
    pub fn seed_room(&self, occupants: impl IntoIterator<Item = UserId>) -> RoomId {
        let mut state = self.lock();
        let room_id = state.mint_room_id();
        let agent = state.agent.clone();

        let mut users = serde_json::Map::new();
        users.insert(agent.as_str().to_string(), Value::from(100));
        let mut power_levels = StateContent::new();
        power_levels.insert("users".to_string(), Value::Object(users));
        power_levels.insert("kick".to_string(), Value::from(100));

        let mut room = SimRoom {
            creation: None,
            occupants: occupants.into_iter().collect(),
            state: BTreeMap::new(),
        };
        room.occupants.insert(agent);
        room.state.insert((event_type::POWER_LEVELS.to_string(), String::new()), power_levels);

        state.rooms.insert(room_id.clone(), room);
        room_id
    }

    /// Make a room's occupants change behind the service's back.
    pub fn set_occupants(&self, room_id: &RoomId, occupants: impl IntoIterator<Item = UserId>) {
        if let Some(room) = self.lock().rooms.get_mut(room_id) {
            room.occupants = occupants.into_iter().collect();
        }
    }

    /// Fail the next call of `kind` with `err`. Queued failures are used in
    /// order, one per call.
    pub fn fail_next(&self, kind: CallKind, err: RemoteError) {
        self.lock().failures.entry(kind).or_default().push_back(err);
    }

    /// Snapshot of one room.
    pub fn room(&self, room_id: &RoomId) -> Option<SimRoom> {
        self.lock().rooms.get(room_id).cloned()
    }

    /// Identifiers of every room.
    pub fn room_ids(&self) -> Vec<RoomId> {
        self.lock().rooms.keys().cloned().collect()
    }

    /// Occupants of a room; empty if the room does not exist.
    pub fn occupants(&self, room_id: &RoomId) -> BTreeSet<UserId> {
        self.lock().rooms.get(room_id).map(|room| room.occupants.clone()).unwrap_or_default()
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls of `kind`.
    pub fn count(&self, kind: CallKind) -> usize {
        self.lock().calls.iter().filter(|call| call.kind() == kind).count()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

impl RoomApi for SimHomeserver {
    fn whoami(&self) -> Result<UserId, RemoteError> {
        let mut state = self.lock();
        state.begin(ApiCall::Whoami)?;
        Ok(state.agent.clone())
    }

    fn create_room(&self, request: &CreateRoomRequest) -> Result<RoomId, RemoteError> {
        let mut state = self.lock();
        state.begin(ApiCall::CreateRoom(request.clone()))?;

        let room_id = state.mint_room_id();
        let power_levels = match serde_json::to_value(&request.power_level_content_override) {
            Ok(Value::Object(content)) => content,
            _ => return Err(RemoteError::http(400, "M_BAD_JSON", "invalid power levels")),
        };

        let mut room = SimRoom {
            creation: Some(request.clone()),
            occupants: BTreeSet::from([state.agent.clone()]),
            state: BTreeMap::new(),
        };
        room.state.insert((event_type::POWER_LEVELS.to_string(), String::new()), power_levels);
        room.state.insert(
            (event_type::NAME.to_string(), String::new()),
            text_content("name", request.name.as_str()),
        );
        room.state.insert(
            (event_type::TOPIC.to_string(), String::new()),
            text_content("topic", request.topic.as_str()),
        );
        for event in &request.initial_state {
            room.state
                .insert((event.event_type.clone(), event.state_key.clone()), event.content.clone());
        }

        tracing::debug!(%room_id, name = %request.name, "sim: room created");
        state.rooms.insert(room_id.clone(), room);
        Ok(room_id)
    }

    fn invite_user(&self, user_id: &UserId, room_id: &RoomId) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.begin(ApiCall::Invite { room_id: room_id.clone(), user_id: user_id.clone() })?;

        let room = state.room_mut(room_id)?;
        if !room.occupants.insert(user_id.clone()) {
            let message = format!("{user_id} is already in the room");
            return Err(RemoteError::http(403, "M_FORBIDDEN", message));
        }
        Ok(())
    }

    fn kick_user(&self, user_id: &UserId, room_id: &RoomId) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.begin(ApiCall::Kick { room_id: room_id.clone(), user_id: user_id.clone() })?;

        let room = state.room_mut(room_id)?;
        if !room.occupants.remove(user_id) {
            let message = format!("{user_id} is not in the room");
            return Err(RemoteError::http(403, "M_FORBIDDEN", message));
        }
        Ok(())
    }

    fn get_state(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
    ) -> Result<StateContent, RemoteError> {
        let mut state = self.lock();
        state.begin(ApiCall::GetState {
            room_id: room_id.clone(),
            event_type: event_type.to_string(),
        })?;

        state
            .room_mut(room_id)?
            .state
            .get(&(event_type.to_string(), state_key.to_string()))
            .cloned()
            .ok_or_else(|| RemoteError::http(404, "M_NOT_FOUND", "event not found"))
    }

    fn set_state(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
        content: &StateContent,
    ) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.begin(ApiCall::SetState {
            room_id: room_id.clone(),
            event_type: event_type.to_string(),
            content: content.clone(),
        })?;

        state
            .room_mut(room_id)?
            .state
            .insert((event_type.to_string(), state_key.to_string()), content.clone());
        Ok(())
    }

    fn list_occupants(&self, room_id: &RoomId) -> Result<BTreeSet<UserId>, RemoteError> {
        let mut state = self.lock();
        state.begin(ApiCall::ListOccupants { room_id: room_id.clone() })?;
        Ok(state.room_mut(room_id)?.occupants.clone())
    }
}

fn not_found(room_id: &RoomId) -> RemoteError {
    RemoteError::http(404, "M_NOT_FOUND", format!("unknown room {room_id}"))
}

fn text_content(key: &str, value: &str) -> StateContent {
    let mut content = StateContent::new();
    content.insert(key.to_string(), Value::from(value));
    content
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    fn server() -> SimHomeserver {
        SimHomeserver::new(user("@bot:example.org"))
    }

    #[test]
    fn seeded_room_holds_agent() {
        let server = server();
        let room_id = server.seed_room([user("@a:example.org")]);

        let occupants = server.occupants(&room_id);
        assert!(occupants.contains(&user("@bot:example.org")));
        assert!(occupants.contains(&user("@a:example.org")));
        assert_eq!(server.room(&room_id).unwrap().power_users()["@bot:example.org"], 100);
        assert!(server.calls().is_empty());
    }

    #[test]
    fn double_invite_is_forbidden() {
        let server = server();
        let room_id = server.seed_room([]);
        let a = user("@a:example.org");

        server.invite_user(&a, &room_id).unwrap();
        let err = server.invite_user(&a, &room_id).unwrap_err();
        assert_eq!(err.status, Some(403));
        assert_eq!(server.count(CallKind::Invite), 2);
    }

    #[test]
    fn unknown_room_is_not_found() {
        let server = server();
        let room_id = RoomId::parse("!nope:example.org").unwrap();
        let err = server.list_occupants(&room_id).unwrap_err();
        assert_eq!(err.code, "M_NOT_FOUND");
    }

    #[test]
    fn scripted_failure_is_used_once() {
        let server = server();
        server.fail_next(CallKind::Whoami, RemoteError::network("down"));

        assert!(server.whoami().is_err());
        assert_eq!(server.whoami().unwrap(), user("@bot:example.org"));
        assert_eq!(server.count(CallKind::Whoami), 2);
    }
}
