//! Remote room control API.
//!
//! [`RoomApi`] is the seam between reconciliation logic and the homeserver.
//! The trait is synchronous: every call is one blocking request/response and
//! every failure is a [`RemoteError`]. Implementations attach the bearer
//! credential to each request themselves.
//!
//! The request and response schemas here are the typed boundary. Payloads
//! that do not match are rejected when decoded, not downstream.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    error::RemoteError,
    ids::{CourseId, GroupId, RoomId, UserId},
    naming::{RoomName, RoomTopic},
};

/// Content of a state event: an arbitrary JSON object.
pub type StateContent = Map<String, Value>;

/// State event types the service reads or writes.
pub mod event_type {
    /// Permission levels of a room
    pub const POWER_LEVELS: &str = "m.room.power_levels";
    /// Display name
    pub const NAME: &str = "m.room.name";
    /// Topic
    pub const TOPIC: &str = "m.room.topic";
    /// Guest access rules
    pub const GUEST_ACCESS: &str = "m.room.guest_access";
    /// History visibility
    pub const HISTORY_VISIBILITY: &str = "m.room.history_visibility";
    /// Canonical room alias
    pub const CANONICAL_ALIAS: &str = "m.room.canonical_alias";
    /// Avatar
    pub const AVATAR: &str = "m.room.avatar";
    /// Room upgrade marker
    pub const TOMBSTONE: &str = "m.room.tombstone";
    /// Server access control list
    pub const SERVER_ACL: &str = "m.room.server_acl";
    /// End-to-end encryption settings
    pub const ENCRYPTION: &str = "m.room.encryption";
    /// Join rules
    pub const JOIN_RULES: &str = "m.room.join_rules";
}

/// Namespace of the correlation tags written into room creation content.
pub const METADATA_NAMESPACE: &str = "org.matrix.moodle";

/// Permission tier of a room occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PermissionTier {
    /// Ordinary occupant; no explicit power-level entry
    Member,
    /// Course staff
    Staff,
    /// The synchronizing agent
    Owner,
}

impl PermissionTier {
    /// Numeric power level.
    pub const fn level(self) -> i64 {
        match self {
            Self::Member => 0,
            Self::Staff => 99,
            Self::Owner => 100,
        }
    }
}

/// Control surface of the homeserver used by provisioning and
/// reconciliation.
pub trait RoomApi {
    /// Identity that owns the access token.
    fn whoami(&self) -> Result<UserId, RemoteError>;

    /// Create a room and return its identifier.
    fn create_room(&self, request: &CreateRoomRequest) -> Result<RoomId, RemoteError>;

    /// Invite a user into a room.
    fn invite_user(&self, user_id: &UserId, room_id: &RoomId) -> Result<(), RemoteError>;

    /// Remove a user from a room.
    fn kick_user(&self, user_id: &UserId, room_id: &RoomId) -> Result<(), RemoteError>;

    /// Read the content of a state event.
    fn get_state(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
    ) -> Result<StateContent, RemoteError>;

    /// Replace the content of a state event.
    fn set_state(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
        content: &StateContent,
    ) -> Result<(), RemoteError>;

    /// Users currently joined or invited.
    fn list_occupants(&self, room_id: &RoomId) -> Result<BTreeSet<UserId>, RemoteError>;
}

impl<T: RoomApi + ?Sized> RoomApi for &T {
    fn whoami(&self) -> Result<UserId, RemoteError> {
        (**self).whoami()
    }

    fn create_room(&self, request: &CreateRoomRequest) -> Result<RoomId, RemoteError> {
        (**self).create_room(request)
    }

    fn invite_user(&self, user_id: &UserId, room_id: &RoomId) -> Result<(), RemoteError> {
        (**self).invite_user(user_id, room_id)
    }

    fn kick_user(&self, user_id: &UserId, room_id: &RoomId) -> Result<(), RemoteError> {
        (**self).kick_user(user_id, room_id)
    }

    fn get_state(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
    ) -> Result<StateContent, RemoteError> {
        (**self).get_state(room_id, event_type, state_key)
    }

    fn set_state(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
        content: &StateContent,
    ) -> Result<(), RemoteError> {
        (**self).set_state(room_id, event_type, state_key, content)
    }

    fn list_occupants(&self, room_id: &RoomId) -> Result<BTreeSet<UserId>, RemoteError> {
        (**self).list_occupants(room_id)
    }
}

/// Visibility preset of a new room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomPreset {
    /// Invite-only, history shared with members
    PrivateChat,
    /// Like `PrivateChat`, all invitees get the creator's power level
    TrustedPrivateChat,
    /// Publicly joinable
    PublicChat,
}

/// Correlation tags stored in a room's creation content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationMetadata {
    /// Course the room belongs to
    #[serde(rename = "org.matrix.moodle.course_id")]
    pub course_id: CourseId,
    /// Group the room belongs to; absent for a whole-course room
    #[serde(
        rename = "org.matrix.moodle.group_id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub group_id: Option<GroupId>,
}

impl CreationMetadata {
    /// Tags for the room of `(course_id, group_id)`.
    pub fn new(course_id: CourseId, group_id: Option<GroupId>) -> Self {
        Self { course_id, group_id }
    }
}

/// Power-level block applied at room creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerLevelOverride {
    /// Level required to ban
    pub ban: i64,
    /// Level required to invite
    pub invite: i64,
    /// Level required to kick
    pub kick: i64,
    /// Level required to redact other users' events
    pub redact: i64,
    /// Per-event-type requirements
    pub events: BTreeMap<String, i64>,
    /// Level required to send message events
    pub events_default: i64,
    /// Level required to send state events not listed in `events`
    pub state_default: i64,
    /// Explicit user levels
    pub users: BTreeMap<UserId, i64>,
}

impl PowerLevelOverride {
    /// Membership management and high-risk state events reserved to `agent`.
    ///
    /// Messages are open to everyone; other state changes need staff level.
    pub fn exclusive_to(agent: &UserId) -> Self {
        let owner = PermissionTier::Owner.level();
        let events = [
            event_type::NAME,
            event_type::POWER_LEVELS,
            event_type::HISTORY_VISIBILITY,
            event_type::CANONICAL_ALIAS,
            event_type::AVATAR,
            event_type::TOMBSTONE,
            event_type::SERVER_ACL,
            event_type::ENCRYPTION,
            event_type::JOIN_RULES,
            event_type::GUEST_ACCESS,
        ]
        .into_iter()
        .map(|event| (event.to_string(), owner))
        .collect();

        Self {
            ban: owner,
            invite: owner,
            kick: owner,
            redact: 50,
            events,
            events_default: PermissionTier::Member.level(),
            state_default: PermissionTier::Staff.level(),
            users: BTreeMap::from([(agent.clone(), owner)]),
        }
    }
}

/// State event applied at room creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialStateEvent {
    /// Event type
    #[serde(rename = "type")]
    pub event_type: String,
    /// State key
    pub state_key: String,
    /// Event content
    pub content: StateContent,
}

impl InitialStateEvent {
    /// `m.room.guest_access` set to `forbidden`.
    pub fn guest_access_forbidden() -> Self {
        let mut content = StateContent::new();
        content.insert("guest_access".to_string(), Value::from("forbidden"));
        Self { event_type: event_type::GUEST_ACCESS.to_string(), state_key: String::new(), content }
    }
}

/// Body of a room-creation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateRoomRequest {
    /// Display name
    pub name: RoomName,
    /// Topic
    pub topic: RoomTopic,
    /// Visibility preset
    pub preset: RoomPreset,
    /// Correlation tags
    pub creation_content: CreationMetadata,
    /// Power levels applied on top of the preset
    pub power_level_content_override: PowerLevelOverride,
    /// State events applied after the preset
    pub initial_state: Vec<InitialStateEvent>,
}

/// Response of `POST /createRoom`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoomResponse {
    /// Identifier of the new room
    pub room_id: RoomId,
}

/// Response of `GET /account/whoami`.
#[derive(Debug, Clone, Deserialize)]
pub struct WhoamiResponse {
    /// Owner of the access token
    pub user_id: UserId,
}

/// Membership state of a user in a room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Membership {
    /// In the room
    Join,
    /// Invited, not yet joined
    Invite,
    /// Left or was kicked
    Leave,
    /// Banned
    Ban,
    /// Asked to join
    Knock,
    /// Missing or unrecognized membership value
    #[default]
    #[serde(other)]
    Unknown,
}

impl Membership {
    /// Whether the user counts as an occupant.
    pub const fn is_present(self) -> bool {
        matches!(self, Self::Join | Self::Invite)
    }
}

/// Content of an `m.room.member` event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberContent {
    /// Membership state
    #[serde(default)]
    pub membership: Membership,
}

/// One `m.room.member` state event.
#[derive(Debug, Clone, Deserialize)]
pub struct MemberEvent {
    /// The user the event is about
    pub state_key: String,
    /// Event content
    #[serde(default)]
    pub content: MemberContent,
}

/// Response of `GET /rooms/{roomId}/members`.
#[derive(Debug, Clone, Deserialize)]
pub struct MembersResponse {
    /// Member events
    pub chunk: Vec<MemberEvent>,
}

/// Occupants among a list of member events.
///
/// Only joined and invited users are kept. Present members whose state key
/// does not parse as a user identifier are skipped with a warning, so one
/// legacy identifier cannot block reconciliation of the whole room.
pub fn present_occupants(events: &[MemberEvent]) -> BTreeSet<UserId> {
    events
        .iter()
        .filter(|event| event.content.membership.is_present())
        .filter_map(|event| match UserId::parse(event.state_key.as_str()) {
            Ok(user_id) => Some(user_id),
            Err(err) => {
                tracing::warn!(state_key = %event.state_key, error = %err, "skipping occupant");
                None
            },
        })
        .collect()
}
