//! Room provisioning: find or create the room of a course or group.

use crate::{
    api::{
        CreateRoomRequest, CreationMetadata, InitialStateEvent, PowerLevelOverride, RoomApi,
        RoomPreset, StateContent, event_type,
    },
    directory::{RoomDirectory, RoomMapping},
    env::Environment,
    error::SyncError,
    ids::{CourseId, GroupId, RoomId},
    naming::{RoomName, RoomTopic},
};

/// Idempotent room creation backed by the room directory.
///
/// Provisioning for the same pair is expected to be serialized by the
/// caller. Two interleaved calls can both miss the directory; the second
/// insert then fails with a store conflict and its room is left orphaned.
#[derive(Debug, Clone)]
pub struct RoomProvisioner<A, D, E> {
    api: A,
    directory: D,
    env: E,
}

impl<A, D, E> RoomProvisioner<A, D, E>
where
    A: RoomApi,
    D: RoomDirectory,
    E: Environment,
{
    /// Provisioner over the given collaborators.
    pub fn new(api: A, directory: D, env: E) -> Self {
        Self { api, directory, env }
    }

    /// Room of `(course_id, group_id)`, created on first use.
    ///
    /// An existing mapping is returned without any remote call. Otherwise the
    /// room is created private, tagged with the pair, locked down so only the
    /// agent can manage membership and high-risk state, and closed to guests.
    /// The new mapping records the current time as its creation time.
    ///
    /// # Errors
    ///
    /// - `InvalidState` for an unknown course or group sentinel
    /// - `Remote` if identity lookup or room creation fails; nothing is
    ///   persisted in that case
    /// - `Store` if the mapping cannot be persisted
    pub fn ensure_room(
        &self,
        course_id: CourseId,
        group_id: Option<GroupId>,
        name: &RoomName,
        topic: &RoomTopic,
    ) -> Result<RoomId, SyncError> {
        if course_id.is_unknown() || group_id.is_some_and(GroupId::is_unknown) {
            return Err(SyncError::InvalidState(
                "cannot provision a room for an unpersisted course or group".to_string(),
            ));
        }

        if let Some(mapping) = self.directory.find_mapping(course_id, group_id)? {
            tracing::debug!(%course_id, room_id = %mapping.room_id, "room already provisioned");
            return Ok(mapping.room_id);
        }

        let agent = self.api.whoami()?;
        let request = CreateRoomRequest {
            name: name.clone(),
            topic: topic.clone(),
            preset: RoomPreset::PrivateChat,
            creation_content: CreationMetadata::new(course_id, group_id),
            power_level_content_override: PowerLevelOverride::exclusive_to(&agent),
            initial_state: vec![InitialStateEvent::guest_access_forbidden()],
        };
        let room_id = self.api.create_room(&request)?;

        let mapping = RoomMapping::new(course_id, group_id, room_id.clone(), self.env.now());
        let mapping_id = self.directory.insert_mapping(&mapping)?;

        tracing::info!(
            %course_id,
            group_id = group_id.map(GroupId::get),
            %room_id,
            %mapping_id,
            "room provisioned"
        );
        Ok(room_id)
    }

    /// Write a new display name and topic into an existing room.
    pub fn update_room(
        &self,
        room_id: &RoomId,
        name: &RoomName,
        topic: &RoomTopic,
    ) -> Result<(), SyncError> {
        self.api.set_state(room_id, event_type::NAME, "", &text_content("name", name.as_str()))?;
        self.api.set_state(room_id, event_type::TOPIC, "", &text_content("topic", topic.as_str()))?;
        tracing::info!(%room_id, %name, "room renamed");
        Ok(())
    }
}

fn text_content(key: &str, value: &str) -> StateContent {
    let mut content = StateContent::new();
    content.insert(key.to_string(), value.into());
    content
}
