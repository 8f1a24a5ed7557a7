//! Observable state snapshots for invariant checking.
//!
//! A snapshot joins three views at one point in time: what the directory
//! maps, what the homeserver holds, and what the roster wants. Invariants
//! operate on snapshots rather than live state.

use std::collections::{BTreeMap, BTreeSet};

use rostra_core::{
    CourseId, CreationMetadata, GroupId, RoomDirectory, RoomId, Roster, SyncError, UserId,
};

use crate::SimHomeserver;

/// Snapshot of every mapped room.
#[derive(Debug, Clone)]
pub struct SystemSnapshot {
    /// The synchronizing agent
    pub agent: UserId,
    /// One entry per directory mapping
    pub rooms: Vec<RoomSnapshot>,
}

/// One mapped room, observed and desired.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    /// Mapped room
    pub room_id: RoomId,
    /// Mapped course
    pub course_id: CourseId,
    /// Mapped group; `None` for the whole-course room
    pub group_id: Option<GroupId>,
    /// Whether the homeserver knows the room
    pub exists: bool,
    /// Creation tags, for rooms created through the API
    pub creation: Option<CreationMetadata>,
    /// Joined and invited users
    pub occupants: BTreeSet<UserId>,
    /// Explicit user levels
    pub power_users: BTreeMap<String, i64>,
    /// Learners the roster wants in the room
    pub learners: BTreeSet<UserId>,
    /// Staff the roster wants in the room
    pub staff: BTreeSet<UserId>,
}

impl RoomSnapshot {
    /// Everyone who should be in the room, agent included.
    pub fn desired(&self, agent: &UserId) -> BTreeSet<UserId> {
        let mut desired: BTreeSet<UserId> = self.learners.union(&self.staff).cloned().collect();
        desired.insert(agent.clone());
        desired
    }
}

impl SystemSnapshot {
    /// Capture the current state.
    ///
    /// # Errors
    ///
    /// Fails if the directory or the roster cannot be read.
    pub fn capture(
        server: &SimHomeserver,
        directory: &impl RoomDirectory,
        roster: &impl Roster,
    ) -> Result<Self, SyncError> {
        let mut rooms = Vec::new();

        for mapping in directory.find_all_mappings(None)? {
            let observed = server.room(&mapping.room_id);
            rooms.push(RoomSnapshot {
                exists: observed.is_some(),
                creation: observed
                    .as_ref()
                    .and_then(|room| room.creation.as_ref())
                    .map(|request| request.creation_content),
                occupants: observed.as_ref().map(|room| room.occupants.clone()).unwrap_or_default(),
                power_users: observed.as_ref().map(|room| room.power_users()).unwrap_or_default(),
                learners: roster.enrolled_learners(mapping.course_id, mapping.group_id)?,
                staff: roster.staff(mapping.course_id)?,
                room_id: mapping.room_id,
                course_id: mapping.course_id,
                group_id: mapping.group_id,
            });
        }

        Ok(Self { agent: server.agent(), rooms })
    }
}
