//! Room directory: which remote room belongs to which course or group.
//!
//! At most one [`RoomMapping`] exists per `(course, group)` pair, the
//! whole-course pair `(course, None)` included. Mappings are never mutated
//! except for their modification timestamp.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::StoreError,
    ids::{CourseId, GroupId, MappingId, RoomId, Timestamp},
};

/// Association of a course (and optional group) with a remote room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMapping {
    /// Persisted identity; [`MappingId::unknown`] until inserted
    pub id: MappingId,
    /// Owning course
    pub course_id: CourseId,
    /// Owning group; `None` for the whole-course room
    pub group_id: Option<GroupId>,
    /// Remote room
    pub room_id: RoomId,
    /// When the room was provisioned
    pub created_at: Timestamp,
    /// Last rename; [`Timestamp::ZERO`] if never
    pub modified_at: Timestamp,
}

impl RoomMapping {
    /// Unpersisted mapping for a freshly provisioned room.
    pub fn new(
        course_id: CourseId,
        group_id: Option<GroupId>,
        room_id: RoomId,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: MappingId::unknown(),
            course_id,
            group_id,
            room_id,
            created_at,
            modified_at: Timestamp::ZERO,
        }
    }

    /// Whether the mapping has a persisted identity.
    pub fn is_persisted(&self) -> bool {
        !self.id.is_unknown()
    }

    /// Directory key of the mapping.
    pub fn key(&self) -> (CourseId, Option<GroupId>) {
        (self.course_id, self.group_id)
    }
}

/// Persistence of room mappings.
///
/// Same sharing rules as the other stores: implementations are cheap to
/// clone and clones see the same data.
pub trait RoomDirectory: Clone + Send + Sync + 'static {
    /// Mapping for a pair, if any.
    fn find_mapping(
        &self,
        course_id: CourseId,
        group_id: Option<GroupId>,
    ) -> Result<Option<RoomMapping>, StoreError>;

    /// Persist a new mapping and return its identity.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if the mapping is already persisted or carries an
    ///   unknown foreign key
    /// - `Conflict` if the pair is already mapped
    fn insert_mapping(&self, mapping: &RoomMapping) -> Result<MappingId, StoreError>;

    /// All mappings, or those of one course, ordered by identity.
    fn find_all_mappings(
        &self,
        course_id: Option<CourseId>,
    ) -> Result<Vec<RoomMapping>, StoreError>;

    /// Delete a mapping. Deleting one that is already gone is a no-op.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the mapping has no persisted identity.
    fn remove_mapping(&self, mapping: &RoomMapping) -> Result<(), StoreError>;

    /// Refresh the modification timestamp of a persisted mapping.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the mapping has no persisted identity or no longer
    /// exists.
    fn touch_mapping(&self, mapping: &RoomMapping, modified_at: Timestamp)
        -> Result<(), StoreError>;
}

/// Reject mappings that must not reach a backend.
pub fn check_insertable(mapping: &RoomMapping) -> Result<(), StoreError> {
    if mapping.is_persisted() {
        return Err(StoreError::InvalidState(format!(
            "mapping {} is already persisted",
            mapping.id
        )));
    }
    if mapping.course_id.is_unknown() || mapping.group_id.is_some_and(GroupId::is_unknown) {
        return Err(StoreError::InvalidState(
            "mapping refers to an unpersisted course or group".to_string(),
        ));
    }
    Ok(())
}

/// Reject mappings without a persisted identity.
pub fn check_persisted(mapping: &RoomMapping) -> Result<MappingId, StoreError> {
    if mapping.is_persisted() {
        Ok(mapping.id)
    } else {
        Err(StoreError::InvalidState("mapping has no persisted identity".to_string()))
    }
}

/// In-memory directory for tests and simulation.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    inner: Arc<Mutex<MemoryDirectoryInner>>,
}

#[derive(Default)]
struct MemoryDirectoryInner {
    mappings: BTreeMap<MappingId, RoomMapping>,
    last_id: i64,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored mappings.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").mappings.len()
    }

    /// Whether no mapping is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RoomDirectory for MemoryDirectory {
    #[allow(clippy::expect_used)]
    fn find_mapping(
        &self,
        course_id: CourseId,
        group_id: Option<GroupId>,
    ) -> Result<Option<RoomMapping>, StoreError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.mappings.values().find(|m| m.key() == (course_id, group_id)).cloned())
    }

    #[allow(clippy::expect_used)]
    fn insert_mapping(&self, mapping: &RoomMapping) -> Result<MappingId, StoreError> {
        check_insertable(mapping)?;
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        if inner.mappings.values().any(|m| m.key() == mapping.key()) {
            return Err(StoreError::Conflict(format!(
                "course {} group {:?} is already mapped",
                mapping.course_id,
                mapping.group_id.map(GroupId::get)
            )));
        }

        inner.last_id += 1;
        let id = MappingId::new(inner.last_id)
            .map_err(|e| StoreError::InvalidState(e.to_string()))?;
        inner.mappings.insert(id, RoomMapping { id, ..mapping.clone() });
        Ok(id)
    }

    #[allow(clippy::expect_used)]
    fn find_all_mappings(
        &self,
        course_id: Option<CourseId>,
    ) -> Result<Vec<RoomMapping>, StoreError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner
            .mappings
            .values()
            .filter(|m| course_id.is_none_or(|c| m.course_id == c))
            .cloned()
            .collect())
    }

    #[allow(clippy::expect_used)]
    fn remove_mapping(&self, mapping: &RoomMapping) -> Result<(), StoreError> {
        let id = check_persisted(mapping)?;
        self.inner.lock().expect("Mutex poisoned").mappings.remove(&id);
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn touch_mapping(
        &self,
        mapping: &RoomMapping,
        modified_at: Timestamp,
    ) -> Result<(), StoreError> {
        let id = check_persisted(mapping)?;
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        let stored = inner
            .mappings
            .get_mut(&id)
            .ok_or_else(|| StoreError::InvalidState(format!("mapping {id} no longer exists")))?;
        stored.modified_at = modified_at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(id: i64) -> CourseId {
        CourseId::new(id).unwrap()
    }

    fn group(id: i64) -> GroupId {
        GroupId::new(id).unwrap()
    }

    fn room(id: &str) -> RoomId {
        RoomId::parse(id).unwrap()
    }

    fn mapping(course_id: i64, group_id: Option<i64>, room_id: &str) -> RoomMapping {
        RoomMapping::new(
            course(course_id),
            group_id.map(group),
            room(room_id),
            Timestamp::from_secs(10),
        )
    }

    #[test]
    fn insert_then_find() {
        let directory = MemoryDirectory::new();
        let id = directory.insert_mapping(&mapping(1, Some(2), "!a:x")).unwrap();

        let found = directory.find_mapping(course(1), Some(group(2))).unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.room_id, room("!a:x"));
        assert_eq!(found.modified_at, Timestamp::ZERO);
        assert!(directory.find_mapping(course(1), None).unwrap().is_none());
    }

    #[test]
    fn whole_course_pair_is_unique() {
        let directory = MemoryDirectory::new();
        directory.insert_mapping(&mapping(1, None, "!a:x")).unwrap();

        let err = directory.insert_mapping(&mapping(1, None, "!b:x")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn unknown_foreign_keys_are_rejected() {
        let directory = MemoryDirectory::new();
        let mut bad = mapping(1, None, "!a:x");
        bad.course_id = CourseId::unknown();

        let err = directory.insert_mapping(&bad).unwrap_err();
        assert!(matches!(err, StoreError::InvalidState(_)));

        let mut bad = mapping(1, None, "!a:x");
        bad.group_id = Some(GroupId::unknown());
        let err = directory.insert_mapping(&bad).unwrap_err();
        assert!(matches!(err, StoreError::InvalidState(_)));
    }

    #[test]
    fn removing_unpersisted_mapping_fails() {
        let directory = MemoryDirectory::new();
        let err = directory.remove_mapping(&mapping(1, None, "!a:x")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidState(_)));
    }

    #[test]
    fn remove_is_idempotent() {
        let directory = MemoryDirectory::new();
        directory.insert_mapping(&mapping(1, None, "!a:x")).unwrap();
        let stored = directory.find_mapping(course(1), None).unwrap().unwrap();

        directory.remove_mapping(&stored).unwrap();
        directory.remove_mapping(&stored).unwrap();
        assert!(directory.is_empty());
    }

    #[test]
    fn find_all_filters_by_course() {
        let directory = MemoryDirectory::new();
        directory.insert_mapping(&mapping(1, Some(1), "!a:x")).unwrap();
        directory.insert_mapping(&mapping(2, None, "!b:x")).unwrap();
        directory.insert_mapping(&mapping(1, Some(2), "!c:x")).unwrap();

        assert_eq!(directory.find_all_mappings(None).unwrap().len(), 3);

        let rooms: Vec<_> = directory
            .find_all_mappings(Some(course(1)))
            .unwrap()
            .into_iter()
            .map(|m| m.room_id)
            .collect();
        assert_eq!(rooms, vec![room("!a:x"), room("!c:x")]);
    }

    #[test]
    fn touch_updates_only_modified_at() {
        let directory = MemoryDirectory::new();
        directory.insert_mapping(&mapping(1, None, "!a:x")).unwrap();
        let stored = directory.find_mapping(course(1), None).unwrap().unwrap();

        directory.touch_mapping(&stored, Timestamp::from_secs(99)).unwrap();

        let touched = directory.find_mapping(course(1), None).unwrap().unwrap();
        assert_eq!(touched.modified_at, Timestamp::from_secs(99));
        assert_eq!(touched.created_at, stored.created_at);
        assert_eq!(touched.room_id, stored.room_id);
    }

    #[test]
    fn touching_removed_mapping_fails() {
        let directory = MemoryDirectory::new();
        directory.insert_mapping(&mapping(1, None, "!a:x")).unwrap();
        let stored = directory.find_mapping(course(1), None).unwrap().unwrap();
        directory.remove_mapping(&stored).unwrap();

        let err = directory.touch_mapping(&stored, Timestamp::from_secs(5)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidState(_)));
    }
}
