//! Roster loaded from a JSON snapshot exported by the host system.
//!
//! The snapshot lists courses, groups, users, enrolments and staff
//! assignments. It is validated once at load: every reference must resolve
//! and every non-blank remote identity must parse. Users whose remote identity
//! is blank or absent stay in the snapshot but never appear in a roster
//! query.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
    sync::Arc,
};

use rostra_core::{Course, CourseId, Group, GroupId, Roster, RosterError, UserId};
use serde::Deserialize;

/// Raw snapshot document.
#[derive(Debug, Deserialize)]
struct Snapshot {
    courses: Vec<Course>,
    #[serde(default)]
    groups: Vec<Group>,
    #[serde(default)]
    users: Vec<SnapshotUser>,
    #[serde(default)]
    enrolments: Vec<Enrolment>,
    #[serde(default)]
    staff: Vec<StaffAssignment>,
}

#[derive(Debug, Deserialize)]
struct SnapshotUser {
    id: i64,
    #[serde(default)]
    remote_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Enrolment {
    user: i64,
    course: CourseId,
    #[serde(default)]
    groups: Vec<GroupId>,
}

#[derive(Debug, Deserialize)]
struct StaffAssignment {
    user: i64,
    course: CourseId,
}

#[derive(Debug, Default)]
struct Index {
    courses: BTreeMap<CourseId, Course>,
    groups: BTreeMap<GroupId, Group>,
    /// (course, group memberships) -> remote ids of learners
    learners: BTreeMap<CourseId, Vec<(BTreeSet<GroupId>, UserId)>>,
    staff: BTreeMap<CourseId, BTreeSet<UserId>>,
}

/// Read-only roster backed by a validated snapshot.
///
/// Clone is cheap (Arc).
#[derive(Debug, Clone)]
pub struct FileRoster {
    index: Arc<Index>,
}

impl FileRoster {
    /// Load and validate a snapshot file.
    ///
    /// # Errors
    ///
    /// - `RosterError::Unavailable` if the file cannot be read
    /// - `RosterError::Invalid` if it is not a valid snapshot
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RosterError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| RosterError::Unavailable(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Parse and validate a snapshot document.
    pub fn from_json(json: &str) -> Result<Self, RosterError> {
        let snapshot: Snapshot =
            serde_json::from_str(json).map_err(|e| RosterError::Invalid(e.to_string()))?;
        let index = build_index(snapshot)?;

        tracing::debug!(
            courses = index.courses.len(),
            groups = index.groups.len(),
            "roster snapshot loaded"
        );
        Ok(Self { index: Arc::new(index) })
    }
}

fn build_index(snapshot: Snapshot) -> Result<Index, RosterError> {
    let mut index = Index::default();

    for course in snapshot.courses {
        if index.courses.insert(course.id, course.clone()).is_some() {
            return Err(RosterError::Invalid(format!("duplicate course {}", course.id)));
        }
    }

    for group in snapshot.groups {
        if !index.courses.contains_key(&group.course_id) {
            return Err(RosterError::Invalid(format!(
                "group {} refers to unknown course {}",
                group.id, group.course_id
            )));
        }
        if index.groups.insert(group.id, group.clone()).is_some() {
            return Err(RosterError::Invalid(format!("duplicate group {}", group.id)));
        }
    }

    let mut remote_ids: BTreeMap<i64, Option<UserId>> = BTreeMap::new();
    for user in snapshot.users {
        let remote_id = match user.remote_id.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(UserId::parse(raw).map_err(|e| {
                RosterError::Invalid(format!("user {}: {e}", user.id))
            })?),
        };
        if remote_ids.insert(user.id, remote_id).is_some() {
            return Err(RosterError::Invalid(format!("duplicate user {}", user.id)));
        }
    }

    let resolve = |user: i64, course: CourseId| -> Result<Option<UserId>, RosterError> {
        if !index.courses.contains_key(&course) {
            return Err(RosterError::Invalid(format!("unknown course {course}")));
        }
        remote_ids
            .get(&user)
            .cloned()
            .ok_or_else(|| RosterError::Invalid(format!("unknown user {user}")))
    };

    let mut learners: BTreeMap<CourseId, Vec<(BTreeSet<GroupId>, UserId)>> = BTreeMap::new();
    for enrolment in snapshot.enrolments {
        let remote_id = resolve(enrolment.user, enrolment.course)?;
        for group_id in &enrolment.groups {
            match index.groups.get(group_id) {
                Some(group) if group.course_id == enrolment.course => {},
                _ => {
                    return Err(RosterError::Invalid(format!(
                        "user {} is enrolled in group {group_id} outside course {}",
                        enrolment.user, enrolment.course
                    )));
                },
            }
        }
        if let Some(remote_id) = remote_id {
            let groups = enrolment.groups.into_iter().collect();
            learners.entry(enrolment.course).or_default().push((groups, remote_id));
        }
    }

    let mut staff: BTreeMap<CourseId, BTreeSet<UserId>> = BTreeMap::new();
    for assignment in snapshot.staff {
        if let Some(remote_id) = resolve(assignment.user, assignment.course)? {
            staff.entry(assignment.course).or_default().insert(remote_id);
        }
    }

    index.learners = learners;
    index.staff = staff;
    Ok(index)
}

impl Roster for FileRoster {
    fn course(&self, course_id: CourseId) -> Result<Option<Course>, RosterError> {
        Ok(self.index.courses.get(&course_id).cloned())
    }

    fn group(&self, group_id: GroupId) -> Result<Option<Group>, RosterError> {
        Ok(self.index.groups.get(&group_id).cloned())
    }

    fn groups_in_course(&self, course_id: CourseId) -> Result<Vec<Group>, RosterError> {
        Ok(self.index.groups.values().filter(|g| g.course_id == course_id).cloned().collect())
    }

    fn enrolled_learners(
        &self,
        course_id: CourseId,
        group_id: Option<GroupId>,
    ) -> Result<BTreeSet<UserId>, RosterError> {
        let Some(enrolled) = self.index.learners.get(&course_id) else {
            return Ok(BTreeSet::new());
        };

        Ok(enrolled
            .iter()
            .filter(|(groups, _)| group_id.is_none_or(|g| groups.contains(&g)))
            .map(|(_, user)| user.clone())
            .collect())
    }

    fn staff(&self, course_id: CourseId) -> Result<BTreeSet<UserId>, RosterError> {
        Ok(self.index.staff.get(&course_id).cloned().unwrap_or_default())
    }
}
