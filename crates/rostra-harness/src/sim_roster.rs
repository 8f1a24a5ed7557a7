//! Mutable in-memory roster.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex},
};

use rostra_core::{Course, CourseId, Group, GroupId, Roster, RosterError, UserId};

#[derive(Default)]
struct Inner {
    courses: BTreeMap<CourseId, Course>,
    groups: BTreeMap<GroupId, Group>,
    /// course -> learner -> groups
    learners: BTreeMap<CourseId, BTreeMap<UserId, BTreeSet<GroupId>>>,
    staff: BTreeMap<CourseId, BTreeSet<UserId>>,
    unavailable: bool,
}

/// Roster that tests can change between passes.
///
/// Clones share the same data. Setters never validate; tests that want a
/// dangling reference get one.
#[derive(Clone, Default)]
pub struct SimRoster {
    inner: Arc<Mutex<Inner>>,
}

impl SimRoster {
    /// Empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("Mutex poisoned")
    }

    /// Add a course.
    pub fn add_course(&self, course_id: CourseId, short_name: &str) -> &Self {
        let course = Course {
            id: course_id,
            short_name: short_name.to_string(),
            full_name: short_name.to_string(),
        };
        self.lock().courses.insert(course_id, course);
        self
    }

    /// Add a group to a course.
    pub fn add_group(&self, group_id: GroupId, course_id: CourseId, name: &str) -> &Self {
        let group = Group { id: group_id, course_id, name: name.to_string() };
        self.lock().groups.insert(group_id, group);
        self
    }

    /// Enrol a learner in a course and the given groups.
    pub fn enrol(&self, course_id: CourseId, user_id: UserId, groups: &[GroupId]) -> &Self {
        self.lock()
            .learners
            .entry(course_id)
            .or_default()
            .entry(user_id)
            .or_default()
            .extend(groups.iter().copied());
        self
    }

    /// Remove a learner from a course.
    pub fn unenrol(&self, course_id: CourseId, user_id: &UserId) -> &Self {
        if let Some(learners) = self.lock().learners.get_mut(&course_id) {
            learners.remove(user_id);
        }
        self
    }

    /// Assign a staff member to a course.
    pub fn add_staff(&self, course_id: CourseId, user_id: UserId) -> &Self {
        self.lock().staff.entry(course_id).or_default().insert(user_id);
        self
    }

    /// Remove a staff member from a course.
    pub fn remove_staff(&self, course_id: CourseId, user_id: &UserId) -> &Self {
        if let Some(staff) = self.lock().staff.get_mut(&course_id) {
            staff.remove(user_id);
        }
        self
    }

    /// Make every query fail with `RosterError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    fn read(&self) -> Result<std::sync::MutexGuard<'_, Inner>, RosterError> {
        let inner = self.lock();
        if inner.unavailable {
            return Err(RosterError::Unavailable("simulated outage".to_string()));
        }
        Ok(inner)
    }
}

impl Roster for SimRoster {
    fn course(&self, course_id: CourseId) -> Result<Option<Course>, RosterError> {
        Ok(self.read()?.courses.get(&course_id).cloned())
    }

    fn group(&self, group_id: GroupId) -> Result<Option<Group>, RosterError> {
        Ok(self.read()?.groups.get(&group_id).cloned())
    }

    fn groups_in_course(&self, course_id: CourseId) -> Result<Vec<Group>, RosterError> {
        Ok(self.read()?.groups.values().filter(|g| g.course_id == course_id).cloned().collect())
    }

    fn enrolled_learners(
        &self,
        course_id: CourseId,
        group_id: Option<GroupId>,
    ) -> Result<BTreeSet<UserId>, RosterError> {
        let inner = self.read()?;
        let Some(learners) = inner.learners.get(&course_id) else {
            return Ok(BTreeSet::new());
        };

        Ok(learners
            .iter()
            .filter(|(_, groups)| group_id.is_none_or(|g| groups.contains(&g)))
            .map(|(user, _)| user.clone())
            .collect())
    }

    fn staff(&self, course_id: CourseId) -> Result<BTreeSet<UserId>, RosterError> {
        Ok(self.read()?.staff.get(&course_id).cloned().unwrap_or_default())
    }
}
