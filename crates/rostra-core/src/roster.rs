//! Roster source: courses, groups, enrolments and staff.
//!
//! The roster is authoritative. It is read fresh on every reconciliation and
//! never cached. Users without a linked remote identity are invisible here.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    error::RosterError,
    ids::{CourseId, GroupId, UserId},
};

/// A course as known to the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    /// Identity
    pub id: CourseId,
    /// Short name, used in room names
    pub short_name: String,
    /// Full name
    pub full_name: String,
}

/// A group within a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Identity
    pub id: GroupId,
    /// Owning course
    pub course_id: CourseId,
    /// Display name, used in room names
    pub name: String,
}

/// Read access to the roster.
pub trait Roster {
    /// Course by identity.
    fn course(&self, course_id: CourseId) -> Result<Option<Course>, RosterError>;

    /// Group by identity.
    fn group(&self, group_id: GroupId) -> Result<Option<Group>, RosterError>;

    /// Groups of a course. Empty when the course is not split into groups.
    fn groups_in_course(&self, course_id: CourseId) -> Result<Vec<Group>, RosterError>;

    /// Remote identities of learners enrolled in the course, restricted to
    /// members of `group_id` when given.
    fn enrolled_learners(
        &self,
        course_id: CourseId,
        group_id: Option<GroupId>,
    ) -> Result<BTreeSet<UserId>, RosterError>;

    /// Remote identities of the course's staff.
    fn staff(&self, course_id: CourseId) -> Result<BTreeSet<UserId>, RosterError>;
}

impl<T: Roster + ?Sized> Roster for &T {
    fn course(&self, course_id: CourseId) -> Result<Option<Course>, RosterError> {
        (**self).course(course_id)
    }

    fn group(&self, group_id: GroupId) -> Result<Option<Group>, RosterError> {
        (**self).group(group_id)
    }

    fn groups_in_course(&self, course_id: CourseId) -> Result<Vec<Group>, RosterError> {
        (**self).groups_in_course(course_id)
    }

    fn enrolled_learners(
        &self,
        course_id: CourseId,
        group_id: Option<GroupId>,
    ) -> Result<BTreeSet<UserId>, RosterError> {
        (**self).enrolled_learners(course_id, group_id)
    }

    fn staff(&self, course_id: CourseId) -> Result<BTreeSet<UserId>, RosterError> {
        (**self).staff(course_id)
    }
}
