//! Module lifecycle: the triggers that provision, rename, reconcile and
//! remove rooms.
//!
//! [`CourseRooms`] wires the roster, the stores and the remote API together
//! through its constructor. It holds no state of its own; every call reads
//! the roster and the directory afresh.

use crate::{
    api::RoomApi,
    directory::{RoomDirectory, RoomMapping},
    env::Environment,
    error::{NotFound, SyncError},
    ids::{CourseId, GroupId, ModuleId, RoomId},
    module::{Module, ModuleStore},
    naming::{self, RoomName, RoomTopic},
    provision::RoomProvisioner,
    roster::{Course, Roster},
    sync::{RoomSynchronizer, SyncReport},
};

/// Course-level room management.
#[derive(Debug, Clone)]
pub struct CourseRooms<A, D, M, R, E> {
    api: A,
    directory: D,
    modules: M,
    roster: R,
    env: E,
}

impl<A, D, M, R, E> CourseRooms<A, D, M, R, E>
where
    A: RoomApi,
    D: RoomDirectory,
    M: ModuleStore,
    R: Roster,
    E: Environment,
{
    /// Service over the given collaborators.
    pub fn new(api: A, directory: D, modules: M, roster: R, env: E) -> Self {
        Self { api, directory, modules, roster, env }
    }

    /// Remote API.
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Room directory.
    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Module store.
    pub fn modules(&self) -> &M {
        &self.modules
    }

    /// Persist a new module and provision its rooms.
    ///
    /// A course with groups gets one room per group, a course without groups
    /// one whole-course room. Rooms that already exist are reused. Every room
    /// is reconciled against the roster before returning.
    ///
    /// The module stays persisted if provisioning fails; a later
    /// [`resync_all`](Self::resync_all) or re-add completes the rooms.
    pub fn add_module(&self, module: &Module) -> Result<Module, SyncError> {
        let course = self.require_course(module.course_id)?;

        let id = self.modules.insert(module)?;
        let module = Module { id, ..module.clone() };
        tracing::info!(
            module_id = %id,
            course_id = %course.id,
            name = %module.name,
            "module added"
        );

        let groups = self.roster.groups_in_course(course.id)?;
        let scopes: Vec<(Option<GroupId>, Option<&str>)> = if groups.is_empty() {
            vec![(None, None)]
        } else {
            groups.iter().map(|g| (Some(g.id), Some(g.name.as_str()))).collect()
        };

        let provisioner = self.provisioner();
        for (group_id, group_name) in scopes {
            let name = naming::room_name(&course.short_name, group_name, &module.name);
            let topic = naming::room_topic(&module.topic);
            provisioner.ensure_room(course.id, group_id, &name, &topic)?;
            self.sync_room(course.id, group_id)?;
        }

        Ok(module)
    }

    /// Persist a module's new name and topic and push them to its rooms.
    pub fn update_module(&self, module: &Module) -> Result<(), SyncError> {
        let course = self.require_course(module.course_id)?;

        let now = self.env.now();
        self.modules.update(&Module { modified_at: now, ..module.clone() })?;

        let provisioner = self.provisioner();
        for mapping in self.directory.find_all_mappings(Some(course.id))? {
            let name = self.room_name_for(&course, &mapping, module)?;
            provisioner.update_room(&mapping.room_id, &name, &naming::room_topic(&module.topic))?;
            self.directory.touch_mapping(&mapping, now)?;
        }

        tracing::info!(module_id = %module.id, name = %module.name, "module updated");
        Ok(())
    }

    /// Delete a module. Returns false if it does not exist.
    ///
    /// Rooms are shared by every module of a course, so they are removed only
    /// together with the course's last module.
    pub fn delete_module(&self, module_id: ModuleId) -> Result<bool, SyncError> {
        let Some(module) = self.modules.find(module_id)? else {
            return Ok(false);
        };

        let siblings = self
            .modules
            .find_by_course(module.course_id)?
            .into_iter()
            .filter(|m| m.id != module.id)
            .count();

        if siblings == 0 {
            for mapping in self.directory.find_all_mappings(Some(module.course_id))? {
                self.remove_room(&mapping.room_id)?;
                self.directory.remove_mapping(&mapping)?;
            }
        } else {
            tracing::debug!(%module_id, siblings, "course keeps its rooms");
        }

        self.modules.remove(module_id)?;
        tracing::info!(%module_id, course_id = %module.course_id, "module deleted");
        Ok(true)
    }

    /// Reconcile the room of one pair against the roster.
    ///
    /// # Errors
    ///
    /// `NotFound` when the pair has no room.
    pub fn sync_room(
        &self,
        course_id: CourseId,
        group_id: Option<GroupId>,
    ) -> Result<SyncReport, SyncError> {
        let mapping = self
            .directory
            .find_mapping(course_id, group_id)?
            .ok_or(NotFound::Mapping { course_id, group_id })?;

        let learners = self.roster.enrolled_learners(course_id, group_id)?;
        let staff = self.roster.staff(course_id)?;

        Ok(self.synchronizer().synchronize_room_members(&mapping.room_id, &learners, &staff)?)
    }

    /// Reconcile every room, or every room of one course.
    ///
    /// Rooms whose mapping disappears during the sweep are skipped. Any other
    /// failure aborts the sweep.
    pub fn resync_all(&self, course_id: Option<CourseId>) -> Result<Vec<SyncReport>, SyncError> {
        let mappings = self.directory.find_all_mappings(course_id)?;
        let mut reports = Vec::with_capacity(mappings.len());

        for mapping in mappings {
            match self.sync_room(mapping.course_id, mapping.group_id) {
                Ok(report) => reports.push(report),
                Err(SyncError::NotFound(NotFound::Mapping { .. })) => {
                    tracing::warn!(
                        course_id = %mapping.course_id,
                        room_id = %mapping.room_id,
                        "mapping vanished during resync, skipping"
                    );
                },
                Err(err) => return Err(err),
            }
        }

        tracing::info!(rooms = reports.len(), "resync complete");
        Ok(reports)
    }

    /// Kick every occupant of a room except the agent.
    pub fn remove_room(&self, room_id: &RoomId) -> Result<usize, SyncError> {
        Ok(self.synchronizer().evict_all(room_id)?)
    }

    /// Write a new name and topic into a room.
    pub fn update_room(
        &self,
        room_id: &RoomId,
        name: &RoomName,
        topic: &RoomTopic,
    ) -> Result<(), SyncError> {
        self.provisioner().update_room(room_id, name, topic)
    }

    fn provisioner(&self) -> RoomProvisioner<&A, D, E> {
        RoomProvisioner::new(&self.api, self.directory.clone(), self.env.clone())
    }

    fn synchronizer(&self) -> RoomSynchronizer<&A> {
        RoomSynchronizer::new(&self.api)
    }

    fn require_course(&self, course_id: CourseId) -> Result<Course, SyncError> {
        self.roster.course(course_id)?.ok_or_else(|| NotFound::Course(course_id).into())
    }

    fn room_name_for(
        &self,
        course: &Course,
        mapping: &RoomMapping,
        module: &Module,
    ) -> Result<RoomName, SyncError> {
        let group = match mapping.group_id {
            Some(group_id) => Some(self.roster.group(group_id)?.ok_or(NotFound::Group(group_id))?),
            None => None,
        };
        let group_name = group.as_ref().map(|g| g.name.as_str());
        Ok(naming::room_name(&course.short_name, group_name, &module.name))
    }
}
