//! Chat modules: the course activities that own rooms.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::StoreError,
    ids::{CourseId, ModuleId, SectionId, Timestamp},
    naming::{ModuleName, RoomTopic},
};

/// Host-defined module type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleKind(u32);

impl ModuleKind {
    /// Type code of a plain chat module.
    pub const CHAT: Self = Self(1);

    /// Wrap a host type code.
    pub const fn new(code: u32) -> Self {
        Self(code)
    }

    /// Raw type code.
    pub const fn code(self) -> u32 {
        self.0
    }
}

impl Default for ModuleKind {
    fn default() -> Self {
        Self::CHAT
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chat activity placed in a course section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// Persisted identity; [`ModuleId::unknown`] until inserted
    pub id: ModuleId,
    /// Host type code
    pub kind: ModuleKind,
    /// Display name, used to derive room names
    pub name: ModuleName,
    /// Topic, copied to every room of the module
    pub topic: RoomTopic,
    /// Owning course
    pub course_id: CourseId,
    /// Section the module is placed in
    pub section_id: SectionId,
    /// Creation time
    pub created_at: Timestamp,
    /// Last update; [`Timestamp::ZERO`] if never
    pub modified_at: Timestamp,
}

impl Module {
    /// Unpersisted module.
    pub fn new(
        kind: ModuleKind,
        name: ModuleName,
        topic: RoomTopic,
        course_id: CourseId,
        section_id: SectionId,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: ModuleId::unknown(),
            kind,
            name,
            topic,
            course_id,
            section_id,
            created_at,
            modified_at: Timestamp::ZERO,
        }
    }

    /// Whether the module has a persisted identity.
    pub fn is_persisted(&self) -> bool {
        !self.id.is_unknown()
    }
}

/// Persistence of chat modules.
pub trait ModuleStore: Clone + Send + Sync + 'static {
    /// Persist a new module and return its identity.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the module is already persisted or refers to an
    /// unknown course or section.
    fn insert(&self, module: &Module) -> Result<ModuleId, StoreError>;

    /// Module by identity.
    fn find(&self, id: ModuleId) -> Result<Option<Module>, StoreError>;

    /// Modules of a course, ordered by identity.
    fn find_by_course(&self, course_id: CourseId) -> Result<Vec<Module>, StoreError>;

    /// Overwrite a persisted module.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the module has no persisted identity or does not
    /// exist.
    fn update(&self, module: &Module) -> Result<(), StoreError>;

    /// Delete a module. Returns false if it did not exist.
    fn remove(&self, id: ModuleId) -> Result<bool, StoreError>;
}

/// Reject modules that must not be inserted.
pub fn check_insertable(module: &Module) -> Result<(), StoreError> {
    if module.is_persisted() {
        return Err(StoreError::InvalidState(format!("module {} is already persisted", module.id)));
    }
    if module.course_id.is_unknown() || module.section_id.is_unknown() {
        return Err(StoreError::InvalidState(
            "module refers to an unpersisted course or section".to_string(),
        ));
    }
    Ok(())
}

/// In-memory module store for tests and simulation.
#[derive(Clone, Default)]
pub struct MemoryModuleStore {
    inner: Arc<Mutex<MemoryModuleStoreInner>>,
}

#[derive(Default)]
struct MemoryModuleStoreInner {
    modules: BTreeMap<ModuleId, Module>,
    last_id: i64,
}

impl MemoryModuleStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModuleStore for MemoryModuleStore {
    #[allow(clippy::expect_used)]
    fn insert(&self, module: &Module) -> Result<ModuleId, StoreError> {
        check_insertable(module)?;
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        inner.last_id += 1;
        let id = ModuleId::new(inner.last_id).map_err(|e| StoreError::InvalidState(e.to_string()))?;
        inner.modules.insert(id, Module { id, ..module.clone() });
        Ok(id)
    }

    #[allow(clippy::expect_used)]
    fn find(&self, id: ModuleId) -> Result<Option<Module>, StoreError> {
        Ok(self.inner.lock().expect("Mutex poisoned").modules.get(&id).cloned())
    }

    #[allow(clippy::expect_used)]
    fn find_by_course(&self, course_id: CourseId) -> Result<Vec<Module>, StoreError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.modules.values().filter(|m| m.course_id == course_id).cloned().collect())
    }

    #[allow(clippy::expect_used)]
    fn update(&self, module: &Module) -> Result<(), StoreError> {
        if !module.is_persisted() {
            return Err(StoreError::InvalidState("module has no persisted identity".to_string()));
        }
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        let stored = inner
            .modules
            .get_mut(&module.id)
            .ok_or_else(|| {
                StoreError::InvalidState(format!("module {} does not exist", module.id))
            })?;
        *stored = module.clone();
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn remove(&self, id: ModuleId) -> Result<bool, StoreError> {
        Ok(self.inner.lock().expect("Mutex poisoned").modules.remove(&id).is_some())
    }
}
