//! Course chat-room provisioning and membership reconciliation.
//!
//! Keeps one remote chat room per course (or per group within a course) in
//! lockstep with the roster: learners and staff with a linked remote identity
//! are invited, staff get elevated permissions, and everyone else is removed.
//!
//! # Architecture
//!
//! All I/O sits behind traits injected through constructors:
//!
//! - [`RoomApi`]: remote room control (whoami, create, invite, kick, state)
//! - [`RoomDirectory`]: persisted `(course, group) -> room` mappings
//! - [`ModuleStore`]: persisted chat modules
//! - [`Roster`]: courses, groups, enrolments and staff
//! - [`Environment`]: wall-clock time
//!
//! [`plan_membership`] is pure and returns [`MembershipAction`]s;
//! [`RoomSynchronizer`] executes them. [`RoomProvisioner`] finds or creates
//! rooms and [`CourseRooms`] drives both from module lifecycle events.
//!
//! Everything is synchronous and single-threaded per call. Nothing is cached
//! between calls, no remote call is retried, and applied mutations are never
//! rolled back: a failed pass is completed by running it again.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod config;
pub mod directory;
pub mod env;
pub mod error;
pub mod ids;
pub mod lifecycle;
pub mod module;
pub mod naming;
pub mod provision;
pub mod roster;
pub mod sync;

pub use api::{
    CreateRoomRequest, CreationMetadata, InitialStateEvent, Membership, PermissionTier,
    PowerLevelOverride, RoomApi, RoomPreset, StateContent,
};
pub use config::Configuration;
pub use directory::{MemoryDirectory, RoomDirectory, RoomMapping};
pub use env::Environment;
pub use error::{NotFound, RemoteError, RosterError, StoreError, SyncError, ValidationError};
pub use ids::{CourseId, GroupId, MappingId, ModuleId, RoomId, SectionId, Timestamp, UserId};
pub use lifecycle::CourseRooms;
pub use module::{MemoryModuleStore, Module, ModuleKind, ModuleStore};
pub use naming::{ModuleName, RoomName, RoomTopic};
pub use provision::RoomProvisioner;
pub use roster::{Course, Group, Roster};
pub use sync::{MembershipAction, RoomSynchronizer, SyncReport, plan_membership};
