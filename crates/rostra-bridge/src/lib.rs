//! Production glue for rostra.
//!
//! Wraps [`rostra_core`]'s trait-based logic with real I/O:
//!
//! - [`HttpRoomApi`]: blocking client-server API transport (reqwest)
//! - [`RedbStore`]: durable room directory and module store (redb)
//! - [`FileRoster`]: roster from a validated JSON snapshot
//! - [`SystemEnv`]: wall-clock time
//!
//! The `rostra` binary assembles these into a
//! [`CourseRooms`](rostra_core::CourseRooms) service and exposes its
//! operations as subcommands.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod http;
pub mod roster;
pub mod storage;
mod system_env;

pub use error::BridgeError;
pub use http::HttpRoomApi;
pub use roster::FileRoster;
pub use storage::RedbStore;
pub use system_env::SystemEnv;

/// The service as assembled by the binary.
pub type ProductionRooms =
    rostra_core::CourseRooms<HttpRoomApi, RedbStore, RedbStore, FileRoster, SystemEnv>;
