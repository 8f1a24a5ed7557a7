//! Durable storage for the room directory and the module store.
//!
//! The traits live in `rostra-core` together with their in-memory
//! implementations; this module adds the Redb backend used by the binary.

mod redb;

pub use self::redb::RedbStore;
