//! Redb-backed durable storage for room mappings and chat modules.
//!
//! Every mutation runs in one write transaction, so the pair index and the
//! mapping records can never disagree after a crash.

use std::{fmt::Display, path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use rostra_core::{
    CourseId, GroupId, MappingId, Module, ModuleId, ModuleStore, RoomDirectory, RoomMapping,
    StoreError, Timestamp, directory, module,
};
use serde::{Serialize, de::DeserializeOwned};

/// Table: mappings
/// Key: mapping id as big-endian bytes [8 bytes]
/// Value: CBOR-encoded RoomMapping
const MAPPINGS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("mappings");

/// Table: mapping_keys
/// Key: (course_id, group_id or 0) as big-endian bytes [16 bytes]
/// Value: mapping id as big-endian bytes [8 bytes]
const MAPPING_KEYS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("mapping_keys");

/// Table: modules
/// Key: module id as big-endian bytes [8 bytes]
/// Value: CBOR-encoded Module
const MODULES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("modules");

/// Table: sequences
/// Key: sequence name
/// Value: last issued identifier
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

const MAPPING_SEQUENCE: &str = "mapping";
const MODULE_SEQUENCE: &str = "module";

/// Durable directory and module store backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a Redb database at the given path.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        let txn = db.begin_write().map_err(io)?;
        {
            let _ = txn.open_table(MAPPINGS).map_err(io)?;
            let _ = txn.open_table(MAPPING_KEYS).map_err(io)?;
            let _ = txn.open_table(MODULES).map_err(io)?;
            let _ = txn.open_table(SEQUENCES).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl RoomDirectory for RedbStore {
    fn find_mapping(
        &self,
        course_id: CourseId,
        group_id: Option<GroupId>,
    ) -> Result<Option<RoomMapping>, StoreError> {
        let txn = self.db.begin_read().map_err(io)?;
        let keys = txn.open_table(MAPPING_KEYS).map_err(io)?;

        let pair = encode_pair_key(course_id, group_id);
        let Some(id) = keys.get(pair.as_slice()).map_err(io)?.map(|v| v.value().to_vec()) else {
            return Ok(None);
        };

        let mappings = txn.open_table(MAPPINGS).map_err(io)?;
        match mappings.get(id.as_slice()).map_err(io)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Err(StoreError::InvalidState(format!(
                "pair index of course {course_id} points at a missing mapping"
            ))),
        }
    }

    fn insert_mapping(&self, mapping: &RoomMapping) -> Result<MappingId, StoreError> {
        directory::check_insertable(mapping)?;

        let txn = self.db.begin_write().map_err(io)?;
        let id = {
            let mut keys = txn.open_table(MAPPING_KEYS).map_err(io)?;
            let pair = encode_pair_key(mapping.course_id, mapping.group_id);

            if keys.get(pair.as_slice()).map_err(io)?.is_some() {
                return Err(StoreError::Conflict(format!(
                    "course {} group {:?} is already mapped",
                    mapping.course_id,
                    mapping.group_id.map(GroupId::get)
                )));
            }

            let id = MappingId::new(next_id(&txn, MAPPING_SEQUENCE)?)
                .map_err(|e| StoreError::InvalidState(e.to_string()))?;
            let bytes = encode(&RoomMapping { id, ..mapping.clone() })?;
            let key = encode_id_key(id.get());

            keys.insert(pair.as_slice(), key.as_slice()).map_err(io)?;
            let mut mappings = txn.open_table(MAPPINGS).map_err(io)?;
            mappings.insert(key.as_slice(), bytes.as_slice()).map_err(io)?;
            id
        };
        txn.commit().map_err(io)?;

        Ok(id)
    }

    fn find_all_mappings(
        &self,
        course_id: Option<CourseId>,
    ) -> Result<Vec<RoomMapping>, StoreError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(MAPPINGS).map_err(io)?;

        let mut mappings = Vec::new();
        for result in table.iter().map_err(io)? {
            let (_, value) = result.map_err(io)?;
            let mapping: RoomMapping = decode(value.value())?;
            if course_id.is_none_or(|c| mapping.course_id == c) {
                mappings.push(mapping);
            }
        }

        Ok(mappings)
    }

    fn remove_mapping(&self, mapping: &RoomMapping) -> Result<(), StoreError> {
        let id = directory::check_persisted(mapping)?;

        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(MAPPINGS).map_err(io)?;
            let key = encode_id_key(id.get());
            let removed = table.remove(key.as_slice()).map_err(io)?.map(|v| v.value().to_vec());

            if let Some(bytes) = removed {
                let stored: RoomMapping = decode(&bytes)?;
                let mut keys = txn.open_table(MAPPING_KEYS).map_err(io)?;
                let pair = encode_pair_key(stored.course_id, stored.group_id);
                keys.remove(pair.as_slice()).map_err(io)?;
            }
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn touch_mapping(
        &self,
        mapping: &RoomMapping,
        modified_at: Timestamp,
    ) -> Result<(), StoreError> {
        let id = directory::check_persisted(mapping)?;

        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(MAPPINGS).map_err(io)?;
            let key = encode_id_key(id.get());

            let current = table.get(key.as_slice()).map_err(io)?.map(|v| v.value().to_vec());
            let Some(bytes) = current else {
                return Err(StoreError::InvalidState(format!("mapping {id} no longer exists")));
            };

            let mut stored: RoomMapping = decode(&bytes)?;
            stored.modified_at = modified_at;
            table.insert(key.as_slice(), encode(&stored)?.as_slice()).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }
}

impl ModuleStore for RedbStore {
    fn insert(&self, module: &Module) -> Result<ModuleId, StoreError> {
        module::check_insertable(module)?;

        let txn = self.db.begin_write().map_err(io)?;
        let id = {
            let id = ModuleId::new(next_id(&txn, MODULE_SEQUENCE)?)
                .map_err(|e| StoreError::InvalidState(e.to_string()))?;
            let bytes = encode(&Module { id, ..module.clone() })?;

            let mut table = txn.open_table(MODULES).map_err(io)?;
            table.insert(encode_id_key(id.get()).as_slice(), bytes.as_slice()).map_err(io)?;
            id
        };
        txn.commit().map_err(io)?;

        Ok(id)
    }

    fn find(&self, id: ModuleId) -> Result<Option<Module>, StoreError> {
        if id.is_unknown() {
            return Ok(None);
        }

        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(MODULES).map_err(io)?;

        match table.get(encode_id_key(id.get()).as_slice()).map_err(io)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn find_by_course(&self, course_id: CourseId) -> Result<Vec<Module>, StoreError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(MODULES).map_err(io)?;

        let mut modules = Vec::new();
        for result in table.iter().map_err(io)? {
            let (_, value) = result.map_err(io)?;
            let module: Module = decode(value.value())?;
            if module.course_id == course_id {
                modules.push(module);
            }
        }

        Ok(modules)
    }

    fn update(&self, module: &Module) -> Result<(), StoreError> {
        if !module.is_persisted() {
            return Err(StoreError::InvalidState("module has no persisted identity".to_string()));
        }

        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(MODULES).map_err(io)?;
            let key = encode_id_key(module.id.get());

            if table.get(key.as_slice()).map_err(io)?.is_none() {
                return Err(StoreError::InvalidState(format!(
                    "module {} does not exist",
                    module.id
                )));
            }

            table.insert(key.as_slice(), encode(module)?.as_slice()).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn remove(&self, id: ModuleId) -> Result<bool, StoreError> {
        if id.is_unknown() {
            return Ok(false);
        }

        let txn = self.db.begin_write().map_err(io)?;
        let removed = {
            let mut table = txn.open_table(MODULES).map_err(io)?;
            table.remove(encode_id_key(id.get()).as_slice()).map_err(io)?.is_some()
        };
        txn.commit().map_err(io)?;

        Ok(removed)
    }
}

/// Advance a named sequence and return the new value.
fn next_id(txn: &redb::WriteTransaction, sequence: &str) -> Result<i64, StoreError> {
    let mut table = txn.open_table(SEQUENCES).map_err(io)?;
    let last = table.get(sequence).map_err(io)?.map_or(0, |v| v.value());
    let next = last + 1;
    table.insert(sequence, next).map_err(io)?;

    i64::try_from(next)
        .map_err(|_| StoreError::InvalidState(format!("{sequence} sequence exhausted")))
}

/// Encode a positive identifier as 8-byte big-endian key.
fn encode_id_key(id: i64) -> [u8; 8] {
    debug_assert!(id > 0);
    id.to_be_bytes()
}

/// Encode a `(course, group)` pair as 16-byte big-endian key.
///
/// Layout: [course_id: 8 bytes BE][group_id or 0: 8 bytes BE]
fn encode_pair_key(course_id: CourseId, group_id: Option<GroupId>) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&course_id.get().to_be_bytes());
    key[8..].copy_from_slice(&group_id.map_or(0, GroupId::get).to_be_bytes());
    key
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn io(err: impl Display) -> StoreError {
    StoreError::Io(err.to_string())
}
