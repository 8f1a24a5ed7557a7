//! Model-based tests for the redb directory
//!
//! Random operation sequences are applied to both [`RedbStore`] and the
//! in-memory [`MemoryDirectory`]. Both must agree on every result and on the
//! final contents, including after the database is reopened.

use proptest::prelude::*;
use rostra_bridge::RedbStore;
use rostra_core::{
    CourseId, GroupId, MemoryDirectory, RoomDirectory, RoomId, RoomMapping, StoreError, Timestamp,
};
use tempfile::tempdir;

#[derive(Debug, Clone)]
enum Operation {
    Insert { course: i64, group: i64, room: u16 },
    Remove { nth: usize },
    Touch { nth: usize, secs: u64 },
}

fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        3 => (1i64..4, 0i64..3, any::<u16>())
            .prop_map(|(course, group, room)| Operation::Insert { course, group, room }),
        1 => (0usize..8).prop_map(|nth| Operation::Remove { nth }),
        1 => (0usize..8, 1u64..1_000_000).prop_map(|(nth, secs)| Operation::Touch { nth, secs }),
    ]
}

/// Outcome reduced to what both backends must agree on.
fn outcome<T: PartialEq + std::fmt::Debug>(
    result: Result<T, StoreError>,
) -> Result<T, &'static str> {
    result.map_err(|e| match e {
        StoreError::Conflict(_) => "conflict",
        StoreError::InvalidState(_) => "invalid_state",
        StoreError::Io(_) => "io",
        StoreError::Serialization(_) => "serialization",
    })
}

/// Mapping to act on: the nth stored one, or a stale copy of a removed one.
fn pick(model: &MemoryDirectory, graveyard: &[RoomMapping], nth: usize) -> Option<RoomMapping> {
    let live = model.find_all_mappings(None).unwrap();
    live.get(nth).cloned().or_else(|| graveyard.get(nth % graveyard.len().max(1)).cloned())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_redb_matches_memory(ops in prop::collection::vec(operation(), 1..40)) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("directory.redb");
        let store = RedbStore::open(&path).unwrap();
        let model = MemoryDirectory::new();
        let mut graveyard = Vec::new();

        for op in ops {
            match op {
                Operation::Insert { course, group, room } => {
                    let mapping = RoomMapping::new(
                        CourseId::new(course).unwrap(),
                        GroupId::from_host(group).unwrap(),
                        RoomId::parse(format!("!r{room}:example.org")).unwrap(),
                        Timestamp::from_secs(10),
                    );
                    prop_assert_eq!(
                        outcome(store.insert_mapping(&mapping)),
                        outcome(model.insert_mapping(&mapping))
                    );
                },
                Operation::Remove { nth } => {
                    if let Some(mapping) = pick(&model, &graveyard, nth) {
                        prop_assert_eq!(
                            outcome(store.remove_mapping(&mapping)),
                            outcome(model.remove_mapping(&mapping))
                        );
                        graveyard.push(mapping);
                    }
                },
                Operation::Touch { nth, secs } => {
                    if let Some(mapping) = pick(&model, &graveyard, nth) {
                        let at = Timestamp::from_secs(secs);
                        prop_assert_eq!(
                            outcome(store.touch_mapping(&mapping, at)),
                            outcome(model.touch_mapping(&mapping, at))
                        );
                    }
                },
            }
        }

        let expected = model.find_all_mappings(None).unwrap();
        prop_assert_eq!(&store.find_all_mappings(None).unwrap(), &expected);

        drop(store);
        let reopened = RedbStore::open(&path).unwrap();
        prop_assert_eq!(&reopened.find_all_mappings(None).unwrap(), &expected);
        for mapping in &expected {
            let found = reopened.find_mapping(mapping.course_id, mapping.group_id).unwrap();
            prop_assert_eq!(found.as_ref(), Some(mapping));
        }
    }
}
