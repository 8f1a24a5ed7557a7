//! Chaos property tests for provisioning and reconciliation
//!
//! Calls fail at random through [`ChaoticApi`]. Injected failures happen
//! before the call reaches the homeserver, so these tests check that
//! whatever prefix of a pass got applied, a fault-free rerun converges:
//! - interrupted passes never kick the agent
//! - a clean resync after any number of failed ones satisfies every
//!   convergence invariant
//! - failed provisioning never leaves a mapping without a room, nor a room
//!   without a mapping

use proptest::prelude::*;
use rostra_core::{
    CourseId, CourseRooms, GroupId, MemoryDirectory, MemoryModuleStore, RoomDirectory, RoomName,
    RoomProvisioner, RoomTopic, SyncError, UserId,
};
use rostra_harness::{
    ApiCall, ChaoticApi, InvariantRegistry, SimEnv, SimHomeserver, SimRoster, SystemSnapshot,
};

fn agent() -> UserId {
    UserId::parse("@rostra:example.org").unwrap()
}

fn user(n: u8) -> UserId {
    UserId::parse(format!("@user{n}:example.org")).unwrap()
}

fn course() -> CourseId {
    CourseId::new(7).unwrap()
}

/// Roster of course 7: learners split over groups 1 and 2 by parity.
fn roster(learners: &[u8], staff: &[u8]) -> SimRoster {
    let roster = SimRoster::new();
    let (g1, g2) = (GroupId::new(1).unwrap(), GroupId::new(2).unwrap());
    roster.add_course(course(), "C7").add_group(g1, course(), "One").add_group(g2, course(), "Two");
    for &n in learners {
        roster.enrol(course(), user(n), &[if n % 2 == 0 { g1 } else { g2 }]);
    }
    for &n in staff {
        roster.add_staff(course(), user(n));
    }
    roster
}

/// Directory with one mapped room per group, each seeded with `present`.
fn provisioned(server: &SimHomeserver, present: &[u8]) -> MemoryDirectory {
    let directory = MemoryDirectory::new();
    let provisioner = RoomProvisioner::new(server.clone(), directory.clone(), SimEnv::default());
    for group in [1, 2] {
        let name = RoomName::new(&format!("Group {group}")).unwrap();
        let room_id = provisioner
            .ensure_room(course(), Some(GroupId::new(group).unwrap()), &name, &RoomTopic::new(""))
            .unwrap();
        server.set_occupants(&room_id, present.iter().copied().map(user).chain([agent()]));
    }
    directory
}

fn assert_converged(server: &SimHomeserver, directory: &MemoryDirectory, roster: &SimRoster) {
    let snapshot = SystemSnapshot::capture(server, directory, roster).unwrap();
    InvariantRegistry::standard().assert_all(&snapshot, "after clean resync");
}

fn ids() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0u8..20, 0..10)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: any mix of failed resyncs is repaired by one clean resync
    #[test]
    fn prop_clean_resync_converges_after_chaos(
        failure_rate in 0.05..0.6,
        seed in any::<u64>(),
        present in ids(),
        learners in ids(),
        staff in ids(),
        attempts in 1usize..5,
    ) {
        let server = SimHomeserver::new(agent());
        let directory = provisioned(&server, &present);
        let roster = roster(&learners, &staff);
        server.clear_calls();

        let chaotic = CourseRooms::new(
            ChaoticApi::with_seed(server.clone(), failure_rate, seed),
            directory.clone(),
            MemoryModuleStore::new(),
            roster.clone(),
            SimEnv::default(),
        );
        for _ in 0..attempts {
            match chaotic.resync_all(None) {
                Ok(_) => {},
                Err(err) => prop_assert!(err.is_transient(), "unexpected error {err}"),
            }
        }

        let agent_kicked = server.calls().iter().any(|call| {
            matches!(call, ApiCall::Kick { user_id, .. } if *user_id == agent())
        });
        prop_assert!(!agent_kicked);

        let clean = CourseRooms::new(
            server.clone(),
            directory.clone(),
            MemoryModuleStore::new(),
            roster.clone(),
            SimEnv::default(),
        );
        clean.resync_all(None).unwrap();
        assert_converged(&server, &directory, &roster);
    }

    /// Property: failed provisioning leaves no half-provisioned pair behind
    #[test]
    fn prop_provisioning_chaos_leaves_no_orphans(
        failure_rate in 0.1..0.9,
        seed in any::<u64>(),
        attempts in 1usize..6,
    ) {
        let server = SimHomeserver::new(agent());
        let directory = MemoryDirectory::new();
        let chaotic = RoomProvisioner::new(
            ChaoticApi::with_seed(server.clone(), failure_rate, seed),
            directory.clone(),
            SimEnv::default(),
        );
        let name = RoomName::new("Chat").unwrap();

        let mut provisioned = None;
        for _ in 0..attempts {
            match chaotic.ensure_room(course(), None, &name, &RoomTopic::new("")) {
                Ok(room_id) => {
                    prop_assert!(provisioned.as_ref().is_none_or(|earlier| *earlier == room_id));
                    provisioned = Some(room_id);
                },
                Err(err) => prop_assert!(matches!(err, SyncError::Remote(_))),
            }
            prop_assert_eq!(server.room_ids().len(), directory.len());
        }

        let clean = RoomProvisioner::new(server.clone(), directory.clone(), SimEnv::default());
        let room_id = clean.ensure_room(course(), None, &name, &RoomTopic::new("")).unwrap();

        prop_assert_eq!(server.room_ids(), vec![room_id.clone()]);
        prop_assert_eq!(directory.find_mapping(course(), None).unwrap().unwrap().room_id, room_id);
    }
}
