//! Property-based tests for room-member synchronization
//!
//! The real [`RoomSynchronizer`] runs against the simulated homeserver, so
//! these properties cover planning, execution and the power-level write
//! together.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use rostra_core::{RoomSynchronizer, UserId};
use rostra_harness::{ApiCall, CallKind, SimHomeserver};

fn user(n: u8) -> UserId {
    UserId::parse(format!("@user{n}:example.org")).unwrap()
}

fn agent() -> UserId {
    UserId::parse("@rostra:example.org").unwrap()
}

fn users() -> impl Strategy<Value = BTreeSet<UserId>> {
    prop::collection::btree_set(0u8..24, 0..12).prop_map(|ids| ids.into_iter().map(user).collect())
}

fn membership_changes(server: &SimHomeserver) -> usize {
    server.calls().iter().filter(|call| call.is_membership_change()).count()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: after a pass, occupants are exactly learners, staff and the agent
    #[test]
    fn prop_sync_converges(present in users(), learners in users(), staff in users()) {
        let server = SimHomeserver::new(agent());
        let room_id = server.seed_room(present);

        RoomSynchronizer::new(server.clone())
            .synchronize_room_members(&room_id, &learners, &staff)
            .unwrap();

        let mut expected: BTreeSet<UserId> = learners.union(&staff).cloned().collect();
        expected.insert(agent());
        prop_assert_eq!(server.occupants(&room_id), expected);
    }

    /// Property: a second pass with the same roster changes no membership
    #[test]
    fn prop_second_pass_is_quiescent(present in users(), learners in users(), staff in users()) {
        let server = SimHomeserver::new(agent());
        let room_id = server.seed_room(present);
        let synchronizer = RoomSynchronizer::new(server.clone());

        synchronizer.synchronize_room_members(&room_id, &learners, &staff).unwrap();
        server.clear_calls();
        let report = synchronizer.synchronize_room_members(&room_id, &learners, &staff).unwrap();

        prop_assert_eq!(membership_changes(&server), 0);
        prop_assert_eq!((report.invited, report.kicked), (0, 0));
    }

    /// Property: the agent is never kicked, even when the roster omits it
    #[test]
    fn prop_agent_never_kicked(present in users(), learners in users(), staff in users()) {
        let server = SimHomeserver::new(agent());
        let room_id = server.seed_room(present);

        RoomSynchronizer::new(server.clone())
            .synchronize_room_members(&room_id, &learners, &staff)
            .unwrap();

        let kicked_agent = server.calls().iter().any(|call| {
            matches!(call, ApiCall::Kick { user_id, .. } if *user_id == agent())
        });
        prop_assert!(!kicked_agent);
        prop_assert!(server.occupants(&room_id).contains(&agent()));
    }

    /// Property: user levels are staff at 99 plus the agent at 100, nothing else
    #[test]
    fn prop_power_levels_follow_staff(present in users(), learners in users(), staff in users()) {
        let server = SimHomeserver::new(agent());
        let room_id = server.seed_room(present);

        RoomSynchronizer::new(server.clone())
            .synchronize_room_members(&room_id, &learners, &staff)
            .unwrap();

        let mut expected: BTreeMap<String, i64> =
            staff.iter().map(|u| (u.as_str().to_string(), 99)).collect();
        expected.insert(agent().as_str().to_string(), 100);
        prop_assert_eq!(server.room(&room_id).unwrap().power_users(), expected);
        prop_assert_eq!(server.count(CallKind::SetState), 1);
    }

    /// Property: the report counts match the calls issued
    #[test]
    fn prop_report_matches_calls(present in users(), learners in users(), staff in users()) {
        let server = SimHomeserver::new(agent());
        let room_id = server.seed_room(present);

        let report = RoomSynchronizer::new(server.clone())
            .synchronize_room_members(&room_id, &learners, &staff)
            .unwrap();

        prop_assert_eq!(report.invited, server.count(CallKind::Invite));
        prop_assert_eq!(report.kicked, server.count(CallKind::Kick));
        prop_assert_eq!(report.room_id, room_id);
    }
}
