//! Concrete synchronization scenarios against the simulated homeserver

use std::collections::{BTreeMap, BTreeSet};

use rostra_core::{RemoteError, RoomSynchronizer, SyncReport, UserId, api::event_type};
use rostra_harness::{ApiCall, CallKind, SimHomeserver};
use serde_json::json;

fn user(id: &str) -> UserId {
    UserId::parse(id).unwrap()
}

fn agent() -> UserId {
    user("@rostra:example.org")
}

fn set(ids: &[&str]) -> BTreeSet<UserId> {
    ids.iter().map(|id| user(id)).collect()
}

/// Invites, power-level writes and kicks, in the order issued.
fn mutations(server: &SimHomeserver) -> Vec<ApiCall> {
    server
        .calls()
        .into_iter()
        .filter(|call| {
            matches!(call.kind(), CallKind::Invite | CallKind::Kick | CallKind::SetState)
        })
        .collect()
}

#[test]
fn invites_then_power_levels_then_kicks() {
    let server = SimHomeserver::new(agent());
    let room_id = server.seed_room(set(&["@a:example.org", "@b:example.org"]));

    let report = RoomSynchronizer::new(server.clone())
        .synchronize_room_members(
            &room_id,
            &set(&["@a:example.org", "@c:example.org"]),
            &BTreeSet::new(),
        )
        .unwrap();

    assert_eq!(report, SyncReport { room_id: room_id.clone(), invited: 1, kicked: 1 });

    let calls = mutations(&server);
    assert_eq!(calls.len(), 3);
    assert_eq!(
        calls[0],
        ApiCall::Invite { room_id: room_id.clone(), user_id: user("@c:example.org") }
    );
    match &calls[1] {
        ApiCall::SetState { event_type, content, .. } => {
            assert_eq!(event_type, event_type::POWER_LEVELS);
            assert_eq!(content["users"], json!({ "@rostra:example.org": 100 }));
        },
        other => panic!("expected power-level write, got {other:?}"),
    }
    assert_eq!(
        calls[2],
        ApiCall::Kick { room_id: room_id.clone(), user_id: user("@b:example.org") }
    );

    assert_eq!(
        server.occupants(&room_id),
        set(&["@a:example.org", "@c:example.org", "@rostra:example.org"])
    );
}

#[test]
fn staff_learner_gets_one_staff_entry() {
    let server = SimHomeserver::new(agent());
    let room_id = server.seed_room([]);
    let both = set(&["@u:example.org"]);

    RoomSynchronizer::new(server.clone()).synchronize_room_members(&room_id, &both, &both).unwrap();

    assert_eq!(server.count(CallKind::Invite), 1);
    assert_eq!(
        server.room(&room_id).unwrap().power_users(),
        BTreeMap::from([
            ("@rostra:example.org".to_string(), 100),
            ("@u:example.org".to_string(), 99),
        ])
    );
}

#[test]
fn power_level_write_keeps_other_fields() {
    let server = SimHomeserver::new(agent());
    let room_id = server.seed_room([]);

    RoomSynchronizer::new(server.clone())
        .synchronize_room_members(&room_id, &BTreeSet::new(), &set(&["@t:example.org"]))
        .unwrap();

    let room = server.room(&room_id).unwrap();
    let content = &room.state[&(event_type::POWER_LEVELS.to_string(), String::new())];
    assert_eq!(content["kick"], 100);
    assert_eq!(content["users"], json!({ "@rostra:example.org": 100, "@t:example.org": 99 }));
}

#[test]
fn departed_staff_loses_level_and_seat() {
    let server = SimHomeserver::new(agent());
    let room_id = server.seed_room([]);
    let synchronizer = RoomSynchronizer::new(server.clone());

    synchronizer
        .synchronize_room_members(&room_id, &BTreeSet::new(), &set(&["@t:example.org"]))
        .unwrap();
    synchronizer.synchronize_room_members(&room_id, &BTreeSet::new(), &BTreeSet::new()).unwrap();

    let room = server.room(&room_id).unwrap();
    assert_eq!(room.occupants, set(&["@rostra:example.org"]));
    assert_eq!(room.power_users(), BTreeMap::from([("@rostra:example.org".to_string(), 100)]));
}

#[test]
fn failed_kick_aborts_and_rerun_completes() {
    let server = SimHomeserver::new(agent());
    let room_id = server.seed_room(set(&["@old1:example.org", "@old2:example.org"]));
    let learners = set(&["@new:example.org"]);
    let synchronizer = RoomSynchronizer::new(server.clone());

    server.fail_next(CallKind::Kick, RemoteError::http(502, "M_UNKNOWN", "Bad Gateway"));
    let err = synchronizer
        .synchronize_room_members(&room_id, &learners, &BTreeSet::new())
        .unwrap_err();
    assert!(err.is_transient());

    // The invite and the power-level write happened before the failed kick.
    let occupants = server.occupants(&room_id);
    assert!(occupants.contains(&user("@new:example.org")));
    assert!(occupants.contains(&user("@old1:example.org")));

    server.clear_calls();
    let report = synchronizer
        .synchronize_room_members(&room_id, &learners, &BTreeSet::new())
        .unwrap();
    assert_eq!(report.invited, 0);
    assert_eq!(report.kicked, 2);
    assert_eq!(server.occupants(&room_id), set(&["@new:example.org", "@rostra:example.org"]));
}

#[test]
fn identity_failure_touches_nothing() {
    let server = SimHomeserver::new(agent());
    let room_id = server.seed_room(set(&["@a:example.org"]));
    server.fail_next(CallKind::Whoami, RemoteError::http(401, "M_UNKNOWN_TOKEN", "Invalid token"));

    let err = RoomSynchronizer::new(server.clone())
        .synchronize_room_members(&room_id, &BTreeSet::new(), &BTreeSet::new())
        .unwrap_err();

    assert_eq!(err.code, "M_UNKNOWN_TOKEN");
    assert!(!err.is_transient());
    assert_eq!(server.calls(), vec![ApiCall::Whoami]);
    assert!(server.occupants(&room_id).contains(&user("@a:example.org")));
}

#[test]
fn evict_all_keeps_only_agent() {
    let server = SimHomeserver::new(agent());
    let room_id = server.seed_room(set(&["@a:example.org", "@b:example.org"]));

    let kicked = RoomSynchronizer::new(server.clone()).evict_all(&room_id).unwrap();

    assert_eq!(kicked, 2);
    assert_eq!(server.occupants(&room_id), set(&["@rostra:example.org"]));
}
