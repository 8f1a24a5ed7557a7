//! Fuzz target for roster snapshot loading
//!
//! # Invariants
//!
//! - NEVER panic on malformed snapshots
//! - A snapshot that loads answers every query without error
//! - Group-scoped learners are a subset of the course's learners

#![no_main]

use libfuzzer_sys::fuzz_target;
use rostra_bridge::FileRoster;
use rostra_core::{CourseId, Roster};

fuzz_target!(|input: &str| {
    let Ok(roster) = FileRoster::from_json(input) else {
        return;
    };

    for id in 1..=8 {
        let Ok(course_id) = CourseId::new(id) else { continue };
        let everyone = roster.enrolled_learners(course_id, None).unwrap();
        roster.staff(course_id).unwrap();

        for group in roster.groups_in_course(course_id).unwrap() {
            assert_eq!(group.course_id, course_id);
            let members = roster.enrolled_learners(course_id, Some(group.id)).unwrap();
            assert!(members.is_subset(&everyone));
        }
    }
});
