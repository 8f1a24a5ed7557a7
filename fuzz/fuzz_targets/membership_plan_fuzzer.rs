//! Fuzz target for membership planning
//!
//! # Strategy
//!
//! Users are drawn from a small pool so present, learner and staff sets
//! overlap heavily, including with the agent itself. The agent is always
//! present, as it is in every room it created.
//!
//! # Invariants
//!
//! - Applying the plan yields exactly learners, staff and the agent
//! - The agent is never kicked or invited
//! - Exactly one power-level write, placed after every invite and before
//!   every kick
//! - Replanning the converged room yields only the power-level write

#![no_main]

use std::collections::BTreeSet;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rostra_core::{MembershipAction, UserId, plan_membership};

#[derive(Debug, Arbitrary)]
struct PlanInput {
    present: Vec<u8>,
    learners: Vec<u8>,
    staff: Vec<u8>,
}

fn pool(ids: &[u8]) -> BTreeSet<UserId> {
    ids.iter().map(|n| user(n % 16)).collect()
}

/// Pool member 0 is the agent.
fn user(n: u8) -> UserId {
    UserId::parse(format!("@u{n}:example.org")).unwrap()
}

fuzz_target!(|input: PlanInput| {
    let agent = user(0);
    let mut present = pool(&input.present);
    present.insert(agent.clone());
    let learners = pool(&input.learners);
    let staff = pool(&input.staff);

    let actions = plan_membership(&agent, &present, &learners, &staff);

    let mut occupants = present.clone();
    let mut seen_power_write = false;
    for action in &actions {
        match action {
            MembershipAction::Invite { user_id } => {
                assert!(!seen_power_write, "invite after power-level write");
                assert_ne!(*user_id, agent);
                assert!(occupants.insert(user_id.clone()), "invite of present user");
            },
            MembershipAction::SetPowerLevels { .. } => {
                assert!(!seen_power_write, "second power-level write");
                seen_power_write = true;
            },
            MembershipAction::Kick { user_id } => {
                assert!(seen_power_write, "kick before power-level write");
                assert_ne!(*user_id, agent);
                assert!(occupants.remove(user_id), "kick of absent user");
            },
        }
    }
    assert!(seen_power_write);

    let mut expected: BTreeSet<UserId> = learners.union(&staff).cloned().collect();
    expected.insert(agent.clone());
    assert_eq!(occupants, expected);

    let replan = plan_membership(&agent, &occupants, &learners, &staff);
    assert_eq!(replan.len(), 1);
    assert!(matches!(replan[0], MembershipAction::SetPowerLevels { .. }));
});
