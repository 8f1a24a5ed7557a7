//! Standard invariant checks.
//!
//! These hold after every fully successful pass over every mapped room.

use std::collections::{BTreeMap, BTreeSet};

use rostra_core::PermissionTier;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// Occupants equal learners, staff and the agent, exactly.
pub struct OccupantsMatchRoster;

impl Invariant for OccupantsMatchRoster {
    fn name(&self) -> &'static str {
        "occupants_match_roster"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for room in &state.rooms {
            let desired = room.desired(&state.agent);
            if room.occupants != desired {
                let missing: Vec<_> = desired.difference(&room.occupants).collect();
                let extra: Vec<_> = room.occupants.difference(&desired).collect();
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("room {}: missing {missing:?}, extra {extra:?}", room.room_id),
                });
            }
        }
        Ok(())
    }
}

/// The agent stays in every room with the owner level.
pub struct AgentRetained;

impl Invariant for AgentRetained {
    fn name(&self) -> &'static str {
        "agent_retained"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let owner = PermissionTier::Owner.level();
        for room in &state.rooms {
            if !room.occupants.contains(&state.agent) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "room {}: agent {} is not an occupant",
                        room.room_id, state.agent
                    ),
                });
            }
            let level = room.power_users.get(state.agent.as_str()).copied();
            if level != Some(owner) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "room {}: agent level {level:?}, expected {owner}",
                        room.room_id
                    ),
                });
            }
        }
        Ok(())
    }
}

/// The explicit user levels are staff at the staff level plus the agent.
///
/// Learners, including learners who are also staff, get no other entry.
pub struct StaffLevels;

impl Invariant for StaffLevels {
    fn name(&self) -> &'static str {
        "staff_levels"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for room in &state.rooms {
            let mut expected: BTreeMap<String, i64> = room
                .staff
                .iter()
                .map(|user| (user.as_str().to_string(), PermissionTier::Staff.level()))
                .collect();
            expected.insert(state.agent.as_str().to_string(), PermissionTier::Owner.level());

            if room.power_users != expected {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "room {}: levels {:?}, expected {expected:?}",
                        room.room_id, room.power_users
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Every mapping points at a distinct existing room tagged with its pair.
pub struct MappingsResolve;

impl Invariant for MappingsResolve {
    fn name(&self) -> &'static str {
        "mappings_resolve"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let mut seen = BTreeSet::new();
        for room in &state.rooms {
            if !room.exists {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("room {} is mapped but does not exist", room.room_id),
                });
            }
            if !seen.insert(&room.room_id) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("room {} is mapped twice", room.room_id),
                });
            }
            if let Some(tags) = room.creation {
                if tags.course_id != room.course_id || tags.group_id != room.group_id {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "room {}: tagged {:?}, mapped to ({}, {:?})",
                            room.room_id, tags, room.course_id, room.group_id
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}
