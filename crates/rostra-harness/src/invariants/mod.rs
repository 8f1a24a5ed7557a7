//! Invariant checking for simulation testing.
//!
//! Invariants are properties that must hold once every mapped room has been
//! reconciled. They are checked against a [`SystemSnapshot`] rather than
//! live state.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! let snapshot = SystemSnapshot::capture(&server, &directory, &roster)?;
//! registry.assert_all(&snapshot, "after resync");
//! ```

mod checks;
mod snapshot;

pub use checks::{AgentRetained, MappingsResolve, OccupantsMatchRoster, StaffLevels};
pub use snapshot::{RoomSnapshot, SystemSnapshot};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property checked against a snapshot.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against the snapshot.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Registry with every convergence invariant:
    /// [`OccupantsMatchRoster`], [`AgentRetained`], [`StaffLevels`] and
    /// [`MappingsResolve`].
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(OccupantsMatchRoster);
        registry.add(AgentRetained);
        registry.add(StaffLevels);
        registry.add(MappingsResolve);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants. Returns every violation found.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking with every violation.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("Invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use rostra_core::{CourseId, RoomId, UserId};

    use super::*;

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    fn converged_room() -> RoomSnapshot {
        RoomSnapshot {
            room_id: RoomId::parse("!r:x").unwrap(),
            course_id: CourseId::new(1).unwrap(),
            group_id: None,
            exists: true,
            creation: None,
            occupants: BTreeSet::from([user("@bot:x"), user("@a:x"), user("@t:x")]),
            power_users: BTreeMap::from([("@bot:x".to_string(), 100), ("@t:x".to_string(), 99)]),
            learners: BTreeSet::from([user("@a:x")]),
            staff: BTreeSet::from([user("@t:x")]),
        }
    }

    #[test]
    fn converged_room_passes() {
        let snapshot = SystemSnapshot { agent: user("@bot:x"), rooms: vec![converged_room()] };
        assert!(InvariantRegistry::standard().check_all(&snapshot).is_ok());
        assert_eq!(InvariantRegistry::standard().len(), 4);
    }

    #[test]
    fn stray_occupant_and_missing_agent_are_reported() {
        let mut room = converged_room();
        room.occupants.remove(&user("@bot:x"));
        room.occupants.insert(user("@stray:x"));
        let snapshot = SystemSnapshot { agent: user("@bot:x"), rooms: vec![room] };

        let violations = InvariantRegistry::standard().check_all(&snapshot).unwrap_err();
        let names: Vec<_> = violations.iter().map(|v| v.invariant).collect();
        assert_eq!(names, vec!["occupants_match_roster", "agent_retained"]);
    }

    #[test]
    fn learner_level_is_reported() {
        let mut room = converged_room();
        room.power_users.insert("@a:x".to_string(), 0);
        let snapshot = SystemSnapshot { agent: user("@bot:x"), rooms: vec![room] };

        let violations = InvariantRegistry::standard().check_all(&snapshot).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].invariant, "staff_levels");
    }
}
