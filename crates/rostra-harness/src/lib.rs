//! Deterministic simulation harness for rostra.
//!
//! In-memory implementations of the service's seams, so that provisioning,
//! reconciliation and module lifecycle can be tested end to end without a
//! homeserver:
//!
//! - [`SimHomeserver`]: rooms, occupants and state, with a call log and
//!   scripted failures
//! - [`ChaoticApi`]: seeded random fault injection around any
//!   [`RoomApi`](rostra_core::RoomApi)
//! - [`SimRoster`]: a roster tests can change between passes
//! - [`SimEnv`]: a clock that only moves when told to
//!
//! # Invariant Testing
//!
//! The `invariants` module checks what must hold after a complete pass:
//! every mapped room holds exactly the roster plus the agent, with staff at
//! the staff level. Use [`InvariantRegistry::standard()`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chaotic;
pub mod invariants;
pub mod sim_env;
pub mod sim_homeserver;
pub mod sim_roster;

pub use chaotic::ChaoticApi;
pub use invariants::{
    AgentRetained, Invariant, InvariantRegistry, InvariantResult, MappingsResolve,
    OccupantsMatchRoster, RoomSnapshot, StaffLevels, SystemSnapshot, Violation,
};
pub use sim_env::SimEnv;
pub use sim_homeserver::{ApiCall, CallKind, SimHomeserver, SimRoom};
pub use sim_roster::SimRoster;
