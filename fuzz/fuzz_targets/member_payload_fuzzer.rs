//! Fuzz target for member-list decoding
//!
//! Homeserver responses are untrusted. Decoding must reject or accept, never
//! crash, and accepted payloads must only yield occupants.
//!
//! # Invariants
//!
//! - NEVER panic on malformed JSON
//! - Every returned occupant had a join or invite event
//! - Present members with invalid user ids are skipped, not fatal

#![no_main]

use libfuzzer_sys::fuzz_target;
use rostra_core::api::{MembersResponse, present_occupants};

fuzz_target!(|data: &[u8]| {
    let Ok(response) = serde_json::from_slice::<MembersResponse>(data) else {
        return;
    };

    for user in &present_occupants(&response.chunk) {
        assert!(response.chunk.iter().any(|event| {
            event.state_key == user.as_str() && event.content.membership.is_present()
        }));
    }
});
