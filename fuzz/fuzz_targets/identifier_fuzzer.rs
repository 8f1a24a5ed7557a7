//! Fuzz target for identifier parsing
//!
//! # Invariants
//!
//! - NEVER panic on arbitrary input
//! - An accepted user id splits into a non-empty local part and server name
//!   that recombine into the original
//! - An accepted id survives a JSON round trip unchanged

#![no_main]

use libfuzzer_sys::fuzz_target;
use rostra_core::{RoomId, UserId};

fuzz_target!(|input: &str| {
    if let Ok(user) = UserId::parse(input) {
        assert!(!user.localpart().is_empty());
        assert!(!user.server_name().is_empty());
        assert_eq!(format!("@{}:{}", user.localpart(), user.server_name()), user.as_str());

        let json = serde_json::to_string(&user).unwrap();
        assert_eq!(serde_json::from_str::<UserId>(&json).unwrap(), user);
    }

    if let Ok(room) = RoomId::parse(input) {
        assert!(room.as_str().starts_with('!'));
        let json = serde_json::to_string(&room).unwrap();
        assert_eq!(serde_json::from_str::<RoomId>(&json).unwrap(), room);
    }
});
