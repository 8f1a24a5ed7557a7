//! Identifiers and value types.
//!
//! Remote identifiers ([`UserId`], [`RoomId`]) are validated strings issued by
//! the homeserver. Host identifiers ([`CourseId`], [`GroupId`], [`ModuleId`],
//! [`SectionId`], [`MappingId`]) are positive integers issued by the roster
//! system or the local store, with an `unknown` sentinel for entities that
//! have not been persisted yet.
//!
//! Every constructor validates. A value that exists is well-formed, so nothing
//! downstream re-checks identifier grammar.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Maximum length of a user identifier, sigil and server name included.
pub const MAX_USER_ID_LEN: usize = 255;

/// Raw value of the "not yet persisted" sentinel for host identifiers.
const UNKNOWN: i64 = -1;

/// Remote user identifier of the form `@localpart:server`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Parse and validate a user identifier.
    ///
    /// The local part is restricted to `a-z 0-9 . _ = - / +`; the server name
    /// must be a hostname or IP literal with an optional port.
    pub fn parse(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if is_valid_user_id(&value) {
            Ok(Self(value))
        } else {
            Err(ValidationError::InvalidUserId(value))
        }
    }

    /// The identifier as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Part between the `@` sigil and the first `:`.
    pub fn localpart(&self) -> &str {
        self.0[1..].split_once(':').map_or("", |(local, _)| local)
    }

    /// Part after the first `:`.
    pub fn server_name(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, server)| server)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

fn is_valid_user_id(value: &str) -> bool {
    if value.len() > MAX_USER_ID_LEN {
        return false;
    }

    let Some(rest) = value.strip_prefix('@') else {
        return false;
    };

    let Some((localpart, server)) = rest.split_once(':') else {
        return false;
    };

    !localpart.is_empty()
        && localpart.bytes().all(is_localpart_byte)
        && is_valid_server_name(server)
}

fn is_localpart_byte(b: u8) -> bool {
    matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'=' | b'-' | b'/' | b'+')
}

fn is_valid_server_name(server: &str) -> bool {
    let Some(first) = server.bytes().next() else {
        return false;
    };

    (first.is_ascii_alphanumeric() || first == b'[')
        && server
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b':' | b'[' | b']'))
}

/// Opaque remote room identifier.
///
/// Only ever obtained from a room-creation response or read back from the
/// directory. The sole structural requirement is the `!` sigil.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    /// Parse and validate a room identifier.
    pub fn parse(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();

        let well_formed = value.len() > 1
            && value.starts_with('!')
            && !value.chars().any(|c| c.is_whitespace() || c.is_control());

        if well_formed { Ok(Self(value)) } else { Err(ValidationError::InvalidRoomId(value)) }
    }

    /// The identifier as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

macro_rules! host_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "i64", into = "i64")]
        pub struct $name(i64);

        impl $name {
            /// Wrap a host-issued identifier. Must be strictly positive.
            pub fn new(value: i64) -> Result<Self, ValidationError> {
                if value > 0 {
                    Ok(Self(value))
                } else {
                    Err(ValidationError::InvalidHostId { kind: $kind, value: value.to_string() })
                }
            }

            /// Sentinel for an entity that has not been assigned an identifier.
            pub const fn unknown() -> Self {
                Self(UNKNOWN)
            }

            /// Whether this is the [`unknown`](Self::unknown) sentinel.
            pub const fn is_unknown(self) -> bool {
                self.0 == UNKNOWN
            }

            /// Raw integer value.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = s.trim().parse::<i64>().map_err(|_| ValidationError::InvalidHostId {
                    kind: $kind,
                    value: s.to_string(),
                })?;
                Self::new(value)
            }
        }

        impl TryFrom<i64> for $name {
            type Error = ValidationError;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

host_id!(
    /// Course identifier issued by the roster system.
    CourseId,
    "course"
);

host_id!(
    /// Group identifier issued by the roster system.
    ///
    /// "No group" is `Option::<GroupId>::None`, never zero. Use
    /// [`GroupId::from_host`] at every boundary where the host hands over its
    /// integer encoding.
    GroupId,
    "group"
);

host_id!(
    /// Chat module (activity) identifier.
    ModuleId,
    "module"
);

host_id!(
    /// Course section identifier.
    SectionId,
    "section"
);

host_id!(
    /// Persisted identity of a room mapping.
    MappingId,
    "mapping"
);

impl GroupId {
    /// Normalize the host encoding of an optional group.
    ///
    /// The host uses `0` for "no group"; this maps it to `None` so that the
    /// whole-course room has exactly one key.
    pub fn from_host(value: i64) -> Result<Option<Self>, ValidationError> {
        if value == 0 { Ok(None) } else { Self::new(value).map(Some) }
    }
}

/// Wall-clock time in whole seconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch. Used as "never modified".
    pub const ZERO: Self = Self(0);

    /// Timestamp from seconds since the epoch.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Seconds since the epoch.
    pub const fn as_secs(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
