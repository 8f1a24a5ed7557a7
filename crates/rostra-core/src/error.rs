//! Error types for room provisioning and membership reconciliation.
//!
//! One enum per layer, composed into [`SyncError`] at the service boundary:
//! - [`ValidationError`]: malformed identifiers and configuration, raised at
//!   construction time only
//! - [`RemoteError`]: every failure of the homeserver API
//! - [`StoreError`]: directory and module-store backends
//! - [`RosterError`]: roster backends
//! - [`NotFound`]: an entity an operation requires is absent

use thiserror::Error;

use crate::ids::{CourseId, GroupId, ModuleId};

/// Malformed identifier or configuration value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Not a `@localpart:server` user identifier
    #[error("value {0:?} does not appear to be a valid user identifier")]
    InvalidUserId(String),

    /// Not a `!`-prefixed room identifier
    #[error("value {0:?} does not appear to be a valid room identifier")]
    InvalidRoomId(String),

    /// Host identifier that is not a positive integer
    #[error("invalid {kind} id: {value}")]
    InvalidHostId {
        /// Which identifier was being parsed
        kind: &'static str,
        /// Offending input
        value: String,
    },

    /// Name or topic that is blank after trimming
    #[error("{0} must not be blank")]
    Blank(&'static str),

    /// Required configuration value is missing or blank
    #[error("configuration should have a {0:?} value, but it does not")]
    MissingConfig(&'static str),

    /// Configuration value is present but unusable
    #[error("configuration {field:?} is invalid: {reason}")]
    InvalidConfig {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Failure reported by (or while talking to) the homeserver.
///
/// Authentication failures, network failures, non-2xx responses and
/// malformed payloads all surface as this one type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("remote error {code}: {message}")]
pub struct RemoteError {
    /// HTTP status, when a response was received
    pub status: Option<u16>,
    /// Machine-readable code (`M_FORBIDDEN`, `NETWORK`, `MALFORMED`, ...)
    pub code: String,
    /// Human-readable detail
    pub message: String,
}

impl RemoteError {
    /// Code used when no response was received.
    pub const NETWORK: &'static str = "NETWORK";

    /// Code used when a response did not match its schema.
    pub const MALFORMED: &'static str = "MALFORMED";

    /// Request never produced a response.
    pub fn network(message: impl Into<String>) -> Self {
        Self { status: None, code: Self::NETWORK.to_string(), message: message.into() }
    }

    /// Non-success response.
    pub fn http(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { status: Some(status), code: code.into(), message: message.into() }
    }

    /// Response body rejected at the decoding boundary.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self { status: None, code: Self::MALFORMED.to_string(), message: message.into() }
    }

    /// Returns true if a later rerun may succeed without any change on our
    /// side.
    ///
    /// Network failures, rate limiting and server-side errors are transient.
    /// Authorization failures and malformed payloads are not.
    pub fn is_transient(&self) -> bool {
        match self.status {
            None => self.code == Self::NETWORK,
            Some(status) => status == 429 || status >= 500 || self.code == "M_LIMIT_EXCEEDED",
        }
    }
}

/// Errors from directory and module-store backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend I/O failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Stored record could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A record with the same key already exists
    #[error("conflict: {0}")]
    Conflict(String),

    /// Entity is in a lifecycle stage that forbids the operation
    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// Errors from roster backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RosterError {
    /// Roster source could not be read
    #[error("roster unavailable: {0}")]
    Unavailable(String),

    /// Roster source contained an invalid record
    #[error("invalid roster record: {0}")]
    Invalid(String),
}

/// An entity an operation requires is absent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFound {
    /// No room mapping for the pair
    #[error("no room mapping for course {course_id}{}", group_suffix(.group_id))]
    Mapping {
        /// Course of the missing mapping
        course_id: CourseId,
        /// Group of the missing mapping
        group_id: Option<GroupId>,
    },

    /// No such module
    #[error("could not find module with id {0}")]
    Module(ModuleId),

    /// No such course
    #[error("could not find course with id {0}")]
    Course(CourseId),

    /// No such group
    #[error("could not find group with id {0}")]
    Group(GroupId),
}

fn group_suffix(group_id: &Option<GroupId>) -> String {
    group_id.map(|g| format!(" group {g}")).unwrap_or_default()
}

/// Top-level error of every provisioning, reconciliation and lifecycle
/// operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Malformed input
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Homeserver failure; the current pass was aborted
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Required entity absent
    #[error(transparent)]
    NotFound(#[from] NotFound),

    /// Illegal lifecycle transition
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Directory or module-store failure
    #[error("store error: {0}")]
    Store(StoreError),

    /// Roster failure
    #[error(transparent)]
    Roster(#[from] RosterError),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidState(msg) => Self::InvalidState(msg),
            other => Self::Store(other),
        }
    }
}

impl SyncError {
    /// Returns true if rerunning the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Remote(err) => err.is_transient(),
            Self::Store(StoreError::Io(_)) | Self::Roster(RosterError::Unavailable(_)) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_and_server_errors_are_transient() {
        assert!(RemoteError::network("connection reset").is_transient());
        assert!(RemoteError::http(502, "M_UNKNOWN", "bad gateway").is_transient());
        assert!(RemoteError::http(429, "M_LIMIT_EXCEEDED", "slow down").is_transient());
    }

    #[test]
    fn client_errors_are_fatal() {
        assert!(!RemoteError::http(403, "M_FORBIDDEN", "not allowed").is_transient());
        assert!(!RemoteError::http(401, "M_UNKNOWN_TOKEN", "bad token").is_transient());
        assert!(!RemoteError::malformed("missing room_id").is_transient());
    }

    #[test]
    fn remote_error_display() {
        let err = RemoteError::http(403, "M_FORBIDDEN", "You are not invited to this room.");
        assert_eq!(err.to_string(), "remote error M_FORBIDDEN: You are not invited to this room.");
    }

    #[test]
    fn not_found_display() {
        let course_id = CourseId::new(5).unwrap();
        let err = NotFound::Mapping { course_id, group_id: None };
        assert_eq!(err.to_string(), "no room mapping for course 5");

        let err = NotFound::Mapping { course_id, group_id: Some(GroupId::new(2).unwrap()) };
        assert_eq!(err.to_string(), "no room mapping for course 5 group 2");
    }

    #[test]
    fn store_invalid_state_lifts_to_sync_invalid_state() {
        let err: SyncError = StoreError::InvalidState("mapping has no identity".to_string()).into();
        assert_eq!(err, SyncError::InvalidState("mapping has no identity".to_string()));

        let err: SyncError = StoreError::Io("disk full".to_string()).into();
        assert!(matches!(err, SyncError::Store(StoreError::Io(_))));
        assert!(err.is_transient());
    }
}
