//! Validated runtime configuration.
//!
//! Built once at startup and passed by value to whatever needs it. Nothing
//! re-reads or re-validates configuration after construction.

use url::Url;

use crate::{error::ValidationError, ids::RoomId};

/// Link target used when no Element web client is configured.
pub const MATRIX_TO_URL: &str = "https://matrix.to";

/// Connection and presentation settings.
#[derive(Clone, PartialEq, Eq)]
pub struct Configuration {
    homeserver_url: String,
    access_token: String,
    element_url: Option<String>,
}

impl Configuration {
    /// Validate raw values.
    ///
    /// All values are trimmed. The homeserver URL and access token are
    /// required; a blank Element URL means "not configured". URLs must use
    /// `http` or `https` and name a host. Trailing slashes are dropped so that
    /// paths can be appended directly.
    pub fn new(
        homeserver_url: &str,
        access_token: &str,
        element_url: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let homeserver_url = homeserver_url.trim();
        if homeserver_url.is_empty() {
            return Err(ValidationError::MissingConfig("homeserver_url"));
        }
        let homeserver_url = validate_url("homeserver_url", homeserver_url)?;

        let access_token = access_token.trim();
        if access_token.is_empty() {
            return Err(ValidationError::MissingConfig("access_token"));
        }
        if access_token.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidConfig {
                field: "access_token",
                reason: "contains whitespace".to_string(),
            });
        }

        let element_url = match element_url.map(str::trim) {
            None | Some("") => None,
            Some(url) => Some(validate_url("element_url", url)?),
        };

        Ok(Self { homeserver_url, access_token: access_token.to_string(), element_url })
    }

    /// Base URL of the client-server API, without trailing slash.
    pub fn homeserver_url(&self) -> &str {
        &self.homeserver_url
    }

    /// Bearer credential of the synchronizing agent.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Element web client, if configured.
    pub fn element_url(&self) -> Option<&str> {
        self.element_url.as_deref()
    }

    /// User-facing link to a room.
    pub fn room_url(&self, room_id: &RoomId) -> String {
        match &self.element_url {
            Some(element) => format!("{element}/#/room/{room_id}"),
            None => format!("{MATRIX_TO_URL}/#/{room_id}"),
        }
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("homeserver_url", &self.homeserver_url)
            .field("access_token", &"<redacted>")
            .field("element_url", &self.element_url)
            .finish()
    }
}

fn validate_url(field: &'static str, url: &str) -> Result<String, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidConfig { field, reason };

    if url.chars().any(char::is_whitespace) {
        return Err(invalid(format!("{url:?} contains whitespace")));
    }
    let parsed = Url::parse(url).map_err(|e| invalid(format!("{url:?}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("{url:?} is not an http(s) URL")));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid(format!("{url:?} does not name a host")));
    }

    Ok(url.trim_end_matches('/').to_string())
}
