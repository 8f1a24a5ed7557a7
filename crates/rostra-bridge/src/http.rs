//! Blocking client-server API transport.
//!
//! One HTTP request per [`RoomApi`] call against the `/_matrix/client/v3`
//! endpoints. Every request carries the bearer token. Any failure, whether
//! the connection, a non-2xx status or an undecodable body, surfaces as a
//! [`RemoteError`].

use std::{collections::BTreeSet, time::Duration};

use reqwest::{
    Url,
    blocking::{Client, RequestBuilder, Response},
};
use rostra_core::{
    Configuration, CreateRoomRequest, RemoteError, RoomApi, RoomId, StateContent, UserId,
    api::{CreateRoomResponse, MembersResponse, WhoamiResponse, present_occupants},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::BridgeError;

/// Path prefix of the client-server API.
const API_PREFIX: [&str; 3] = ["_matrix", "client", "v3"];

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Error body returned by the homeserver on failure.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    errcode: String,
    #[serde(default)]
    error: String,
}

/// Body of invite and kick requests.
#[derive(Debug, Serialize)]
struct MembershipBody<'a> {
    user_id: &'a str,
}

/// [`RoomApi`] over HTTPS.
#[derive(Clone)]
pub struct HttpRoomApi {
    client: Client,
    base: Url,
    access_token: String,
}

impl HttpRoomApi {
    /// Client for the configured homeserver.
    ///
    /// # Errors
    ///
    /// - `BridgeError::Transport` if the HTTP client cannot be built or the
    ///   homeserver URL cannot carry a path
    pub fn new(config: &Configuration) -> Result<Self, BridgeError> {
        let base = Url::parse(config.homeserver_url())
            .map_err(|e| BridgeError::Transport(format!("homeserver URL: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(BridgeError::Transport("homeserver URL cannot carry a path".to_string()));
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("rostra/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::Transport(e.to_string()))?;

        Ok(Self { client, base, access_token: config.access_token().to_string() })
    }

    /// URL of an API endpoint. Each segment is percent-encoded on its own.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // Checked in `new`.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(API_PREFIX).extend(segments);
        }
        url
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .map_err(|e| RemoteError::network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().map_err(|e| RemoteError::network(e.to_string()))?;
        Err(error_from_body(status.as_u16(), &body))
    }

    fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, RemoteError> {
        let response = self.send(self.client.get(self.endpoint(segments)))?;
        decode(response)
    }

    fn post<B: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<Response, RemoteError> {
        self.send(self.client.post(self.endpoint(segments)).json(body))
    }
}

impl RoomApi for HttpRoomApi {
    fn whoami(&self) -> Result<UserId, RemoteError> {
        let response: WhoamiResponse = self.get(&["account", "whoami"])?;
        Ok(response.user_id)
    }

    fn create_room(&self, request: &CreateRoomRequest) -> Result<RoomId, RemoteError> {
        let response: CreateRoomResponse = decode(self.post(&["createRoom"], request)?)?;
        Ok(response.room_id)
    }

    fn invite_user(&self, user_id: &UserId, room_id: &RoomId) -> Result<(), RemoteError> {
        let body = MembershipBody { user_id: user_id.as_str() };
        self.post(&["rooms", room_id.as_str(), "invite"], &body)?;
        Ok(())
    }

    fn kick_user(&self, user_id: &UserId, room_id: &RoomId) -> Result<(), RemoteError> {
        let body = MembershipBody { user_id: user_id.as_str() };
        self.post(&["rooms", room_id.as_str(), "kick"], &body)?;
        Ok(())
    }

    fn get_state(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
    ) -> Result<StateContent, RemoteError> {
        self.get(&["rooms", room_id.as_str(), "state", event_type, state_key])
    }

    fn set_state(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
        content: &StateContent,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(&["rooms", room_id.as_str(), "state", event_type, state_key]);
        self.send(self.client.put(url).json(content))?;
        Ok(())
    }

    fn list_occupants(&self, room_id: &RoomId) -> Result<BTreeSet<UserId>, RemoteError> {
        let response: MembersResponse = self.get(&["rooms", room_id.as_str(), "members"])?;
        Ok(present_occupants(&response.chunk))
    }
}

fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    let body = response.bytes().map_err(|e| RemoteError::network(e.to_string()))?;
    serde_json::from_slice(&body).map_err(|e| RemoteError::malformed(e.to_string()))
}

/// Remote error for a non-2xx response.
///
/// Uses the homeserver's `errcode`/`error` pair when the body carries one,
/// otherwise `M_UNKNOWN` with the status text.
pub fn error_from_body(status: u16, body: &[u8]) -> RemoteError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody { errcode, error }) => RemoteError::http(status, errcode, error),
        Err(_) => {
            let reason = reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("request failed");
            RemoteError::http(status, "M_UNKNOWN", reason)
        },
    }
}
