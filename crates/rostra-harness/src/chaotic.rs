//! Chaotic API wrapper for fault injection testing
//!
//! Delegates to an underlying [`RoomApi`] but randomly fails calls before
//! they reach it, so a failed call never has a side effect. Chaos tests use
//! it to check that an interrupted pass leaves the room in a state a clean
//! rerun converges from.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex},
};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rostra_core::{CreateRoomRequest, RemoteError, RoomApi, RoomId, StateContent, UserId};

/// Wrapper that fails calls with probability `failure_rate`.
///
/// Injected failures alternate between network errors and `503`s, both of
/// which classify as transient. Clones share the RNG and the counters.
#[derive(Clone)]
pub struct ChaoticApi<A> {
    inner: A,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    rng: Arc<Mutex<ChaCha8Rng>>,
    counters: Arc<Mutex<Counters>>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    attempted: usize,
    injected: usize,
}

impl<A: RoomApi> ChaoticApi<A> {
    /// Wrap `inner` with a fixed seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: A, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x5EED_C4A0_5EED_C4A0)
    }

    /// Wrap `inner` with an explicit seed for reproducible chaos.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: A, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            counters: Arc::new(Mutex::new(Counters::default())),
        }
    }

    /// Underlying API (for checking invariants after chaos).
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Total number of calls attempted.
    pub fn operation_count(&self) -> usize {
        #[allow(clippy::expect_used)]
        self.counters.lock().expect("counters mutex poisoned").attempted
    }

    /// Number of calls that were failed on purpose.
    pub fn injected_failures(&self) -> usize {
        #[allow(clippy::expect_used)]
        self.counters.lock().expect("counters mutex poisoned").injected
    }

    /// Count the call and decide whether it fails.
    fn roll(&self, call: &'static str) -> Result<(), RemoteError> {
        #[allow(clippy::expect_used)]
        let fail = self.rng.lock().expect("rng mutex poisoned").gen_bool(self.failure_rate);

        #[allow(clippy::expect_used)]
        let mut counters = self.counters.lock().expect("counters mutex poisoned");
        counters.attempted += 1;
        if !fail {
            return Ok(());
        }

        counters.injected += 1;
        tracing::debug!(call, injected = counters.injected, "chaos: failing call");
        if counters.injected % 2 == 0 {
            Err(RemoteError::http(503, "M_UNKNOWN", "chaotic failure injection"))
        } else {
            Err(RemoteError::network("chaotic failure injection"))
        }
    }
}

impl<A: RoomApi> RoomApi for ChaoticApi<A> {
    fn whoami(&self) -> Result<UserId, RemoteError> {
        self.roll("whoami")?;
        self.inner.whoami()
    }

    fn create_room(&self, request: &CreateRoomRequest) -> Result<RoomId, RemoteError> {
        self.roll("create_room")?;
        self.inner.create_room(request)
    }

    fn invite_user(&self, user_id: &UserId, room_id: &RoomId) -> Result<(), RemoteError> {
        self.roll("invite_user")?;
        self.inner.invite_user(user_id, room_id)
    }

    fn kick_user(&self, user_id: &UserId, room_id: &RoomId) -> Result<(), RemoteError> {
        self.roll("kick_user")?;
        self.inner.kick_user(user_id, room_id)
    }

    fn get_state(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
    ) -> Result<StateContent, RemoteError> {
        self.roll("get_state")?;
        self.inner.get_state(room_id, event_type, state_key)
    }

    fn set_state(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
        content: &StateContent,
    ) -> Result<(), RemoteError> {
        self.roll("set_state")?;
        self.inner.set_state(room_id, event_type, state_key, content)
    }

    fn list_occupants(&self, room_id: &RoomId) -> Result<BTreeSet<UserId>, RemoteError> {
        self.roll("list_occupants")?;
        self.inner.list_occupants(room_id)
    }
}
