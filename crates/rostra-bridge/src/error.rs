//! Bridge error types.

use rostra_core::{RosterError, StoreError, SyncError, ValidationError};
use thiserror::Error;

/// Errors raised while wiring up or running the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Missing or invalid configuration.
    ///
    /// Fatal at startup. Fix the flags or environment and rerun.
    #[error("configuration error: {0}")]
    Config(#[from] ValidationError),

    /// The HTTP client could not be built.
    #[error("transport error: {0}")]
    Transport(String),

    /// Storage could not be opened.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Roster snapshot could not be loaded.
    #[error("roster error: {0}")]
    Roster(#[from] RosterError),

    /// Provisioning, reconciliation or lifecycle failure.
    #[error(transparent)]
    Sync(#[from] SyncError),
}
