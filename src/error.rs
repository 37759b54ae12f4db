//! Failure reasons surfaced by the hunt engine.
//!
//! Every core operation returns one of these instead of failing silently.
//! A failed operation never leaves progress partially changed.

use crate::{catalog::CatalogError, storage::StorageError};

/// Errors produced by the hunt engine and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The hunt cannot be played, e.g. it has no waypoints.
    #[error("invalid hunt {hunt_id}: {reason}")]
    InvalidHunt { hunt_id: String, reason: String },

    /// A transition was called with malformed arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No hunt in the catalog has this id.
    #[error("hunt not found: {0}")]
    HuntNotFound(String),

    /// The operation needs an active hunt and there is none.
    #[error("no hunt is active")]
    NoActiveHunt,

    /// The player is not where they need to be, or there is no position yet.
    #[error("not eligible to check in: {reason}")]
    NotEligible {
        reason: String,
        distance_meters: Option<f32>,
    },

    /// Another check-in for the same progress is still awaiting its result.
    #[error("a check-in is already in progress")]
    AttemptInProgress,

    /// The location source has no permission. Terminal for the stream.
    #[error("location permission denied")]
    PermissionDenied,

    /// The location source failed after the subscription started.
    #[error("location source failed: {0}")]
    LocationUnavailable(String),

    /// The remote refused the request (4xx-equivalent).
    #[error("{message}")]
    RemoteClient { status: u16, message: String },

    /// The remote or the network failed (5xx-equivalent). Retry is up to the caller.
    #[error("{0}")]
    RemoteTransient(String),

    /// A result arrived for a progress that is no longer active and was dropped.
    #[error("check-in result discarded: {0}")]
    Discarded(String),
}

impl Error {
    /// Whether retrying the same operation later can succeed without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AttemptInProgress | Self::RemoteTransient(_))
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Self::RemoteTransient(format!("storage failure: {err}"))
    }
}

impl From<CatalogError> for Error {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(id) => Self::HuntNotFound(id),
            other => Self::RemoteTransient(format!("catalog failure: {other}")),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
