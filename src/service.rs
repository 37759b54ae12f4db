//! The check-in collaborator: the authority that accepts or refuses check-ins.
//!
//! The session never decides on its own that a waypoint was claimed. It asks
//! a [`HuntService`] and applies whatever snapshot comes back. The service may
//! be a remote API or the storage-backed [`LocalService`].

mod local;

use std::future::Future;

pub use local::LocalService;

use crate::error::{Error, Result};
use crate::model::{CheckInAttempt, CheckInResponse, Progress};

/// Message used for every 5xx-equivalent failure.
pub const SERVER_ERROR_MESSAGE: &str = "server error, please try again";

/// Authority over a player's hunt attempts.
///
/// Implementations enforce their own timeouts and report them as
/// [`Error::RemoteTransient`].
pub trait HuntService {
    /// Register a freshly started attempt. Returns the authoritative snapshot.
    fn start_hunt(&self, progress: Progress) -> impl Future<Output = Result<Progress>> + Send;

    /// Submit the observed position for the attempt's target waypoint.
    fn submit_check_in(
        &self,
        attempt: &CheckInAttempt,
    ) -> impl Future<Output = Result<CheckInResponse>> + Send;

    /// Give up on the player's active attempt at a hunt. History is kept.
    fn abandon_hunt(&self, hunt_id: &str) -> impl Future<Output = Result<()>> + Send;

    /// The player's current unfinished attempt, if any.
    fn active_progress(&self) -> impl Future<Output = Result<Option<Progress>>> + Send;
}

/// Map a transport status code and message to an error category.
///
/// 4xx is the client's fault and carries the message. 5xx is transient and
/// carries a fixed message. Anything else (including 0 for "no response")
/// is treated as a transient network failure.
pub fn classify_status(status: u16, message: impl Into<String>) -> Error {
    match status {
        400..=499 => Error::RemoteClient {
            status,
            message: message.into(),
        },
        500..=599 => Error::RemoteTransient(SERVER_ERROR_MESSAGE.to_string()),
        _ => Error::RemoteTransient(message.into()),
    }
}
