//! Collaborator traits at the engine boundary.
//!
//! The engine measures a path; it does not manage a radio or read hardware.
//! Those concerns arrive through [`RadioLink`] and [`TelemetrySource`].
//! [`ProbeTransport`] is the seam between the search loop and the socket
//! layer, which is what makes the search testable without a NAT in the loop.

use std::future::Future;
use std::time::Duration;

use super::error::{TelemetryError, TransportError};
use super::types::{RegistrationStatus, TelemetrySnapshot};

/// Cellular radio link collaborator.
///
/// Implementations are expected to answer from cached state; both methods are
/// called from inside poll loops and must not block.
pub trait RadioLink: Send + Sync {
    /// Current network registration status.
    fn registration_status(&self) -> RegistrationStatus;

    /// Ask the modem to drop and re-establish its network attachment.
    fn request_reattach(&self);
}

/// Device/SIM telemetry collaborator.
pub trait TelemetrySource: Send + Sync {
    /// Take a synchronous snapshot of the current telemetry.
    ///
    /// Failure means the diagnostic payload cannot be built and fails the
    /// probe (not the run, until the retry budget is spent).
    fn snapshot(&self) -> Result<TelemetrySnapshot, TelemetryError>;
}

/// One connection to the probe server, as seen by the search loop.
///
/// The futures are required to be `Send` so the worker task stays spawnable
/// on a multi-threaded runtime.
pub trait ProbeTransport: Send {
    /// Establish a fresh connection, replacing any existing socket.
    ///
    /// Covers link supervision, resolution, socket setup and connect.
    fn connect(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Send one probe packet.
    fn send(&mut self, packet: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Wait at most one slice for a response.
    ///
    /// `Ok(None)` means the slice elapsed silently. Must never wait longer
    /// than `slice`; the caller owns elapsed-time and abort bookkeeping.
    fn recv_slice(
        &mut self,
        slice: Duration,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Release the socket. Idempotent; never errors on an already-closed
    /// socket.
    fn close(&mut self);
}
