//! Error types for the NAT probe engine.
//!
//! A probe timeout is deliberately absent here: no response within the
//! tolerance window is the convergence signal of the search, not an error.

use thiserror::Error;

use super::types::Protocol;

/// Errors rejected at the configuration boundary.
///
/// Invalid values are rejected, never clamped.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Initial timeout must be a positive number of seconds.
    #[error("initial timeout for {protocol} must be positive")]
    InvalidInitialTimeout {
        /// Protocol the setting applies to.
        protocol: Protocol,
    },

    /// Growth multiplier must be strictly greater than 1.
    #[error("multiplier for {protocol} must be greater than 1, got {value}")]
    InvalidMultiplier {
        /// Protocol the setting applies to.
        protocol: Protocol,
        /// Rejected value.
        value: f64,
    },

    /// Configuration cannot change while a run is active.
    #[error("configuration is locked while a test is running")]
    Locked,
}

/// Errors from radio-link supervision.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The radio never reached a registered state within the reconnect budget.
    #[error("radio link not registered after {attempts} re-attach attempts")]
    Unavailable {
        /// Number of re-attach attempts made.
        attempts: u32,
    },

    /// An abort request arrived while waiting for the link.
    #[error("link wait aborted")]
    Aborted,
}

/// Errors from socket setup and probe I/O.
///
/// Everything except [`TransportError::Link`] is transient: the search loop
/// recovers by closing and reopening the connection and resending the same
/// probe.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Hostname resolution failed.
    #[error("failed to resolve {host}: {source}")]
    Resolution {
        /// Hostname that could not be resolved.
        host: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Socket creation or binding failed.
    #[error("socket setup failed: {0}")]
    Socket(#[source] std::io::Error),

    /// The peer could not be reached.
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// Send or receive failed on a connection the peer no longer honors.
    #[error("connection lost: {0}")]
    NotConnected(#[source] std::io::Error),

    /// The radio link is gone; fatal to the current run.
    #[error(transparent)]
    Link(#[from] LinkError),
}

impl TransportError {
    /// Whether the search loop should recover by reconnecting.
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::Link(_))
    }
}

/// Diagnostic payload could not be serialized.
#[derive(Debug, Error)]
#[error("failed to encode diagnostic payload: {0}")]
pub struct EncodeError(#[from] pub serde_json::Error);

/// Telemetry snapshot could not be obtained.
///
/// Without telemetry the diagnostic payload cannot be built, so this fails
/// the probe the same way an encoding failure does.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("telemetry unavailable: {0}")]
pub struct TelemetryError(pub String);

/// Fatal outcomes of a single protocol's search run.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Radio link lost and not recovered within the reconnect budget.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// The peer replied with an explicit error payload.
    #[error("peer reported an error: {0}")]
    Protocol(String),

    /// Telemetry stayed unavailable past the retry budget.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// Payload encoding kept failing past the retry budget.
    #[error(transparent)]
    Encoding(#[from] EncodeError),
}

/// Errors reported by the control surface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// A run is already active; a second `start()` is rejected, never queued.
    #[error("a test is already running")]
    AlreadyRunning,

    /// The worker did not reach idle within the stop grace period.
    ///
    /// The abort flag stays set; `stop()` may be retried.
    #[error("worker did not stop within the grace period")]
    StopTimedOut,
}
