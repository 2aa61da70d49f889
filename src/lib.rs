//! # natprobe
//!
//! Discovers the NAT/firewall idle-connection timeout of a network path by
//! sending keep-alive probes over UDP and TCP and observing when the NAT
//! binding stops forwarding traffic. Built for constrained cellular devices
//! sitting behind operator NAT.
//!
//! The search grows the probe interval until a probe goes unanswered, then
//! binary-searches the bracketed range down to one-second resolution:
//!
//! - **GROWTH**: interval increases each answered probe (quadratically by
//!   probe count for UDP, geometrically for TCP)
//! - **BISECT**: the first unanswered probe brackets the timeout; binary
//!   search narrows it to the discovered value
//!
//! One background worker runs at most one search at a time; `start`, `stop`
//! and queries come from any task. Radio link management and telemetry are
//! collaborator traits ([`RadioLink`], [`TelemetrySource`]) so the engine
//! stays free of modem specifics.
//!
//! ## Example
//!
//! ```ignore
//! use natprobe::{NatProbe, ProbeConfig, ProtocolSelector};
//!
//! let probe = NatProbe::new(ProbeConfig::default(), my_radio, my_telemetry);
//! probe.start(ProtocolSelector::Both)?;
//! // ... later ...
//! let udp_timeout = probe.last_outcome(natprobe::Protocol::Udp);
//! ```
//!
//! ## Modules
//!
//! - [`core`]: constants, errors, shared types, collaborator traits
//! - [`probe`]: diagnostic packet codec and the adaptive timeout search
//! - [`transport`]: radio-link supervision and UDP/TCP socket lifecycle
//! - [`control`]: run configuration and the test orchestrator

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod control;
pub mod core;
pub mod probe;
pub mod transport;

// Re-export commonly used items at crate root
pub use control::{NatProbe, ProbeConfig, ProbeDialer, RunOutcome, SocketDialer};
pub use core::{
    AbortSignal, ConfigError, ControlError, EncodeError, LinkError, ProbeError, ProbeTransport,
    Protocol, ProtocolSelector, RadioLink, RegistrationStatus, RunState, TelemetryError,
    TelemetrySnapshot, TelemetrySource, TransportError,
};
pub use probe::{DiagnosticPayload, SearchOutcome, SearchState};
pub use transport::Connection;
