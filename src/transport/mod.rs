//! Transport layer: radio-link supervision and UDP/TCP socket lifecycle.
//!
//! Produces connected sockets for the probe engine and recovers from
//! radio-link loss. The probe engine only sees the [`ProbeTransport`]
//! trait; this module provides the real implementation.
//!
//! [`ProbeTransport`]: crate::core::ProbeTransport

mod link;
mod socket;

pub use link::ensure_link;
pub use socket::Connection;
