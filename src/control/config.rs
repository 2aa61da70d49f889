//! Run configuration.
//!
//! Search parameters were process-wide mutable globals in older NAT test
//! tools; here they are an owned value behind the orchestrator. Invalid
//! values are rejected at the setter, never clamped, so the search can rely
//! on `initial >= 1` and `multiplier > 1` without re-checking.

use crate::core::constants::{
    DEFAULT_SERVER_HOST, DEFAULT_TCP_INITIAL_TIMEOUT, DEFAULT_TCP_MULTIPLIER,
    DEFAULT_UDP_INITIAL_TIMEOUT, DEFAULT_UDP_MULTIPLIER,
};
use crate::core::{ConfigError, Protocol};

/// Tunable parameters of a probe run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeConfig {
    udp_initial_timeout: u64,
    tcp_initial_timeout: u64,
    udp_multiplier: f64,
    tcp_multiplier: f64,
    server_host: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            udp_initial_timeout: DEFAULT_UDP_INITIAL_TIMEOUT,
            tcp_initial_timeout: DEFAULT_TCP_INITIAL_TIMEOUT,
            udp_multiplier: DEFAULT_UDP_MULTIPLIER,
            tcp_multiplier: DEFAULT_TCP_MULTIPLIER,
            server_host: DEFAULT_SERVER_HOST.to_string(),
        }
    }
}

impl ProbeConfig {
    /// Initial candidate interval for a protocol, in seconds.
    pub fn initial_timeout(&self, protocol: Protocol) -> u64 {
        match protocol {
            Protocol::Udp => self.udp_initial_timeout,
            Protocol::Tcp => self.tcp_initial_timeout,
        }
    }

    /// Set the initial candidate interval for a protocol.
    ///
    /// Zero is rejected; the search would never terminate.
    pub fn set_initial_timeout(
        &mut self,
        protocol: Protocol,
        seconds: u64,
    ) -> Result<(), ConfigError> {
        if seconds == 0 {
            return Err(ConfigError::InvalidInitialTimeout { protocol });
        }
        match protocol {
            Protocol::Udp => self.udp_initial_timeout = seconds,
            Protocol::Tcp => self.tcp_initial_timeout = seconds,
        }
        Ok(())
    }

    /// Growth multiplier for a protocol.
    ///
    /// Only TCP growth consumes this; the UDP rule is quadratic by probe
    /// count. Both are kept configurable because the control surface exposes
    /// both.
    pub fn multiplier(&self, protocol: Protocol) -> f64 {
        match protocol {
            Protocol::Udp => self.udp_multiplier,
            Protocol::Tcp => self.tcp_multiplier,
        }
    }

    /// Set the growth multiplier for a protocol.
    ///
    /// Values not strictly greater than 1 are rejected; growth would stall.
    pub fn set_multiplier(&mut self, protocol: Protocol, value: f64) -> Result<(), ConfigError> {
        if !(value > 1.0) || !value.is_finite() {
            return Err(ConfigError::InvalidMultiplier { protocol, value });
        }
        match protocol {
            Protocol::Udp => self.udp_multiplier = value,
            Protocol::Tcp => self.tcp_multiplier = value,
        }
        Ok(())
    }

    /// Probe server hostname.
    pub fn server_host(&self) -> &str {
        &self.server_host
    }

    /// Set the probe server hostname.
    pub fn set_server_host(&mut self, host: impl Into<String>) {
        self.server_host = host.into();
    }
}
