//! The probe cycle: build, send, wait, classify, adjust.
//!
//! Drives a [`ProbeTransport`] and a [`SearchState`] until the search
//! converges, the run is aborted, or a fatal error ends it. Transient
//! transport failures are recovered here by reconnecting and resending the
//! same probe; they never surface to the orchestrator.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::core::constants::{
    MAX_PAYLOAD_ATTEMPTS, POLL_SLICE, TIMEOUT_TOLERANCE, WAIT_LOG_THRESHOLD,
};
use crate::core::{
    AbortSignal, LinkError, ProbeError, ProbeTransport, Protocol, TelemetrySource, TransportError,
};

use super::payload::DiagnosticPayload;
use super::search::{SearchState, Step};

/// Terminal outcome of one protocol's search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The search converged on the discovered keep-alive timeout.
    Converged {
        /// Discovered timeout in seconds.
        seconds: u64,
    },
    /// The run was aborted; no value is reported.
    Aborted,
}

/// What one bounded response wait produced.
enum Wait {
    Reply(String),
    TimedOut,
    Disconnected,
    Aborted,
}

/// Run the adaptive timeout search for one protocol.
///
/// `initial` and `multiplier` must already be validated by the
/// configuration boundary. The transport is released on every exit path.
pub async fn run_search<T, S>(
    protocol: Protocol,
    initial: u64,
    multiplier: f64,
    transport: &mut T,
    telemetry: &S,
    abort: &AbortSignal,
) -> Result<SearchOutcome, ProbeError>
where
    T: ProbeTransport,
    S: TelemetrySource,
{
    let result = drive(protocol, initial, multiplier, transport, telemetry, abort).await;
    transport.close();
    result
}

async fn drive<T, S>(
    protocol: Protocol,
    initial: u64,
    multiplier: f64,
    transport: &mut T,
    telemetry: &S,
    abort: &AbortSignal,
) -> Result<SearchOutcome, ProbeError>
where
    T: ProbeTransport,
    S: TelemetrySource,
{
    let mut state = SearchState::new(protocol, initial, multiplier);
    let mut payload_failures = 0u32;

    if !establish(protocol, transport, abort).await? {
        return Ok(SearchOutcome::Aborted);
    }
    info!(%protocol, interval = state.current(), "search started");

    loop {
        if abort.is_aborted() {
            return Ok(SearchOutcome::Aborted);
        }

        // Fresh telemetry snapshot every cycle.
        let packet = match build_packet(telemetry, state.current()) {
            Ok(packet) => {
                payload_failures = 0;
                packet
            }
            Err(err) => {
                payload_failures += 1;
                if payload_failures >= MAX_PAYLOAD_ATTEMPTS {
                    return Err(err);
                }
                warn!(%protocol, error = %err, attempt = payload_failures, "probe payload unavailable, retrying next cycle");
                sleep(POLL_SLICE).await;
                continue;
            }
        };

        match transport.send(&packet).await {
            Ok(()) => debug!(%protocol, interval = state.current(), "probe sent"),
            Err(TransportError::Link(link)) => return link_outcome(link),
            Err(err) => {
                warn!(%protocol, error = %err, "send failed, reconnecting");
                if !establish(protocol, transport, abort).await? {
                    return Ok(SearchOutcome::Aborted);
                }
                // Same candidate interval, bounds untouched.
                continue;
            }
        }

        match await_reply(transport, state.current(), abort).await? {
            Wait::Aborted => return Ok(SearchOutcome::Aborted),
            Wait::Disconnected => {
                if !establish(protocol, transport, abort).await? {
                    return Ok(SearchOutcome::Aborted);
                }
                continue;
            }
            Wait::Reply(response) => {
                if response.to_ascii_lowercase().contains("error") {
                    return Err(ProbeError::Protocol(response));
                }
                debug!(%protocol, %response, "response received");
                if let Step::Converged(seconds) = state.on_reply() {
                    return converged(protocol, seconds);
                }
            }
            Wait::TimedOut => {
                info!(%protocol, interval = state.current(), "no response from server");
                if let Step::Converged(seconds) = state.on_timeout() {
                    return converged(protocol, seconds);
                }
                // The NAT binding is presumed dead after a timeout.
                transport.close();
                if !establish(protocol, transport, abort).await? {
                    return Ok(SearchOutcome::Aborted);
                }
            }
        }
    }
}

fn converged(protocol: Protocol, seconds: u64) -> Result<SearchOutcome, ProbeError> {
    info!(%protocol, seconds, "search converged, max keep-alive interval found");
    Ok(SearchOutcome::Converged { seconds })
}

fn link_outcome(link: LinkError) -> Result<SearchOutcome, ProbeError> {
    match link {
        LinkError::Aborted => Ok(SearchOutcome::Aborted),
        other => Err(other.into()),
    }
}

fn build_packet<S: TelemetrySource>(telemetry: &S, interval_s: u64) -> Result<Vec<u8>, ProbeError> {
    let snapshot = telemetry.snapshot()?;
    let packet = DiagnosticPayload::from_snapshot(&snapshot, interval_s).encode()?;
    Ok(packet)
}

/// Open a fresh connection, retrying transient failures forever.
///
/// Returns `Ok(false)` if an abort request arrived; the abort check precedes
/// every attempt. Only link exhaustion is fatal.
async fn establish<T: ProbeTransport>(
    protocol: Protocol,
    transport: &mut T,
    abort: &AbortSignal,
) -> Result<bool, ProbeError> {
    loop {
        if abort.is_aborted() {
            return Ok(false);
        }
        match transport.connect().await {
            Ok(()) => {
                debug!(%protocol, "connected to server");
                return Ok(true);
            }
            Err(TransportError::Link(LinkError::Aborted)) => return Ok(false),
            Err(TransportError::Link(link)) => return Err(link.into()),
            Err(err) => {
                warn!(%protocol, error = %err, "connection attempt failed, retrying");
                sleep(POLL_SLICE).await;
            }
        }
    }
}

/// Wait up to `interval + tolerance` for a response, one slice at a time.
async fn await_reply<T: ProbeTransport>(
    transport: &mut T,
    interval_s: u64,
    abort: &AbortSignal,
) -> Result<Wait, ProbeError> {
    let deadline = Duration::from_secs(interval_s) + TIMEOUT_TOLERANCE;
    let started = Instant::now();
    let mut last_log = Duration::ZERO;

    loop {
        if abort.is_aborted() {
            return Ok(Wait::Aborted);
        }
        let elapsed = started.elapsed();
        if elapsed >= deadline {
            return Ok(Wait::TimedOut);
        }

        let slice = POLL_SLICE.min(deadline - elapsed);
        match transport.recv_slice(slice).await {
            Ok(Some(data)) => {
                let text = String::from_utf8_lossy(&data)
                    .trim_end_matches('\0')
                    .to_string();
                return Ok(Wait::Reply(text));
            }
            Ok(None) => {
                let elapsed = started.elapsed();
                if elapsed - last_log >= WAIT_LOG_THRESHOLD {
                    info!(elapsed_s = elapsed.as_secs(), "waiting for response");
                    last_log = elapsed;
                }
            }
            Err(TransportError::Link(LinkError::Aborted)) => return Ok(Wait::Aborted),
            Err(TransportError::Link(link)) => return Err(link.into()),
            Err(err) => {
                warn!(error = %err, "receive failed, reconnecting");
                return Ok(Wait::Disconnected);
            }
        }
    }
}
