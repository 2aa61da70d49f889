//! Core vocabulary shared by the probe engine and its control surface.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use super::constants::{TCP_PORT, UDP_PORT};

/// Transport protocol a search runs over.
///
/// Immutable per search invocation; determines the socket type and the fixed
/// destination port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Datagram probes against [`UDP_PORT`].
    Udp,
    /// Stream probes against [`TCP_PORT`].
    Tcp,
}

impl Protocol {
    /// Fixed destination port for this protocol.
    pub fn port(self) -> u16 {
        match self {
            Protocol::Udp => UDP_PORT,
            Protocol::Tcp => TCP_PORT,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Tcp => write!(f, "TCP"),
        }
    }
}

/// What `start()` accepts: one protocol, or both sequentially.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolSelector {
    /// UDP search only.
    Udp,
    /// TCP search only.
    Tcp,
    /// UDP search to completion, then TCP unless aborted.
    Both,
}

/// Overall run state of the test engine.
///
/// Process-wide, single instance; only one run is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    /// Worker not started yet.
    Uninitialized = 0,
    /// Worker parked, waiting for a run request.
    Idle = 1,
    /// A search is executing.
    Running = 2,
    /// A stop request is pending; the worker has not observed it yet.
    Aborting = 3,
}

impl RunState {
    fn from_u8(value: u8) -> RunState {
        match value {
            1 => RunState::Idle,
            2 => RunState::Running,
            3 => RunState::Aborting,
            _ => RunState::Uninitialized,
        }
    }
}

/// Shared run-state cell.
///
/// Written by the control surface (`start`/`stop`) and the worker, read by
/// everyone. The `Aborting` value doubles as the cooperative abort signal.
#[derive(Debug, Default)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: RunState) -> Self {
        StateCell(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> RunState {
        RunState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn store(&self, state: RunState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Transition `from -> to` atomically; returns whether it happened.
    pub(crate) fn transition(&self, from: RunState, to: RunState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Cancellation token handed into every blocking wait.
///
/// Cheap to clone; reads the shared run-state cell. Every poll slice of every
/// wait checks this so a stop request is never blocked longer than one slice.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    state: Arc<StateCell>,
}

impl AbortSignal {
    pub(crate) fn new(state: Arc<StateCell>) -> Self {
        AbortSignal { state }
    }

    /// Whether an abort has been requested for the current run.
    pub fn is_aborted(&self) -> bool {
        self.state.load() == RunState::Aborting
    }

    /// A signal that never fires, for driving a search outside the
    /// orchestrator.
    pub fn never() -> Self {
        AbortSignal {
            state: Arc::new(StateCell::new(RunState::Running)),
        }
    }
}

/// Registration status reported by the radio link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    /// Attached to the home network.
    RegisteredHome,
    /// Attached to a roaming network.
    RegisteredRoaming,
    /// Searching for a network.
    Searching,
    /// Registration was denied.
    Denied,
    /// Not registered and not searching.
    NotRegistered,
    /// Status unknown.
    Unknown,
}

impl RegistrationStatus {
    /// Only the two registered states carry traffic.
    pub fn is_registered(self) -> bool {
        matches!(
            self,
            RegistrationStatus::RegisteredHome | RegistrationStatus::RegisteredRoaming
        )
    }
}

/// One synchronous snapshot of device and network telemetry.
///
/// Constructed by the telemetry collaborator, consumed whole by the
/// diagnostic packet codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    /// Current operator name.
    pub operator: String,
    /// Serving cell id.
    pub cell_id: u64,
    /// Local IP addresses, most significant first.
    pub ip_addresses: Vec<String>,
    /// SIM ICCID.
    pub iccid: String,
    /// Device IMEI.
    pub imei: String,
}
