//! Test orchestration: run state machine and the background worker.
//!
//! One long-lived worker task executes searches; all control calls
//! (`start`/`stop`/queries) come from other tasks and communicate through
//! the shared run-state cell plus a single-slot request channel. A second
//! `start()` while a run is active is rejected, never queued.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tracing::{error, info};

use crate::core::constants::{STOP_GRACE, STOP_POLL_INTERVAL};
use crate::core::{
    AbortSignal, ConfigError, ControlError, LinkError, ProbeError, ProbeTransport, Protocol,
    ProtocolSelector, RadioLink, RunState, StateCell, TelemetrySource,
};
use crate::probe::{SearchOutcome, run_search};
use crate::transport::Connection;

use super::config::ProbeConfig;

/// Terminal result of the most recent run for one protocol.
///
/// Intermediate values are never exposed; an entry appears only once the
/// search for that protocol has returned control to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The search converged on the discovered keep-alive timeout.
    Converged {
        /// Discovered timeout in seconds.
        seconds: u64,
    },
    /// The radio link stayed down past the reconnect budget.
    LinkUnavailable,
    /// The peer replied with an explicit error payload.
    ProtocolError {
        /// The offending response text.
        response: String,
    },
    /// Telemetry stayed unavailable past the retry budget.
    TelemetryUnavailable,
    /// Payload encoding kept failing past the retry budget.
    EncodingFailed,
}

impl From<&ProbeError> for RunOutcome {
    fn from(err: &ProbeError) -> Self {
        match err {
            ProbeError::Link(LinkError::Unavailable { .. }) | ProbeError::Link(LinkError::Aborted) => {
                RunOutcome::LinkUnavailable
            }
            ProbeError::Protocol(response) => RunOutcome::ProtocolError {
                response: response.clone(),
            },
            ProbeError::Telemetry(_) => RunOutcome::TelemetryUnavailable,
            ProbeError::Encoding(_) => RunOutcome::EncodingFailed,
        }
    }
}

/// Creates one transport per protocol run.
///
/// The orchestrator is generic over this seam so the whole state machine can
/// be exercised against scripted transports.
pub trait ProbeDialer: Send + Sync + 'static {
    /// Transport type produced by this dialer.
    type Transport: ProbeTransport;

    /// Create an unconnected transport for one protocol run.
    fn dial(&self, protocol: Protocol, host: &str, abort: AbortSignal) -> Self::Transport;
}

/// Dialer producing real UDP/TCP connections supervised by a radio link.
pub struct SocketDialer<L> {
    link: Arc<L>,
}

impl<L: RadioLink> SocketDialer<L> {
    /// Wrap a radio link collaborator.
    pub fn new(link: L) -> Self {
        SocketDialer {
            link: Arc::new(link),
        }
    }
}

impl<L: RadioLink + 'static> ProbeDialer for SocketDialer<L> {
    type Transport = Connection<L>;

    fn dial(&self, protocol: Protocol, host: &str, abort: AbortSignal) -> Self::Transport {
        Connection::new(protocol, host, Arc::clone(&self.link), abort)
    }
}

struct Shared {
    state: Arc<StateCell>,
    config: RwLock<ProbeConfig>,
    outcomes: Mutex<HashMap<Protocol, RunOutcome>>,
}

/// Handle to the NAT timeout test engine.
///
/// Cheap to clone; all clones drive the same worker. Dropping every handle
/// closes the request channel and the worker exits once idle.
#[derive(Clone)]
pub struct NatProbe {
    shared: Arc<Shared>,
    requests: mpsc::Sender<ProtocolSelector>,
}

impl NatProbe {
    /// Spawn the engine with real sockets, supervised by `link`.
    pub fn new<L, T>(config: ProbeConfig, link: L, telemetry: T) -> Self
    where
        L: RadioLink + 'static,
        T: TelemetrySource + 'static,
    {
        Self::spawn(config, SocketDialer::new(link), telemetry)
    }

    /// Spawn the engine with a custom transport dialer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<D, T>(config: ProbeConfig, dialer: D, telemetry: T) -> Self
    where
        D: ProbeDialer,
        T: TelemetrySource + 'static,
    {
        let shared = Arc::new(Shared {
            state: Arc::new(StateCell::new(RunState::Uninitialized)),
            config: RwLock::new(config),
            outcomes: Mutex::new(HashMap::new()),
        });
        let (requests, inbox) = mpsc::channel(1);

        // Idle before the first control call can observe the engine.
        shared.state.store(RunState::Idle);
        tokio::spawn(worker(Arc::clone(&shared), inbox, dialer, telemetry));

        NatProbe { shared, requests }
    }

    /// Request a run. Asynchronous: returns as soon as the worker is woken.
    ///
    /// Fails with [`ControlError::AlreadyRunning`] unless the engine is
    /// idle; the in-flight run is never disturbed.
    pub fn start(&self, selector: ProtocolSelector) -> Result<(), ControlError> {
        if !self
            .shared
            .state
            .transition(RunState::Idle, RunState::Running)
        {
            return Err(ControlError::AlreadyRunning);
        }

        // The state transition above happens-before the worker reads the
        // selector from the channel.
        if self.requests.try_send(selector).is_err() {
            self.shared.state.store(RunState::Idle);
            return Err(ControlError::AlreadyRunning);
        }

        info!(?selector, "test started");
        Ok(())
    }

    /// Request the in-flight run to abort and wait for the worker to go
    /// idle.
    ///
    /// Waits at most the stop grace period (twice the poll slice). A no-op
    /// success when nothing is running. On [`ControlError::StopTimedOut`]
    /// the abort request stays pending and `stop()` may be retried.
    pub async fn stop(&self) -> Result<(), ControlError> {
        match self.shared.state.load() {
            RunState::Idle | RunState::Uninitialized => return Ok(()),
            RunState::Running => {
                self.shared
                    .state
                    .transition(RunState::Running, RunState::Aborting);
            }
            RunState::Aborting => {}
        }

        let started = Instant::now();
        while started.elapsed() < STOP_GRACE {
            if self.shared.state.load() == RunState::Idle {
                return Ok(());
            }
            sleep(STOP_POLL_INTERVAL).await;
        }

        if self.shared.state.load() == RunState::Idle {
            Ok(())
        } else {
            Err(ControlError::StopTimedOut)
        }
    }

    /// Current run state. Never blocks.
    pub fn state(&self) -> RunState {
        self.shared.state.load()
    }

    /// Terminal outcome of the most recent run for a protocol, if any.
    pub fn last_outcome(&self, protocol: Protocol) -> Option<RunOutcome> {
        self.shared
            .outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&protocol)
            .cloned()
    }

    /// Initial candidate interval for a protocol, in seconds.
    pub fn initial_timeout(&self, protocol: Protocol) -> u64 {
        self.read_config().initial_timeout(protocol)
    }

    /// Set the initial candidate interval. Rejected while a run is active.
    pub fn set_initial_timeout(
        &self,
        protocol: Protocol,
        seconds: u64,
    ) -> Result<(), ConfigError> {
        self.ensure_unlocked()?;
        self.write_config().set_initial_timeout(protocol, seconds)
    }

    /// Growth multiplier for a protocol.
    pub fn multiplier(&self, protocol: Protocol) -> f64 {
        self.read_config().multiplier(protocol)
    }

    /// Set the growth multiplier. Rejected while a run is active.
    pub fn set_multiplier(&self, protocol: Protocol, value: f64) -> Result<(), ConfigError> {
        self.ensure_unlocked()?;
        self.write_config().set_multiplier(protocol, value)
    }

    /// Probe server hostname.
    pub fn server_host(&self) -> String {
        self.read_config().server_host().to_string()
    }

    /// Set the probe server hostname. Rejected while a run is active.
    pub fn set_server_host(&self, host: impl Into<String>) -> Result<(), ConfigError> {
        self.ensure_unlocked()?;
        self.write_config().set_server_host(host);
        Ok(())
    }

    fn ensure_unlocked(&self) -> Result<(), ConfigError> {
        match self.shared.state.load() {
            RunState::Running | RunState::Aborting => Err(ConfigError::Locked),
            RunState::Idle | RunState::Uninitialized => Ok(()),
        }
    }

    fn read_config(&self) -> std::sync::RwLockReadGuard<'_, ProbeConfig> {
        self.shared
            .config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_config(&self) -> std::sync::RwLockWriteGuard<'_, ProbeConfig> {
        self.shared
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn worker<D, T>(
    shared: Arc<Shared>,
    mut inbox: mpsc::Receiver<ProtocolSelector>,
    dialer: D,
    telemetry: T,
) where
    D: ProbeDialer,
    T: TelemetrySource,
{
    while let Some(selector) = inbox.recv().await {
        let protocols: &[Protocol] = match selector {
            ProtocolSelector::Udp => &[Protocol::Udp],
            ProtocolSelector::Tcp => &[Protocol::Tcp],
            ProtocolSelector::Both => &[Protocol::Udp, Protocol::Tcp],
        };

        {
            let mut outcomes = shared
                .outcomes
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            for protocol in protocols {
                outcomes.remove(protocol);
            }
        }

        for &protocol in protocols {
            // An abort also cancels the not-yet-started second protocol.
            if shared.state.load() == RunState::Aborting {
                break;
            }
            run_one(&shared, &dialer, &telemetry, protocol).await;
        }

        shared.state.store(RunState::Idle);
        info!("test finished");
    }
}

async fn run_one<D, T>(shared: &Arc<Shared>, dialer: &D, telemetry: &T, protocol: Protocol)
where
    D: ProbeDialer,
    T: TelemetrySource,
{
    let (initial, multiplier, host) = {
        let config = shared
            .config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        (
            config.initial_timeout(protocol),
            config.multiplier(protocol),
            config.server_host().to_string(),
        )
    };

    let abort = AbortSignal::new(Arc::clone(&shared.state));
    let mut transport = dialer.dial(protocol, &host, abort.clone());

    let outcome = match run_search(
        protocol,
        initial,
        multiplier,
        &mut transport,
        telemetry,
        &abort,
    )
    .await
    {
        Ok(SearchOutcome::Converged { seconds }) => Some(RunOutcome::Converged { seconds }),
        Ok(SearchOutcome::Aborted) => {
            info!(%protocol, "run aborted, no value reported");
            None
        }
        Err(err) => {
            error!(%protocol, error = %err, "run failed");
            Some(RunOutcome::from(&err))
        }
    };

    if let Some(outcome) = outcome {
        shared
            .outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(protocol, outcome);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use crate::core::{TelemetryError, TelemetrySnapshot, TransportError};

    use super::*;

    struct StaticTelemetry;

    impl TelemetrySource for StaticTelemetry {
        fn snapshot(&self) -> Result<TelemetrySnapshot, TelemetryError> {
            Ok(TelemetrySnapshot {
                operator: "Telenor".to_string(),
                cell_id: 21229824,
                ip_addresses: vec!["10.160.73.64".to_string()],
                iccid: "8947000000000000001".to_string(),
                imei: "352656100000001".to_string(),
            })
        }
    }

    /// Behaves like a NAT with a fixed idle timeout per protocol; a
    /// threshold of `u64::MAX` answers every probe and keeps growth going
    /// forever.
    struct FakeNat {
        udp_reply_up_to: u64,
        tcp_reply_up_to: u64,
        udp_reply_text: &'static str,
        probes: Arc<AtomicU64>,
    }

    impl FakeNat {
        fn with_timeouts(udp: u64, tcp: u64) -> Self {
            FakeNat {
                udp_reply_up_to: udp,
                tcp_reply_up_to: tcp,
                udp_reply_text: "ok",
                probes: Arc::new(AtomicU64::new(0)),
            }
        }
    }

    struct FakeNatTransport {
        reply_up_to: u64,
        reply_text: &'static str,
        probes: Arc<AtomicU64>,
        pending_reply: bool,
        last_interval: u64,
    }

    impl ProbeDialer for FakeNat {
        type Transport = FakeNatTransport;

        fn dial(&self, protocol: Protocol, _host: &str, _abort: AbortSignal) -> FakeNatTransport {
            let (reply_up_to, reply_text) = match protocol {
                Protocol::Udp => (self.udp_reply_up_to, self.udp_reply_text),
                Protocol::Tcp => (self.tcp_reply_up_to, "ok"),
            };
            FakeNatTransport {
                reply_up_to,
                reply_text,
                probes: Arc::clone(&self.probes),
                pending_reply: false,
                last_interval: 0,
            }
        }
    }

    impl ProbeTransport for FakeNatTransport {
        async fn connect(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
            let value: serde_json::Value =
                serde_json::from_slice(&packet[..packet.len() - 1]).unwrap();
            self.last_interval = value["interval"].as_u64().unwrap();
            self.pending_reply = self.last_interval <= self.reply_up_to;
            self.probes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn recv_slice(&mut self, slice: Duration) -> Result<Option<Vec<u8>>, TransportError> {
            if self.pending_reply {
                self.pending_reply = false;
                sleep(Duration::from_millis(10)).await;
                let mut reply = self.reply_text.as_bytes().to_vec();
                reply.push(0);
                Ok(Some(reply))
            } else {
                sleep(slice).await;
                Ok(None)
            }
        }

        fn close(&mut self) {}
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    async fn wait_for_idle(probe: &NatProbe) {
        for _ in 0..10_000 {
            if probe.state() == RunState::Idle {
                return;
            }
            sleep(Duration::from_millis(50)).await;
        }
        panic!("worker never returned to idle");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_when_idle_is_a_noop_success() {
        let probe = NatProbe::spawn(
            ProbeConfig::default(),
            FakeNat::with_timeouts(9, 9),
            StaticTelemetry,
        );

        assert_eq!(probe.state(), RunState::Idle);
        probe.stop().await.unwrap();
        probe.stop().await.unwrap();
        assert_eq!(probe.state(), RunState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_udp_run_converges_and_records_outcome() {
        init_tracing();
        let probe = NatProbe::spawn(
            ProbeConfig::default(),
            FakeNat::with_timeouts(9, 9),
            StaticTelemetry,
        );

        probe.start(ProtocolSelector::Udp).unwrap();
        assert_eq!(probe.state(), RunState::Running);
        wait_for_idle(&probe).await;

        assert_eq!(
            probe.last_outcome(Protocol::Udp),
            Some(RunOutcome::Converged { seconds: 9 })
        );
        assert_eq!(probe.last_outcome(Protocol::Tcp), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_rejected_and_run_undisturbed() {
        // Every probe answered: growth never ends until aborted.
        let nat = FakeNat::with_timeouts(u64::MAX, u64::MAX);
        let probes = Arc::clone(&nat.probes);
        let probe = NatProbe::spawn(ProbeConfig::default(), nat, StaticTelemetry);

        probe.start(ProtocolSelector::Udp).unwrap();
        sleep(Duration::from_secs(5)).await;
        assert_eq!(probe.state(), RunState::Running);
        let probes_before = probes.load(Ordering::SeqCst);
        assert!(probes_before > 0);

        assert_eq!(
            probe.start(ProtocolSelector::Tcp),
            Err(ControlError::AlreadyRunning)
        );
        // The in-flight run keeps probing.
        sleep(Duration::from_secs(5)).await;
        assert!(probes.load(Ordering::SeqCst) >= probes_before);
        assert_eq!(probe.state(), RunState::Running);

        probe.stop().await.unwrap();
        assert_eq!(probe.state(), RunState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_growth_reports_no_value() {
        let probe = NatProbe::spawn(
            ProbeConfig::default(),
            FakeNat::with_timeouts(u64::MAX, u64::MAX),
            StaticTelemetry,
        );

        probe.start(ProtocolSelector::Udp).unwrap();
        sleep(Duration::from_secs(5)).await;
        probe.stop().await.unwrap();

        assert_eq!(probe.state(), RunState::Idle);
        assert_eq!(probe.last_outcome(Protocol::Udp), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_continues_to_tcp_after_udp_protocol_error() {
        init_tracing();
        let mut nat = FakeNat::with_timeouts(u64::MAX, 5);
        nat.udp_reply_text = "Internal Error";
        let mut config = ProbeConfig::default();
        config.set_initial_timeout(Protocol::Tcp, 8).unwrap();
        let probe = NatProbe::spawn(config, nat, StaticTelemetry);

        probe.start(ProtocolSelector::Both).unwrap();
        wait_for_idle(&probe).await;

        assert!(matches!(
            probe.last_outcome(Protocol::Udp),
            Some(RunOutcome::ProtocolError { .. })
        ));
        assert_eq!(
            probe.last_outcome(Protocol::Tcp),
            Some(RunOutcome::Converged { seconds: 5 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_locked_while_running() {
        let probe = NatProbe::spawn(
            ProbeConfig::default(),
            FakeNat::with_timeouts(u64::MAX, u64::MAX),
            StaticTelemetry,
        );

        probe.start(ProtocolSelector::Udp).unwrap();
        assert_eq!(
            probe.set_initial_timeout(Protocol::Udp, 10),
            Err(ConfigError::Locked)
        );
        assert_eq!(
            probe.set_multiplier(Protocol::Tcp, 2.0),
            Err(ConfigError::Locked)
        );

        probe.stop().await.unwrap();
        probe.set_initial_timeout(Protocol::Udp, 10).unwrap();
        assert_eq!(probe.initial_timeout(Protocol::Udp), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accessors_round_trip() {
        let probe = NatProbe::spawn(
            ProbeConfig::default(),
            FakeNat::with_timeouts(9, 9),
            StaticTelemetry,
        );

        probe.set_multiplier(Protocol::Tcp, 1.2).unwrap();
        assert_eq!(probe.multiplier(Protocol::Tcp), 1.2);
        probe.set_server_host("probe.example.org").unwrap();
        assert_eq!(probe.server_host(), "probe.example.org");
        assert_eq!(
            probe.set_multiplier(Protocol::Udp, 1.0),
            Err(ConfigError::InvalidMultiplier {
                protocol: Protocol::Udp,
                value: 1.0
            })
        );
    }
}
