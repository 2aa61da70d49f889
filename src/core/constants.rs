//! Fixed protocol and timing constants.
//!
//! These values match the deployed probe servers and MUST NOT be changed
//! without coordinating with the server side.

use std::time::Duration;

// =============================================================================
// WIRE PROTOCOL
// =============================================================================

/// Destination port for UDP probes.
pub const UDP_PORT: u16 = 3050;

/// Destination port for TCP probes.
pub const TCP_PORT: u16 = 3051;

/// Default probe server hostname.
pub const DEFAULT_SERVER_HOST: &str = "nat-test.thingy.rocks";

/// Receive buffer size for probe responses.
pub const RECV_BUFFER_SIZE: usize = 512;

/// Maximum number of local IP addresses carried in a diagnostic payload.
///
/// Extra addresses are dropped, not an error.
pub const MAX_IP_ADDRESSES: usize = 10;

// =============================================================================
// TIMING
// =============================================================================

/// Length of one poll slice.
///
/// Every blocking wait (response wait, link wait, idle park) is cut into
/// slices of this length so the abort flag is observed at least this often.
pub const POLL_SLICE: Duration = Duration::from_secs(3);

/// Extra wait granted on top of the candidate interval before a probe is
/// classified as timed out.
pub const TIMEOUT_TOLERANCE: Duration = Duration::from_secs(10);

/// Emit an elapsed-time log line after this much silent waiting.
pub const WAIT_LOG_THRESHOLD: Duration = Duration::from_secs(60);

/// Grace period `stop()` waits for the worker to observe the abort flag.
pub const STOP_GRACE: Duration = Duration::from_secs(2 * POLL_SLICE.as_secs());

/// How often `stop()` re-checks the run state while waiting out the grace
/// period.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

// =============================================================================
// RETRY BUDGETS
// =============================================================================

/// Radio re-attach attempts before the link is declared unavailable.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Consecutive telemetry/encode failures tolerated before the run fails.
pub const MAX_PAYLOAD_ATTEMPTS: u32 = 3;

// =============================================================================
// SEARCH DEFAULTS
// =============================================================================

/// Default initial candidate interval for UDP, in seconds.
pub const DEFAULT_UDP_INITIAL_TIMEOUT: u64 = 1;

/// Default initial candidate interval for TCP, in seconds.
pub const DEFAULT_TCP_INITIAL_TIMEOUT: u64 = 300;

/// Default growth multiplier for UDP.
pub const DEFAULT_UDP_MULTIPLIER: f64 = 2.0;

/// Default growth multiplier for TCP.
pub const DEFAULT_TCP_MULTIPLIER: f64 = 1.5;
