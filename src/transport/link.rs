//! Radio-link supervision.
//!
//! Probing is pointless while the radio is detached, and cellular links drop
//! regularly; every connection setup first waits here for a registered
//! status, forcing re-attach requests while it waits.

use tokio::time::sleep;
use tracing::{info, warn};

use crate::core::constants::{MAX_RECONNECT_ATTEMPTS, POLL_SLICE};
use crate::core::{AbortSignal, LinkError, RadioLink};

/// Block until the radio reports a registered status.
///
/// Polls once per slice, up to [`MAX_RECONNECT_ATTEMPTS`] ticks, asking the
/// modem to re-attach on every non-registered tick. The abort signal is
/// checked at every tick, so a stop request never waits longer than one
/// slice.
pub async fn ensure_link<L: RadioLink>(link: &L, abort: &AbortSignal) -> Result<(), LinkError> {
    if link.registration_status().is_registered() {
        return Ok(());
    }

    warn!(
        attempts = MAX_RECONNECT_ATTEMPTS,
        "radio link not maintained, attempting to reconnect"
    );

    for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
        if abort.is_aborted() {
            return Err(LinkError::Aborted);
        }
        if link.registration_status().is_registered() {
            return Ok(());
        }

        link.request_reattach();
        info!(attempt, max = MAX_RECONNECT_ATTEMPTS, "requested radio re-attach");
        sleep(POLL_SLICE).await;
    }

    if link.registration_status().is_registered() {
        return Ok(());
    }
    warn!("radio link could not be established");
    Err(LinkError::Unavailable {
        attempts: MAX_RECONNECT_ATTEMPTS,
    })
}
