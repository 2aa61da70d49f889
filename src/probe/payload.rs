//! Diagnostic packet codec.
//!
//! Each probe carries a JSON snapshot of network/device telemetry plus the
//! candidate interval it is testing. The wire protocol delimits packets by
//! send length plus a NUL terminator, not by framing, so the encoded buffer
//! ends in `\0`.

use serde::Serialize;
use tracing::warn;

use crate::core::constants::MAX_IP_ADDRESSES;
use crate::core::{EncodeError, TelemetrySnapshot};

/// One probe's diagnostic payload.
///
/// Constructed fresh per probe, never mutated after creation, discarded
/// after serialization. Field names and order are fixed by the server side.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticPayload {
    /// Local IP addresses, capped at [`MAX_IP_ADDRESSES`].
    ip: Vec<String>,
    /// Operator name.
    op: String,
    /// Serving cell id.
    cell_id: u64,
    /// SIM ICCID.
    iccid: String,
    /// Device IMEI.
    imei: String,
    /// Candidate keep-alive interval being tested, in seconds.
    interval: u64,
}

impl DiagnosticPayload {
    /// Build a payload from a telemetry snapshot and the candidate interval.
    ///
    /// Addresses beyond [`MAX_IP_ADDRESSES`] are dropped with a warning,
    /// never an error.
    pub fn from_snapshot(snapshot: &TelemetrySnapshot, interval_s: u64) -> Self {
        let mut ip = snapshot.ip_addresses.clone();
        if ip.len() > MAX_IP_ADDRESSES {
            warn!(
                count = ip.len(),
                max = MAX_IP_ADDRESSES,
                "more addresses than the payload carries, dropping the remainder"
            );
            ip.truncate(MAX_IP_ADDRESSES);
        }

        DiagnosticPayload {
            ip,
            op: snapshot.operator.clone(),
            cell_id: snapshot.cell_id,
            iccid: snapshot.iccid.clone(),
            imei: snapshot.imei.clone(),
            interval: interval_s,
        }
    }

    /// The candidate interval this payload carries.
    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Serialize into a wire-ready, NUL-terminated buffer.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut buf = serde_json::to_vec(self)?;
        buf.push(0);
        Ok(buf)
    }
}
