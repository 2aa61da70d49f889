//! Probe engine: diagnostic packet codec and the adaptive timeout search.
//!
//! The search discovers the maximum idle interval for which the peer still
//! answers: probes sent `interval` seconds apart stop eliciting a response
//! within `interval + tolerance` once the NAT binding expires.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Control / Orchestrator         │
//! ├─────────────────────────────────────────┤
//! │          Probe Engine                   │  ← this module
//! │   payload codec, search, probe cycle    │
//! ├─────────────────────────────────────────┤
//! │          Transport                      │
//! │   link supervision, UDP/TCP sockets     │
//! └─────────────────────────────────────────┘
//! ```

mod payload;
mod runner;
mod search;

pub use payload::DiagnosticPayload;
pub use runner::{SearchOutcome, run_search};
pub use search::{Phase, SearchState, Step};
