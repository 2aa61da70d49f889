//! Control surface: configuration and the test orchestrator.

mod config;
mod orchestrator;

pub use config::ProbeConfig;
pub use orchestrator::{NatProbe, ProbeDialer, RunOutcome, SocketDialer};
