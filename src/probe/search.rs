//! Adaptive timeout search state.
//!
//! Pure state machine, no I/O: the runner feeds it reply/timeout outcomes
//! and it answers with the next candidate interval or convergence.
//!
//! The search starts in GROWTH, increasing the candidate interval until a
//! probe goes unanswered. The first timeout brackets the real timeout in
//! `[lower, upper)` and switches to BISECT, which narrows the bracket to
//! one-second resolution by binary search.

use crate::core::Protocol;

/// Search stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Interval grows each answered probe; no upper bound known yet.
    Growth,
    /// Binary search inside `[lower, upper)`.
    Bisect,
}

/// Outcome of feeding one probe result into the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Probe again at the new candidate interval.
    Continue,
    /// Search converged; the value is the discovered keep-alive timeout in
    /// seconds.
    Converged(u64),
}

/// State of one protocol's timeout search.
///
/// Created fresh per protocol run and owned by it; destroyed when the run
/// ends.
#[derive(Debug, Clone)]
pub struct SearchState {
    protocol: Protocol,
    initial: u64,
    multiplier: f64,
    current: u64,
    lower: u64,
    upper: u64,
    /// Number of probes sent so far in GROWTH, driving the UDP growth rule.
    probe_count: u32,
    phase: Phase,
}

impl SearchState {
    /// Start a search at the configured initial interval.
    ///
    /// `initial` and `multiplier` must already be validated (`initial >= 1`,
    /// `multiplier > 1`); the configuration boundary rejects anything else.
    pub fn new(protocol: Protocol, initial: u64, multiplier: f64) -> Self {
        SearchState {
            protocol,
            initial,
            multiplier,
            current: initial,
            lower: 0,
            upper: 0,
            probe_count: 1,
            phase: Phase::Growth,
        }
    }

    /// Candidate interval for the next probe, in seconds.
    pub fn current(&self) -> u64 {
        self.current
    }

    /// Current search stage.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Lower bound of the bracket (highest interval known to be answered).
    pub fn lower(&self) -> u64 {
        self.lower
    }

    /// Upper bound of the bracket (lowest interval known to time out).
    pub fn upper(&self) -> u64 {
        self.upper
    }

    /// The probe at `current` was answered in time.
    pub fn on_reply(&mut self) -> Step {
        self.lower = self.current;

        match self.phase {
            Phase::Growth => {
                self.probe_count += 1;
                self.current = match self.protocol {
                    // UDP grows quadratically with the probe count.
                    Protocol::Udp => self.initial * u64::from(self.probe_count).pow(2),
                    // TCP grows geometrically; the +1 floor keeps small
                    // intervals from stalling under integer truncation.
                    Protocol::Tcp => {
                        let grown = (self.current as f64 * self.multiplier) as u64;
                        grown.max(self.current + 1)
                    }
                };
                Step::Continue
            }
            Phase::Bisect => self.narrow(),
        }
    }

    /// The probe at `current` went unanswered past the tolerance window.
    ///
    /// The first timeout of the run switches the search to BISECT; the
    /// caller must force a reconnection because the binding is presumed
    /// dead.
    pub fn on_timeout(&mut self) -> Step {
        self.upper = self.current;
        self.phase = Phase::Bisect;
        self.narrow()
    }

    fn narrow(&mut self) -> Step {
        if self.upper - self.lower == 1 {
            self.current = self.lower;
            Step::Converged(self.lower)
        } else {
            self.current = self.lower + (self.upper - self.lower) / 2;
            Step::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_udp_growth_is_quadratic() {
        let mut state = SearchState::new(Protocol::Udp, 1, 2.0);
        let mut seen = vec![state.current()];
        for _ in 0..4 {
            assert_eq!(state.on_reply(), Step::Continue);
            seen.push(state.current());
        }
        assert_eq!(seen, vec![1, 4, 9, 16, 25]);
    }

    #[test]
    fn test_tcp_growth_is_geometric() {
        let mut state = SearchState::new(Protocol::Tcp, 300, 1.5);
        assert_eq!(state.on_reply(), Step::Continue);
        assert_eq!(state.current(), 450);
        assert_eq!(state.on_reply(), Step::Continue);
        assert_eq!(state.current(), 675);
    }

    #[test]
    fn test_growth_strictly_increases() {
        for protocol in [Protocol::Udp, Protocol::Tcp] {
            let mut state = SearchState::new(protocol, 1, 1.1);
            let mut previous = state.current();
            for _ in 0..20 {
                state.on_reply();
                assert!(state.current() > previous, "{protocol} growth stalled");
                previous = state.current();
            }
        }
    }

    #[test]
    fn test_first_timeout_switches_to_bisect_once() {
        let mut state = SearchState::new(Protocol::Udp, 1, 2.0);
        state.on_reply();
        state.on_reply();
        assert_eq!(state.phase(), Phase::Growth);

        // current = 9, lower = 4
        state.on_timeout();
        assert_eq!(state.phase(), Phase::Bisect);
        assert_eq!(state.upper(), 9);
        assert_eq!(state.lower(), 4);

        state.on_reply();
        assert_eq!(state.phase(), Phase::Bisect);
    }

    #[test]
    fn test_bisect_bracket_invariant() {
        let mut state = SearchState::new(Protocol::Udp, 1, 2.0);
        for _ in 0..3 {
            state.on_reply();
        }
        // current = 16; pretend the real timeout is 20 seconds.
        let real_timeout = 20;
        let mut width = u64::MAX;
        loop {
            let step = if state.current() <= real_timeout {
                state.on_reply()
            } else {
                state.on_timeout()
            };
            match step {
                Step::Continue if state.phase() == Phase::Bisect => {
                    assert!(state.lower() < state.current());
                    assert!(state.current() < state.upper());
                    assert!(state.upper() - state.lower() < width);
                    width = state.upper() - state.lower();
                }
                Step::Continue => {}
                Step::Converged(value) => {
                    assert_eq!(value, real_timeout);
                    break;
                }
            }
        }
    }

    #[test]
    fn test_first_probe_timeout_degenerates_to_bisect() {
        let mut state = SearchState::new(Protocol::Tcp, 300, 1.5);
        assert_eq!(state.on_timeout(), Step::Continue);
        assert_eq!(state.phase(), Phase::Bisect);
        assert_eq!(state.lower(), 0);
        assert_eq!(state.upper(), 300);
        assert_eq!(state.current(), 150);
    }

    #[test]
    fn test_all_timeouts_converge_at_zero_within_log_bound() {
        let mut state = SearchState::new(Protocol::Tcp, 300, 1.5);
        let mut cycles = 0;
        loop {
            cycles += 1;
            if let Step::Converged(value) = state.on_timeout() {
                assert_eq!(value, 0);
                break;
            }
            assert!(cycles <= 10, "more than log2(300) bisection cycles");
        }
    }

    #[test]
    fn test_immediate_timeout_at_one_second_initial() {
        let mut state = SearchState::new(Protocol::Udp, 1, 2.0);
        // upper - lower == 1 right away: converged at 0.
        assert_eq!(state.on_timeout(), Step::Converged(0));
    }
}
