//! Secret touch-sequence detection for restock mode
//!
//! Watches the stream of door touches for a fixed ordered sequence
//! (e.g. A1 -> B2 -> C3 -> D4) with a per-step deadline. A full match
//! unlocks restock mode. Matching is a side channel: it never suppresses
//! or alters normal selection handling for the same touch.

use crate::domain::types::DoorId;
use anyhow::bail;
use smallvec::SmallVec;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Outcome of observing one door touch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// No match in progress and the touch is not the first element
    Idle,
    /// The touch extended the current prefix
    Advanced,
    /// Wrong door, but it equals the first element: matching restarted at 1
    Restarted,
    /// Wrong door mid-sequence: the partial match was discarded
    Reset,
    /// The full sequence matched; state has been cleared
    Activated,
}

/// Progress readout for on-screen feedback, recomputed after every observe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceProgress {
    pub matched: usize,
    pub total: usize,
    pub next: Option<DoorId>,
}

/// Matches door touches against a fixed expected sequence within time bounds
pub struct SequenceDetector {
    /// Expected ordered sequence, fixed at construction
    expected: Vec<DoorId>,
    /// Doors matched so far; always a strict prefix of `expected` or empty
    matched: SmallVec<[DoorId; 8]>,
    /// Per-step timeout measured from the most recent accepted touch
    step_timeout: Duration,
    /// Pending expiration for the current prefix; re-arming overwrites,
    /// so at most one deadline exists and a stale one can never fire
    deadline: Option<Instant>,
}

impl SequenceDetector {
    pub fn new(expected: Vec<DoorId>, step_timeout: Duration) -> anyhow::Result<Self> {
        if expected.is_empty() {
            bail!("expected sequence must not be empty");
        }
        if step_timeout.is_zero() {
            bail!("sequence step timeout must be positive");
        }
        Ok(Self { expected, matched: SmallVec::new(), step_timeout, deadline: None })
    }

    /// Observe a door touch and advance/restart/discard the match.
    ///
    /// Called for every door touch, including doors that are valid purchase
    /// targets and doors that are empty or disabled.
    pub fn observe(&mut self, door: &DoorId, now: Instant) -> SequenceOutcome {
        // A touch arriving after the step window must not extend the stale
        // prefix, so expire lazily before matching.
        self.poll(now);

        let pos = self.matched.len();
        if *door == self.expected[pos] {
            self.matched.push(door.clone());

            if self.matched.len() == self.expected.len() {
                info!(sequence_len = %self.expected.len(), "sequence_activated");
                self.matched.clear();
                self.deadline = None;
                return SequenceOutcome::Activated;
            }

            self.deadline = Some(now + self.step_timeout);
            debug!(door = %door, matched = %self.matched.len(), "sequence_advanced");
            SequenceOutcome::Advanced
        } else if pos > 0 && *door == self.expected[0] {
            // Wrong door, but it could be the start of a fresh attempt
            self.matched.clear();
            self.matched.push(door.clone());
            self.deadline = Some(now + self.step_timeout);
            debug!(door = %door, "sequence_restarted");
            SequenceOutcome::Restarted
        } else if pos > 0 {
            self.matched.clear();
            self.deadline = None;
            debug!(door = %door, "sequence_reset");
            SequenceOutcome::Reset
        } else {
            SequenceOutcome::Idle
        }
    }

    /// Expire the step deadline if it has passed.
    ///
    /// Returns true when a live prefix was discarded, so the caller can
    /// clear its progress display. Driven from the controller tick.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                debug!(matched = %self.matched.len(), "sequence_step_timeout");
                self.matched.clear();
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Current progress readout
    pub fn progress(&self) -> SequenceProgress {
        SequenceProgress {
            matched: self.matched.len(),
            total: self.expected.len(),
            next: self.expected.get(self.matched.len()).cloned(),
        }
    }

    /// Whether a partial match is currently live
    pub fn in_progress(&self) -> bool {
        !self.matched.is_empty()
    }

    #[cfg(test)]
    fn matched(&self) -> &[DoorId] {
        &self.matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doors(ids: &[&str]) -> Vec<DoorId> {
        ids.iter().map(|s| DoorId::from(*s)).collect()
    }

    fn detector() -> SequenceDetector {
        SequenceDetector::new(doors(&["A1", "B2", "C3", "D4"]), Duration::from_secs(5)).unwrap()
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_empty_sequence_rejected() {
        let result = SequenceDetector::new(vec![], Duration::from_secs(5));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = SequenceDetector::new(doors(&["A1"]), Duration::ZERO);
        assert!(result.is_err());
    }

    #[test]
    fn test_exact_sequence_activates_once() {
        let mut det = detector();
        let t0 = Instant::now();

        assert_eq!(det.observe(&DoorId::from("A1"), t0), SequenceOutcome::Advanced);
        assert_eq!(det.observe(&DoorId::from("B2"), t0 + secs(1)), SequenceOutcome::Advanced);
        assert_eq!(det.observe(&DoorId::from("C3"), t0 + secs(2)), SequenceOutcome::Advanced);
        assert_eq!(det.observe(&DoorId::from("D4"), t0 + secs(3)), SequenceOutcome::Activated);

        // State resets to empty after activation
        assert!(det.matched().is_empty());
        assert_eq!(det.progress().matched, 0);

        // A lone D4 afterwards does nothing
        assert_eq!(det.observe(&DoorId::from("D4"), t0 + secs(4)), SequenceOutcome::Idle);
    }

    #[test]
    fn test_prefix_invariant_held_throughout() {
        let mut det = detector();
        let expected = doors(&["A1", "B2", "C3", "D4"]);
        let t0 = Instant::now();

        let noise = doors(&["A1", "X9", "A1", "B2", "B2", "C3", "A1", "D4"]);
        for (i, door) in noise.iter().enumerate() {
            det.observe(door, t0 + Duration::from_millis(i as u64 * 100));
            let matched = det.matched();
            assert!(matched.len() < expected.len());
            assert_eq!(matched, &expected[..matched.len()]);
        }
    }

    #[test]
    fn test_unrelated_touch_mid_sequence_aborts() {
        let mut det = detector();
        let t0 = Instant::now();

        det.observe(&DoorId::from("A1"), t0);
        det.observe(&DoorId::from("B2"), t0 + secs(1));
        assert_eq!(det.observe(&DoorId::from("X9"), t0 + secs(2)), SequenceOutcome::Reset);

        assert!(det.matched().is_empty());
        // The abort cancelled the deadline: nothing left to expire
        assert!(!det.poll(t0 + secs(60)));
    }

    #[test]
    fn test_first_element_mid_sequence_restarts() {
        let mut det = detector();
        let t0 = Instant::now();

        det.observe(&DoorId::from("A1"), t0);
        det.observe(&DoorId::from("B2"), t0 + secs(1));
        assert_eq!(det.observe(&DoorId::from("A1"), t0 + secs(2)), SequenceOutcome::Restarted);

        assert_eq!(det.progress().matched, 1);
        assert_eq!(det.progress().next, Some(DoorId::from("B2")));
    }

    #[test]
    fn test_abort_then_restart_activates_once() {
        // A1, X9, A1, B2, C3, D4 within windows -> exactly one activation
        let mut det = detector();
        let t0 = Instant::now();

        let mut activations = 0;
        let touches = ["A1", "X9", "A1", "B2", "C3", "D4"];
        for (i, id) in touches.iter().enumerate() {
            let outcome = det.observe(&DoorId::from(*id), t0 + secs(i as u64));
            if outcome == SequenceOutcome::Activated {
                activations += 1;
            }
        }
        assert_eq!(activations, 1);
        assert!(det.matched().is_empty());
    }

    #[test]
    fn test_step_timeout_discards_partial() {
        // A1,B2,C3 at t=0,1,2; wait 6s; D4 -> no activation
        let mut det = detector();
        let t0 = Instant::now();

        det.observe(&DoorId::from("A1"), t0);
        det.observe(&DoorId::from("B2"), t0 + secs(1));
        det.observe(&DoorId::from("C3"), t0 + secs(2));

        // D4 arrives after the 5s window measured from the C3 touch; the
        // stale prefix is discarded first and D4 alone matches nothing.
        assert_eq!(det.observe(&DoorId::from("D4"), t0 + secs(8)), SequenceOutcome::Idle);
        assert!(det.matched().is_empty());
    }

    #[test]
    fn test_timeout_then_fresh_first_element_starts_over() {
        let mut det = detector();
        let t0 = Instant::now();

        det.observe(&DoorId::from("A1"), t0);
        det.observe(&DoorId::from("B2"), t0 + secs(1));

        // Tick expires the partial match
        assert!(det.poll(t0 + secs(7)));
        assert!(!det.in_progress());

        // A fresh A1 starts a new match from position 0
        assert_eq!(det.observe(&DoorId::from("A1"), t0 + secs(8)), SequenceOutcome::Advanced);
        assert_eq!(det.progress().matched, 1);
    }

    #[test]
    fn test_poll_fires_at_most_once_per_arm() {
        let mut det = detector();
        let t0 = Instant::now();

        det.observe(&DoorId::from("A1"), t0);
        assert!(det.poll(t0 + secs(6)));
        // Deadline was consumed, a later poll is a no-op
        assert!(!det.poll(t0 + secs(12)));
    }

    #[test]
    fn test_each_step_restarts_deadline() {
        let mut det = detector();
        let t0 = Instant::now();

        // 4s between touches stays inside the per-step window even though
        // the total exceeds a single window
        det.observe(&DoorId::from("A1"), t0);
        det.observe(&DoorId::from("B2"), t0 + secs(4));
        det.observe(&DoorId::from("C3"), t0 + secs(8));
        assert_eq!(
            det.observe(&DoorId::from("D4"), t0 + secs(12)),
            SequenceOutcome::Activated
        );
    }

    #[test]
    fn test_repeated_door_sequence() {
        // A sequence that repeats the same door must be matched in order
        // (it is a sequence, not a set)
        let mut det =
            SequenceDetector::new(doors(&["A1", "A1", "B2"]), Duration::from_secs(5)).unwrap();
        let t0 = Instant::now();

        assert_eq!(det.observe(&DoorId::from("A1"), t0), SequenceOutcome::Advanced);
        assert_eq!(det.observe(&DoorId::from("A1"), t0 + secs(1)), SequenceOutcome::Advanced);
        assert_eq!(det.observe(&DoorId::from("B2"), t0 + secs(2)), SequenceOutcome::Activated);
    }

    #[test]
    fn test_progress_readout() {
        let mut det = detector();
        let t0 = Instant::now();

        assert_eq!(
            det.progress(),
            SequenceProgress { matched: 0, total: 4, next: Some(DoorId::from("A1")) }
        );

        det.observe(&DoorId::from("A1"), t0);
        det.observe(&DoorId::from("B2"), t0 + secs(1));
        assert_eq!(
            det.progress(),
            SequenceProgress { matched: 2, total: 4, next: Some(DoorId::from("C3")) }
        );
    }

    #[test]
    fn test_single_door_sequence() {
        let mut det = SequenceDetector::new(doors(&["A1"]), Duration::from_secs(5)).unwrap();
        assert_eq!(det.observe(&DoorId::from("A1"), Instant::now()), SequenceOutcome::Activated);
    }
}
