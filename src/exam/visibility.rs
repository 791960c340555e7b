//! Hand visibility tracking
//!
//! The exam requires a fixed number of hands in frame. Every time the
//! observed count strays from that number an "unseen" interval opens, and it
//! closes when the count is right again. The intervals are summed when the
//! exam finishes.

use std::time::{Duration, Instant};

/// Visibility transition reported to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityChange {
    /// valid -> invalid
    Lost,
    /// invalid -> valid
    Restored,
}

/// Timestamps of visibility transitions
///
/// `entered_invalid` and `entered_valid` are appended alternately, starting
/// with `entered_invalid`, so their lengths never differ by more than one.
#[derive(Debug, Clone, Default)]
pub struct VisibilityLedger {
    entered_invalid: Vec<Instant>,
    entered_valid: Vec<Instant>,
    unseen: Duration,
}

impl VisibilityLedger {
    pub fn entered_invalid(&self) -> &[Instant] {
        &self.entered_invalid
    }

    pub fn entered_valid(&self) -> &[Instant] {
        &self.entered_valid
    }

    /// Accumulated unseen duration (only meaningful after finalization)
    pub fn unseen_duration(&self) -> Duration {
        self.unseen
    }
}

/// Tracks whether the required number of hands is visible
#[derive(Debug, Clone)]
pub struct HandVisibilityTracker {
    valid: bool,
    finalized: bool,
    ledger: VisibilityLedger,
}

impl HandVisibilityTracker {
    pub fn new() -> Self {
        Self {
            valid: true,
            finalized: false,
            ledger: VisibilityLedger::default(),
        }
    }

    /// Record an observed hand count; returns the transition, if any
    pub fn observe(&mut self, count: usize, required: usize, now: Instant) -> Option<VisibilityChange> {
        if self.finalized {
            return None;
        }

        let valid_now = count == required;
        match (self.valid, valid_now) {
            (true, false) => {
                self.valid = false;
                self.ledger.entered_invalid.push(now);
                Some(VisibilityChange::Lost)
            }
            (false, true) => {
                self.valid = true;
                self.ledger.entered_valid.push(now);
                Some(VisibilityChange::Restored)
            }
            _ => None,
        }
    }

    /// Close any open interval and compute the total unseen duration
    ///
    /// Later calls return the stored result unchanged.
    pub fn finalize(&mut self, now: Instant) -> Duration {
        if self.finalized {
            return self.ledger.unseen;
        }

        if !self.valid {
            self.ledger.entered_valid.push(now);
            self.valid = true;
        }

        self.ledger.unseen = self
            .ledger
            .entered_invalid
            .iter()
            .zip(self.ledger.entered_valid.iter())
            .map(|(out, back)| back.saturating_duration_since(*out))
            .sum();
        self.finalized = true;
        self.ledger.unseen
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn ledger(&self) -> &VisibilityLedger {
        &self.ledger
    }
}

impl Default for HandVisibilityTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(base: Instant, s: u64) -> Instant {
        base + Duration::from_secs(s)
    }

    #[test]
    fn test_transitions_emit_once() {
        let t0 = Instant::now();
        let mut tracker = HandVisibilityTracker::new();

        assert_eq!(tracker.observe(2, 2, t0), None);
        assert_eq!(tracker.observe(1, 2, secs(t0, 1)), Some(VisibilityChange::Lost));
        assert_eq!(tracker.observe(0, 2, secs(t0, 2)), None);
        assert_eq!(tracker.observe(2, 2, secs(t0, 3)), Some(VisibilityChange::Restored));
        assert_eq!(tracker.observe(2, 2, secs(t0, 4)), None);
    }

    #[test]
    fn test_ledger_lengths_stay_paired() {
        let t0 = Instant::now();
        let mut tracker = HandVisibilityTracker::new();
        let counts = [2, 1, 1, 2, 3, 0, 2, 2, 1];

        for (i, count) in counts.iter().enumerate() {
            tracker.observe(*count, 2, secs(t0, i as u64));
            let ledger = tracker.ledger();
            let diff = ledger.entered_invalid().len() as i64 - ledger.entered_valid().len() as i64;
            assert!((0..=1).contains(&diff));
        }
    }

    #[test]
    fn test_paired_interval_sum() {
        let t0 = Instant::now();
        let mut tracker = HandVisibilityTracker::new();

        tracker.observe(1, 2, secs(t0, 10));
        tracker.observe(2, 2, secs(t0, 15));
        tracker.observe(0, 2, secs(t0, 20));
        tracker.observe(2, 2, secs(t0, 22));

        assert_eq!(tracker.finalize(secs(t0, 30)), Duration::from_secs(7));
    }

    #[test]
    fn test_finalize_closes_open_interval() {
        let t0 = Instant::now();
        let mut tracker = HandVisibilityTracker::new();

        tracker.observe(1, 2, secs(t0, 10));
        assert!(!tracker.is_valid());

        assert_eq!(tracker.finalize(secs(t0, 14)), Duration::from_secs(4));
        assert!(tracker.is_valid());
        assert_eq!(tracker.ledger().entered_valid().len(), 1);

        // Idempotent, and no further transitions are recorded
        assert_eq!(tracker.finalize(secs(t0, 100)), Duration::from_secs(4));
        assert_eq!(tracker.observe(0, 2, secs(t0, 101)), None);
    }

    #[test]
    fn test_single_hand_mode() {
        let t0 = Instant::now();
        let mut tracker = HandVisibilityTracker::new();
        assert_eq!(tracker.observe(1, 1, t0), None);
        assert_eq!(tracker.observe(2, 1, t0), Some(VisibilityChange::Lost));
    }
}
