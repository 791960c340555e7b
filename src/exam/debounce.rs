//! Gesture debouncing
//!
//! Turns the per-tick candidate label into a single-fire confirmed
//! selection. A candidate must be seen, then seen again more than
//! `hold_interval` later with no "none" tick in between. After a
//! confirmation, ticks are ignored until `cooldown` has elapsed.

use std::time::{Duration, Instant};
use tracing::trace;

use super::gesture::AnswerLabel;

/// Default hold interval between first and confirming sighting
pub const DEFAULT_HOLD_INTERVAL: Duration = Duration::from_secs(1);
/// Default cooldown after a confirmed selection
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default)]
struct DebounceState {
    pending: Option<AnswerLabel>,
    first_observed_at: Option<Instant>,
    confirming: bool,
    last_confirmed_at: Option<Instant>,
    in_cooldown: bool,
}

/// Converts noisy candidate labels into confirmed selection events
#[derive(Debug, Clone)]
pub struct GestureDebouncer {
    hold_interval: Duration,
    cooldown: Duration,
    state: DebounceState,
}

impl GestureDebouncer {
    pub fn new(hold_interval: Duration, cooldown: Duration) -> Self {
        Self {
            hold_interval,
            cooldown,
            state: DebounceState::default(),
        }
    }

    /// Feed one sampling tick; returns a label when a selection is confirmed
    pub fn observe(&mut self, candidate: Option<AnswerLabel>, now: Instant) -> Option<AnswerLabel> {
        let state = &mut self.state;

        if state.in_cooldown {
            let expired = state
                .last_confirmed_at
                .map(|at| now.saturating_duration_since(at) >= self.cooldown)
                .unwrap_or(true);
            if expired {
                state.in_cooldown = false;
                trace!("Gesture cooldown expired");
            }
            return None;
        }

        let Some(candidate) = candidate else {
            // A gap resets confirmation
            state.confirming = false;
            state.pending = None;
            return None;
        };

        if !state.confirming {
            state.pending = Some(candidate);
            state.first_observed_at = Some(now);
            state.confirming = true;
            trace!("Gesture {} pending confirmation", candidate);
            return None;
        }

        let first = state.first_observed_at.unwrap_or(now);
        if now <= first + self.hold_interval {
            return None;
        }

        state.confirming = false;
        let pending = state.pending.take();
        if pending != Some(candidate) {
            trace!(
                "Gesture mismatch ({:?} then {}), dropping pending selection",
                pending,
                candidate
            );
            return None;
        }

        state.in_cooldown = true;
        state.last_confirmed_at = Some(now);
        state.first_observed_at = None;
        Some(candidate)
    }

    /// Whether a selection is currently waiting for its confirming sighting
    pub fn is_confirming(&self) -> bool {
        self.state.confirming
    }

    pub fn in_cooldown(&self) -> bool {
        self.state.in_cooldown
    }

    /// Drop any pending or cooldown state
    pub fn reset(&mut self) {
        self.state = DebounceState::default();
    }
}

impl Default for GestureDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_HOLD_INTERVAL, DEFAULT_COOLDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO: Option<AnswerLabel> = Some(AnswerLabel::Choice(2));
    const THREE: Option<AnswerLabel> = Some(AnswerLabel::Choice(3));

    fn ms(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    #[test]
    fn test_confirms_after_hold_interval() {
        let t0 = Instant::now();
        let mut d = GestureDebouncer::default();

        assert_eq!(d.observe(TWO, t0), None);
        assert!(d.is_confirming());
        assert_eq!(d.observe(TWO, ms(t0, 500)), None);
        assert_eq!(d.observe(TWO, ms(t0, 1000)), None);
        assert_eq!(d.observe(TWO, ms(t0, 1100)), Some(AnswerLabel::Choice(2)));
        assert!(d.in_cooldown());
        assert!(!d.is_confirming());
    }

    #[test]
    fn test_gap_resets_confirmation() {
        let t0 = Instant::now();
        let mut d = GestureDebouncer::default();

        d.observe(TWO, t0);
        d.observe(None, ms(t0, 600));
        assert!(!d.is_confirming());

        // Starts a fresh hold rather than confirming the old one
        assert_eq!(d.observe(TWO, ms(t0, 1200)), None);
        assert_eq!(d.observe(TWO, ms(t0, 1900)), None);
        assert_eq!(d.observe(TWO, ms(t0, 2300)), Some(AnswerLabel::Choice(2)));
    }

    #[test]
    fn test_mismatch_cancels_silently() {
        let t0 = Instant::now();
        let mut d = GestureDebouncer::default();

        d.observe(TWO, t0);
        assert_eq!(d.observe(THREE, ms(t0, 1500)), None);
        assert!(!d.is_confirming());
        assert!(!d.in_cooldown());

        // The mismatching label becomes the next pending candidate
        assert_eq!(d.observe(THREE, ms(t0, 1600)), None);
        assert_eq!(d.observe(THREE, ms(t0, 2700)), Some(AnswerLabel::Choice(3)));
    }

    #[test]
    fn test_other_label_inside_hold_is_ignored() {
        let t0 = Instant::now();
        let mut d = GestureDebouncer::default();

        d.observe(TWO, t0);
        // Only the sighting after the hold interval is compared
        assert_eq!(d.observe(THREE, ms(t0, 500)), None);
        assert!(d.is_confirming());
        assert_eq!(d.observe(TWO, ms(t0, 1100)), Some(AnswerLabel::Choice(2)));
    }

    #[test]
    fn test_cooldown_blocks_repeat() {
        let t0 = Instant::now();
        let mut d = GestureDebouncer::default();

        d.observe(TWO, t0);
        assert!(d.observe(TWO, ms(t0, 1100)).is_some());

        // Held pose during cooldown does nothing
        assert_eq!(d.observe(TWO, ms(t0, 1500)), None);
        assert_eq!(d.observe(TWO, ms(t0, 2000)), None);
        assert!(d.in_cooldown());

        // Cooldown expiry consumes the tick
        assert_eq!(d.observe(TWO, ms(t0, 2100)), None);
        assert!(!d.in_cooldown());

        assert_eq!(d.observe(TWO, ms(t0, 2200)), None);
        assert_eq!(d.observe(TWO, ms(t0, 3300)), Some(AnswerLabel::Choice(2)));
    }

    #[test]
    fn test_no_two_events_within_cooldown() {
        let t0 = Instant::now();
        let mut d = GestureDebouncer::default();
        let mut fired = vec![];

        for i in 0..100u64 {
            let now = ms(t0, i * 100);
            if d.observe(TWO, now).is_some() {
                fired.push(now);
            }
        }

        assert!(fired.len() >= 2);
        for pair in fired.windows(2) {
            assert!(pair[1] - pair[0] >= DEFAULT_COOLDOWN);
        }
    }

    #[test]
    fn test_exact_hold_boundary_does_not_confirm() {
        let t0 = Instant::now();
        let mut d = GestureDebouncer::new(Duration::from_millis(500), DEFAULT_COOLDOWN);

        d.observe(TWO, t0);
        assert_eq!(d.observe(TWO, ms(t0, 500)), None);
        assert_eq!(d.observe(TWO, ms(t0, 501)), Some(AnswerLabel::Choice(2)));
    }

    #[test]
    fn test_reset() {
        let t0 = Instant::now();
        let mut d = GestureDebouncer::default();
        d.observe(TWO, t0);
        d.reset();
        assert!(!d.is_confirming());
        assert!(!d.in_cooldown());
    }
}
