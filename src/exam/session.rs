//! Per-connection exam bundle
//!
//! Wires observations through the debouncer into the quiz and the hand
//! visibility tracker. Owned by exactly one connection loop, so every
//! mutation is serialized by construction.

use std::time::Duration;
use tracing::debug;

use super::debounce::GestureDebouncer;
use super::gesture::classify;
use super::notification::ExamNotification;
use super::question::Question;
use super::quiz::{QuizMode, QuizOutcome, QuizSession};
use crate::config::ExamConfig;
use crate::error::Result;
use crate::vision::HandObservation;

/// Tunables for one exam session
#[derive(Debug, Clone)]
pub struct ExamSettings {
    pub hold_interval: Duration,
    pub cooldown: Duration,
    pub required_hands: usize,
    pub allow_undo: bool,
}

impl Default for ExamSettings {
    fn default() -> Self {
        Self::from(&ExamConfig::default())
    }
}

impl From<&ExamConfig> for ExamSettings {
    fn from(config: &ExamConfig) -> Self {
        Self {
            hold_interval: Duration::from_millis(config.hold_interval_ms),
            cooldown: Duration::from_millis(config.cooldown_ms),
            required_hands: config.required_hands.max(1),
            allow_undo: config.undo_enabled,
        }
    }
}

/// Debouncer + quiz state for one connection
#[derive(Debug)]
pub struct ExamSession {
    quiz_name: String,
    settings: ExamSettings,
    debouncer: GestureDebouncer,
    quiz: QuizSession,
}

impl ExamSession {
    /// Fails with `QuizData` when `questions` is empty
    pub fn new(
        quiz_name: impl Into<String>,
        questions: Vec<Question>,
        settings: ExamSettings,
    ) -> Result<Self> {
        Ok(Self {
            quiz: QuizSession::new(questions)?,
            quiz_name: quiz_name.into(),
            debouncer: GestureDebouncer::new(settings.hold_interval, settings.cooldown),
            settings,
        })
    }

    /// Handle the `quiz_start` control message
    pub fn toggle_grading(&mut self) -> Vec<ExamNotification> {
        self.debouncer.reset();
        self.quiz.toggle_grading()
    }

    /// Feed one sampled observation
    pub fn on_observation(&mut self, observation: &HandObservation) -> Vec<ExamNotification> {
        if self.quiz.mode() != QuizMode::Grading {
            return vec![];
        }

        let now = observation.observed_at;
        let candidate = observation
            .primary_pattern()
            .and_then(|pattern| classify(&pattern, self.settings.allow_undo));

        let mut out = vec![];
        if let Some(label) = self.debouncer.observe(candidate, now) {
            debug!("Confirmed gesture {} on {}", label, self.quiz_name);
            out.extend(self.quiz.apply_event(label, now));
        }

        if self.quiz.mode() == QuizMode::Grading {
            out.extend(self.quiz.observe_hand_count(
                observation.hand_count(),
                self.settings.required_hands,
                now,
            ));
        }

        out
    }

    /// Apply an already-confirmed selection, bypassing the debouncer
    #[cfg(test)]
    pub(crate) fn apply_confirmed(
        &mut self,
        label: super::gesture::AnswerLabel,
        observation: &HandObservation,
    ) -> Vec<ExamNotification> {
        self.quiz.apply_event(label, observation.observed_at)
    }

    pub fn quiz_name(&self) -> &str {
        &self.quiz_name
    }

    pub fn quiz(&self) -> &QuizSession {
        &self.quiz
    }

    pub fn mode(&self) -> QuizMode {
        self.quiz.mode()
    }

    pub fn outcome(&self) -> Option<QuizOutcome> {
        self.quiz.outcome()
    }

    pub fn settings(&self) -> &ExamSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::exam::AnswerLabel;
    use crate::vision::Hand;
    use std::time::Instant;

    fn session(answers: &[u8]) -> ExamSession {
        let questions = answers
            .iter()
            .map(|a| Question::new("q", ["a", "b", "c", "d"], *a))
            .collect();
        ExamSession::new("test", questions, ExamSettings::default()).unwrap()
    }

    fn both_hands(pattern: [u8; 5], at: Instant) -> HandObservation {
        HandObservation::new(
            vec![Hand::with_fingers([0, 0, 0, 0, 0]), Hand::with_fingers(pattern)],
            at,
        )
    }

    fn ms(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    #[test]
    fn test_empty_quiz_is_quiz_error() {
        let result = ExamSession::new("empty", vec![], ExamSettings::default());
        assert!(matches!(result, Err(AppError::QuizData(_))));
    }

    #[test]
    fn test_observations_ignored_in_pass_through() {
        let t0 = Instant::now();
        let mut s = session(&[2, 1]);
        assert!(s.on_observation(&both_hands([0, 1, 1, 0, 0], t0)).is_empty());
        assert!(s
            .on_observation(&both_hands([0, 1, 1, 0, 0], ms(t0, 1500)))
            .is_empty());
        assert_eq!(s.quiz().current_index(), 0);
    }

    #[test]
    fn test_held_gesture_answers_once() {
        let t0 = Instant::now();
        let mut s = session(&[2, 1, 3]);
        s.toggle_grading();

        let mut notifications = vec![];
        for i in 0..20u64 {
            notifications.extend(s.on_observation(&both_hands([0, 1, 1, 0, 0], ms(t0, i * 100))));
        }

        // Confirmed at 1.1s; the cooldown outlasts the remaining ticks
        assert_eq!(s.quiz().current_index(), 1);
        assert_eq!(s.quiz().questions()[0].chosen_answer, Some(2));
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind(), "new_question");
    }

    #[test]
    fn test_visibility_alerts_while_grading() {
        let t0 = Instant::now();
        let mut s = session(&[1]);
        s.toggle_grading();

        let one_hand = HandObservation::new(vec![Hand::with_fingers([0, 0, 0, 0, 0])], t0);
        assert_eq!(s.on_observation(&one_hand), vec![ExamNotification::hand_unseen(2)]);
        assert!(s.on_observation(&HandObservation::empty(ms(t0, 100))).is_empty());
        assert_eq!(
            s.on_observation(&both_hands([0, 0, 0, 0, 0], ms(t0, 200))),
            vec![ExamNotification::hand_seen()]
        );
    }

    #[test]
    fn test_unrecognized_pose_resets_hold() {
        let t0 = Instant::now();
        let mut s = session(&[2, 1]);
        s.toggle_grading();

        s.on_observation(&both_hands([0, 1, 1, 0, 0], t0));
        s.on_observation(&both_hands([1, 1, 1, 1, 1], ms(t0, 500)));
        assert!(s
            .on_observation(&both_hands([0, 1, 1, 0, 0], ms(t0, 1200)))
            .is_empty());
        assert_eq!(s.quiz().current_index(), 0);
    }

    #[test]
    fn test_undo_disabled() {
        let t0 = Instant::now();
        let settings = ExamSettings {
            allow_undo: false,
            ..ExamSettings::default()
        };
        let questions = vec![Question::new("q", ["a", "b", "c", "d"], 1); 2];
        let mut s = ExamSession::new("test", questions, settings).unwrap();
        s.toggle_grading();

        let confirmed = s.apply_confirmed(AnswerLabel::Choice(1), &HandObservation::empty(t0));
        assert_eq!(confirmed.len(), 1);

        s.on_observation(&both_hands([1, 0, 0, 0, 0], ms(t0, 1000)));
        s.on_observation(&both_hands([1, 0, 0, 0, 0], ms(t0, 2100)));
        assert_eq!(s.quiz().current_index(), 1);
    }

    #[test]
    fn test_finish_reports_outcome() {
        let t0 = Instant::now();
        let mut s = session(&[2]);
        s.toggle_grading();

        s.on_observation(&both_hands([0, 1, 1, 0, 0], t0));
        let out = s.on_observation(&both_hands([0, 1, 1, 0, 0], ms(t0, 1100)));

        assert_eq!(s.mode(), QuizMode::Finished);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind(), "quiz_finished");
        assert_eq!(s.outcome().map(|o| o.score), Some(100.0));
        assert!(s.toggle_grading().is_empty());
    }
}
