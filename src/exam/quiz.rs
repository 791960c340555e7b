//! Quiz session state machine
//!
//! ```text
//! PassThrough <--toggle--> Grading --(last question answered)--> Finished
//! ```
//!
//! Only confirmed selection events move the question index. Finishing is
//! irreversible; the score is computed exactly once.

use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::gesture::AnswerLabel;
use super::notification::ExamNotification;
use super::question::Question;
use super::visibility::{HandVisibilityTracker, VisibilityChange};
use crate::error::{AppError, Result};

/// Exam processing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizMode {
    /// Video only, gestures are ignored
    PassThrough,
    /// Gestures drive the exam
    Grading,
    /// All questions answered
    Finished,
}

impl std::fmt::Display for QuizMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuizMode::PassThrough => write!(f, "pass_through"),
            QuizMode::Grading => write!(f, "grading"),
            QuizMode::Finished => write!(f, "finished"),
        }
    }
}

/// Final result of a finished exam
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuizOutcome {
    /// Percentage of correct answers, rounded to 2 decimals
    pub score: f64,
    pub hands_unseen: Duration,
}

/// Ordered question list plus progress
#[derive(Debug)]
pub struct QuizSession {
    questions: Vec<Question>,
    current: usize,
    mode: QuizMode,
    activated: bool,
    outcome: Option<QuizOutcome>,
    visibility: HandVisibilityTracker,
}

impl QuizSession {
    /// Start a session over `questions`; an empty list is rejected
    pub fn new(questions: Vec<Question>) -> Result<Self> {
        if questions.is_empty() {
            return Err(AppError::QuizData("Quiz has no questions".to_string()));
        }
        Ok(Self {
            questions,
            current: 0,
            mode: QuizMode::PassThrough,
            activated: false,
            outcome: None,
            visibility: HandVisibilityTracker::new(),
        })
    }

    /// Flip between pass-through and grading
    ///
    /// Activating grading shows the current question (question 0 on first
    /// activation). No-op once finished.
    pub fn toggle_grading(&mut self) -> Vec<ExamNotification> {
        match self.mode {
            QuizMode::Finished => {
                debug!("Ignoring grading toggle on finished quiz");
                vec![]
            }
            QuizMode::Grading => {
                self.mode = QuizMode::PassThrough;
                info!("Quiz paused at question {}", self.current + 1);
                vec![]
            }
            QuizMode::PassThrough => {
                self.mode = QuizMode::Grading;
                if !self.activated {
                    self.activated = true;
                    info!("Quiz started ({} questions)", self.questions.len());
                }
                self.current_notification().into_iter().collect()
            }
        }
    }

    /// Apply a confirmed selection event
    ///
    /// Ignored unless grading with questions remaining.
    pub fn apply_event(&mut self, label: AnswerLabel, now: Instant) -> Vec<ExamNotification> {
        if self.mode != QuizMode::Grading || self.current >= self.questions.len() {
            return vec![];
        }

        match label {
            AnswerLabel::Undo => {
                self.questions[self.current].chosen_answer = None;
                self.current = self.current.saturating_sub(1);
                self.questions[self.current].chosen_answer = None;
                debug!("Undo, back to question {}", self.current + 1);
            }
            AnswerLabel::Choice(choice) => {
                self.questions[self.current].chosen_answer = Some(choice);
                debug!("Question {} answered with {}", self.current + 1, choice);
                self.current += 1;
            }
        }

        if self.current == self.questions.len() {
            vec![self.finish(now)]
        } else {
            self.current_notification().into_iter().collect()
        }
    }

    /// Record an observed hand count while grading
    pub fn observe_hand_count(
        &mut self,
        count: usize,
        required: usize,
        now: Instant,
    ) -> Option<ExamNotification> {
        if self.mode != QuizMode::Grading {
            return None;
        }

        match self.visibility.observe(count, required, now)? {
            VisibilityChange::Lost => Some(ExamNotification::hand_unseen(required)),
            VisibilityChange::Restored => Some(ExamNotification::hand_seen()),
        }
    }

    fn finish(&mut self, now: Instant) -> ExamNotification {
        let total = self.questions.len();
        let correct = self.questions.iter().filter(|q| q.is_correct()).count();
        let score = round2(correct as f64 / total as f64 * 100.0);
        let hands_unseen = self.visibility.finalize(now);

        self.mode = QuizMode::Finished;
        self.outcome = Some(QuizOutcome {
            score,
            hands_unseen,
        });
        info!(
            "Quiz finished: {}/{} correct, score {:.2}, hands unseen {:.2}s",
            correct,
            total,
            score,
            hands_unseen.as_secs_f64()
        );

        ExamNotification::QuizFinished {
            score,
            hands_unseen: hands_unseen.as_secs_f64(),
        }
    }

    fn current_notification(&self) -> Option<ExamNotification> {
        self.questions
            .get(self.current)
            .map(|q| ExamNotification::new_question(self.current, q))
    }

    pub fn mode(&self) -> QuizMode {
        self.mode
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn total(&self) -> usize {
        self.questions.len()
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Score and unseen duration, set once the quiz is finished
    pub fn outcome(&self) -> Option<QuizOutcome> {
        self.outcome
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
