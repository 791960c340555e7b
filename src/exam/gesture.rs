//! Finger pattern to answer label mapping
//!
//! The detector reports each hand as a 5-element up/down vector
//! (index 0 = thumb .. index 4 = pinky). A handful of patterns map to
//! exam actions; everything else is "no answer".

use serde::{Deserialize, Serialize};

/// Up/down state of the five fingers, thumb first
pub type FingerPattern = [u8; 5];

/// Action carried by a recognized gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerLabel {
    /// Select choice 1..=4
    Choice(u8),
    /// Go back one question
    Undo,
}

impl AnswerLabel {
    /// Choice number for selection labels, `None` for undo
    pub fn choice(self) -> Option<u8> {
        match self {
            AnswerLabel::Choice(n) => Some(n),
            AnswerLabel::Undo => None,
        }
    }
}

impl std::fmt::Display for AnswerLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnswerLabel::Choice(n) => write!(f, "{}", n),
            AnswerLabel::Undo => write!(f, "undo"),
        }
    }
}

/// Map a finger pattern to a candidate label
///
/// `allow_undo` disables the thumb-only gesture for exams that do not
/// support going back.
pub fn classify(fingers: &FingerPattern, allow_undo: bool) -> Option<AnswerLabel> {
    match fingers {
        [0, 1, 0, 0, 0] => Some(AnswerLabel::Choice(1)),
        [0, 1, 1, 0, 0] => Some(AnswerLabel::Choice(2)),
        [0, 1, 1, 1, 0] => Some(AnswerLabel::Choice(3)),
        [0, 1, 1, 1, 1] => Some(AnswerLabel::Choice(4)),
        [1, 0, 0, 0, 0] if allow_undo => Some(AnswerLabel::Undo),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_patterns() {
        assert_eq!(classify(&[0, 1, 0, 0, 0], true), Some(AnswerLabel::Choice(1)));
        assert_eq!(classify(&[0, 1, 1, 0, 0], true), Some(AnswerLabel::Choice(2)));
        assert_eq!(classify(&[0, 1, 1, 1, 0], true), Some(AnswerLabel::Choice(3)));
        assert_eq!(classify(&[0, 1, 1, 1, 1], true), Some(AnswerLabel::Choice(4)));
    }

    #[test]
    fn test_undo_pattern() {
        assert_eq!(classify(&[1, 0, 0, 0, 0], true), Some(AnswerLabel::Undo));
        assert_eq!(classify(&[1, 0, 0, 0, 0], false), None);
    }

    #[test]
    fn test_unrecognized_patterns() {
        assert_eq!(classify(&[0, 0, 0, 0, 0], true), None);
        assert_eq!(classify(&[1, 1, 1, 1, 1], true), None);
        assert_eq!(classify(&[1, 1, 0, 0, 0], true), None);
        assert_eq!(classify(&[0, 0, 1, 0, 0], true), None);
    }

    #[test]
    fn test_label_display() {
        assert_eq!(AnswerLabel::Choice(3).to_string(), "3");
        assert_eq!(AnswerLabel::Undo.to_string(), "undo");
        assert_eq!(AnswerLabel::Choice(2).choice(), Some(2));
        assert_eq!(AnswerLabel::Undo.choice(), None);
    }
}
