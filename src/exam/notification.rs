//! Data-channel notifications sent to the exam taker
//!
//! Payloads are JSON objects keyed by `message`:
//!
//! ```json
//! {"message": "new_question", "qNo": "Question 1", "question": "...", "image": null,
//!  "choice1": "...", "choice2": "...", "choice3": "...", "choice4": "..."}
//! {"message": "hand_unseen", "text": "Show both hands!", "color": "yellow"}
//! {"message": "hand_seen", "text": "Hands detected", "color": "#49ff34"}
//! {"message": "quiz_finished", "score": 75.0, "hands_unseen": 4.2}
//! ```

use serde::{Deserialize, Serialize};

use super::question::Question;

/// Inbound data-channel control message that toggles grading
pub const QUIZ_START: &str = "quiz_start";

const UNSEEN_COLOR: &str = "yellow";
const SEEN_COLOR: &str = "#49ff34";

/// Server-to-client exam notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "snake_case")]
pub enum ExamNotification {
    NewQuestion {
        #[serde(rename = "qNo")]
        q_no: String,
        question: String,
        image: Option<String>,
        choice1: String,
        choice2: String,
        choice3: String,
        choice4: String,
    },
    HandUnseen {
        text: String,
        color: String,
    },
    HandSeen {
        text: String,
        color: String,
    },
    QuizFinished {
        score: f64,
        /// Seconds without the required hands in frame
        hands_unseen: f64,
    },
}

impl ExamNotification {
    pub fn new_question(index: usize, question: &Question) -> Self {
        let [c1, c2, c3, c4] = question.choices.clone();
        Self::NewQuestion {
            q_no: format!("Question {}", index + 1),
            question: question.text.clone(),
            image: question.image.clone(),
            choice1: c1,
            choice2: c2,
            choice3: c3,
            choice4: c4,
        }
    }

    pub fn hand_unseen(required_hands: usize) -> Self {
        let text = if required_hands == 1 {
            "Show your hand!"
        } else {
            "Show both hands!"
        };
        Self::HandUnseen {
            text: text.to_string(),
            color: UNSEEN_COLOR.to_string(),
        }
    }

    pub fn hand_seen() -> Self {
        Self::HandSeen {
            text: "Hands detected".to_string(),
            color: SEEN_COLOR.to_string(),
        }
    }

    /// Short name used in logs and system events
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewQuestion { .. } => "new_question",
            Self::HandUnseen { .. } => "hand_unseen",
            Self::HandSeen { .. } => "hand_seen",
            Self::QuizFinished { .. } => "quiz_finished",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
