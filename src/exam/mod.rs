//! Gesture-driven exam logic
//!
//! Pipeline for one connection:
//! ```text
//! remote video --> FrameSampler --> HandDetector --> HandObservation
//!                                                        |
//!                      GestureDebouncer <-- candidate ---+--- hand count
//!                             |                                  |
//!                             v                                  v
//!                        QuizSession  <----------  HandVisibilityTracker
//!                             |
//!                             v
//!                    ExamNotification (data channel)
//! ```

pub mod debounce;
pub mod gesture;
pub mod notification;
pub mod question;
pub mod quiz;
pub mod sampler;
pub mod session;
pub mod visibility;

pub use debounce::GestureDebouncer;
pub use gesture::{classify, AnswerLabel, FingerPattern};
pub use notification::{ExamNotification, QUIZ_START};
pub use question::{FileQuizLoader, Question, QuizLoader, StaticQuizLoader};
pub use quiz::{QuizMode, QuizOutcome, QuizSession};
pub use sampler::{FrameSampler, FrameTick};
pub use session::{ExamSession, ExamSettings};
pub use visibility::{HandVisibilityTracker, VisibilityChange, VisibilityLedger};
