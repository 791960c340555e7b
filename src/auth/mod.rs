//! Exam-taker login

mod password;
mod roster;

pub use password::{hash_password, verify_password};
pub use roster::ExamRoster;
