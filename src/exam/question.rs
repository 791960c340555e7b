//! Quiz questions and quiz-definition loading

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Deserializer};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

use crate::error::{AppError, Result};

/// One exam question
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub text: String,
    /// Base64-encoded image payload, resolved at load time
    pub image: Option<String>,
    pub choices: [String; 4],
    /// Correct choice, 1..=4
    pub answer: u8,
    /// Last confirmed selection for this question
    pub chosen_answer: Option<u8>,
}

impl Question {
    pub fn new(text: impl Into<String>, choices: [&str; 4], answer: u8) -> Self {
        Self {
            text: text.into(),
            image: None,
            choices: choices.map(String::from),
            answer,
            chosen_answer: None,
        }
    }

    pub fn is_correct(&self) -> bool {
        self.chosen_answer == Some(self.answer)
    }
}

/// Source of quiz definitions
#[async_trait]
pub trait QuizLoader: Send + Sync {
    /// Load the ordered question list for `name`
    async fn load(&self, name: &str) -> Result<Vec<Question>>;
}

/// Record layout of a quiz file entry
#[derive(Debug, Deserialize)]
struct QuestionRecord {
    question_text: String,
    #[serde(default)]
    question_image: Option<String>,
    #[serde(deserialize_with = "answer_from_number_or_string")]
    answer: u8,
    #[serde(default)]
    choice1: String,
    #[serde(default)]
    choice2: String,
    #[serde(default)]
    choice3: String,
    #[serde(default)]
    choice4: String,
}

fn answer_from_number_or_string<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u8),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// On-disk quiz encodings, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuizFormat {
    Json,
    Csv,
}

impl QuizFormat {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Self::Csv,
            _ => Self::Json,
        }
    }

    fn parse(self, content: &[u8]) -> std::result::Result<Vec<QuestionRecord>, String> {
        match self {
            Self::Json => serde_json::from_slice(content).map_err(|e| e.to_string()),
            Self::Csv => csv::Reader::from_reader(content)
                .deserialize()
                .collect::<std::result::Result<Vec<QuestionRecord>, csv::Error>>()
                .map_err(|e| e.to_string()),
        }
    }
}

/// Loads `<quiz_dir>/<name>` quiz files, either `.csv` or `.json`
///
/// A name without an extension resolves to `<name>.json`.
#[derive(Debug, Clone)]
pub struct FileQuizLoader {
    quiz_dir: PathBuf,
    include_images: bool,
}

impl FileQuizLoader {
    pub fn new(quiz_dir: impl Into<PathBuf>, include_images: bool) -> Self {
        Self {
            quiz_dir: quiz_dir.into(),
            include_images,
        }
    }

    fn quiz_path(&self, name: &str) -> Result<PathBuf> {
        let trimmed = name.trim();
        if trimmed.is_empty()
            || trimmed.contains('/')
            || trimmed.contains('\\')
            || trimmed.contains("..")
        {
            return Err(AppError::QuizData(format!("Invalid quiz name: {:?}", name)));
        }

        let mut path = self.quiz_dir.join(trimmed);
        if path.extension().is_none() {
            path.set_extension("json");
        }
        Ok(path)
    }

    async fn load_image(&self, image: &str) -> Result<String> {
        // Images must stay inside the quiz directory
        let relative = Path::new(image);
        if relative.is_absolute()
            || image.contains('\\')
            || !relative.components().all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(AppError::QuizData(format!("Invalid image path: {:?}", image)));
        }

        let path = self.quiz_dir.join(relative);
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            AppError::QuizData(format!("Failed to read image {}: {}", path.display(), e))
        })?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    async fn to_question(&self, index: usize, record: QuestionRecord) -> Result<Question> {
        if !(1..=4).contains(&record.answer) {
            return Err(AppError::QuizData(format!(
                "Question {} has answer {} (expected 1-4)",
                index + 1,
                record.answer
            )));
        }

        let image = match record.question_image.as_deref().map(str::trim) {
            Some(image) if !image.is_empty() && self.include_images => {
                Some(self.load_image(image).await?)
            }
            _ => None,
        };

        Ok(Question {
            text: record.question_text,
            image,
            choices: [record.choice1, record.choice2, record.choice3, record.choice4],
            answer: record.answer,
            chosen_answer: None,
        })
    }

    pub fn quiz_dir(&self) -> &Path {
        &self.quiz_dir
    }
}

#[async_trait]
impl QuizLoader for FileQuizLoader {
    async fn load(&self, name: &str) -> Result<Vec<Question>> {
        let path = self.quiz_path(name)?;
        debug!("Loading quiz from {}", path.display());

        let content = tokio::fs::read(&path).await.map_err(|e| {
            AppError::QuizData(format!("Failed to read quiz {}: {}", path.display(), e))
        })?;
        let records = QuizFormat::from_path(&path)
            .parse(&content)
            .map_err(|e| AppError::QuizData(format!("Malformed quiz {}: {}", name, e)))?;

        if records.is_empty() {
            return Err(AppError::QuizData(format!("Quiz {} has no questions", name)));
        }

        let mut questions = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            questions.push(self.to_question(index, record).await?);
        }

        info!("Loaded quiz {} ({} questions)", name, questions.len());
        Ok(questions)
    }
}

/// Fixed question list, for tests and embedded quizzes
#[derive(Debug, Clone, Default)]
pub struct StaticQuizLoader {
    questions: Vec<Question>,
}

impl StaticQuizLoader {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }
}

#[async_trait]
impl QuizLoader for StaticQuizLoader {
    async fn load(&self, name: &str) -> Result<Vec<Question>> {
        if self.questions.is_empty() {
            return Err(AppError::QuizData(format!("Quiz {} has no questions", name)));
        }
        Ok(self.questions.clone())
    }
}
