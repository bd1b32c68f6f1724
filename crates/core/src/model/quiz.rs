use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::QuizId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("expected {expected} answers, got {got}")]
    CountMismatch { expected: usize, got: usize },

    #[error("answer for question {question} picks option {option}, which does not exist")]
    OptionOutOfRange { question: usize, option: usize },
}

/// A single multiple-choice question produced by quiz generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    /// Present when the generator shares the key with the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_index: Option<usize>,
}

/// The learner's picks, one slot per question. `None` means skipped.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuizAnswers(Vec<Option<usize>>);

impl QuizAnswers {
    #[must_use]
    pub fn new(answers: Vec<Option<usize>>) -> Self {
        Self(answers)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Option<usize>] {
        &self.0
    }

    /// Check the answers line up with `questions`.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError` on a count mismatch or an out-of-range option.
    pub fn validate_against(&self, questions: &[QuizQuestion]) -> Result<(), AnswerError> {
        if self.0.len() != questions.len() {
            return Err(AnswerError::CountMismatch {
                expected: questions.len(),
                got: self.0.len(),
            });
        }
        for (index, (answer, question)) in self.0.iter().zip(questions).enumerate() {
            if let Some(option) = answer {
                if *option >= question.options.len() {
                    return Err(AnswerError::OptionOutOfRange {
                        question: index,
                        option: *option,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Score of a quiz attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizScore {
    pub correct: u32,
    pub total: u32,
}

impl QuizScore {
    #[must_use]
    pub fn new(correct: u32, total: u32) -> Self {
        Self { correct, total }
    }

    /// Score answers locally. `None` unless every question carries its key.
    #[must_use]
    pub fn grade(questions: &[QuizQuestion], answers: &QuizAnswers) -> Option<Self> {
        if questions.is_empty() || answers.as_slice().len() != questions.len() {
            return None;
        }
        let mut correct = 0u32;
        for (question, answer) in questions.iter().zip(answers.as_slice()) {
            let key = question.correct_index?;
            if *answer == Some(key) {
                correct += 1;
            }
        }
        let total = u32::try_from(questions.len()).ok()?;
        Some(Self { correct, total })
    }

    /// Whole-number percentage, 0 when there are no questions.
    #[must_use]
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        let percent = u64::from(self.correct) * 100 / u64::from(self.total);
        u32::try_from(percent).unwrap_or(u32::MAX)
    }
}

/// Identifiers and provenance carried alongside a quiz.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuizMetadata {
    pub subject: String,
    pub unit: String,
    pub topic: String,
    pub quiz_id: Option<QuizId>,
    pub existing_quiz: bool,
}

/// A finished attempt, as shown in the read-only quiz view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizRecord {
    pub score: Option<QuizScore>,
    pub completed_at: Option<DateTime<Utc>>,
}
