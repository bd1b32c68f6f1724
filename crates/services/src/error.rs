//! Shared error types for the services crate.

use thiserror::Error;

use storage::backend::BackendError;
use storage::repository::StorageError;
use study_core::model::{
    AnswerError, CurriculumError, PreferenceError, SubjectError, TopicStep,
};

/// Errors emitted by `QuizSession`. These are the only user-visible failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizSessionError {
    #[error(transparent)]
    Validation(#[from] SubjectError),
    #[error("cannot determine {0} for quiz submission")]
    MissingIdentifier(&'static str),
    #[error("no study material found for topic {0:?}")]
    DocumentNotFound(String),
    #[error("quiz for this topic is already completed")]
    AlreadyCompleted,
    #[error("no quiz is ready to submit")]
    NotReady,
    #[error("quiz has no questions")]
    EmptyQuiz,
    /// A newer request for the session replaced this one before it finished.
    #[error("quiz request was replaced by a newer one")]
    Superseded,
    #[error(transparent)]
    Curriculum(#[from] CurriculumError),
    #[error(transparent)]
    Answers(#[from] AnswerError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl QuizSessionError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::DocumentNotFound(_) => true,
            Self::Backend(error) => error.is_transient(),
            _ => false,
        }
    }
}

/// Errors emitted by `LearningService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no subject loaded")]
    NoSubject,
    #[error("no topic selected")]
    NoTopicSelected,
    #[error("topic {0} is locked")]
    TopicLocked(String),
    #[error("{0:?} step is not unlocked yet")]
    StepLocked(TopicStep),
    #[error(transparent)]
    Curriculum(#[from] CurriculumError),
    #[error(transparent)]
    Quiz(#[from] QuizSessionError),
}

/// Errors emitted while reading `EngineConfig`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{name} is not a valid url: {source}")]
    InvalidUrl {
        name: &'static str,
        source: url::ParseError,
    },
    #[error("{name} must be {expected}, got {value:?}")]
    InvalidValue {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Errors emitted by `PreferenceService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PreferenceServiceError {
    #[error(transparent)]
    Preference(#[from] PreferenceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
