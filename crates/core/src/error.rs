use thiserror::Error;

use crate::model::{AnswerError, CurriculumError, PreferenceError, SubjectError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Curriculum(#[from] CurriculumError),
    #[error(transparent)]
    Subject(#[from] SubjectError),
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    Preference(#[from] PreferenceError),
}
