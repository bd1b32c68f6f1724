#![forbid(unsafe_code)]

pub mod backend;
pub mod repository;
pub mod sqlite;

pub use backend::{
    BackendError, CompletionList, DocumentKey, DocumentResolver, Endpoint, GenerateQuizResponse,
    GeneratedQuiz, InMemoryBackend, ProgressBackend, StudyPlan, StudyPlanEntry, SubmitQuizRequest,
    SubmitQuizResponse, TopicCompletion,
};
pub use repository::{InMemoryRepository, PreferenceRepository, Storage, StorageError};
