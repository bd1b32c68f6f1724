#![forbid(unsafe_code)]

pub mod completion_store;
pub mod config;
pub mod debounce;
pub mod error;
pub mod events;
pub mod http_backend;
pub mod latest;
pub mod learning_service;
pub mod optimistic;
pub mod preference_service;
pub mod progress_tracker;
pub mod quiz_session;
pub mod study_plan;

pub use study_core::Clock;

pub use completion_store::{CompletionSnapshot, CompletionStore, FetchOutcome};
pub use config::EngineConfig;
pub use debounce::DebouncedTask;
pub use error::{ConfigError, PreferenceServiceError, QuizSessionError, SessionError};
pub use events::{EventTopic, ProgressEvent, ProgressEvents, TopicSubscription};
pub use http_backend::HttpProgressBackend;
pub use latest::LatestOnly;
pub use learning_service::{LearningService, TopicView};
pub use optimistic::OptimisticUpdateProtocol;
pub use preference_service::PreferenceService;
pub use progress_tracker::ProgressTracker;
pub use quiz_session::{QuizPhase, QuizSession, SubmitOutcome};
pub use study_plan::StudyPlanService;
