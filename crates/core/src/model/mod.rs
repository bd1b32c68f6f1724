mod completion;
mod curriculum;
mod ids;
mod preferences;
mod progress;
mod quiz;
mod subject;
mod tristate;

pub use completion::{CompletionStatus, CompletionSummary};
pub use curriculum::{Curriculum, CurriculumDraft, CurriculumError, Topic, Unit};
pub use ids::{ParseIdError, QuizId, TopicKey};
pub use preferences::{PreferenceError, PreferenceKey, Preferences};
pub use progress::{ProgressBook, TopicProgress, TopicStep};
pub use quiz::{AnswerError, QuizAnswers, QuizMetadata, QuizQuestion, QuizRecord, QuizScore};
pub use subject::{SubjectContext, SubjectError, is_year_semester_code, validate_subject_name};
pub use tristate::Tristate;
