//! Contracts for the remote progress backend and the document resolver.
//!
//! The backend identifies topics by title + subject + unit, never by index.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use study_core::model::{QuizAnswers, QuizId, QuizQuestion, QuizScore, SubjectContext};
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Errors surfaced by backend adapters.
///
/// `Clone` so a single in-flight result can be handed to every waiter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backend returned status {0}")]
    Status(u16),

    #[error("unauthorized")]
    Unauthorized,

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl BackendError {
    /// Errors worth retrying through a later refresh.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Network(_) => true,
            BackendError::Status(code) => *code >= 500 || *code == 429,
            _ => false,
        }
    }
}

//
// ─── WIRE SHAPES ───────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionList {
    pub completed_topic_titles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicCompletion {
    pub completed: bool,
    #[serde(default)]
    pub score: Option<u32>,
    #[serde(default)]
    pub total_questions: Option<u32>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TopicCompletion {
    #[must_use]
    pub fn quiz_score(&self) -> Option<QuizScore> {
        Some(QuizScore::new(self.score?, self.total_questions?))
    }
}

/// Handle for the document a quiz is generated from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentKey(String);

impl DocumentKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw `generateQuiz` response. Either carries questions or flags an existing quiz.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQuizResponse {
    #[serde(default)]
    pub questions: Vec<QuizQuestion>,
    #[serde(default)]
    pub existing_quiz: bool,
    #[serde(default)]
    pub previous_score: Option<u32>,
    #[serde(default)]
    pub total_questions: Option<u32>,
    #[serde(default)]
    pub quiz_id: Option<QuizId>,
    /// Subject label the content service filed the document under.
    #[serde(default)]
    pub subject: Option<String>,
}

/// `generateQuiz` outcome after interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedQuiz {
    Fresh {
        questions: Vec<QuizQuestion>,
        quiz_id: Option<QuizId>,
    },
    Existing {
        previous_score: Option<QuizScore>,
        quiz_id: Option<QuizId>,
    },
}

impl GenerateQuizResponse {
    #[must_use]
    pub fn into_outcome(self) -> GeneratedQuiz {
        if self.existing_quiz {
            let total = self
                .total_questions
                .or_else(|| u32::try_from(self.questions.len()).ok().filter(|n| *n > 0));
            let previous_score = match (self.previous_score, total) {
                (Some(correct), Some(total)) => Some(QuizScore::new(correct, total)),
                _ => None,
            };
            GeneratedQuiz::Existing {
                previous_score,
                quiz_id: self.quiz_id,
            }
        } else {
            GeneratedQuiz::Fresh {
                questions: self.questions,
                quiz_id: self.quiz_id,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuizRequest {
    pub subject: String,
    pub unit: String,
    pub topic: String,
    pub year: u16,
    pub semester: u8,
    pub questions: Vec<QuizQuestion>,
    pub answers: QuizAnswers,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuizResponse {
    pub score: u32,
    #[serde(default)]
    pub total_questions: Option<u32>,
    #[serde(default)]
    pub completed_topics: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyPlanEntry {
    pub topic_title: String,
    pub unit_title: String,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyPlan {
    pub date: NaiveDate,
    pub entries: Vec<StudyPlanEntry>,
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Remote source of completion truth and quiz generation.
#[async_trait]
pub trait ProgressBackend: Send + Sync {
    /// Titles of every completed topic for the subject/year/semester.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on transport or decoding failures.
    async fn completion(&self, subject: &SubjectContext) -> Result<CompletionList, BackendError>;

    /// Completion record for one topic.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on transport or decoding failures.
    async fn topic_completion(
        &self,
        subject: &SubjectContext,
        unit: &str,
        topic: &str,
    ) -> Result<TopicCompletion, BackendError>;

    /// Generate (or look up) a quiz for a backing document.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` when the document has no quiz source.
    async fn generate_quiz(
        &self,
        document: &DocumentKey,
    ) -> Result<GenerateQuizResponse, BackendError>;

    /// Score and record a quiz attempt.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on transport or validation failures.
    async fn submit_quiz_score(
        &self,
        request: &SubmitQuizRequest,
    ) -> Result<SubmitQuizResponse, BackendError>;

    /// Topics planned for a given day.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on transport or decoding failures.
    async fn study_plan(&self, date: NaiveDate) -> Result<StudyPlan, BackendError>;
}

/// Maps a topic to the document its quiz is generated from.
#[async_trait]
pub trait DocumentResolver: Send + Sync {
    /// # Errors
    ///
    /// Returns `BackendError` if the lookup itself fails. A missing document is `Ok(None)`.
    async fn resolve_document(
        &self,
        subject: &SubjectContext,
        unit: &str,
        topic: &str,
    ) -> Result<Option<DocumentKey>, BackendError>;
}

//
// ─── IN-MEMORY BACKEND ─────────────────────────────────────────────────────────
//

/// Backend endpoints, used for call counting and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Completion,
    TopicCompletion,
    GenerateQuiz,
    SubmitQuizScore,
    StudyPlan,
    ResolveDocument,
}

#[derive(Debug, Clone)]
struct StoredQuiz {
    subject: String,
    topic: String,
    questions: Vec<QuizQuestion>,
    reported_subject: Option<String>,
}

#[derive(Default)]
struct InMemoryState {
    completed: HashMap<SubjectContext, BTreeSet<String>>,
    records: HashMap<(String, String), TopicCompletion>,
    documents: HashMap<(String, String), DocumentKey>,
    quizzes: HashMap<DocumentKey, StoredQuiz>,
    plans: HashMap<NaiveDate, StudyPlan>,
    plan_delays: HashMap<NaiveDate, Duration>,
    topic_delays: HashMap<String, Duration>,
    delays: HashMap<Endpoint, Duration>,
    failing: HashSet<Endpoint>,
    calls: HashMap<Endpoint, usize>,
    record_submissions: bool,
}

/// In-memory backend for tests and prototyping.
///
/// Submissions are recorded as completions unless `with_confirm_submissions(false)`.
#[derive(Clone)]
pub struct InMemoryBackend {
    state: Arc<Mutex<InMemoryState>>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryState {
                record_submissions: true,
                ..InMemoryState::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[must_use]
    pub fn with_confirm_submissions(self, confirm: bool) -> Self {
        self.lock().record_submissions = confirm;
        self
    }

    /// Replace the completed-title list for a subject.
    pub fn set_completed<S: Into<String>>(
        &self,
        subject: &SubjectContext,
        titles: impl IntoIterator<Item = S>,
    ) {
        let titles = titles.into_iter().map(Into::into).collect();
        self.lock().completed.insert(subject.clone(), titles);
    }

    pub fn set_topic_record(&self, subject: &SubjectContext, topic: &str, record: TopicCompletion) {
        self.lock()
            .records
            .insert((subject.name().to_string(), topic.to_string()), record);
    }

    /// Register a backing document and its generated questions.
    pub fn add_document(
        &self,
        subject: &SubjectContext,
        topic: &str,
        document: DocumentKey,
        questions: Vec<QuizQuestion>,
    ) {
        let mut state = self.lock();
        state.documents.insert(
            (subject.name().to_string(), topic.to_string()),
            document.clone(),
        );
        state.quizzes.insert(
            document,
            StoredQuiz {
                subject: subject.name().to_string(),
                topic: topic.to_string(),
                questions,
                reported_subject: None,
            },
        );
    }

    /// Override the subject label `generate_quiz` reports for `document`.
    pub fn set_reported_subject(&self, document: &DocumentKey, label: impl Into<String>) {
        if let Some(quiz) = self.lock().quizzes.get_mut(document) {
            quiz.reported_subject = Some(label.into());
        }
    }

    pub fn set_study_plan(&self, plan: StudyPlan) {
        self.lock().plans.insert(plan.date, plan);
    }

    pub fn set_study_plan_delay(&self, date: NaiveDate, delay: Duration) {
        self.lock().plan_delays.insert(date, delay);
    }

    /// Delay `topic_completion` lookups for one topic title.
    pub fn set_topic_delay(&self, topic: &str, delay: Duration) {
        self.lock().topic_delays.insert(topic.to_string(), delay);
    }

    pub fn set_delay(&self, endpoint: Endpoint, delay: Duration) {
        self.lock().delays.insert(endpoint, delay);
    }

    /// Make `endpoint` fail with a network error until `recover` is called.
    pub fn fail(&self, endpoint: Endpoint) {
        self.lock().failing.insert(endpoint);
    }

    pub fn recover(&self, endpoint: Endpoint) {
        self.lock().failing.remove(&endpoint);
    }

    #[must_use]
    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.lock().calls.get(&endpoint).copied().unwrap_or(0)
    }

    /// Count the call and apply injected delay/failure.
    async fn enter(&self, endpoint: Endpoint, extra_delay: Option<Duration>) -> Result<(), BackendError> {
        let delay = {
            let mut state = self.lock();
            *state.calls.entry(endpoint).or_insert(0) += 1;
            extra_delay.or_else(|| state.delays.get(&endpoint).copied())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.lock().failing.contains(&endpoint) {
            return Err(BackendError::Network(format!("{endpoint:?} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressBackend for InMemoryBackend {
    async fn completion(&self, subject: &SubjectContext) -> Result<CompletionList, BackendError> {
        self.enter(Endpoint::Completion, None).await?;
        let state = self.lock();
        let completed_topic_titles = state
            .completed
            .get(subject)
            .map(|titles| titles.iter().cloned().collect())
            .unwrap_or_default();
        Ok(CompletionList {
            completed_topic_titles,
        })
    }

    async fn topic_completion(
        &self,
        subject: &SubjectContext,
        _unit: &str,
        topic: &str,
    ) -> Result<TopicCompletion, BackendError> {
        let delay = self.lock().topic_delays.get(topic).copied();
        self.enter(Endpoint::TopicCompletion, delay).await?;
        let state = self.lock();
        if let Some(record) = state
            .records
            .get(&(subject.name().to_string(), topic.to_string()))
        {
            return Ok(record.clone());
        }
        let completed = state
            .completed
            .get(subject)
            .is_some_and(|titles| titles.contains(topic));
        Ok(TopicCompletion {
            completed,
            ..TopicCompletion::default()
        })
    }

    async fn generate_quiz(
        &self,
        document: &DocumentKey,
    ) -> Result<GenerateQuizResponse, BackendError> {
        self.enter(Endpoint::GenerateQuiz, None).await?;
        let state = self.lock();
        let quiz = state
            .quizzes
            .get(document)
            .ok_or_else(|| BackendError::NotFound(document.to_string()))?;
        let quiz_id = Some(QuizId::new(format!("quiz-{document}")));

        if let Some(record) = state
            .records
            .get(&(quiz.subject.clone(), quiz.topic.clone()))
            .filter(|record| record.completed)
        {
            return Ok(GenerateQuizResponse {
                questions: Vec::new(),
                existing_quiz: true,
                previous_score: record.score,
                total_questions: record.total_questions,
                quiz_id,
                subject: quiz.reported_subject.clone(),
            });
        }

        Ok(GenerateQuizResponse {
            questions: quiz.questions.clone(),
            quiz_id,
            subject: quiz.reported_subject.clone(),
            ..GenerateQuizResponse::default()
        })
    }

    async fn submit_quiz_score(
        &self,
        request: &SubmitQuizRequest,
    ) -> Result<SubmitQuizResponse, BackendError> {
        self.enter(Endpoint::SubmitQuizScore, None).await?;
        let total = u32::try_from(request.questions.len())
            .map_err(|err| BackendError::Serialization(err.to_string()))?;
        let score = QuizScore::grade(&request.questions, &request.answers)
            .map_or(total, |score| score.correct);

        let mut state = self.lock();
        if !state.record_submissions {
            return Ok(SubmitQuizResponse {
                score,
                total_questions: Some(total),
                completed_topics: None,
            });
        }

        let subject = state
            .completed
            .keys()
            .find(|ctx| {
                ctx.name() == request.subject
                    && ctx.year() == request.year
                    && ctx.semester() == request.semester
            })
            .cloned()
            .map_or_else(
                || SubjectContext::new(request.subject.clone(), request.year, request.semester),
                Ok,
            )
            .map_err(|err| BackendError::Serialization(err.to_string()))?;
        let titles = state.completed.entry(subject).or_default();
        titles.insert(request.topic.clone());
        let completed_topics = titles.iter().cloned().collect();

        state.records.insert(
            (request.subject.clone(), request.topic.clone()),
            TopicCompletion {
                completed: true,
                score: Some(score),
                total_questions: Some(total),
                completed_at: None,
            },
        );

        Ok(SubmitQuizResponse {
            score,
            total_questions: Some(total),
            completed_topics: Some(completed_topics),
        })
    }

    async fn study_plan(&self, date: NaiveDate) -> Result<StudyPlan, BackendError> {
        let delay = self.lock().plan_delays.get(&date).copied();
        self.enter(Endpoint::StudyPlan, delay).await?;
        let state = self.lock();
        Ok(state.plans.get(&date).cloned().unwrap_or(StudyPlan {
            date,
            entries: Vec::new(),
        }))
    }
}

#[async_trait]
impl DocumentResolver for InMemoryBackend {
    async fn resolve_document(
        &self,
        subject: &SubjectContext,
        _unit: &str,
        topic: &str,
    ) -> Result<Option<DocumentKey>, BackendError> {
        self.enter(Endpoint::ResolveDocument, None).await?;
        Ok(self
            .lock()
            .documents
            .get(&(subject.name().to_string(), topic.to_string()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> SubjectContext {
        SubjectContext::new("Physics", 1, 1).unwrap()
    }

    fn question() -> QuizQuestion {
        QuizQuestion {
            question: "Unit of force?".into(),
            options: vec!["Newton".into(), "Joule".into()],
            correct_index: Some(0),
        }
    }

    #[test]
    fn existing_quiz_response_maps_to_existing_outcome() {
        let response: GenerateQuizResponse = serde_json::from_str(
            r#"{"existingQuiz":true,"previousScore":4,"totalQuestions":5,"quizId":"q1"}"#,
        )
        .unwrap();
        assert_eq!(
            response.into_outcome(),
            GeneratedQuiz::Existing {
                previous_score: Some(QuizScore::new(4, 5)),
                quiz_id: Some(QuizId::new("q1")),
            }
        );
    }

    #[test]
    fn transient_classification() {
        assert!(BackendError::Network("reset".into()).is_transient());
        assert!(BackendError::Status(503).is_transient());
        assert!(!BackendError::Status(400).is_transient());
        assert!(!BackendError::NotFound("doc".into()).is_transient());
    }

    #[tokio::test]
    async fn submission_marks_topic_completed() {
        let backend = InMemoryBackend::new();
        let subject = subject();
        backend.set_completed(&subject, ["Kinematics"]);

        let response = backend
            .submit_quiz_score(&SubmitQuizRequest {
                subject: "Physics".into(),
                unit: "Mechanics".into(),
                topic: "Dynamics".into(),
                year: 1,
                semester: 1,
                questions: vec![question()],
                answers: QuizAnswers::new(vec![Some(0)]),
            })
            .await
            .unwrap();
        assert_eq!(response.score, 1);

        let list = backend.completion(&subject).await.unwrap();
        assert_eq!(
            list.completed_topic_titles,
            vec!["Dynamics".to_string(), "Kinematics".to_string()]
        );
        assert_eq!(backend.calls(Endpoint::Completion), 1);
    }

    #[tokio::test]
    async fn generate_reports_existing_after_submission() {
        let backend = InMemoryBackend::new();
        let subject = subject();
        let doc = DocumentKey::new("physics/dynamics.pdf");
        backend.add_document(&subject, "Dynamics", doc.clone(), vec![question()]);
        backend.set_topic_record(
            &subject,
            "Dynamics",
            TopicCompletion {
                completed: true,
                score: Some(1),
                total_questions: Some(1),
                completed_at: None,
            },
        );

        let outcome = backend.generate_quiz(&doc).await.unwrap().into_outcome();
        assert!(matches!(outcome, GeneratedQuiz::Existing { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn topic_delay_only_slows_that_topic() {
        let backend = InMemoryBackend::new();
        let subject = subject();
        backend.set_topic_delay("Dynamics", Duration::from_secs(5));

        let start = tokio::time::Instant::now();
        backend
            .topic_completion(&subject, "Mechanics", "Kinematics")
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));

        backend
            .topic_completion(&subject, "Mechanics", "Dynamics")
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn injected_failure_is_network_error() {
        let backend = InMemoryBackend::new();
        backend.fail(Endpoint::Completion);
        let err = backend.completion(&subject()).await.unwrap_err();
        assert!(err.is_transient());

        backend.recover(Endpoint::Completion);
        assert!(backend.completion(&subject()).await.is_ok());
    }
}
