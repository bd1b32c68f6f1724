//! Quiz generation and submission for one topic at a time.
//!
//! `Idle -> Loading -> {Ready | AlreadyCompleted | Error} -> Submitted -> {Completed | Reconciling}`.
//! A submission that fails on the network still marks the topic complete
//! locally, lets the optimistic protocol verify it, and reconciles the
//! session phase against a forced refresh after a delay.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use storage::backend::{
    BackendError, DocumentResolver, GeneratedQuiz, ProgressBackend, SubmitQuizRequest,
};
use study_core::Clock;
use study_core::model::{
    QuizAnswers, QuizMetadata, QuizQuestion, QuizRecord, QuizScore, SubjectContext, TopicKey,
    TopicStep, validate_subject_name,
};

use crate::completion_store::{CompletionStore, FetchOutcome};
use crate::debounce::DebouncedTask;
use crate::error::QuizSessionError;
use crate::optimistic::OptimisticUpdateProtocol;
use crate::progress_tracker::ProgressTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuizPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    AlreadyCompleted,
    Error,
    Submitted,
    Reconciling,
    Completed,
}

/// How a submission ended from the learner's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The backend scored and recorded the attempt.
    Confirmed(QuizScore),
    /// The backend was unreachable; completion is local until reconciled.
    /// The provisional score is only known when every question carries its key.
    Pending { provisional: Option<QuizScore> },
}

#[derive(Default)]
struct QuizState {
    attempt: u64,
    phase: QuizPhase,
    key: Option<TopicKey>,
    subject: Option<SubjectContext>,
    questions: Vec<QuizQuestion>,
    metadata: QuizMetadata,
    score: Option<QuizScore>,
    completed_at: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl QuizState {
    fn is_for(&self, subject: &SubjectContext, key: TopicKey) -> bool {
        self.key == Some(key) && self.subject.as_ref() == Some(subject)
    }
}

struct SessionInner {
    backend: Arc<dyn ProgressBackend>,
    resolver: Arc<dyn DocumentResolver>,
    store: CompletionStore,
    progress: ProgressTracker,
    protocol: OptimisticUpdateProtocol,
    clock: Clock,
    reconciler: DebouncedTask,
    state: Mutex<QuizState>,
}

#[derive(Clone)]
pub struct QuizSession {
    inner: Arc<SessionInner>,
}

impl QuizSession {
    /// `retry_delay` spaces out the background reconciliation that follows a
    /// submission the backend never acknowledged.
    #[must_use]
    pub fn new(
        backend: Arc<dyn ProgressBackend>,
        resolver: Arc<dyn DocumentResolver>,
        store: CompletionStore,
        progress: ProgressTracker,
        protocol: OptimisticUpdateProtocol,
        clock: Clock,
        retry_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                backend,
                resolver,
                store,
                progress,
                protocol,
                clock,
                reconciler: DebouncedTask::new(retry_delay),
                state: Mutex::new(QuizState::default()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QuizState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the quiz for `key`, or its previous result if already completed.
    ///
    /// Repeated calls for a topic already known to be completed return
    /// `AlreadyCompleted` without asking the backend again.
    ///
    /// # Errors
    ///
    /// Returns `QuizSessionError::DocumentNotFound` when the topic has no backing
    /// document, `EmptyQuiz` when generation yields no questions, `Superseded`
    /// when a newer `generate` or `reset` overtook this one, and `Backend` for
    /// transport failures.
    pub async fn generate(
        &self,
        subject: &SubjectContext,
        key: TopicKey,
    ) -> Result<QuizPhase, QuizSessionError> {
        let curriculum = self.inner.store.curriculum();
        let topic = curriculum.require_topic(key)?.title().to_string();
        let unit = curriculum.unit_title(key).unwrap_or_default().to_string();

        let attempt = {
            let mut state = self.lock();
            let settled = matches!(
                state.phase,
                QuizPhase::AlreadyCompleted | QuizPhase::Completed
            );
            if settled && state.is_for(subject, key) {
                state.phase = QuizPhase::AlreadyCompleted;
                return Ok(QuizPhase::AlreadyCompleted);
            }
            let attempt = state.attempt + 1;
            *state = QuizState {
                attempt,
                phase: QuizPhase::Loading,
                key: Some(key),
                subject: Some(subject.clone()),
                metadata: QuizMetadata {
                    subject: subject.name().to_string(),
                    unit: unit.clone(),
                    topic: topic.clone(),
                    ..QuizMetadata::default()
                },
                ..QuizState::default()
            };
            attempt
        };

        let result = self.fetch_quiz(subject, &unit, &topic).await;

        let mut state = self.lock();
        if state.attempt != attempt {
            tracing::debug!(topic = %topic, "quiz generation superseded");
            return Err(QuizSessionError::Superseded);
        }
        let response = match result {
            Ok(response) => response,
            Err(error) => {
                state.phase = QuizPhase::Error;
                state.error = Some(error.to_string());
                return Err(error);
            }
        };

        if let Some(label) = response.subject.as_deref().map(str::trim)
            && !label.is_empty()
        {
            state.metadata.subject = label.to_string();
        }

        match response.into_outcome() {
            GeneratedQuiz::Existing {
                previous_score,
                quiz_id,
            } => {
                state.phase = QuizPhase::AlreadyCompleted;
                state.score = previous_score;
                state.metadata.quiz_id = quiz_id;
                state.metadata.existing_quiz = true;
                drop(state);
                self.inner.store.apply_topic_truth(&topic, true);
                self.inner.progress.mark(key, TopicStep::Quiz);
                tracing::debug!(topic = %topic, "quiz already completed");
                Ok(QuizPhase::AlreadyCompleted)
            }
            GeneratedQuiz::Fresh { questions, .. } if questions.is_empty() => {
                state.phase = QuizPhase::Error;
                state.error = Some(QuizSessionError::EmptyQuiz.to_string());
                Err(QuizSessionError::EmptyQuiz)
            }
            GeneratedQuiz::Fresh { questions, quiz_id } => {
                state.phase = QuizPhase::Ready;
                state.questions = questions;
                state.metadata.quiz_id = quiz_id;
                Ok(QuizPhase::Ready)
            }
        }
    }

    async fn fetch_quiz(
        &self,
        subject: &SubjectContext,
        unit: &str,
        topic: &str,
    ) -> Result<storage::backend::GenerateQuizResponse, QuizSessionError> {
        let document = self
            .inner
            .resolver
            .resolve_document(subject, unit, topic)
            .await?
            .ok_or_else(|| QuizSessionError::DocumentNotFound(topic.to_string()))?;
        self.inner
            .backend
            .generate_quiz(&document)
            .await
            .map_err(|error| match error {
                BackendError::NotFound(_) => QuizSessionError::DocumentNotFound(topic.to_string()),
                other => QuizSessionError::Backend(other),
            })
    }

    /// Submit answers for the ready quiz.
    ///
    /// # Errors
    ///
    /// Returns `QuizSessionError::Validation` when the subject name collapses to
    /// a year-semester code, `Answers` for malformed answers, `NotReady` or
    /// `AlreadyCompleted` for the wrong phase, and `Backend` for non-transient
    /// backend rejections. None of these touch completion state.
    pub async fn submit(&self, answers: QuizAnswers) -> Result<SubmitOutcome, QuizSessionError> {
        let (key, request) = {
            let mut state = self.lock();
            match state.phase {
                QuizPhase::Ready => {}
                QuizPhase::AlreadyCompleted | QuizPhase::Completed => {
                    return Err(QuizSessionError::AlreadyCompleted);
                }
                _ => return Err(QuizSessionError::NotReady),
            }
            let key = state
                .key
                .ok_or(QuizSessionError::MissingIdentifier("topic"))?;
            if self.inner.store.status(key).is_true() {
                return Err(QuizSessionError::AlreadyCompleted);
            }
            answers.validate_against(&state.questions)?;
            let request = build_request(&state, answers)?;
            state.phase = QuizPhase::Submitted;
            (key, request)
        };

        match self.inner.backend.submit_quiz_score(&request).await {
            Ok(response) => {
                let total = response
                    .total_questions
                    .unwrap_or_else(|| u32::try_from(request.questions.len()).unwrap_or(u32::MAX));
                let score = QuizScore::new(response.score, total);
                self.inner.progress.mark(key, TopicStep::Quiz);
                for title in response.completed_topics.iter().flatten() {
                    self.inner.store.apply_topic_truth(title, true);
                }
                self.inner.protocol.apply_completion(key, &request.topic);
                self.settle(QuizPhase::Completed, Some(score));
                tracing::debug!(topic = %request.topic, correct = score.correct, total, "quiz submitted");
                Ok(SubmitOutcome::Confirmed(score))
            }
            Err(error) if error.is_transient() => {
                tracing::warn!(%error, topic = %request.topic, "quiz submission failed; completing locally");
                let provisional = QuizScore::grade(&request.questions, &request.answers);
                self.inner.progress.mark(key, TopicStep::Quiz);
                self.inner.protocol.apply_completion(key, &request.topic);
                self.settle(QuizPhase::Reconciling, provisional);
                self.schedule_reconcile();
                Ok(SubmitOutcome::Pending { provisional })
            }
            Err(error) => {
                let mut state = self.lock();
                state.phase = QuizPhase::Ready;
                state.error = Some(error.to_string());
                Err(QuizSessionError::Backend(error))
            }
        }
    }

    fn settle(&self, phase: QuizPhase, score: Option<QuizScore>) {
        let mut state = self.lock();
        state.phase = phase;
        state.score = score;
        state.completed_at = Some(self.inner.clock.now());
        state.error = None;
    }

    fn schedule_reconcile(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.reconciler.schedule(move || async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let session = QuizSession { inner };
            if session.reconcile().await == QuizPhase::Reconciling {
                tracing::debug!("quiz reconciliation inconclusive; retrying later");
                session.schedule_reconcile();
            }
        });
    }

    /// Ask the backend whether a locally completed submission landed.
    ///
    /// `Reconciling` becomes `Completed` once the backend lists the topic, or
    /// falls back to `Ready` if an applied refresh says it is still incomplete.
    /// Runs on its own after a submission that failed on the network, and is
    /// retried until a refresh lands.
    pub async fn reconcile(&self) -> QuizPhase {
        let key = {
            let state = self.lock();
            if state.phase != QuizPhase::Reconciling {
                return state.phase;
            }
            match state.key {
                Some(key) => key,
                None => return state.phase,
            }
        };

        let outcome = self.inner.store.force_refresh_completion().await;
        let status = self.inner.store.status(key);

        let mut state = self.lock();
        if state.phase != QuizPhase::Reconciling || state.key != Some(key) {
            return state.phase;
        }
        match (outcome, status.known()) {
            (FetchOutcome::Applied, Some(true)) => state.phase = QuizPhase::Completed,
            (FetchOutcome::Applied, Some(false)) => {
                state.phase = QuizPhase::Ready;
                state.score = None;
                state.completed_at = None;
            }
            _ => {}
        }
        state.phase
    }

    /// Forget the current quiz.
    pub fn reset(&self) {
        self.inner.reconciler.cancel();
        let mut state = self.lock();
        let attempt = state.attempt + 1;
        *state = QuizState {
            attempt,
            ..QuizState::default()
        };
    }

    #[must_use]
    pub fn phase(&self) -> QuizPhase {
        self.lock().phase
    }

    #[must_use]
    pub fn topic(&self) -> Option<TopicKey> {
        self.lock().key
    }

    #[must_use]
    pub fn questions(&self) -> Vec<QuizQuestion> {
        self.lock().questions.clone()
    }

    #[must_use]
    pub fn metadata(&self) -> QuizMetadata {
        self.lock().metadata.clone()
    }

    #[must_use]
    pub fn score(&self) -> Option<QuizScore> {
        self.lock().score
    }

    /// Result shown by the read-only quiz view, once there is one.
    #[must_use]
    pub fn record(&self) -> Option<QuizRecord> {
        let state = self.lock();
        matches!(
            state.phase,
            QuizPhase::AlreadyCompleted | QuizPhase::Completed | QuizPhase::Reconciling
        )
        .then(|| QuizRecord {
            score: state.score,
            completed_at: state.completed_at,
        })
    }

    /// User-facing text of the last failure, if the session is in `Error`
    /// or a submission was rejected.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.lock().error.clone()
    }
}

fn build_request(
    state: &QuizState,
    answers: QuizAnswers,
) -> Result<SubmitQuizRequest, QuizSessionError> {
    let context = state
        .subject
        .as_ref()
        .ok_or(QuizSessionError::MissingIdentifier("subject"))?;
    let subject = validate_subject_name(&state.metadata.subject)?;
    let unit = state.metadata.unit.trim();
    if unit.is_empty() {
        return Err(QuizSessionError::MissingIdentifier("unit"));
    }
    let topic = state.metadata.topic.trim();
    if topic.is_empty() {
        return Err(QuizSessionError::MissingIdentifier("topic"));
    }
    Ok(SubmitQuizRequest {
        subject,
        unit: unit.to_string(),
        topic: topic.to_string(),
        year: context.year(),
        semester: context.semester(),
        questions: state.questions.clone(),
        answers,
    })
}
