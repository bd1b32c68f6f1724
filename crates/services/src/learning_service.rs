//! Facade wiring the completion engine together for one learner.
//!
//! Initialisation order on every subject load:
//! 1. cancel pending verification, refreshes and topic lookups;
//! 2. drop per-topic progress and the current quiz;
//! 3. point the completion store at the new subject (map back to `Unknown`);
//! 4. fetch completion.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use storage::backend::{DocumentResolver, ProgressBackend};
use study_core::Clock;
use study_core::gating::{self, TabGates};
use study_core::model::{
    CompletionSummary, Curriculum, QuizAnswers, QuizRecord, SubjectContext, TopicKey, TopicStep,
};
use study_core::navigation::NavigationResolver;

use crate::completion_store::{CompletionSnapshot, CompletionStore, FetchOutcome};
use crate::config::EngineConfig;
use crate::error::SessionError;
use crate::events::{ProgressEvent, ProgressEvents};
use crate::latest::LatestOnly;
use crate::optimistic::OptimisticUpdateProtocol;
use crate::progress_tracker::ProgressTracker;
use crate::quiz_session::{QuizPhase, QuizSession, SubmitOutcome};
use crate::study_plan::StudyPlanService;

/// What the learner sees after selecting a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicView {
    pub key: TopicKey,
    pub title: String,
    pub gates: TabGates,
    /// Prior result, when the backend reports the topic completed.
    pub record: Option<QuizRecord>,
}

#[derive(Default)]
struct Selection {
    current: Option<TopicKey>,
    record: Option<(TopicKey, QuizRecord)>,
}

pub struct LearningService {
    backend: Arc<dyn ProgressBackend>,
    progress: ProgressTracker,
    store: CompletionStore,
    events: ProgressEvents,
    protocol: OptimisticUpdateProtocol,
    quiz: QuizSession,
    study_plan: StudyPlanService,
    topic_lookup: LatestOnly,
    selection: Mutex<Selection>,
    video_threshold: f32,
}

impl LearningService {
    #[must_use]
    pub fn new(
        backend: Arc<dyn ProgressBackend>,
        resolver: Arc<dyn DocumentResolver>,
        config: &EngineConfig,
        clock: Clock,
    ) -> Self {
        let progress = ProgressTracker::new();
        let store = CompletionStore::new(Arc::clone(&backend), progress.clone());
        let events = ProgressEvents::new();
        let protocol = OptimisticUpdateProtocol::new(
            store.clone(),
            events.clone(),
            Arc::clone(&backend),
            config.verify_debounce,
            config.refresh_delay,
        );
        let quiz = QuizSession::new(
            Arc::clone(&backend),
            resolver,
            store.clone(),
            progress.clone(),
            protocol.clone(),
            clock,
            config.refresh_delay,
        );
        let study_plan = StudyPlanService::new(Arc::clone(&backend));
        Self {
            backend,
            progress,
            store,
            events,
            protocol,
            quiz,
            study_plan,
            topic_lookup: LatestOnly::new(),
            selection: Mutex::new(Selection::default()),
            video_threshold: config.video_threshold,
        }
    }

    fn selection(&self) -> MutexGuard<'_, Selection> {
        self.selection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Switch to `subject` and fetch its completion.
    pub async fn load_subject(&self, subject: SubjectContext, curriculum: Curriculum) -> FetchOutcome {
        self.protocol.cancel();
        self.topic_lookup.cancel();
        *self.selection() = Selection::default();
        self.progress.clear();
        self.quiz.reset();
        tracing::info!(%subject, topics = curriculum.topic_count(), "loading subject");
        self.store.load_subject(subject, Arc::new(curriculum));
        self.store.fetch_completion().await
    }

    /// Select `key`, restarting its step flags and refreshing its completion.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoSubject` before a subject is loaded,
    /// `Curriculum` for unknown keys and `TopicLocked` for locked topics.
    pub async fn select_topic(&self, key: TopicKey) -> Result<TopicView, SessionError> {
        let subject = self.store.subject().ok_or(SessionError::NoSubject)?;
        let curriculum = self.store.curriculum();
        let topic = curriculum.require_topic(key)?;
        if !topic.is_open() {
            return Err(SessionError::TopicLocked(topic.title().to_string()));
        }
        let title = topic.title().to_string();
        let unit = curriculum.unit_title(key).unwrap_or_default().to_string();

        {
            let mut selection = self.selection();
            selection.current = Some(key);
            selection.record = None;
        }
        self.progress.begin_topic(key);
        if self.quiz.topic() != Some(key) {
            self.quiz.reset();
        }

        let backend = Arc::clone(&self.backend);
        let detail = async {
            backend
                .topic_completion(&subject, &unit, &title)
                .await
        };
        let lookup = self.topic_lookup.run(detail, |result| match result {
            Ok(record) if record.completed => {
                self.store.apply_topic_truth(&title, true);
                self.selection().record = Some((
                    key,
                    QuizRecord {
                        score: record.quiz_score(),
                        completed_at: record.completed_at,
                    },
                ));
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(%error, topic = %title, "topic completion lookup failed");
            }
        });
        let (_, fetched) = tokio::join!(lookup, self.store.fetch_completion());
        tracing::debug!(topic = %title, ?fetched, "topic selected");

        Ok(TopicView {
            key,
            gates: self.gates(key),
            record: self.topic_record(key),
            title,
        })
    }

    #[must_use]
    pub fn current_topic(&self) -> Option<TopicKey> {
        self.selection().current
    }

    fn topic_record(&self, key: TopicKey) -> Option<QuizRecord> {
        self.selection()
            .record
            .as_ref()
            .filter(|(k, _)| *k == key)
            .map(|(_, record)| record.clone())
    }

    fn require_current(&self) -> Result<TopicKey, SessionError> {
        self.current_topic().ok_or(SessionError::NoTopicSelected)
    }

    fn mark_step(&self, key: TopicKey, step: TopicStep) -> bool {
        let changed = self.progress.mark(key, step);
        if changed {
            let title = self
                .store
                .curriculum()
                .topic(key)
                .map(|t| t.title().to_string())
                .unwrap_or_default();
            self.events.publish(ProgressEvent::ProgressUpdated {
                step,
                topic_key: key,
                topic_title: title,
            });
        }
        changed
    }

    /// Playback progress for the current topic, as a fraction of its length.
    ///
    /// Marks the video watched once the configured threshold is reached.
    /// Returns `true` only on the transition. Non-finite readings, such as a
    /// player dividing by a zero duration, never count as watched.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoTopicSelected` without a current topic.
    pub fn record_video_progress(&self, fraction: f32) -> Result<bool, SessionError> {
        let key = self.require_current()?;
        if !fraction.is_finite() || fraction < self.video_threshold {
            return Ok(false);
        }
        Ok(self.mark_step(key, TopicStep::Video))
    }

    /// # Errors
    ///
    /// Returns `SessionError::StepLocked` while the notes tab is locked.
    pub fn mark_notes_read(&self) -> Result<bool, SessionError> {
        let key = self.require_current()?;
        if !self.gates(key).notes.can_enter() {
            return Err(SessionError::StepLocked(TopicStep::Notes));
        }
        Ok(self.mark_step(key, TopicStep::Notes))
    }

    /// Tab access for `key`. Unknown completion never blocks a tab.
    #[must_use]
    pub fn gates(&self, key: TopicKey) -> TabGates {
        gating::gate_topic(self.progress.get(key), self.store.is_completed(key))
    }

    /// Open the quiz tab of the current topic.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::StepLocked` until video and notes are done, and
    /// `SessionError::Quiz` when generation fails.
    pub async fn open_quiz(&self) -> Result<QuizPhase, SessionError> {
        let key = self.require_current()?;
        let subject = self.store.subject().ok_or(SessionError::NoSubject)?;
        if !self.gates(key).quiz.can_enter() {
            return Err(SessionError::StepLocked(TopicStep::Quiz));
        }
        Ok(self.quiz.generate(&subject, key).await?)
    }

    /// # Errors
    ///
    /// Returns `SessionError::Quiz` with the submission failure.
    pub async fn submit_quiz(&self, answers: QuizAnswers) -> Result<SubmitOutcome, SessionError> {
        Ok(self.quiz.submit(answers).await?)
    }

    #[must_use]
    pub fn quiz(&self) -> &QuizSession {
        &self.quiz
    }

    #[must_use]
    pub fn study_plan(&self) -> &StudyPlanService {
        &self.study_plan
    }

    #[must_use]
    pub fn events(&self) -> &ProgressEvents {
        &self.events
    }

    #[must_use]
    pub fn store(&self) -> &CompletionStore {
        &self.store
    }

    /// Re-fetch completion, replacing local optimism with backend truth.
    pub async fn force_refresh(&self) -> FetchOutcome {
        self.store.force_refresh_completion().await
    }

    fn with_resolver<R>(&self, query: impl FnOnce(NavigationResolver<'_>, &CompletionSnapshot) -> R) -> R {
        let snapshot = self.store.snapshot();
        let resolver = NavigationResolver::new(&snapshot.curriculum, &snapshot.status, self.current_topic());
        query(resolver, &snapshot)
    }

    #[must_use]
    pub fn next_uncompleted_topic(&self) -> Option<TopicKey> {
        self.with_resolver(|nav, _| nav.next_uncompleted_topic())
    }

    #[must_use]
    pub fn next_topic_forward(&self) -> Option<TopicKey> {
        self.with_resolver(|nav, _| nav.next_topic_forward())
    }

    #[must_use]
    pub fn latest_completed_topic(&self) -> Option<TopicKey> {
        self.with_resolver(|nav, _| nav.latest_completed_topic())
    }

    #[must_use]
    pub fn sequential_completion_end(&self, unit: usize) -> Option<usize> {
        self.with_resolver(|nav, _| nav.sequential_completion_end(unit))
    }

    /// Strict: unknown topics count as not complete.
    #[must_use]
    pub fn all_topics_complete(&self) -> bool {
        self.with_resolver(|_, snap| gating::all_topics_complete(&snap.curriculum, &snap.status))
    }

    /// Strict: unknown topics count as not complete.
    #[must_use]
    pub fn unit_complete(&self, unit: usize) -> bool {
        self.with_resolver(|_, snap| gating::unit_complete(&snap.curriculum, &snap.status, unit))
    }

    #[must_use]
    pub fn summary(&self) -> CompletionSummary {
        let snapshot = self.store.snapshot();
        snapshot.status.summary(&snapshot.curriculum)
    }
}
