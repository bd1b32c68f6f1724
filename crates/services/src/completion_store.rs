//! Shadow cache of backend completion, updated optimistically by local actions.
//!
//! Backend responses are authoritative: an applied fetch overwrites every
//! optimistic mark. Responses are applied in request order, so a slow response
//! to an older request never replaces a newer one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use storage::backend::{BackendError, CompletionList, ProgressBackend};
use study_core::model::{CompletionStatus, Curriculum, SubjectContext, TopicKey, Tristate};

use crate::progress_tracker::ProgressTracker;

type CompletionFuture = Shared<BoxFuture<'static, Result<CompletionList, BackendError>>>;

/// Result of a completion fetch. Failures never propagate as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    /// A newer response was already applied, or the subject changed meanwhile.
    Superseded,
    Failed(BackendError),
    NoSubject,
}

/// Immutable view of the store at one instant.
#[derive(Debug, Clone)]
pub struct CompletionSnapshot {
    pub subject: Option<SubjectContext>,
    pub curriculum: Arc<Curriculum>,
    pub status: CompletionStatus,
}

struct InFlight {
    request: u64,
    future: CompletionFuture,
}

#[derive(Default)]
struct StoreState {
    subject: Option<SubjectContext>,
    curriculum: Arc<Curriculum>,
    status: CompletionStatus,
    epoch: u64,
    last_request: u64,
    last_applied: u64,
    in_flight: Option<InFlight>,
}

#[derive(Clone)]
pub struct CompletionStore {
    backend: Arc<dyn ProgressBackend>,
    progress: ProgressTracker,
    state: Arc<Mutex<StoreState>>,
}

impl CompletionStore {
    #[must_use]
    pub fn new(backend: Arc<dyn ProgressBackend>, progress: ProgressTracker) -> Self {
        Self {
            backend,
            progress,
            state: Arc::new(Mutex::new(StoreState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Point the store at a subject. A different subject or curriculum clears
    /// the map back to all-`Unknown` and orphans any request in flight.
    pub fn load_subject(&self, subject: SubjectContext, curriculum: Arc<Curriculum>) {
        let mut state = self.lock();
        let unchanged = state.subject.as_ref() == Some(&subject) && state.curriculum == curriculum;
        if unchanged {
            return;
        }
        tracing::debug!(%subject, topics = curriculum.topic_count(), "completion store reset");
        state.subject = Some(subject);
        state.curriculum = curriculum;
        state.status.clear();
        state.epoch += 1;
        state.in_flight = None;
    }

    #[must_use]
    pub fn subject(&self) -> Option<SubjectContext> {
        self.lock().subject.clone()
    }

    #[must_use]
    pub fn curriculum(&self) -> Arc<Curriculum> {
        Arc::clone(&self.lock().curriculum)
    }

    /// Fetch completed titles, joining a request already in flight.
    pub async fn fetch_completion(&self) -> FetchOutcome {
        self.fetch(false).await
    }

    /// Issue a fresh request even if one is in flight. Safe to call repeatedly.
    pub async fn force_refresh_completion(&self) -> FetchOutcome {
        self.fetch(true).await
    }

    async fn fetch(&self, force: bool) -> FetchOutcome {
        let (request, epoch, future) = {
            let mut state = self.lock();
            let Some(subject) = state.subject.clone() else {
                return FetchOutcome::NoSubject;
            };
            let joined = if force {
                None
            } else {
                state
                    .in_flight
                    .as_ref()
                    .map(|flight| (flight.request, flight.future.clone()))
            };
            match joined {
                Some((request, future)) => (request, state.epoch, future),
                None => {
                    state.last_request += 1;
                    let request = state.last_request;
                    let backend = Arc::clone(&self.backend);
                    let future = async move { backend.completion(&subject).await }
                        .boxed()
                        .shared();
                    state.in_flight = Some(InFlight {
                        request,
                        future: future.clone(),
                    });
                    (request, state.epoch, future)
                }
            }
        };

        let result = future.await;
        self.finish(request, epoch, result)
    }

    fn finish(
        &self,
        request: u64,
        epoch: u64,
        result: Result<CompletionList, BackendError>,
    ) -> FetchOutcome {
        let mut state = self.lock();
        if state
            .in_flight
            .as_ref()
            .is_some_and(|flight| flight.request == request)
        {
            state.in_flight = None;
        }
        if state.epoch != epoch {
            return FetchOutcome::Superseded;
        }

        match result {
            Ok(list) => {
                // Every waiter on a shared request reaches here; apply once.
                if request < state.last_applied {
                    return FetchOutcome::Superseded;
                }
                if request > state.last_applied {
                    let curriculum = Arc::clone(&state.curriculum);
                    state
                        .status
                        .apply_completed_titles(&curriculum, &list.completed_topic_titles);
                    state.last_applied = request;
                    tracing::debug!(
                        request,
                        completed = list.completed_topic_titles.len(),
                        "applied completion response"
                    );
                }
                FetchOutcome::Applied
            }
            Err(error) => {
                tracing::warn!(%error, request, "completion fetch failed; keeping cached state");
                FetchOutcome::Failed(error)
            }
        }
    }

    /// Optimistically mark every topic titled `title` as complete.
    pub fn mark_completed_local(&self, title: &str) -> Vec<TopicKey> {
        let mut state = self.lock();
        let curriculum = Arc::clone(&state.curriculum);
        let keys = state.status.mark_title_completed(&curriculum, title);
        if keys.is_empty() {
            tracing::debug!(topic = %title, "no topic matches optimistic completion");
        }
        keys
    }

    /// Record a single-topic answer from the backend.
    pub fn apply_topic_truth(&self, title: &str, completed: bool) {
        let mut state = self.lock();
        let curriculum = Arc::clone(&state.curriculum);
        for key in curriculum.keys_for_title(title) {
            state.status.set(key, Tristate::from(completed));
        }
    }

    /// Raw map value: backend truth or optimistic mark, `Unknown` if neither.
    #[must_use]
    pub fn status(&self, key: TopicKey) -> Tristate {
        self.lock().status.get(key)
    }

    /// Completion with the instant-feedback fallback.
    ///
    /// When the map is `Unknown` for `key`, the local `quiz_completed` flag
    /// decides: `True` if set, `False` otherwise. Suitable for gating only;
    /// confirmed-completion scans must use `status` or a snapshot instead.
    #[must_use]
    pub fn is_completed(&self, key: TopicKey) -> Tristate {
        match self.status(key) {
            Tristate::Unknown => Tristate::from(self.progress.get(key).quiz_completed),
            known => known,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> CompletionSnapshot {
        let state = self.lock();
        CompletionSnapshot {
            subject: state.subject.clone(),
            curriculum: Arc::clone(&state.curriculum),
            status: state.status.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use storage::backend::{Endpoint, InMemoryBackend};
    use study_core::model::{Topic, TopicStep, Unit};

    fn subject() -> SubjectContext {
        SubjectContext::new("History", 1, 2).unwrap()
    }

    fn curriculum() -> Arc<Curriculum> {
        Arc::new(
            Curriculum::new(vec![Unit::new(
                "Antiquity",
                vec![Topic::new("Egypt"), Topic::new("Rome"), Topic::new("Topic X")],
            )])
            .unwrap(),
        )
    }

    fn store(backend: &InMemoryBackend) -> CompletionStore {
        let store = CompletionStore::new(Arc::new(backend.clone()), ProgressTracker::new());
        store.load_subject(subject(), curriculum());
        store
    }

    #[tokio::test]
    async fn fetch_populates_from_titles() {
        let backend = InMemoryBackend::new();
        backend.set_completed(&subject(), ["Rome"]);
        let store = store(&backend);

        assert_eq!(store.status(TopicKey::new(0, 1)), Tristate::Unknown);
        assert_eq!(store.fetch_completion().await, FetchOutcome::Applied);
        assert_eq!(store.status(TopicKey::new(0, 0)), Tristate::False);
        assert_eq!(store.status(TopicKey::new(0, 1)), Tristate::True);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_fetches_share_one_request() {
        let backend = InMemoryBackend::new();
        backend.set_delay(Endpoint::Completion, Duration::from_millis(50));
        backend.set_completed(&subject(), ["Egypt"]);
        let store = store(&backend);

        let (a, b, c) = tokio::join!(
            store.fetch_completion(),
            store.fetch_completion(),
            store.fetch_completion()
        );
        assert_eq!((a, b, c), (FetchOutcome::Applied, FetchOutcome::Applied, FetchOutcome::Applied));
        assert_eq!(backend.calls(Endpoint::Completion), 1);

        store.fetch_completion().await;
        assert_eq!(backend.calls(Endpoint::Completion), 2);
    }

    #[tokio::test]
    async fn failed_fetch_leaves_cache_untouched() {
        let backend = InMemoryBackend::new();
        backend.set_completed(&subject(), ["Egypt"]);
        let store = store(&backend);
        store.fetch_completion().await;

        backend.fail(Endpoint::Completion);
        let outcome = store.force_refresh_completion().await;
        assert!(matches!(outcome, FetchOutcome::Failed(_)));
        assert_eq!(store.status(TopicKey::new(0, 0)), Tristate::True);
    }

    #[tokio::test]
    async fn refresh_downgrades_stale_optimism() {
        let backend = InMemoryBackend::new();
        let store = store(&backend);

        store.mark_completed_local("Topic X");
        assert_eq!(store.status(TopicKey::new(0, 2)), Tristate::True);

        store.force_refresh_completion().await;
        assert_eq!(store.status(TopicKey::new(0, 2)), Tristate::False);
    }

    #[tokio::test]
    async fn optimistic_write_never_undoes_confirmed_true() {
        let backend = InMemoryBackend::new();
        backend.set_completed(&subject(), ["Rome"]);
        let store = store(&backend);
        store.fetch_completion().await;

        store.mark_completed_local("Rome");
        store.mark_completed_local("Egypt");
        assert_eq!(store.status(TopicKey::new(0, 1)), Tristate::True);
    }

    #[tokio::test(start_paused = true)]
    async fn older_response_does_not_replace_newer() {
        let backend = InMemoryBackend::new();
        backend.set_delay(Endpoint::Completion, Duration::from_millis(100));
        let store = store(&backend);

        let slow = {
            let store = store.clone();
            tokio::spawn(async move { store.fetch_completion().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        backend.set_completed(&subject(), ["Egypt"]);
        backend.set_delay(Endpoint::Completion, Duration::from_millis(10));
        assert_eq!(store.force_refresh_completion().await, FetchOutcome::Applied);

        // The first request was issued before "Egypt" was completed.
        assert_eq!(slow.await.unwrap(), FetchOutcome::Superseded);
        assert_eq!(store.status(TopicKey::new(0, 0)), Tristate::True);
    }

    #[tokio::test(start_paused = true)]
    async fn subject_change_orphans_in_flight_fetch() {
        let backend = InMemoryBackend::new();
        backend.set_delay(Endpoint::Completion, Duration::from_millis(50));
        backend.set_completed(&subject(), ["Egypt"]);
        let store = store(&backend);

        let pending = {
            let store = store.clone();
            tokio::spawn(async move { store.fetch_completion().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.load_subject(SubjectContext::new("Art", 1, 2).unwrap(), curriculum());

        assert_eq!(pending.await.unwrap(), FetchOutcome::Superseded);
        assert_eq!(store.status(TopicKey::new(0, 0)), Tristate::Unknown);
    }

    #[tokio::test]
    async fn unknown_falls_back_to_quiz_flag() {
        let backend = InMemoryBackend::new();
        let progress = ProgressTracker::new();
        let store = CompletionStore::new(Arc::new(backend), progress.clone());
        store.load_subject(subject(), curriculum());
        let key = TopicKey::new(0, 0);

        assert_eq!(store.is_completed(key), Tristate::False);
        progress.mark(key, TopicStep::Quiz);
        assert_eq!(store.is_completed(key), Tristate::True);
        assert_eq!(store.status(key), Tristate::Unknown);
    }

    #[tokio::test]
    async fn fetch_without_subject_is_a_no_op() {
        let backend = InMemoryBackend::new();
        let store = CompletionStore::new(Arc::new(backend.clone()), ProgressTracker::new());
        assert_eq!(store.fetch_completion().await, FetchOutcome::NoSubject);
        assert_eq!(backend.calls(Endpoint::Completion), 0);
    }
}
