//! Apply-now, verify-later protocol for completion-affecting actions.
//!
//! 1. the local optimistic mark lands in the `CompletionStore` immediately;
//! 2. collaborators are notified on the event bus;
//! 3. a debounced verification asks the backend about every touched topic;
//! 4. anything the backend does not confirm triggers a forced full refresh,
//!    which overwrites local optimism.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use storage::backend::ProgressBackend;
use study_core::model::{TopicKey, TopicStep};

use crate::completion_store::{CompletionStore, FetchOutcome};
use crate::debounce::DebouncedTask;
use crate::events::{ProgressEvent, ProgressEvents};

struct ProtocolInner {
    store: CompletionStore,
    events: ProgressEvents,
    backend: Arc<dyn ProgressBackend>,
    pending: Mutex<BTreeSet<TopicKey>>,
    verifier: DebouncedTask,
    delayed_refresh: DebouncedTask,
}

impl ProtocolInner {
    fn pending(&self) -> MutexGuard<'_, BTreeSet<TopicKey>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone)]
pub struct OptimisticUpdateProtocol {
    inner: Arc<ProtocolInner>,
}

impl OptimisticUpdateProtocol {
    #[must_use]
    pub fn new(
        store: CompletionStore,
        events: ProgressEvents,
        backend: Arc<dyn ProgressBackend>,
        verify_debounce: Duration,
        refresh_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ProtocolInner {
                store,
                events,
                backend,
                pending: Mutex::new(BTreeSet::new()),
                verifier: DebouncedTask::new(verify_debounce),
                delayed_refresh: DebouncedTask::new(refresh_delay),
            }),
        }
    }

    /// Mark `title` complete locally, notify, and schedule verification of `key`.
    pub fn apply_completion(&self, key: TopicKey, title: &str) {
        self.inner.store.mark_completed_local(title);
        self.inner.events.publish(ProgressEvent::ProgressUpdated {
            step: TopicStep::Quiz,
            topic_key: key,
            topic_title: title.to_string(),
        });
        self.inner.events.publish(ProgressEvent::DashboardRefresh);
        self.inner.events.publish(ProgressEvent::StudyPlanUpdated {
            step: TopicStep::Quiz,
            topic: title.to_string(),
        });
        self.request_verification(key);
    }

    /// Queue `key` for the next debounced verification pass.
    pub fn request_verification(&self, key: TopicKey) {
        self.inner.pending().insert(key);
        let weak = Arc::downgrade(&self.inner);
        self.inner.verifier.schedule(move || verify_pending(weak));
    }

    /// Drop queued verification and any delayed refresh, as on a subject switch.
    pub fn cancel(&self) {
        self.inner.verifier.cancel();
        self.inner.delayed_refresh.cancel();
        self.inner.pending().clear();
    }

    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        self.inner.verifier.is_pending() || self.inner.delayed_refresh.is_pending()
    }
}

fn schedule_refresh(inner: &Arc<ProtocolInner>) {
    let weak = Arc::downgrade(inner);
    inner.delayed_refresh.schedule(move || async move {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        if let FetchOutcome::Failed(error) = inner.store.force_refresh_completion().await {
            tracing::warn!(%error, "delayed completion refresh failed");
        }
    });
}

async fn verify_pending(weak: Weak<ProtocolInner>) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let keys = std::mem::take(&mut *inner.pending());
    if keys.is_empty() {
        return;
    }

    let snapshot = inner.store.snapshot();
    let Some(subject) = snapshot.subject else {
        return;
    };

    let mut all_confirmed = true;
    for key in keys {
        let Some(topic) = snapshot.curriculum.topic(key) else {
            continue;
        };
        let unit = snapshot.curriculum.unit_title(key).unwrap_or_default();
        match inner
            .backend
            .topic_completion(&subject, unit, topic.title())
            .await
        {
            Ok(record) if record.completed => {
                if inner.store.subject().as_ref() == Some(&subject) {
                    inner.store.apply_topic_truth(topic.title(), true);
                }
            }
            Ok(_) => {
                tracing::debug!(topic = %topic.title(), "backend has not confirmed completion");
                all_confirmed = false;
            }
            Err(error) => {
                tracing::warn!(%error, topic = %topic.title(), "completion verification failed");
                all_confirmed = false;
            }
        }
    }

    if all_confirmed {
        return;
    }
    if let FetchOutcome::Failed(error) = inner.store.force_refresh_completion().await {
        tracing::warn!(%error, "refresh after failed verification did not land; retrying later");
        schedule_refresh(&inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress_tracker::ProgressTracker;
    use storage::backend::{Endpoint, InMemoryBackend};
    use study_core::model::{Curriculum, SubjectContext, Topic, Tristate, Unit};

    fn subject() -> SubjectContext {
        SubjectContext::new("Geography", 2, 1).unwrap()
    }

    fn setup(backend: &InMemoryBackend) -> (CompletionStore, OptimisticUpdateProtocol, ProgressEvents) {
        let backend_arc: Arc<dyn ProgressBackend> = Arc::new(backend.clone());
        let store = CompletionStore::new(Arc::clone(&backend_arc), ProgressTracker::new());
        store.load_subject(
            subject(),
            Arc::new(
                Curriculum::new(vec![Unit::new(
                    "Maps",
                    vec![Topic::new("Projections"), Topic::new("Scale")],
                )])
                .unwrap(),
            ),
        );
        let events = ProgressEvents::new();
        let protocol = OptimisticUpdateProtocol::new(
            store.clone(),
            events.clone(),
            backend_arc,
            Duration::from_millis(200),
            Duration::from_secs(3),
        );
        (store, protocol, events)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_triggers_makes_one_verification_call() {
        let backend = InMemoryBackend::new();
        let (_store, protocol, _events) = setup(&backend);

        for _ in 0..5 {
            protocol.request_verification(TopicKey::new(0, 0));
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(backend.calls(Endpoint::TopicCompletion), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn apply_marks_locally_and_publishes() {
        let backend = InMemoryBackend::new();
        backend.set_completed(&subject(), ["Scale"]);
        let (store, protocol, events) = setup(&backend);
        let mut rx = events.subscribe();

        protocol.apply_completion(TopicKey::new(0, 1), "Scale");
        assert_eq!(store.status(TopicKey::new(0, 1)), Tristate::True);

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, ProgressEvent::ProgressUpdated { .. }));
        assert_eq!(rx.recv().await.unwrap(), ProgressEvent::DashboardRefresh);
        assert!(matches!(
            rx.recv().await.unwrap(),
            ProgressEvent::StudyPlanUpdated { .. }
        ));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(backend.calls(Endpoint::TopicCompletion), 1);
        // Confirmed, so no forced refresh was needed.
        assert_eq!(backend.calls(Endpoint::Completion), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_optimism_is_reverted_by_refresh() {
        let backend = InMemoryBackend::new();
        let (store, protocol, _events) = setup(&backend);

        protocol.apply_completion(TopicKey::new(0, 0), "Projections");
        assert_eq!(store.status(TopicKey::new(0, 0)), Tristate::True);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(backend.calls(Endpoint::Completion), 1);
        assert_eq!(store.status(TopicKey::new(0, 0)), Tristate::False);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_is_retried_after_delay() {
        let backend = InMemoryBackend::new();
        backend.fail(Endpoint::TopicCompletion);
        backend.fail(Endpoint::Completion);
        let (store, protocol, _events) = setup(&backend);

        protocol.apply_completion(TopicKey::new(0, 0), "Projections");
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(backend.calls(Endpoint::Completion), 1);
        assert_eq!(store.status(TopicKey::new(0, 0)), Tristate::True);

        backend.recover(Endpoint::Completion);
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(backend.calls(Endpoint::Completion), 2);
        assert_eq!(store.status(TopicKey::new(0, 0)), Tristate::False);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_queued_verification() {
        let backend = InMemoryBackend::new();
        let (_store, protocol, _events) = setup(&backend);

        protocol.request_verification(TopicKey::new(0, 0));
        assert!(protocol.has_pending_work());
        protocol.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(backend.calls(Endpoint::TopicCompletion), 0);
    }
}
