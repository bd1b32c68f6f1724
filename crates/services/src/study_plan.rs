use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;
use storage::backend::{ProgressBackend, StudyPlan};
use tokio::task::JoinHandle;

use crate::events::{EventTopic, ProgressEvent, ProgressEvents};
use crate::latest::LatestOnly;

/// Date-scoped study plan view. The last selected date wins.
#[derive(Clone)]
pub struct StudyPlanService {
    backend: Arc<dyn ProgressBackend>,
    latest: Arc<LatestOnly>,
    current: Arc<Mutex<Option<StudyPlan>>>,
}

impl StudyPlanService {
    #[must_use]
    pub fn new(backend: Arc<dyn ProgressBackend>) -> Self {
        Self {
            backend,
            latest: Arc::new(LatestOnly::new()),
            current: Arc::new(Mutex::new(None)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<StudyPlan>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the plan for `date`, cancelling any lookup still in flight.
    ///
    /// Returns the applied plan, or `None` if a newer selection superseded this
    /// one or the lookup failed. Failures keep the previous plan visible.
    pub async fn select_date(&self, date: NaiveDate) -> Option<StudyPlan> {
        let backend = Arc::clone(&self.backend);
        let applied = self
            .latest
            .run(async move { backend.study_plan(date).await }, |result| {
                match result {
                    Ok(plan) => {
                        *self.lock() = Some(plan.clone());
                        Some(plan)
                    }
                    Err(error) => {
                        tracing::warn!(%error, %date, "study plan lookup failed");
                        None
                    }
                }
            })
            .await;
        if applied.is_none() {
            tracing::debug!(%date, "study plan selection superseded");
        }
        applied.flatten()
    }

    #[must_use]
    pub fn current(&self) -> Option<StudyPlan> {
        self.lock().clone()
    }

    /// Flag every entry for `topic` in the current plan as done.
    /// Returns `true` if anything changed.
    pub fn mark_topic_done(&self, topic: &str) -> bool {
        let mut current = self.lock();
        let Some(plan) = current.as_mut() else {
            return false;
        };
        let mut changed = false;
        for entry in plan.entries.iter_mut().filter(|e| e.topic_title == topic) {
            changed |= !entry.done;
            entry.done = true;
        }
        changed
    }

    /// Keep the plan in step with `study-plan-updated` events until the bus closes.
    #[must_use]
    pub fn follow(&self, events: &ProgressEvents) -> JoinHandle<()> {
        let mut subscription = events.subscribe_topic(EventTopic::StudyPlanUpdated);
        let service = self.clone();
        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                if let ProgressEvent::StudyPlanUpdated { topic, .. } = event {
                    service.mark_topic_done(&topic);
                }
            }
        })
    }
}
