use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use study_core::model::{ProgressBook, TopicKey, TopicProgress, TopicStep};

/// Shared handle to the per-topic step flags of the current viewing session.
///
/// Cloning shares the same book. Nothing here is persisted.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    book: Arc<Mutex<ProgressBook>>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ProgressBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a viewing session for `key` with all flags cleared.
    pub fn begin_topic(&self, key: TopicKey) {
        self.lock().restart(key);
    }

    /// Set a step flag. Returns `true` if it changed.
    pub fn mark(&self, key: TopicKey, step: TopicStep) -> bool {
        self.lock().mark(key, step)
    }

    #[must_use]
    pub fn get(&self, key: TopicKey) -> TopicProgress {
        self.lock().get(key)
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressBook {
        self.lock().clone()
    }

    /// Discard every entry, as on a subject switch.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let tracker = ProgressTracker::new();
        let other = tracker.clone();
        let key = TopicKey::new(0, 0);

        assert!(tracker.mark(key, TopicStep::Video));
        assert!(other.get(key).video_watched);
        assert!(!other.mark(key, TopicStep::Video));
    }

    #[test]
    fn begin_topic_resets_only_that_topic() {
        let tracker = ProgressTracker::new();
        let a = TopicKey::new(0, 0);
        let b = TopicKey::new(0, 1);
        tracker.mark(a, TopicStep::Notes);
        tracker.mark(b, TopicStep::Notes);

        tracker.begin_topic(a);
        assert!(!tracker.get(a).notes_read);
        assert!(tracker.get(b).notes_read);

        tracker.clear();
        assert!(tracker.snapshot().is_empty());
    }
}
