//! Navigation queries over a completion snapshot.
//!
//! Every query walks the curriculum in document order (units ascending, topics
//! ascending within a unit) and reads the raw tristate map. The progress-flag
//! hint used for gating is deliberately not consulted here: these answers drive
//! where the learner is sent, so they only trust backend or optimistic marks.

use crate::model::{CompletionStatus, Curriculum, TopicKey, Tristate};

/// Read-only view used to compute navigation targets.
#[derive(Debug, Clone, Copy)]
pub struct NavigationResolver<'a> {
    curriculum: &'a Curriculum,
    status: &'a CompletionStatus,
    current: Option<TopicKey>,
}

impl<'a> NavigationResolver<'a> {
    #[must_use]
    pub fn new(
        curriculum: &'a Curriculum,
        status: &'a CompletionStatus,
        current: Option<TopicKey>,
    ) -> Self {
        Self {
            curriculum,
            status,
            current,
        }
    }

    fn state(&self, key: TopicKey) -> Tristate {
        self.status.get(key)
    }

    /// First topic confirmed incomplete, scanning from the current topic
    /// (inclusive) to the end, then wrapping to the start.
    ///
    /// `Unknown` topics are skipped: the caller wants a backend-confirmed target.
    /// Returns `None` when nothing is `False`.
    #[must_use]
    pub fn next_uncompleted_topic(&self) -> Option<TopicKey> {
        let start = self.current.unwrap_or_else(|| TopicKey::new(0, 0));
        let is_incomplete = |key: &TopicKey| self.state(*key).is_false();

        self.curriculum
            .keys()
            .filter(|key| *key >= start)
            .find(is_incomplete)
            .or_else(|| self.curriculum.keys().find(is_incomplete))
    }

    /// First topic strictly after the current one that is not `True`.
    ///
    /// Unlike `next_uncompleted_topic`, `Unknown` counts as a valid target and
    /// there is no wraparound. Without a current topic the scan covers the
    /// whole curriculum.
    #[must_use]
    pub fn next_topic_forward(&self) -> Option<TopicKey> {
        let current = self.current;
        self.curriculum
            .keys()
            .filter(|key| current.is_none_or(|cur| *key > cur))
            .find(|key| !self.state(*key).is_true())
    }

    /// Completed topic furthest along in document order.
    #[must_use]
    pub fn latest_completed_topic(&self) -> Option<TopicKey> {
        self.curriculum
            .keys()
            .filter(|key| self.state(*key).is_true())
            .max()
    }

    /// Highest topic index `i` such that topics `0..=i` of `unit` are all `True`.
    ///
    /// `None` when topic 0 is not `True` (or the unit does not exist). Stops at
    /// the first gap, so an `Unknown` topic breaks the run.
    #[must_use]
    pub fn sequential_completion_end(&self, unit: usize) -> Option<usize> {
        let topics = self.curriculum.unit(unit)?.topics().len();
        (0..topics)
            .take_while(|t| self.state(TopicKey::new(unit, *t)).is_true())
            .last()
    }
}
