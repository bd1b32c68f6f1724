use std::collections::{HashMap, HashSet};

use crate::model::curriculum::Curriculum;
use crate::model::ids::TopicKey;
use crate::model::tristate::Tristate;

/// Counts over a `CompletionStatus` snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletionSummary {
    pub total: usize,
    pub completed: usize,
    pub incomplete: usize,
    pub unknown: usize,
}

/// Map of `TopicKey` to tristate completion for one subject context.
///
/// Keys that were never written read as `Tristate::Unknown`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionStatus {
    entries: HashMap<TopicKey, Tristate>,
}

impl CompletionStatus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: TopicKey) -> Tristate {
        self.entries.get(&key).copied().unwrap_or_default()
    }

    pub fn set(&mut self, key: TopicKey, value: Tristate) {
        if value.is_unknown() {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, value);
        }
    }

    /// Replace the whole map with the backend's view.
    ///
    /// Every topic of `curriculum` becomes `True` if its title is listed and
    /// `False` otherwise. Earlier optimistic writes are overwritten.
    pub fn apply_completed_titles<S: AsRef<str>>(&mut self, curriculum: &Curriculum, titles: &[S]) {
        let completed: HashSet<&str> = titles.iter().map(AsRef::as_ref).collect();
        self.entries = curriculum
            .entries()
            .map(|(key, topic)| (key, Tristate::from(completed.contains(topic.title()))))
            .collect();
    }

    /// Set `True` for every topic whose title matches exactly. Returns the keys touched.
    pub fn mark_title_completed(&mut self, curriculum: &Curriculum, title: &str) -> Vec<TopicKey> {
        let keys = curriculum.keys_for_title(title);
        for key in &keys {
            self.entries.insert(*key, Tristate::True);
        }
        keys
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn summary(&self, curriculum: &Curriculum) -> CompletionSummary {
        curriculum
            .keys()
            .fold(CompletionSummary::default(), |mut acc, key| {
                acc.total += 1;
                match self.get(key) {
                    Tristate::True => acc.completed += 1,
                    Tristate::False => acc.incomplete += 1,
                    Tristate::Unknown => acc.unknown += 1,
                }
                acc
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Topic, Unit};

    fn curriculum() -> Curriculum {
        Curriculum::new(vec![
            Unit::new("U1", vec![Topic::new("A"), Topic::new("B")]),
            Unit::new("U2", vec![Topic::new("C"), Topic::new("A")]),
        ])
        .unwrap()
    }

    #[test]
    fn unset_keys_are_unknown() {
        let status = CompletionStatus::new();
        assert_eq!(status.get(TopicKey::new(0, 0)), Tristate::Unknown);
    }

    #[test]
    fn backend_titles_overwrite_optimistic_marks() {
        let curriculum = curriculum();
        let mut status = CompletionStatus::new();
        status.mark_title_completed(&curriculum, "B");
        status.apply_completed_titles(&curriculum, &["C"]);
        assert_eq!(status.get(TopicKey::new(0, 1)), Tristate::False);
        assert_eq!(status.get(TopicKey::new(1, 0)), Tristate::True);
        assert_eq!(status.get(TopicKey::new(0, 0)), Tristate::False);
    }

    #[test]
    fn mark_title_hits_every_matching_key() {
        let curriculum = curriculum();
        let mut status = CompletionStatus::new();
        let touched = status.mark_title_completed(&curriculum, "A");
        assert_eq!(touched, vec![TopicKey::new(0, 0), TopicKey::new(1, 1)]);
        assert!(status.get(TopicKey::new(1, 1)).is_true());
        assert!(status.get(TopicKey::new(0, 1)).is_unknown());
    }

    #[test]
    fn summary_counts_each_state() {
        let curriculum = curriculum();
        let mut status = CompletionStatus::new();
        status.set(TopicKey::new(0, 0), Tristate::True);
        status.set(TopicKey::new(0, 1), Tristate::False);
        let summary = status.summary(&curriculum);
        assert_eq!(
            summary,
            CompletionSummary {
                total: 4,
                completed: 1,
                incomplete: 1,
                unknown: 2,
            }
        );
    }
}
