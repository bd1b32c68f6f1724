use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::ids::TopicKey;

/// Which step of a topic a signal refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopicStep {
    Video,
    Notes,
    Quiz,
}

/// Step flags for one topic during the current viewing session.
///
/// Flags only move from `false` to `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TopicProgress {
    pub video_watched: bool,
    pub notes_read: bool,
    pub quiz_completed: bool,
}

impl TopicProgress {
    /// Set the flag for `step`. Returns `true` if it changed.
    pub fn mark(&mut self, step: TopicStep) -> bool {
        let flag = match step {
            TopicStep::Video => &mut self.video_watched,
            TopicStep::Notes => &mut self.notes_read,
            TopicStep::Quiz => &mut self.quiz_completed,
        };
        let changed = !*flag;
        *flag = true;
        changed
    }

    #[must_use]
    pub fn is_marked(&self, step: TopicStep) -> bool {
        match step {
            TopicStep::Video => self.video_watched,
            TopicStep::Notes => self.notes_read,
            TopicStep::Quiz => self.quiz_completed,
        }
    }
}

/// Per-topic step flags for the active subject. Entries are created lazily.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressBook {
    topics: HashMap<TopicKey, TopicProgress>,
}

impl ProgressBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags for `key`; a missing entry reads as all-false.
    #[must_use]
    pub fn get(&self, key: TopicKey) -> TopicProgress {
        self.topics.get(&key).copied().unwrap_or_default()
    }

    /// Entry for `key`, created on first access.
    pub fn entry(&mut self, key: TopicKey) -> &mut TopicProgress {
        self.topics.entry(key).or_default()
    }

    /// Set a step flag. Returns `true` if it changed.
    pub fn mark(&mut self, key: TopicKey, step: TopicStep) -> bool {
        self.entry(key).mark(step)
    }

    /// Start a fresh viewing session for `key`.
    pub fn restart(&mut self, key: TopicKey) {
        self.topics.insert(key, TopicProgress::default());
    }

    pub fn clear(&mut self) {
        self.topics.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}
