use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::TopicKey;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CurriculumError {
    #[error("unit {unit} has an empty title")]
    EmptyUnitTitle { unit: usize },

    #[error("topic {key} has an empty title")]
    EmptyTopicTitle { key: TopicKey },

    #[error("topic {key} is outside the curriculum")]
    OutOfRange { key: TopicKey },
}

//
// ─── TOPIC / UNIT ──────────────────────────────────────────────────────────────
//

/// Smallest curriculum entry. Carries the video, notes and quiz steps.
///
/// The title is the join key with the backend, which identifies topics by
/// title + subject + unit rather than by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    title: String,
    #[serde(default = "default_true")]
    is_accessible: bool,
    #[serde(default)]
    is_locked: bool,
}

fn default_true() -> bool {
    true
}

impl Topic {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            is_accessible: true,
            is_locked: false,
        }
    }

    #[must_use]
    pub fn with_access(mut self, is_accessible: bool, is_locked: bool) -> Self {
        self.is_accessible = is_accessible;
        self.is_locked = is_locked;
        self
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn is_accessible(&self) -> bool {
        self.is_accessible
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.is_locked
    }

    /// True when the learner may open this topic at all.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.is_accessible && !self.is_locked
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    title: String,
    topics: Vec<Topic>,
}

impl Unit {
    #[must_use]
    pub fn new(title: impl Into<String>, topics: Vec<Topic>) -> Self {
        Self {
            title: title.into(),
            topics,
        }
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }
}

//
// ─── CURRICULUM ────────────────────────────────────────────────────────────────
//

/// Unvalidated curriculum as received from the content collaborator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurriculumDraft {
    pub units: Vec<Unit>,
}

impl CurriculumDraft {
    /// Validate titles and freeze the tree.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError` if any unit or topic title is blank.
    pub fn validate(self) -> Result<Curriculum, CurriculumError> {
        for (u, unit) in self.units.iter().enumerate() {
            if unit.title.trim().is_empty() {
                return Err(CurriculumError::EmptyUnitTitle { unit: u });
            }
            for (t, topic) in unit.topics.iter().enumerate() {
                if topic.title.trim().is_empty() {
                    return Err(CurriculumError::EmptyTopicTitle {
                        key: TopicKey::new(u, t),
                    });
                }
            }
        }
        Ok(Curriculum { units: self.units })
    }
}

/// Read-only Subject → Unit[] → Topic[] tree for the active subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CurriculumDraft")]
pub struct Curriculum {
    units: Vec<Unit>,
}

impl TryFrom<CurriculumDraft> for Curriculum {
    type Error = CurriculumError;

    fn try_from(draft: CurriculumDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

impl Curriculum {
    /// Build a curriculum from units.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError` if any unit or topic title is blank.
    pub fn new(units: Vec<Unit>) -> Result<Self, CurriculumError> {
        CurriculumDraft { units }.validate()
    }

    #[must_use]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    #[must_use]
    pub fn unit(&self, index: usize) -> Option<&Unit> {
        self.units.get(index)
    }

    #[must_use]
    pub fn topic(&self, key: TopicKey) -> Option<&Topic> {
        self.units
            .get(key.unit())
            .and_then(|unit| unit.topics.get(key.topic()))
    }

    /// Resolve a key to its topic, failing when it lies outside the tree.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError::OutOfRange` for unknown keys.
    pub fn require_topic(&self, key: TopicKey) -> Result<&Topic, CurriculumError> {
        self.topic(key).ok_or(CurriculumError::OutOfRange { key })
    }

    #[must_use]
    pub fn contains(&self, key: TopicKey) -> bool {
        self.topic(key).is_some()
    }

    /// Total number of topics across all units.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.units.iter().map(|unit| unit.topics.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topic_count() == 0
    }

    /// Every topic key in document order.
    pub fn keys(&self) -> impl Iterator<Item = TopicKey> + '_ {
        self.units.iter().enumerate().flat_map(|(u, unit)| {
            (0..unit.topics.len()).map(move |t| TopicKey::new(u, t))
        })
    }

    /// Every `(key, topic)` pair in document order.
    pub fn entries(&self) -> impl Iterator<Item = (TopicKey, &Topic)> + '_ {
        self.units.iter().enumerate().flat_map(|(u, unit)| {
            unit.topics
                .iter()
                .enumerate()
                .map(move |(t, topic)| (TopicKey::new(u, t), topic))
        })
    }

    /// All keys whose topic title matches exactly.
    #[must_use]
    pub fn keys_for_title(&self, title: &str) -> Vec<TopicKey> {
        self.entries()
            .filter(|(_, topic)| topic.title == title)
            .map(|(key, _)| key)
            .collect()
    }

    /// Title of the unit that owns `key`.
    #[must_use]
    pub fn unit_title(&self, key: TopicKey) -> Option<&str> {
        self.units.get(key.unit()).map(Unit::title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Curriculum {
        Curriculum::new(vec![
            Unit::new("Algebra", vec![Topic::new("Sets"), Topic::new("Relations")]),
            Unit::new("Calculus", vec![Topic::new("Limits")]),
        ])
        .unwrap()
    }

    #[test]
    fn keys_follow_document_order() {
        let keys: Vec<_> = sample().keys().collect();
        assert_eq!(
            keys,
            vec![TopicKey::new(0, 0), TopicKey::new(0, 1), TopicKey::new(1, 0)]
        );
    }

    #[test]
    fn blank_topic_title_is_rejected() {
        let err = Curriculum::new(vec![Unit::new("U", vec![Topic::new("  ")])]).unwrap_err();
        assert_eq!(
            err,
            CurriculumError::EmptyTopicTitle {
                key: TopicKey::new(0, 0)
            }
        );
    }

    #[test]
    fn repeated_titles_resolve_to_every_key() {
        let curriculum = Curriculum::new(vec![
            Unit::new("A", vec![Topic::new("Review")]),
            Unit::new("B", vec![Topic::new("Intro"), Topic::new("Review")]),
        ])
        .unwrap();
        assert_eq!(
            curriculum.keys_for_title("Review"),
            vec![TopicKey::new(0, 0), TopicKey::new(1, 1)]
        );
        assert!(curriculum.keys_for_title("review").is_empty());
    }

    #[test]
    fn deserializes_with_access_defaults() {
        let json = r#"{"units":[{"title":"U","topics":[{"title":"T"},{"title":"P","isLocked":true}]}]}"#;
        let curriculum: Curriculum = serde_json::from_str(json).unwrap();
        assert!(curriculum.topic(TopicKey::new(0, 0)).unwrap().is_open());
        assert!(!curriculum.topic(TopicKey::new(0, 1)).unwrap().is_open());
    }

    #[test]
    fn deserialize_rejects_blank_unit_title() {
        let json = r#"{"units":[{"title":"","topics":[]}]}"#;
        assert!(serde_json::from_str::<Curriculum>(json).is_err());
    }
}
