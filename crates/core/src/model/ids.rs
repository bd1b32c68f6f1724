use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Position of a topic inside a subject's curriculum.
///
/// Ordering is document order: units ascending, then topics ascending within a unit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicKey {
    unit: usize,
    topic: usize,
}

impl TopicKey {
    /// Creates a new `TopicKey`
    #[must_use]
    pub const fn new(unit: usize, topic: usize) -> Self {
        Self { unit, topic }
    }

    /// Index of the unit within the subject
    #[must_use]
    pub fn unit(&self) -> usize {
        self.unit
    }

    /// Index of the topic within its unit
    #[must_use]
    pub fn topic(&self) -> usize {
        self.topic
    }
}

/// Backend-issued identifier for a generated quiz
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuizId(String);

impl QuizId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TopicKey({}, {})", self.unit, self.topic)
    }
}

impl fmt::Debug for QuizId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QuizId({})", self.0)
    }
}

// ─── Display Implementations ───────────────────────────────────────────────────

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.unit, self.topic)
    }
}

impl fmt::Display for QuizId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── FromStr Implementations ───────────────────────────────────────────────────

/// Error type for parsing ID from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {} from string", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

impl FromStr for TopicKey {
    type Err = ParseIdError;

    /// Parses the `unit.topic` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseIdError {
            kind: "TopicKey".to_string(),
        };
        let (unit, topic) = s.split_once('.').ok_or_else(err)?;
        let unit = unit.trim().parse::<usize>().map_err(|_| err())?;
        let topic = topic.trim().parse::<usize>().map_err(|_| err())?;
        Ok(TopicKey::new(unit, topic))
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────
