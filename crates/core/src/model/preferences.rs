use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PreferenceError {
    #[error("unknown preference key: {0}")]
    UnknownKey(String),

    #[error("invalid value {value:?} for preference {key}")]
    InvalidValue { key: PreferenceKey, value: String },
}

/// One-time UI flags persisted between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreferenceKey {
    TourDismissed,
    QuizIntroSeen,
    CompletionCelebrationSeen,
}

impl PreferenceKey {
    pub const ALL: [PreferenceKey; 3] = [
        PreferenceKey::TourDismissed,
        PreferenceKey::QuizIntroSeen,
        PreferenceKey::CompletionCelebrationSeen,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PreferenceKey::TourDismissed => "tour_dismissed",
            PreferenceKey::QuizIntroSeen => "quiz_intro_seen",
            PreferenceKey::CompletionCelebrationSeen => "completion_celebration_seen",
        }
    }

    #[must_use]
    pub fn default_value(self) -> bool {
        false
    }

    /// Decode a stored value.
    ///
    /// # Errors
    ///
    /// Returns `PreferenceError::InvalidValue` for anything but `true`/`false`.
    pub fn parse_value(self, raw: &str) -> Result<bool, PreferenceError> {
        match raw.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(PreferenceError::InvalidValue {
                key: self,
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for PreferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreferenceKey {
    type Err = PreferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| PreferenceError::UnknownKey(s.to_string()))
    }
}

/// Resolved preference values; unset keys fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preferences {
    values: HashMap<PreferenceKey, bool>,
}

impl Preferences {
    #[must_use]
    pub fn get(&self, key: PreferenceKey) -> bool {
        self.values
            .get(&key)
            .copied()
            .unwrap_or_else(|| key.default_value())
    }

    pub fn set(&mut self, key: PreferenceKey, value: bool) {
        self.values.insert(key, value);
    }
}
