use serde::{Deserialize, Serialize};
use std::fmt;

/// Completion knowledge for a single topic.
///
/// `Unknown` is a first-class state, not an error: it means the backend has not
/// answered yet. Consumers must pick a policy explicitly: gating treats it as
/// "not proven complete, do not block", confirmed-completion scans treat it as
/// "not complete".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Tristate {
    True,
    False,
    #[default]
    Unknown,
}

impl Tristate {
    /// Strict reading: only a confirmed `True` counts.
    #[must_use]
    pub fn is_true(self) -> bool {
        matches!(self, Tristate::True)
    }

    /// Only a confirmed `False` counts.
    #[must_use]
    pub fn is_false(self) -> bool {
        matches!(self, Tristate::False)
    }

    #[must_use]
    pub fn is_unknown(self) -> bool {
        matches!(self, Tristate::Unknown)
    }

    /// `None` while unknown.
    #[must_use]
    pub fn known(self) -> Option<bool> {
        match self {
            Tristate::True => Some(true),
            Tristate::False => Some(false),
            Tristate::Unknown => None,
        }
    }
}

impl From<bool> for Tristate {
    fn from(value: bool) -> Self {
        if value { Tristate::True } else { Tristate::False }
    }
}

impl From<Option<bool>> for Tristate {
    fn from(value: Option<bool>) -> Self {
        value.map_or(Tristate::Unknown, Tristate::from)
    }
}

impl fmt::Display for Tristate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Tristate::True => "true",
            Tristate::False => "false",
            Tristate::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unknown() {
        assert_eq!(Tristate::default(), Tristate::Unknown);
    }

    #[test]
    fn option_conversion_keeps_unknown() {
        assert_eq!(Tristate::from(None), Tristate::Unknown);
        assert_eq!(Tristate::from(Some(true)), Tristate::True);
        assert_eq!(Tristate::False.known(), Some(false));
    }
}
