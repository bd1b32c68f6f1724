use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SubjectError {
    #[error("subject name cannot be empty")]
    EmptyName,

    #[error("subject name {0:?} looks like a year-semester code, not a subject")]
    YearSemesterCode(String),

    #[error("semester must be 1 or 2, got {0}")]
    InvalidSemester(u8),

    #[error("year must be > 0")]
    InvalidYear,
}

/// Subject the learner is studying, resolved once per curriculum load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectContext {
    name: String,
    year: u16,
    semester: u8,
}

impl SubjectContext {
    /// Creates a validated subject context.
    ///
    /// # Errors
    ///
    /// Returns `SubjectError::YearSemesterCode` when the name is a bare code such
    /// as `2-1`, and other variants for empty names or out-of-range terms.
    pub fn new(name: impl Into<String>, year: u16, semester: u8) -> Result<Self, SubjectError> {
        let name = validate_subject_name(&name.into())?;
        if year == 0 {
            return Err(SubjectError::InvalidYear);
        }
        if !(1..=2).contains(&semester) {
            return Err(SubjectError::InvalidSemester(semester));
        }
        Ok(Self {
            name,
            year,
            semester,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn year(&self) -> u16 {
        self.year
    }

    #[must_use]
    pub fn semester(&self) -> u8 {
        self.semester
    }

    /// The `year-semester` code used by the content collaborator.
    #[must_use]
    pub fn term_code(&self) -> String {
        format!("{}-{}", self.year, self.semester)
    }
}

impl fmt::Display for SubjectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.term_code())
    }
}

/// Trim and check a candidate subject name.
///
/// # Errors
///
/// Returns `SubjectError::EmptyName` for blank input and
/// `SubjectError::YearSemesterCode` for values shaped like `digits-digits`.
pub fn validate_subject_name(raw: &str) -> Result<String, SubjectError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SubjectError::EmptyName);
    }
    if is_year_semester_code(trimmed) {
        return Err(SubjectError::YearSemesterCode(trimmed.to_string()));
    }
    Ok(trimmed.to_string())
}

/// True for strings of the form `<digits>-<digits>` (whitespace around the dash allowed).
#[must_use]
pub fn is_year_semester_code(value: &str) -> bool {
    let Some((left, right)) = value.trim().split_once('-') else {
        return false;
    };
    let all_digits = |part: &str| {
        let part = part.trim();
        !part.is_empty() && part.chars().all(|c| c.is_ascii_digit())
    };
    all_digits(left) && all_digits(right)
}
