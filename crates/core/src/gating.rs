//! Which of a topic's steps the learner may enter.
//!
//! Two consumers read completion here with different policies for
//! `Tristate::Unknown`:
//! - tab gating is permissive: unknown never blocks a tab, so a slow backend
//!   cannot lock a learner out of content;
//! - the all-complete checks used for end-of-unit UI are strict: unknown is
//!   not complete.

use crate::model::{CompletionStatus, Curriculum, TopicProgress, Tristate};

/// Where a learner stands within one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicStage {
    Video,
    Notes,
    Quiz,
    CompletedReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabAccess {
    Open,
    Locked,
    /// Visible, but only the previous result is shown.
    ReadOnly,
}

impl TabAccess {
    #[must_use]
    pub fn can_enter(self) -> bool {
        !matches!(self, TabAccess::Locked)
    }
}

/// What opening the quiz tab should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizTabView {
    Locked,
    Form,
    /// Submission blocked; show the "already completed" notice and prior score.
    AlreadyCompleted,
}

/// Gating decision for one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabGates {
    pub stage: TopicStage,
    pub video: TabAccess,
    pub notes: TabAccess,
    pub quiz: TabAccess,
}

impl TabGates {
    #[must_use]
    pub fn quiz_view(&self) -> QuizTabView {
        match self.quiz {
            TabAccess::Open => QuizTabView::Form,
            TabAccess::Locked => QuizTabView::Locked,
            TabAccess::ReadOnly => QuizTabView::AlreadyCompleted,
        }
    }
}

/// Derive tab access from step flags and the topic's completion.
///
/// `completion` is the hinted reading (backend/optimistic map, falling back to
/// the local quiz flag). `Unknown` is treated permissively: it does not lock
/// the quiz and does not switch it to read-only.
#[must_use]
pub fn gate_topic(progress: TopicProgress, completion: Tristate) -> TabGates {
    if completion.is_true() {
        return TabGates {
            stage: TopicStage::CompletedReadOnly,
            video: TabAccess::Open,
            notes: TabAccess::Open,
            quiz: TabAccess::ReadOnly,
        };
    }

    let notes = if progress.video_watched {
        TabAccess::Open
    } else {
        TabAccess::Locked
    };
    let quiz = if progress.video_watched && progress.notes_read {
        TabAccess::Open
    } else {
        TabAccess::Locked
    };
    let stage = match (notes, quiz) {
        (_, TabAccess::Open) => TopicStage::Quiz,
        (TabAccess::Open, _) => TopicStage::Notes,
        _ => TopicStage::Video,
    };

    TabGates {
        stage,
        video: TabAccess::Open,
        notes,
        quiz,
    }
}

/// Strict check: every topic of `unit` is confirmed `True`.
///
/// Returns `false` for unknown or empty units.
#[must_use]
pub fn unit_complete(curriculum: &Curriculum, status: &CompletionStatus, unit: usize) -> bool {
    let Some(topics) = curriculum.unit(unit).map(|u| u.topics().len()) else {
        return false;
    };
    topics > 0
        && curriculum
            .keys()
            .filter(|key| key.unit() == unit)
            .all(|key| status.get(key).is_true())
}

/// Strict check: every topic in the curriculum is confirmed `True`.
#[must_use]
pub fn all_topics_complete(curriculum: &Curriculum, status: &CompletionStatus) -> bool {
    !curriculum.is_empty() && curriculum.keys().all(|key| status.get(key).is_true())
}
