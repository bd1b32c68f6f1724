//! Typed publish/subscribe channel for progress notifications.
//!
//! Fire-and-forget: publishing never waits on subscribers, and a publish with
//! nobody listening is not an error.

use std::fmt;

use study_core::model::{TopicKey, TopicStep};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// Named channels collaborators can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTopic {
    ProgressUpdated,
    DashboardRefresh,
    StudyPlanUpdated,
}

impl EventTopic {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventTopic::ProgressUpdated => "progress-updated",
            EventTopic::DashboardRefresh => "dashboard-refresh",
            EventTopic::StudyPlanUpdated => "study-plan-updated",
        }
    }
}

impl fmt::Display for EventTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    ProgressUpdated {
        step: TopicStep,
        topic_key: TopicKey,
        topic_title: String,
    },
    DashboardRefresh,
    StudyPlanUpdated {
        step: TopicStep,
        topic: String,
    },
}

impl ProgressEvent {
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            ProgressEvent::ProgressUpdated { .. } => EventTopic::ProgressUpdated,
            ProgressEvent::DashboardRefresh => EventTopic::DashboardRefresh,
            ProgressEvent::StudyPlanUpdated { .. } => EventTopic::StudyPlanUpdated,
        }
    }
}

/// Cloneable handle to the progress event bus.
#[derive(Clone)]
pub struct ProgressEvents {
    tx: broadcast::Sender<ProgressEvent>,
}

impl Default for ProgressEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressEvents {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: ProgressEvent) {
        let topic = event.topic();
        let delivered = self.tx.send(event).unwrap_or(0);
        tracing::trace!(%topic, delivered, "published progress event");
    }

    /// Receive every event.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Receive only events published on `topic`.
    #[must_use]
    pub fn subscribe_topic(&self, topic: EventTopic) -> TopicSubscription {
        TopicSubscription {
            topic,
            rx: self.tx.subscribe(),
        }
    }
}

pub struct TopicSubscription {
    topic: EventTopic,
    rx: broadcast::Receiver<ProgressEvent>,
}

impl TopicSubscription {
    /// Next event on this topic, or `None` once the bus is gone.
    ///
    /// Events dropped because this subscriber lagged are skipped.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.topic() == self.topic => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = %self.topic, skipped, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of `recv`.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if event.topic() == self.topic => return Some(event),
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn topic_subscription_filters_other_topics() {
        let events = ProgressEvents::new();
        let mut dashboard = events.subscribe_topic(EventTopic::DashboardRefresh);

        events.publish(ProgressEvent::StudyPlanUpdated {
            step: TopicStep::Quiz,
            topic: "Limits".into(),
        });
        events.publish(ProgressEvent::DashboardRefresh);

        assert_eq!(dashboard.recv().await, Some(ProgressEvent::DashboardRefresh));
        assert_eq!(dashboard.try_recv(), None);
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let events = ProgressEvents::new();
        events.publish(ProgressEvent::DashboardRefresh);
    }

    #[test]
    fn topic_names_match_wire_names() {
        assert_eq!(EventTopic::ProgressUpdated.to_string(), "progress-updated");
        assert_eq!(EventTopic::StudyPlanUpdated.as_str(), "study-plan-updated");
    }
}
