//! Typed session events fanned out to any number of listeners.
//! Each subscriber gets its own unbounded crossbeam channel; publishing never
//! blocks the producer that caused the event.

use crossbeam_channel as cb;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::confidence::ConfidenceMetric;
use crate::dispatch::ComfortKitConfig;
use crate::expression::Emotion;
use crate::relief::OverrideMode;
use crate::state_machine::ActivationReason;

/// Signal channels feeding the fusion trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Expression,
    Transcript,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Expression => write!(f, "expression"),
            Channel::Transcript => write!(f, "transcript"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted { session_id: String },
    DominantEmotionChanged { emotion: Emotion },
    ConfidenceChanged { metric: ConfidenceMetric },
    Activated { reason: ActivationReason, kit: ComfortKitConfig },
    Reset,
    OverrideChanged { mode: OverrideMode },
    /// A signal channel is unavailable for the rest of the session.
    ChannelDegraded { channel: Channel, reason: String },
    SessionStopped,
}

pub struct EventBus {
    subscribers: Mutex<Vec<cb::Sender<SessionEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> cb::Receiver<SessionEvent> {
        let (tx, rx) = cb::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver to every live subscriber; dropped receivers are pruned.
    pub fn publish(&self, event: SessionEvent) {
        let mut subs = self.subscribers.lock();
        subs.retain(|tx| tx.send(event.clone()).is_ok());
        debug!(event = ?event, subscribers = subs.len(), "event_published");
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
