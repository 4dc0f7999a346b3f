//! Fusion trigger: Idle → Activated, latched until an explicit reset.
//! Both producers (expression, speech) race on the same latch; the
//! check-and-set happens under one write lock so an activation edge is
//! observed by exactly one caller.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::confidence::ConfidenceBucket;
use crate::expression::Emotion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerState {
    Idle,
    Activated,
}

impl std::fmt::Display for TriggerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerState::Idle => write!(f, "Idle"),
            TriggerState::Activated => write!(f, "Activated"),
        }
    }
}

/// Which signal tripped the latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivationReason {
    Emotion,
    Confidence,
}

impl std::fmt::Display for ActivationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivationReason::Emotion => write!(f, "Emotion"),
            ActivationReason::Confidence => write!(f, "Confidence"),
        }
    }
}

/// Whether a dominant emotion qualifies for activation.
#[inline]
pub fn emotion_qualifies(emotion: Emotion) -> bool {
    emotion == Emotion::Sad
}

/// Whether a confidence bucket qualifies for activation. Analyzing never does.
#[inline]
pub fn bucket_qualifies(bucket: ConfidenceBucket) -> bool {
    bucket == ConfidenceBucket::Low
}

/// Activation edge handed to exactly one caller. Only `try_activate`
/// constructs one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationEdge {
    reason: ActivationReason,
    sequence: u64,
}

impl ActivationEdge {
    pub fn reason(&self) -> ActivationReason {
        self.reason
    }

    /// Activation count within the session, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// The single authoritative latch, with a watch channel for subscribers.
pub struct FusionTrigger {
    state: RwLock<LatchState>,
    state_tx: watch::Sender<TriggerState>,
    state_rx: watch::Receiver<TriggerState>,
}

struct LatchState {
    current: TriggerState,
    activations: u64,
}

impl FusionTrigger {
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(TriggerState::Idle);
        Self {
            state: RwLock::new(LatchState {
                current: TriggerState::Idle,
                activations: 0,
            }),
            state_tx,
            state_rx,
        }
    }

    /// Current state (non-blocking read).
    pub fn current(&self) -> TriggerState {
        self.state.read().current
    }

    /// Number of Idle → Activated edges since construction or `rearm_session`.
    pub fn activations(&self) -> u64 {
        self.state.read().activations
    }

    /// Atomic check-and-set. Returns the edge only to the caller that moved
    /// the latch from Idle; every other caller gets None.
    pub fn try_activate(&self, reason: ActivationReason) -> Option<ActivationEdge> {
        let mut state = self.state.write();
        if state.current == TriggerState::Activated {
            debug!(reason = %reason, "latch already set, qualifying update ignored");
            return None;
        }
        state.current = TriggerState::Activated;
        state.activations += 1;
        let sequence = state.activations;
        let _ = self.state_tx.send(TriggerState::Activated);
        info!(
            reason = %reason,
            sequence,
            from = %TriggerState::Idle,
            to = %TriggerState::Activated,
            "trigger_transition"
        );
        Some(ActivationEdge { reason, sequence })
    }

    /// Return to Idle. Returns false (no-op) when already Idle.
    pub fn reset(&self) -> bool {
        let mut state = self.state.write();
        if state.current == TriggerState::Idle {
            debug!("reset on idle latch ignored");
            return false;
        }
        state.current = TriggerState::Idle;
        let _ = self.state_tx.send(TriggerState::Idle);
        info!(from = %TriggerState::Activated, to = %TriggerState::Idle, "trigger_transition");
        true
    }

    /// Unconditional return to Idle with a fresh activation count (new session).
    pub fn rearm_session(&self) {
        let mut state = self.state.write();
        state.current = TriggerState::Idle;
        state.activations = 0;
        let _ = self.state_tx.send(TriggerState::Idle);
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<TriggerState> {
        self.state_rx.clone()
    }
}

impl Default for FusionTrigger {
    fn default() -> Self {
        Self::new()
    }
}
