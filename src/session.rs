//! Session lifecycle: start → ingest (expression / transcript) → latch →
//! dispatch, with manual override and teardown.
//!
//! The two producers call into the session independently and may do so from
//! different threads. Each component is single-owner behind its own lock;
//! the only state both producers mutate is the `FusionTrigger` latch.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cancellation::{GenerationGuard, SessionTimers};
use crate::confidence::{ConfidenceMetric, ConfidenceScorer, TranscriptFragment};
use crate::config::FusionConfig;
use crate::dispatch::{ComfortKitConfig, Dispatcher, EffectRequest, EffectSink, MusicTrack};
use crate::events::{Channel, EventBus, SessionEvent};
use crate::expression::{Emotion, ExpressionSample, ExpressionSmoother, RawExpression};
use crate::metrics::{metric_names, LatencySummary, MetricsRegistry, SessionIds};
use crate::relief::affirmations::AffirmationRotator;
use crate::relief::pacer::PhaseName;
use crate::relief::{OverrideController, OverrideMode};
use crate::state_machine::{
    bucket_qualifies, emotion_qualifies, ActivationReason, FusionTrigger, TriggerState,
};

/// Which producers the host could bring up for this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub expression: bool,
    pub transcript: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            expression: true,
            transcript: true,
        }
    }
}

/// Polled by the session's sampling timer. None means no usable inference
/// result this tick (no face, engine busy); the tick is dropped.
pub trait ExpressionSource: Send + Sync {
    fn poll(&self) -> Option<RawExpression>;
}

/// An externally-held capture resource (camera stream, speech listener)
/// released when the session stops.
pub trait CaptureHandle: Send {
    fn name(&self) -> &str;
    fn release(&mut self);
}

#[derive(Default)]
struct ChannelStatus {
    expression_degraded: bool,
    transcript_degraded: bool,
}

impl ChannelStatus {
    fn is_degraded(&self, channel: Channel) -> bool {
        match channel {
            Channel::Expression => self.expression_degraded,
            Channel::Transcript => self.transcript_degraded,
        }
    }

    fn mark(&mut self, channel: Channel) {
        match channel {
            Channel::Expression => self.expression_degraded = true,
            Channel::Transcript => self.transcript_degraded = true,
        }
    }

    fn manual_only(&self) -> bool {
        self.expression_degraded && self.transcript_degraded
    }
}

pub struct Session {
    config: FusionConfig,
    kit: RwLock<ComfortKitConfig>,
    ids: RwLock<SessionIds>,
    epoch: AtomicU64,
    running: AtomicBool,
    smoother: Mutex<ExpressionSmoother>,
    scorer: Mutex<ConfidenceScorer>,
    channels: Mutex<ChannelStatus>,
    trigger: FusionTrigger,
    relief: Mutex<OverrideController>,
    activity_rotator: Mutex<Option<AffirmationRotator>>,
    timers: SessionTimers,
    captures: Mutex<Vec<Box<dyn CaptureHandle>>>,
    events: EventBus,
    sink: Arc<dyn EffectSink>,
    metrics: Arc<MetricsRegistry>,
}

impl Session {
    pub fn new(config: FusionConfig, sink: Arc<dyn EffectSink>) -> Arc<Self> {
        Self::with_metrics(config, sink, Arc::new(MetricsRegistry::new()))
    }

    pub fn with_metrics(
        config: FusionConfig,
        sink: Arc<dyn EffectSink>,
        metrics: Arc<MetricsRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            smoother: Mutex::new(ExpressionSmoother::new(config.smoother.clone())),
            scorer: Mutex::new(ConfidenceScorer::new(config.scoring.clone(), 0)),
            relief: Mutex::new(OverrideController::new(config.relief.clone())),
            config,
            kit: RwLock::new(ComfortKitConfig::default()),
            ids: RwLock::new(SessionIds::new(0)),
            epoch: AtomicU64::new(0),
            running: AtomicBool::new(false),
            channels: Mutex::new(ChannelStatus::default()),
            trigger: FusionTrigger::new(),
            activity_rotator: Mutex::new(None),
            timers: SessionTimers::new(),
            captures: Mutex::new(Vec::new()),
            events: EventBus::new(),
            sink,
            metrics,
        })
    }

    // --- Lifecycle ---

    /// Start a session now with every producer available.
    pub fn start_session(&self, kit: ComfortKitConfig) -> SessionIds {
        self.start_session_with(kit, Capabilities::default(), now_unix_ms())
    }

    /// Start a session anchored at `started_at_ms`, on the same clock the
    /// producers stamp their samples and fragments with.
    pub fn start_session_with(
        &self,
        kit: ComfortKitConfig,
        capabilities: Capabilities,
        started_at_ms: u64,
    ) -> SessionIds {
        if self.is_running() {
            self.stop_session();
        }

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let ids = SessionIds::new(epoch);
        *self.ids.write() = ids.clone();

        let track = kit.music().and_then(MusicTrack::from_label).unwrap_or(MusicTrack::SoftPiano);
        self.relief.lock().set_music_track(track);
        *self.kit.write() = kit;

        self.smoother.lock().reset();
        self.scorer.lock().reset(started_at_ms);
        *self.activity_rotator.lock() = None;
        *self.channels.lock() = ChannelStatus::default();
        self.trigger.rearm_session();
        self.running.store(true, Ordering::SeqCst);

        info!(session_id = %ids.session_id, epoch, started_at_ms, "session_started");
        self.events.publish(SessionEvent::SessionStarted {
            session_id: ids.session_id.clone(),
        });

        if !capabilities.expression {
            self.degrade_channel(Channel::Expression, "expression producer unavailable");
        }
        if !capabilities.transcript {
            self.degrade_channel(Channel::Transcript, "transcript producer unavailable");
        }
        ids
    }

    /// Re-arm the latch: back to Idle with a cleared window and metric.
    /// A no-op when the latch is already Idle.
    ///
    /// Producers hold their component lock until their activation attempt
    /// returns, so taking both here (window, then metric) means no input
    /// judged against the old window can re-latch after the reset.
    pub fn reset(&self) -> bool {
        let mut smoother = self.smoother.lock();
        let mut scorer = self.scorer.lock();
        if !self.trigger.reset() {
            return false;
        }
        smoother.reset();
        let anchor = scorer.last_timestamp_ms();
        scorer.reset(anchor);
        *self.activity_rotator.lock() = None;
        info!(session_id = %self.ids.read().session_id, "session_reset");
        self.events.publish(SessionEvent::Reset);
        true
    }

    /// Cancel every timer, tear down the override mode and release captures.
    pub fn stop_session(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("stop on stopped session ignored");
            return;
        }
        self.timers.cancel_all_and_advance();
        let teardown = self.relief.lock().select(OverrideMode::None);
        self.submit_all(teardown);
        *self.activity_rotator.lock() = None;

        let mut captures = std::mem::take(&mut *self.captures.lock());
        for capture in captures.iter_mut() {
            capture.release();
            debug!(capture = capture.name(), "capture_released");
        }

        info!(
            session_id = %self.ids.read().session_id,
            released = captures.len(),
            "session_stopped"
        );
        self.events.publish(SessionEvent::SessionStopped);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Gate for user actions and timers: nothing happens outside a session.
    fn live(&self, action: &'static str) -> bool {
        if self.is_running() {
            return true;
        }
        debug!(action, "action on stopped session ignored");
        false
    }

    /// Hand a capture resource to the session; it is released on stop.
    pub fn attach_capture(&self, capture: Box<dyn CaptureHandle>) {
        if !self.is_running() {
            let mut capture = capture;
            warn!(capture = capture.name(), "capture attached to stopped session, released");
            capture.release();
            return;
        }
        self.captures.lock().push(capture);
    }

    /// Report a producer that is unavailable or failed to initialize.
    /// The channel stops contributing for the rest of the session; reported once.
    pub fn degrade_channel(&self, channel: Channel, reason: &str) {
        let manual_only = {
            let mut status = self.channels.lock();
            if status.is_degraded(channel) {
                return;
            }
            status.mark(channel);
            status.manual_only()
        };
        warn!(channel = %channel, reason, "channel_degraded");
        self.events.publish(SessionEvent::ChannelDegraded {
            channel,
            reason: reason.to_string(),
        });
        if manual_only {
            warn!("no signal channels left, manual override only");
        }
    }

    pub fn is_manual_only(&self) -> bool {
        self.channels.lock().manual_only()
    }

    // --- Producers ---

    /// Validate and ingest an inference result. Malformed results are dropped.
    pub fn ingest_expression(&self, raw: &RawExpression) -> Option<Emotion> {
        match raw.validate() {
            Ok(sample) => self.ingest_sample(sample),
            Err(e) => {
                self.metrics.incr(metric_names::SAMPLES_DROPPED);
                warn!(error = %e, timestamp_ms = raw.timestamp_ms, "expression sample dropped");
                None
            }
        }
    }

    /// Ingest a validated sample. Returns the dominant emotion, or None when
    /// the sample was not accepted.
    pub fn ingest_sample(&self, sample: ExpressionSample) -> Option<Emotion> {
        if !self.accepts(Channel::Expression) {
            self.metrics.incr(metric_names::SAMPLES_DROPPED);
            return None;
        }
        let span = self.metrics.span(metric_names::EXPRESSION_INGEST);
        // held through activation; see `reset`
        let mut smoother = self.smoother.lock();
        let previous = smoother.dominant();
        let dominant = smoother.ingest(sample);
        if previous != Some(dominant) {
            debug!(from = ?previous, to = %dominant, "dominant_emotion_changed");
            self.events.publish(SessionEvent::DominantEmotionChanged { emotion: dominant });
        }
        if emotion_qualifies(dominant) {
            self.activate(ActivationReason::Emotion);
        }
        drop(smoother);
        span.finish();
        Some(dominant)
    }

    /// Ingest a transcript fragment. Returns the current metric, or None
    /// when the fragment was not accepted.
    pub fn ingest_transcript(&self, fragment: &TranscriptFragment) -> Option<ConfidenceMetric> {
        if !self.accepts(Channel::Transcript) {
            self.metrics.incr(metric_names::FRAGMENTS_DROPPED);
            return None;
        }
        let span = self.metrics.span(metric_names::TRANSCRIPT_INGEST);
        // held through activation; see `reset`
        let mut scorer = self.scorer.lock();
        let previous = scorer.metric().clone();
        let metric = match scorer.ingest(fragment) {
            Ok(metric) => metric,
            Err(e) => {
                self.metrics.incr(metric_names::FRAGMENTS_DROPPED);
                warn!(error = %e, "transcript fragment dropped");
                return None;
            }
        };
        if metric != previous {
            debug!(score = metric.score, bucket = %metric.bucket, "confidence_changed");
            self.events.publish(SessionEvent::ConfidenceChanged {
                metric: metric.clone(),
            });
        }
        if bucket_qualifies(metric.bucket) {
            self.activate(ActivationReason::Confidence);
        }
        drop(scorer);
        span.finish();
        Some(metric)
    }

    fn accepts(&self, channel: Channel) -> bool {
        if !self.is_running() {
            debug!(channel = %channel, "input outside a running session dropped");
            return false;
        }
        if self.channels.lock().is_degraded(channel) {
            debug!(channel = %channel, "input on degraded channel dropped");
            return false;
        }
        true
    }

    /// Only the caller that wins the latch dispatches.
    fn activate(&self, reason: ActivationReason) {
        let Some(edge) = self.trigger.try_activate(reason) else {
            return;
        };
        let span = self.metrics.span(metric_names::ACTIVATION_DISPATCH);
        let kit = self.kit.read().clone();
        let dispatch = Dispatcher::dispatch(&kit, edge);
        *self.activity_rotator.lock() = dispatch.rotator;

        self.events.publish(SessionEvent::Activated { reason, kit });

        if self.relief.lock().is_active() {
            self.metrics
                .add(metric_names::EFFECTS_SUPPRESSED, dispatch.effects.len() as u64);
            info!(
                suppressed = dispatch.effects.len(),
                "override active, intervention effects withheld"
            );
        } else {
            self.submit_all(dispatch.effects);
        }
        span.finish();
    }

    /// Own the expression sampling interval, polling `source` every
    /// `sampling_interval`. Replaces any previous sampler.
    pub fn spawn_sampler(self: &Arc<Self>, source: Arc<dyn ExpressionSource>) -> bool {
        if !self.live("spawn_sampler") {
            return false;
        }
        let guard = self.timers.sampling.cancel_and_advance();
        let session: Weak<Session> = Arc::downgrade(self);
        self.timers
            .spawn_interval("expression_sampler", guard, self.config.sampling_interval(), move || {
                let Some(session) = session.upgrade() else {
                    return false;
                };
                match source.poll() {
                    Some(raw) => {
                        session.ingest_expression(&raw);
                    }
                    None => debug!("no inference result this tick"),
                }
                true
            })
            .is_some()
    }

    // --- Manual override ---

    /// Select an override mode. The previous mode's timer is cancelled
    /// before the new mode is entered. Latch state is not touched.
    pub fn set_override(self: &Arc<Self>, mode: OverrideMode) {
        if !self.live("set_override") {
            return;
        }
        let (effects, period, guard) = {
            let mut relief = self.relief.lock();
            if relief.mode() == mode {
                debug!(mode = %mode, "override unchanged");
                return;
            }
            let guard = self.timers.relief.cancel_and_advance();
            let effects = relief.select(mode);
            (effects, relief.tick_period(), guard)
        };
        self.submit_all(effects);
        self.events.publish(SessionEvent::OverrideChanged { mode });

        if let Some(period) = period {
            let session: Weak<Session> = Arc::downgrade(self);
            let tick_guard = guard.clone();
            self.timers.spawn_interval("relief_tick", guard, period, move || {
                match session.upgrade() {
                    Some(session) => session.relief_tick(&tick_guard),
                    None => false,
                }
            });
        }
    }

    /// One timer tick for the active override mode. Returns false when the
    /// guard is stale (the mode has since changed).
    fn relief_tick(&self, guard: &GenerationGuard) -> bool {
        let span = self.metrics.span(metric_names::RELIEF_TICK);
        let effect = {
            let mut relief = self.relief.lock();
            if !guard.should_continue() {
                return false;
            }
            relief.tick(&mut rand::thread_rng())
        };
        if let Some(effect) = effect {
            self.sink.submit(effect);
        }
        span.finish();
        true
    }

    /// Drive the override mode by hand (hosts that own their own clock).
    pub fn advance_relief(&self) -> Option<EffectRequest> {
        if !self.live("advance_relief") {
            return None;
        }
        let effect = self.relief.lock().tick(&mut rand::thread_rng());
        if let Some(effect) = &effect {
            self.sink.submit(effect.clone());
        }
        effect
    }

    pub fn override_mode(&self) -> OverrideMode {
        self.relief.lock().mode()
    }

    pub fn pacer_state(&self) -> Option<(PhaseName, u32)> {
        self.relief.lock().pacer_state()
    }

    pub fn bubble_count(&self) -> usize {
        self.relief.lock().bubble_count()
    }

    /// User popped a bubble.
    pub fn pop_bubble(&self, id: u64) -> bool {
        if !self.live("pop_bubble") {
            return false;
        }
        let effect = self.relief.lock().pop_bubble(id);
        self.submit_opt(effect)
    }

    /// User toggled override music playback.
    pub fn toggle_music(&self) -> bool {
        if !self.live("toggle_music") {
            return false;
        }
        let effect = self.relief.lock().toggle_music();
        self.submit_opt(effect)
    }

    /// User asked for the next Repeat-After-Me affirmation of the dispatched
    /// activity prompt. False when that activity is not showing.
    pub fn advance_affirmation(&self) -> bool {
        if !self.live("advance_affirmation") {
            return false;
        }
        let effect = self.activity_rotator.lock().as_mut().map(|rotator| {
            rotator.advance();
            rotator.current_effect()
        });
        self.submit_opt(effect)
    }

    // --- Observation ---

    pub fn subscribe(&self) -> crossbeam_channel::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn trigger_state(&self) -> TriggerState {
        self.trigger.current()
    }

    pub fn subscribe_trigger(&self) -> tokio::sync::watch::Receiver<TriggerState> {
        self.trigger.subscribe()
    }

    pub fn dominant_emotion(&self) -> Option<Emotion> {
        self.smoother.lock().dominant()
    }

    pub fn window_len(&self) -> usize {
        self.smoother.lock().window().len()
    }

    pub fn confidence(&self) -> ConfidenceMetric {
        self.scorer.lock().metric().clone()
    }

    pub fn kit(&self) -> ComfortKitConfig {
        self.kit.read().clone()
    }

    pub fn ids(&self) -> SessionIds {
        self.ids.read().clone()
    }

    pub fn live_timers(&self) -> usize {
        self.timers.live_timers()
    }

    pub fn metrics_summary(&self) -> std::collections::HashMap<String, LatencySummary> {
        self.metrics.summary()
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    fn submit_all(&self, effects: Vec<EffectRequest>) {
        for effect in effects {
            self.sink.submit(effect);
        }
    }

    fn submit_opt(&self, effect: Option<EffectRequest>) -> bool {
        match effect {
            Some(effect) => {
                self.sink.submit(effect);
                true
            }
            None => false,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.timers.cancel_all_and_advance();
    }
}

/// Current time as Unix timestamp (milliseconds).
pub fn now_unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
