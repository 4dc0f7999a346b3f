//! Manual override: stress-relief modes that bypass automatic fusion.
//! Modes: Breathing pacer, bubble pop, looping music, affirmation rotator.
//! The controller owns mode state only; the session owns the timers that
//! tick it and cancels them before every mode switch.

pub mod affirmations;
pub mod bubbles;
pub mod pacer;

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ReliefConfig;
use crate::dispatch::{EffectRequest, MusicTrack};
use affirmations::AffirmationRotator;
use bubbles::BubbleField;
use pacer::{BreathingPacer, PhaseName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReliefMode {
    Breathing,
    Bubbles,
    Music,
    RepeatAfterMe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverrideMode {
    #[default]
    None,
    StressRelief(ReliefMode),
}

impl std::fmt::Display for OverrideMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverrideMode::None => write!(f, "None"),
            OverrideMode::StressRelief(mode) => write!(f, "StressRelief({mode:?})"),
        }
    }
}

enum ActiveRelief {
    Breathing(BreathingPacer),
    Bubbles(BubbleField),
    Music { playing: bool },
    RepeatAfterMe(AffirmationRotator),
}

pub struct OverrideController {
    mode: OverrideMode,
    active: Option<ActiveRelief>,
    config: ReliefConfig,
    music_track: MusicTrack,
}

impl OverrideController {
    pub fn new(config: ReliefConfig) -> Self {
        Self {
            mode: OverrideMode::None,
            active: None,
            config,
            music_track: MusicTrack::SoftPiano,
        }
    }

    pub fn mode(&self) -> OverrideMode {
        self.mode
    }

    /// True while a stress-relief mode suspends fusion-driven effects.
    pub fn is_active(&self) -> bool {
        self.mode != OverrideMode::None
    }

    /// Track used by the Music mode.
    pub fn set_music_track(&mut self, track: MusicTrack) {
        self.music_track = track;
    }

    /// Leave the current mode and enter `mode`. Returns teardown effects for
    /// the old mode followed by entry effects for the new one. Selecting the
    /// current mode again is a no-op.
    pub fn select(&mut self, mode: OverrideMode) -> Vec<EffectRequest> {
        if mode == self.mode {
            debug!(mode = %mode, "override already selected");
            return Vec::new();
        }
        let mut effects = self.leave();
        let prev = self.mode;
        self.mode = mode;
        if let OverrideMode::StressRelief(relief) = mode {
            effects.extend(self.enter(relief));
        }
        info!(from = %prev, to = %mode, "override_selected");
        effects
    }

    fn leave(&mut self) -> Vec<EffectRequest> {
        let mut effects = Vec::new();
        match self.active.take() {
            None => {}
            Some(ActiveRelief::Music { playing }) => {
                if playing {
                    effects.push(EffectRequest::StopAudio);
                }
                effects.push(EffectRequest::ClearRelief);
            }
            Some(_) => effects.push(EffectRequest::ClearRelief),
        }
        effects
    }

    fn enter(&mut self, relief: ReliefMode) -> Vec<EffectRequest> {
        let (active, effects) = match relief {
            ReliefMode::Breathing => {
                let pacer = BreathingPacer::new();
                let effect = pacer.effect();
                (ActiveRelief::Breathing(pacer), vec![effect])
            }
            ReliefMode::Bubbles => (
                ActiveRelief::Bubbles(BubbleField::new(self.config.bubble_cap)),
                Vec::new(),
            ),
            ReliefMode::Music => (
                ActiveRelief::Music { playing: true },
                vec![EffectRequest::PlayAudio {
                    asset: self.music_track.asset().to_string(),
                    looped: true,
                }],
            ),
            ReliefMode::RepeatAfterMe => {
                let rotator = AffirmationRotator::new();
                let effect = rotator.current_effect();
                (ActiveRelief::RepeatAfterMe(rotator), vec![effect])
            }
        };
        self.active = Some(active);
        effects
    }

    /// Period of the timer the current mode needs, if any.
    pub fn tick_period(&self) -> Option<Duration> {
        match self.active.as_ref()? {
            ActiveRelief::Breathing(_) => Some(self.config.pacer_tick()),
            ActiveRelief::Bubbles(_) => Some(self.config.bubble_interval()),
            ActiveRelief::RepeatAfterMe(_) => Some(self.config.affirmation_interval()),
            ActiveRelief::Music { .. } => None,
        }
    }

    /// One timer tick for the current mode.
    pub fn tick<R: Rng>(&mut self, rng: &mut R) -> Option<EffectRequest> {
        match self.active.as_mut()? {
            ActiveRelief::Breathing(pacer) => {
                pacer.tick();
                Some(pacer.effect())
            }
            ActiveRelief::Bubbles(field) => match field.spawn(rng) {
                Some(bubble) => Some(EffectRequest::SpawnBubble { bubble }),
                None => {
                    debug!(cap = field.cap(), "bubble field full, spawn skipped");
                    None
                }
            },
            ActiveRelief::RepeatAfterMe(rotator) => {
                rotator.advance();
                Some(rotator.current_effect())
            }
            ActiveRelief::Music { .. } => None,
        }
    }

    /// User popped a bubble. None when not in Bubbles mode or already popped.
    pub fn pop_bubble(&mut self, id: u64) -> Option<EffectRequest> {
        match self.active.as_mut()? {
            ActiveRelief::Bubbles(field) => {
                field.pop(id).then_some(EffectRequest::RemoveBubble { id })
            }
            _ => None,
        }
    }

    /// User toggled playback. None when not in Music mode.
    pub fn toggle_music(&mut self) -> Option<EffectRequest> {
        match self.active.as_mut()? {
            ActiveRelief::Music { playing } => {
                *playing = !*playing;
                Some(if *playing {
                    EffectRequest::PlayAudio {
                        asset: self.music_track.asset().to_string(),
                        looped: true,
                    }
                } else {
                    EffectRequest::StopAudio
                })
            }
            _ => None,
        }
    }

    pub fn pacer_state(&self) -> Option<(PhaseName, u32)> {
        match self.active.as_ref()? {
            ActiveRelief::Breathing(pacer) => Some(pacer.state()),
            _ => None,
        }
    }

    pub fn bubble_count(&self) -> usize {
        match self.active.as_ref() {
            Some(ActiveRelief::Bubbles(field)) => field.len(),
            _ => 0,
        }
    }

    pub fn is_music_playing(&self) -> bool {
        matches!(self.active, Some(ActiveRelief::Music { playing: true }))
    }
}
