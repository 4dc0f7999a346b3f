//! Breathing pacer: Inhale 4s → Hold 4s → Exhale 6s → Hold 2s, repeating.
//! Driven by 1-second ticks; holds no timer of its own.

use serde::{Deserialize, Serialize};

use crate::dispatch::EffectRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseName {
    Inhale,
    Hold,
    Exhale,
    Hold2,
}

impl PhaseName {
    /// Text shown to the user; both holds read "Hold".
    pub fn display_name(self) -> &'static str {
        match self {
            PhaseName::Inhale => "Inhale",
            PhaseName::Hold | PhaseName::Hold2 => "Hold",
            PhaseName::Exhale => "Exhale",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacerPhase {
    pub name: PhaseName,
    pub duration_seconds: u32,
}

pub const PHASES: [PacerPhase; 4] = [
    PacerPhase {
        name: PhaseName::Inhale,
        duration_seconds: 4,
    },
    PacerPhase {
        name: PhaseName::Hold,
        duration_seconds: 4,
    },
    PacerPhase {
        name: PhaseName::Exhale,
        duration_seconds: 6,
    },
    PacerPhase {
        name: PhaseName::Hold2,
        duration_seconds: 2,
    },
];

/// Ticks in one full cycle.
pub const CYCLE_SECONDS: u32 = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreathingPacer {
    phase_index: usize,
    seconds_remaining: u32,
}

impl BreathingPacer {
    pub fn new() -> Self {
        Self {
            phase_index: 0,
            seconds_remaining: PHASES[0].duration_seconds,
        }
    }

    /// Advance by one second. Returns true when the phase changed.
    pub fn tick(&mut self) -> bool {
        if self.seconds_remaining > 1 {
            self.seconds_remaining -= 1;
            return false;
        }
        self.phase_index = (self.phase_index + 1) % PHASES.len();
        self.seconds_remaining = PHASES[self.phase_index].duration_seconds;
        true
    }

    pub fn phase(&self) -> PhaseName {
        PHASES[self.phase_index].name
    }

    pub fn phase_index(&self) -> usize {
        self.phase_index
    }

    pub fn seconds_remaining(&self) -> u32 {
        self.seconds_remaining
    }

    pub fn state(&self) -> (PhaseName, u32) {
        (self.phase(), self.seconds_remaining)
    }

    pub fn effect(&self) -> EffectRequest {
        EffectRequest::ShowBreathingPhase {
            phase: self.phase(),
            seconds_remaining: self.seconds_remaining,
        }
    }
}

impl Default for BreathingPacer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_on_inhale() {
        assert_eq!(BreathingPacer::new().state(), (PhaseName::Inhale, 4));
    }

    #[test]
    fn four_ticks_reach_hold() {
        let mut pacer = BreathingPacer::new();
        let changed: Vec<bool> = (0..4).map(|_| pacer.tick()).collect();
        assert_eq!(changed, vec![false, false, false, true]);
        assert_eq!(pacer.state(), (PhaseName::Hold, 4));
    }

    #[test]
    fn full_cycle_is_sixteen_ticks() {
        let mut pacer = BreathingPacer::new();
        let start = pacer.clone();
        for tick in 1..=CYCLE_SECONDS {
            pacer.tick();
            if tick < CYCLE_SECONDS {
                assert_ne!(pacer, start, "returned to start early at tick {tick}");
            }
        }
        assert_eq!(pacer, start);
    }

    #[test]
    fn visits_every_phase_in_order() {
        let mut pacer = BreathingPacer::new();
        let mut seen = vec![pacer.phase()];
        for _ in 0..CYCLE_SECONDS {
            if pacer.tick() {
                seen.push(pacer.phase());
            }
        }
        assert_eq!(
            seen,
            vec![
                PhaseName::Inhale,
                PhaseName::Hold,
                PhaseName::Exhale,
                PhaseName::Hold2,
                PhaseName::Inhale
            ]
        );
        assert_eq!(PHASES.iter().map(|p| p.duration_seconds).sum::<u32>(), CYCLE_SECONDS);
    }

    #[test]
    fn exhale_counts_down_from_six() {
        let mut pacer = BreathingPacer::new();
        for _ in 0..8 {
            pacer.tick();
        }
        assert_eq!(pacer.state(), (PhaseName::Exhale, 6));
        pacer.tick();
        assert_eq!(pacer.state(), (PhaseName::Exhale, 5));
        assert_eq!(pacer.phase().display_name(), "Exhale");
        assert_eq!(PhaseName::Hold2.display_name(), "Hold");
    }
}
