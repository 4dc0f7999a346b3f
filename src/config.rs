//! Tunable constants for smoothing, scoring and relief timers.
//! Loaded from JSON; every field falls back to its default so a partial file
//! only overrides what it names.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Expression smoothing and sadness-bias thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmootherConfig {
    /// Number of samples kept in the rolling window.
    pub window_size: usize,
    /// Mean sad probability must exceed this for the bias rule to fire.
    pub sad_floor: f32,
    /// Mean sad must be at least `avg(neutral) * sad_neutral_ratio`.
    pub sad_neutral_ratio: f32,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            window_size: 5,
            sad_floor: 0.2,
            sad_neutral_ratio: 0.9,
        }
    }
}

/// Deduction table and bucket cutoffs for the speech confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// A gap between fragments longer than this counts as a pause.
    pub pause_gap_ms: u64,
    /// More pauses than this costs `pause_penalty`.
    pub pause_limit: u32,
    pub pause_penalty: u8,
    /// Below this rate costs `slow_penalty`.
    pub slow_wpm: f64,
    pub slow_penalty: u8,
    /// Above this rate costs `fast_penalty`.
    pub fast_wpm: f64,
    pub fast_penalty: u8,
    /// score >= confident_cutoff → Confident.
    pub confident_cutoff: u8,
    /// moderate_cutoff <= score < confident_cutoff → Moderate, below → Low.
    pub moderate_cutoff: u8,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            pause_gap_ms: 2_000,
            pause_limit: 3,
            pause_penalty: 20,
            slow_wpm: 80.0,
            slow_penalty: 20,
            fast_wpm: 200.0,
            fast_penalty: 10,
            confident_cutoff: 80,
            moderate_cutoff: 50,
        }
    }
}

/// Periods for the override-mode timers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliefConfig {
    pub pacer_tick_ms: u64,
    pub bubble_interval_ms: u64,
    /// Maximum number of live bubbles; spawns are skipped while full.
    pub bubble_cap: usize,
    pub affirmation_interval_ms: u64,
}

impl Default for ReliefConfig {
    fn default() -> Self {
        Self {
            pacer_tick_ms: 1_000,
            bubble_interval_ms: 1_200,
            bubble_cap: 12,
            affirmation_interval_ms: 5_000,
        }
    }
}

impl ReliefConfig {
    pub fn pacer_tick(&self) -> Duration {
        Duration::from_millis(self.pacer_tick_ms.max(1))
    }

    pub fn bubble_interval(&self) -> Duration {
        Duration::from_millis(self.bubble_interval_ms.max(1))
    }

    pub fn affirmation_interval(&self) -> Duration {
        Duration::from_millis(self.affirmation_interval_ms.max(1))
    }
}

/// Top-level configuration for a fusion session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub smoother: SmootherConfig,
    pub scoring: ScoringConfig,
    pub relief: ReliefConfig,
    /// Expression sampling period used by `Session::spawn_sampler`.
    pub sampling_interval_ms: u64,
}

impl FusionConfig {
    /// Load configuration from a JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: FusionConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn sampling_interval(&self) -> Duration {
        let ms = if self.sampling_interval_ms == 0 {
            DEFAULT_SAMPLING_INTERVAL_MS
        } else {
            self.sampling_interval_ms
        };
        Duration::from_millis(ms)
    }
}

/// Used when `sampling_interval_ms` is left at 0.
pub const DEFAULT_SAMPLING_INTERVAL_MS: u64 = 2_000;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config IO error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}
