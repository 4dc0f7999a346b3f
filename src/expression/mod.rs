//! Facial-expression smoothing.
//! Pipeline: raw probability map → boundary validation → rolling window →
//! per-category mean → dominant category (with sadness bias).

pub mod window;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::SmootherConfig;
use window::RollingWindow;

pub const CATEGORY_COUNT: usize = 7;

/// Emotion categories emitted by the expression inference engine.
/// Declaration order is the engine's emission order and the tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
}

impl Emotion {
    pub const ALL: [Emotion; CATEGORY_COUNT] = [
        Emotion::Neutral,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Fearful,
        Emotion::Disgusted,
        Emotion::Surprised,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Fearful => "fearful",
            Emotion::Disgusted => "disgusted",
            Emotion::Surprised => "surprised",
        }
    }

    pub fn from_label(label: &str) -> Option<Emotion> {
        Emotion::ALL.into_iter().find(|e| e.label() == label)
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One validated inference result: a probability for every category.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionSample {
    pub timestamp_ms: u64,
    probs: [f32; CATEGORY_COUNT],
}

impl ExpressionSample {
    /// Build a sample from probabilities in `Emotion::ALL` order.
    pub fn new(timestamp_ms: u64, probs: [f32; CATEGORY_COUNT]) -> Result<Self, SampleError> {
        for (emotion, &p) in Emotion::ALL.iter().zip(probs.iter()) {
            if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                return Err(SampleError::OutOfRange {
                    emotion: *emotion,
                    value: p,
                });
            }
        }
        Ok(Self { timestamp_ms, probs })
    }

    /// Validate a label → probability map as delivered by the inference engine.
    /// The map must cover every category and nothing else.
    pub fn from_map(timestamp_ms: u64, raw: &HashMap<String, f32>) -> Result<Self, SampleError> {
        let mut probs = [0.0f32; CATEGORY_COUNT];
        for label in raw.keys() {
            if Emotion::from_label(label).is_none() {
                return Err(SampleError::UnknownCategory(label.clone()));
            }
        }
        for emotion in Emotion::ALL {
            match raw.get(emotion.label()) {
                Some(&p) => probs[emotion.index()] = p,
                None => return Err(SampleError::MissingCategory(emotion)),
            }
        }
        Self::new(timestamp_ms, probs)
    }

    #[inline]
    pub fn probability(&self, emotion: Emotion) -> f32 {
        self.probs[emotion.index()]
    }

    #[inline]
    pub fn probabilities(&self) -> &[f32; CATEGORY_COUNT] {
        &self.probs
    }
}

/// Wire form of an inference result, as delivered by the expression producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawExpression {
    pub timestamp_ms: u64,
    pub expressions: HashMap<String, f32>,
}

impl RawExpression {
    pub fn validate(&self) -> Result<ExpressionSample, SampleError> {
        ExpressionSample::from_map(self.timestamp_ms, &self.expressions)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleError {
    MissingCategory(Emotion),
    UnknownCategory(String),
    OutOfRange { emotion: Emotion, value: f32 },
}

impl std::fmt::Display for SampleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleError::MissingCategory(e) => write!(f, "sample missing category: {e}"),
            SampleError::UnknownCategory(label) => write!(f, "unknown category: {label}"),
            SampleError::OutOfRange { emotion, value } => {
                write!(f, "probability for {emotion} out of range: {value}")
            }
        }
    }
}

impl std::error::Error for SampleError {}

/// Rolling-window averager producing the dominant emotion.
pub struct ExpressionSmoother {
    window: RollingWindow,
    config: SmootherConfig,
    dominant: Option<Emotion>,
}

impl ExpressionSmoother {
    pub fn new(config: SmootherConfig) -> Self {
        Self {
            window: RollingWindow::new(config.window_size),
            config,
            dominant: None,
        }
    }

    /// Buffer a sample and recompute the dominant emotion.
    pub fn ingest(&mut self, sample: ExpressionSample) -> Emotion {
        self.window.push(sample);
        let dominant = match self.window.means() {
            Some(means) => pick_dominant(&means, &self.config),
            // unreachable after a push; keep the previous decision
            None => self.dominant.unwrap_or(Emotion::Neutral),
        };
        self.dominant = Some(dominant);
        dominant
    }

    /// Last computed dominant emotion, None before the first sample.
    pub fn dominant(&self) -> Option<Emotion> {
        self.dominant
    }

    pub fn averages(&self) -> Option<[f32; CATEGORY_COUNT]> {
        self.window.means()
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.dominant = None;
    }
}

/// Naive arg-max over category means, then the sadness-bias override.
/// The inference engine under-weights sadness relative to neutral faces.
pub fn pick_dominant(means: &[f32; CATEGORY_COUNT], config: &SmootherConfig) -> Emotion {
    let mut best = Emotion::ALL[0];
    for emotion in Emotion::ALL.into_iter().skip(1) {
        // strict > keeps the first-seen category on exact ties
        if means[emotion.index()] > means[best.index()] {
            best = emotion;
        }
    }

    let sad = means[Emotion::Sad.index()];
    let neutral = means[Emotion::Neutral.index()];
    let happy = means[Emotion::Happy.index()];
    if sad > config.sad_floor && sad >= neutral * config.sad_neutral_ratio && sad > happy {
        return Emotion::Sad;
    }
    best
}
