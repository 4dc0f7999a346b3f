//! Speech confidence scoring over incremental transcript fragments.
//! Cascade: pause detection (inter-fragment gap) → words-per-minute →
//! deduction table → bucket.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ScoringConfig;

/// Whether a fragment carries the whole transcript so far or only new text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    /// Full transcript so far; replaces what the scorer holds.
    #[default]
    Cumulative,
    /// New text only; appended to what the scorer holds.
    Incremental,
}

/// A speech-to-text result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptFragment {
    pub timestamp_ms: u64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub kind: FragmentKind,
}

impl TranscriptFragment {
    pub fn cumulative(timestamp_ms: u64, text: impl Into<String>) -> Self {
        Self {
            timestamp_ms,
            text: text.into(),
            kind: FragmentKind::Cumulative,
        }
    }

    pub fn incremental(timestamp_ms: u64, text: impl Into<String>) -> Self {
        Self {
            timestamp_ms,
            text: text.into(),
            kind: FragmentKind::Incremental,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FragmentError {
    /// Timestamp earlier than the previous fragment.
    OutOfOrder { timestamp_ms: u64, last_ms: u64 },
}

impl std::fmt::Display for FragmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FragmentError::OutOfOrder { timestamp_ms, last_ms } => {
                write!(f, "fragment at {timestamp_ms}ms precedes previous fragment at {last_ms}ms")
            }
        }
    }
}

impl std::error::Error for FragmentError {}

/// Coarse classification of the confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfidenceBucket {
    Confident,
    Moderate,
    Low,
    /// No score computed yet. Never counts as Low.
    Analyzing,
}

impl std::fmt::Display for ConfidenceBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfidenceBucket::Confident => write!(f, "Confident"),
            ConfidenceBucket::Moderate => write!(f, "Moderate"),
            ConfidenceBucket::Low => write!(f, "Low"),
            ConfidenceBucket::Analyzing => write!(f, "Analyzing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceMetric {
    pub pause_count: u32,
    pub words_per_minute: f64,
    pub score: u8,
    pub bucket: ConfidenceBucket,
}

impl ConfidenceMetric {
    pub fn initial() -> Self {
        Self {
            pause_count: 0,
            words_per_minute: 0.0,
            score: 100,
            bucket: ConfidenceBucket::Analyzing,
        }
    }
}

impl Default for ConfidenceMetric {
    fn default() -> Self {
        Self::initial()
    }
}

/// Apply the deduction table. Result is clamped to [0, 100].
pub fn score_for(pause_count: u32, words_per_minute: f64, config: &ScoringConfig) -> u8 {
    let mut score: i32 = 100;
    if pause_count > config.pause_limit {
        score -= config.pause_penalty as i32;
    }
    if words_per_minute < config.slow_wpm {
        score -= config.slow_penalty as i32;
    }
    if words_per_minute > config.fast_wpm {
        score -= config.fast_penalty as i32;
    }
    score.clamp(0, 100) as u8
}

pub fn bucket_for(score: u8, config: &ScoringConfig) -> ConfidenceBucket {
    if score >= config.confident_cutoff {
        ConfidenceBucket::Confident
    } else if score >= config.moderate_cutoff {
        ConfidenceBucket::Moderate
    } else {
        ConfidenceBucket::Low
    }
}

/// Whitespace-delimited word count; empty tokens excluded.
#[inline]
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Incremental confidence metrics for one session.
pub struct ConfidenceScorer {
    config: ScoringConfig,
    session_start_ms: u64,
    last_timestamp_ms: u64,
    pause_count: u32,
    transcript: String,
    metric: ConfidenceMetric,
}

impl ConfidenceScorer {
    pub fn new(config: ScoringConfig, session_start_ms: u64) -> Self {
        Self {
            config,
            session_start_ms,
            last_timestamp_ms: session_start_ms,
            pause_count: 0,
            transcript: String::new(),
            metric: ConfidenceMetric::initial(),
        }
    }

    /// Fold a fragment into the running metrics and return the current metric.
    /// When no time has elapsed since session start the score is not
    /// recomputed and the previous metric is returned unchanged.
    pub fn ingest(
        &mut self,
        fragment: &TranscriptFragment,
    ) -> Result<ConfidenceMetric, FragmentError> {
        if fragment.timestamp_ms < self.last_timestamp_ms {
            return Err(FragmentError::OutOfOrder {
                timestamp_ms: fragment.timestamp_ms,
                last_ms: self.last_timestamp_ms,
            });
        }

        let gap = fragment.timestamp_ms - self.last_timestamp_ms;
        if gap > self.config.pause_gap_ms {
            self.pause_count += 1;
        }
        self.last_timestamp_ms = fragment.timestamp_ms;

        match fragment.kind {
            FragmentKind::Cumulative => {
                self.transcript.clear();
                self.transcript.push_str(&fragment.text);
            }
            FragmentKind::Incremental => {
                if !self.transcript.is_empty() {
                    self.transcript.push(' ');
                }
                self.transcript.push_str(&fragment.text);
            }
        }

        let elapsed_ms = fragment.timestamp_ms.saturating_sub(self.session_start_ms);
        if elapsed_ms == 0 {
            debug!(pause_count = self.pause_count, "zero elapsed time, score retained");
            return Ok(self.metric.clone());
        }

        let elapsed_minutes = elapsed_ms as f64 / 60_000.0;
        let words = count_words(&self.transcript);
        let words_per_minute = words as f64 / elapsed_minutes;
        let score = score_for(self.pause_count, words_per_minute, &self.config);

        self.metric = ConfidenceMetric {
            pause_count: self.pause_count,
            words_per_minute,
            score,
            bucket: bucket_for(score, &self.config),
        };
        Ok(self.metric.clone())
    }

    pub fn metric(&self) -> &ConfidenceMetric {
        &self.metric
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn session_start_ms(&self) -> u64 {
        self.session_start_ms
    }

    /// Timestamp of the newest accepted fragment, or the session start.
    pub fn last_timestamp_ms(&self) -> u64 {
        self.last_timestamp_ms
    }

    /// Back to the session-start state, anchored at `session_start_ms`.
    pub fn reset(&mut self, session_start_ms: u64) {
        self.session_start_ms = session_start_ms;
        self.last_timestamp_ms = session_start_ms;
        self.pause_count = 0;
        self.transcript.clear();
        self.metric = ConfidenceMetric::initial();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn many_pauses_and_fast_speech_is_moderate() {
        let config = ScoringConfig::default();
        let score = score_for(4, 250.0, &config);
        assert_eq!(score, 70);
        assert_eq!(bucket_for(score, &config), ConfidenceBucket::Moderate);
    }

    #[test]
    fn slow_speech_over_one_minute_is_confident_at_boundary() {
        let mut scorer = ConfidenceScorer::new(ScoringConfig::default(), 0);
        // keep gaps under 2s so no pauses are counted
        let mut metric = ConfidenceMetric::initial();
        for step in 1..=30u64 {
            metric = scorer
                .ingest(&TranscriptFragment::cumulative(step * 2_000, words(step as usize)))
                .unwrap();
        }
        assert_eq!(metric.pause_count, 0);
        assert!((metric.words_per_minute - 30.0).abs() < 1e-9);
        assert_eq!(metric.score, 80);
        assert_eq!(metric.bucket, ConfidenceBucket::Confident);
    }

    #[test]
    fn zero_elapsed_retains_metric() {
        let mut scorer = ConfidenceScorer::new(ScoringConfig::default(), 5_000);
        let metric = scorer
            .ingest(&TranscriptFragment::cumulative(5_000, "hello there"))
            .unwrap();
        assert_eq!(metric, ConfidenceMetric::initial());
        assert_eq!(scorer.transcript(), "hello there");
    }

    #[test]
    fn gaps_over_two_seconds_count_as_pauses() {
        let mut scorer = ConfidenceScorer::new(ScoringConfig::default(), 0);
        scorer.ingest(&TranscriptFragment::incremental(2_000, "a")).unwrap();
        let m = scorer.ingest(&TranscriptFragment::incremental(4_001, "b")).unwrap();
        assert_eq!(m.pause_count, 1);
        let m = scorer.ingest(&TranscriptFragment::incremental(6_001, "c")).unwrap();
        assert_eq!(m.pause_count, 1);
        assert_eq!(scorer.transcript(), "a b c");
    }

    #[test]
    fn empty_fragment_still_tracks_pauses() {
        let mut scorer = ConfidenceScorer::new(ScoringConfig::default(), 0);
        let m = scorer.ingest(&TranscriptFragment::incremental(10_000, "")).unwrap();
        assert_eq!(m.pause_count, 1);
        assert_eq!(m.words_per_minute, 0.0);
        // slow only: 100 - 20
        assert_eq!(m.score, 80);
    }

    #[test]
    fn hesitant_slow_speech_is_low() {
        let mut scorer = ConfidenceScorer::new(ScoringConfig::default(), 0);
        let mut metric = ConfidenceMetric::initial();
        for i in 1..=4u64 {
            metric = scorer
                .ingest(&TranscriptFragment::cumulative(i * 5_000, words(i as usize)))
                .unwrap();
        }
        assert_eq!(metric.pause_count, 4);
        assert_eq!(metric.score, 60);

        let metric = scorer
            .ingest(&TranscriptFragment::cumulative(30_000, words(5)))
            .unwrap();
        assert_eq!(metric.pause_count, 5);
        assert_eq!(metric.bucket, ConfidenceBucket::Moderate);

        let strict = ScoringConfig {
            moderate_cutoff: 70,
            ..ScoringConfig::default()
        };
        assert_eq!(bucket_for(metric.score, &strict), ConfidenceBucket::Low);
    }

    #[test]
    fn score_never_negative() {
        let config = ScoringConfig {
            pause_penalty: 60,
            slow_penalty: 60,
            ..ScoringConfig::default()
        };
        assert_eq!(score_for(10, 10.0, &config), 0);
    }

    #[test]
    fn out_of_order_fragment_is_rejected_without_state_change() {
        let mut scorer = ConfidenceScorer::new(ScoringConfig::default(), 0);
        let before = scorer
            .ingest(&TranscriptFragment::cumulative(3_000, "one two"))
            .unwrap();
        let err = scorer
            .ingest(&TranscriptFragment::cumulative(1_000, "late"))
            .unwrap_err();
        assert!(matches!(err, FragmentError::OutOfOrder { .. }));
        assert_eq!(scorer.metric(), &before);
        assert_eq!(scorer.transcript(), "one two");
    }

    #[test]
    fn word_count_ignores_extra_whitespace() {
        assert_eq!(count_words("  hello   world \n again "), 3);
        assert_eq!(count_words(""), 0);
    }

    #[test]
    fn reset_restores_initial_metric() {
        let mut scorer = ConfidenceScorer::new(ScoringConfig::default(), 0);
        scorer.ingest(&TranscriptFragment::cumulative(9_000, "x y z")).unwrap();
        scorer.reset(20_000);
        assert_eq!(scorer.metric(), &ConfidenceMetric::initial());
        assert_eq!(scorer.transcript(), "");
        assert_eq!(scorer.session_start_ms(), 20_000);
    }
}
