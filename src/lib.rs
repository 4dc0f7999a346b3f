//! comfortkit: affective-state fusion and latched comfort-kit intervention.
//! Facial-expression samples and speech transcripts feed one trigger; the
//! first qualifying signal dispatches the user's comfort kit exactly once
//! until an explicit reset.

pub mod cancellation;
pub mod confidence;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod expression;
pub mod metrics;
pub mod profile;
pub mod relief;
pub mod session;
pub mod state_machine;

pub use confidence::{ConfidenceBucket, ConfidenceMetric, TranscriptFragment};
pub use config::FusionConfig;
pub use dispatch::{ComfortKitConfig, EffectRequest, EffectSink};
pub use events::SessionEvent;
pub use expression::{Emotion, ExpressionSample, RawExpression};
pub use relief::{OverrideMode, ReliefMode};
pub use session::{Capabilities, Session};
pub use state_machine::{ActivationReason, TriggerState};

/// Install the fmt subscriber. `RUST_LOG` overrides the default filter;
/// `COMFORTKIT_LOG_FORMAT=json` switches to JSON lines.
/// Returns false when a global subscriber was already set.
pub fn init_tracing() -> bool {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("comfortkit=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    let json = std::env::var("COMFORTKIT_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.is_ok()
}
