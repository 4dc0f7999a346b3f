//! comfortkit-replay: drive a session from a JSON-lines script and print the
//! resulting events and effect requests as JSON lines on stdout.
//!
//! Script lines are tagged by `action`:
//!   {"action":"start","timestamp_ms":0,"kit":{...},"transcript":false}
//!   {"action":"expression","timestamp_ms":2000,"expressions":{"neutral":0.2,...}}
//!   {"action":"transcript","timestamp_ms":2500,"text":"hello","kind":"incremental"}
//!   {"action":"reset"} {"action":"override","mode":{"stress_relief":"breathing"}}
//!   {"action":"tick"} {"action":"pop","id":3} {"action":"toggle_music"}
//!   {"action":"next_affirmation"} {"action":"save_kit","kit":{...}} {"action":"stop"}

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use serde::Deserialize;
use tracing::{error, info, warn};

use comfortkit::confidence::FragmentKind;
use comfortkit::dispatch::ChannelEffectSink;
use comfortkit::profile::{load_profile, save_profile, ProfileStore, SqliteProfileStore};
use comfortkit::{
    Capabilities, ComfortKitConfig, EffectRequest, FusionConfig, OverrideMode, RawExpression,
    Session, SessionEvent, TranscriptFragment,
};

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Step {
    Start {
        #[serde(default)]
        timestamp_ms: u64,
        #[serde(default)]
        kit: Option<ComfortKitConfig>,
        #[serde(default = "enabled")]
        expression: bool,
        #[serde(default = "enabled")]
        transcript: bool,
    },
    Expression(RawExpression),
    Transcript {
        timestamp_ms: u64,
        #[serde(default)]
        text: String,
        #[serde(default)]
        kind: FragmentKind,
    },
    Reset,
    Override {
        mode: OverrideMode,
    },
    Tick,
    Pop {
        id: u64,
    },
    ToggleMusic,
    NextAffirmation,
    SaveKit {
        kit: ComfortKitConfig,
    },
    Stop,
}

fn enabled() -> bool {
    true
}

fn main() {
    comfortkit::init_tracing();

    let Some(script) = std::env::args().nth(1) else {
        eprintln!("usage: comfortkit-replay <script.jsonl>");
        std::process::exit(2);
    };

    let config = match std::env::var("COMFORTKIT_CONFIG") {
        Ok(path) => match FusionConfig::load_from_file(Path::new(&path)) {
            Ok(config) => {
                info!(path = %path, "config loaded");
                config
            }
            Err(e) => {
                warn!(path = %path, error = %e, "config load failed, using defaults");
                FusionConfig::default()
            }
        },
        Err(_) => FusionConfig::default(),
    };

    let profile: Option<Box<dyn ProfileStore>> = match std::env::var("COMFORTKIT_PROFILE_DB") {
        Ok(path) => match SqliteProfileStore::open(Path::new(&path)) {
            Ok(store) => Some(Box::new(store)),
            Err(e) => {
                warn!(path = %path, error = %e, "profile store unavailable");
                None
            }
        },
        Err(_) => None,
    };

    if let Err(e) = replay(Path::new(&script), config, profile.as_deref()) {
        error!(script = %script, error = %e, "replay failed");
        std::process::exit(1);
    }
}

fn replay(
    script: &Path,
    config: FusionConfig,
    profile: Option<&dyn ProfileStore>,
) -> std::io::Result<()> {
    let reader = BufReader::new(std::fs::File::open(script)?);
    let (sink, effects) = ChannelEffectSink::new();
    let session = Session::new(config, Arc::new(sink));
    let events = session.subscribe();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let step: Step = match serde_json::from_str(line) {
            Ok(step) => step,
            Err(e) => {
                warn!(line = lineno + 1, error = %e, "unreadable script line skipped");
                continue;
            }
        };
        apply(&session, step, profile);

        flush(&mut out, &events, &effects)?;
    }

    if session.is_running() {
        session.stop_session();
        flush(&mut out, &events, &effects)?;
    }
    info!(
        latencies = ?session.metrics_summary(),
        counters = ?session.metrics().counters(),
        "replay finished"
    );
    Ok(())
}

/// Print everything the last step produced: events first, then effects.
fn flush(
    out: &mut impl Write,
    events: &Receiver<SessionEvent>,
    effects: &Receiver<EffectRequest>,
) -> std::io::Result<()> {
    for event in events.try_iter() {
        writeln!(out, "{}", serde_json::to_string(&event)?)?;
    }
    for effect in effects.try_iter() {
        writeln!(out, "{}", serde_json::to_string(&effect)?)?;
    }
    Ok(())
}

fn apply(session: &Arc<Session>, step: Step, profile: Option<&dyn ProfileStore>) {
    match step {
        Step::Start {
            timestamp_ms,
            kit,
            expression,
            transcript,
        } => {
            let kit = kit
                .or_else(|| profile.and_then(load_profile))
                .unwrap_or_default();
            session.start_session_with(
                kit,
                Capabilities {
                    expression,
                    transcript,
                },
                timestamp_ms,
            );
        }
        Step::Expression(raw) => {
            session.ingest_expression(&raw);
        }
        Step::Transcript {
            timestamp_ms,
            text,
            kind,
        } => {
            session.ingest_transcript(&TranscriptFragment {
                timestamp_ms,
                text,
                kind,
            });
        }
        Step::Reset => {
            session.reset();
        }
        Step::Override { mode } => session.set_override(mode),
        Step::Tick => {
            session.advance_relief();
        }
        Step::Pop { id } => {
            session.pop_bubble(id);
        }
        Step::ToggleMusic => {
            session.toggle_music();
        }
        Step::NextAffirmation => {
            session.advance_affirmation();
        }
        Step::SaveKit { kit } => match profile {
            Some(store) => {
                if let Err(e) = save_profile(store, &kit) {
                    warn!(error = %e, "comfort kit save failed");
                }
            }
            None => warn!("no profile store configured, save ignored"),
        },
        Step::Stop => session.stop_session(),
    }
}
