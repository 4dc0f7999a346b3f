//! Intervention dispatch: comfort-kit preferences → declarative effect requests.
//! The core never plays audio or touches presentation itself; it hands
//! `EffectRequest` values to an `EffectSink`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::relief::affirmations::AffirmationRotator;
use crate::relief::bubbles::Bubble;
use crate::relief::pacer::PhaseName;
use crate::state_machine::ActivationEdge;

/// User-chosen comfort preferences. Each field is an option label as shown
/// in the configuration view; empty or absent means "not chosen".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComfortKitConfig {
    pub music: Option<String>,
    pub visual: Option<String>,
    pub activity: Option<String>,
    pub support: Option<String>,
    /// Free text, shown verbatim.
    pub anchor: Option<String>,
}

impl ComfortKitConfig {
    fn chosen(field: &Option<String>) -> Option<&str> {
        field.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn music(&self) -> Option<&str> {
        Self::chosen(&self.music)
    }

    pub fn visual(&self) -> Option<&str> {
        Self::chosen(&self.visual)
    }

    pub fn activity(&self) -> Option<&str> {
        Self::chosen(&self.activity)
    }

    pub fn support(&self) -> Option<&str> {
        Self::chosen(&self.support)
    }

    pub fn anchor(&self) -> Option<&str> {
        Self::chosen(&self.anchor)
    }

    pub fn is_empty(&self) -> bool {
        self.music().is_none()
            && self.visual().is_none()
            && self.activity().is_none()
            && self.support().is_none()
            && self.anchor().is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MusicTrack {
    SoftPiano,
    RainOcean,
    Uplifting,
}

impl MusicTrack {
    pub const ALL: [MusicTrack; 3] = [
        MusicTrack::SoftPiano,
        MusicTrack::RainOcean,
        MusicTrack::Uplifting,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MusicTrack::SoftPiano => "Soft piano or guitar",
            MusicTrack::RainOcean => "Rain / Ocean waves",
            MusicTrack::Uplifting => "Uplifting playlist",
        }
    }

    pub fn asset(self) -> &'static str {
        match self {
            MusicTrack::SoftPiano => "/sounds/piano.mp3",
            MusicTrack::RainOcean => "/sounds/rain.mp3",
            MusicTrack::Uplifting => "/sounds/uplift.mp3",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.label() == label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VisualTheme {
    Nature,
    Space,
    CozyRoom,
}

impl VisualTheme {
    pub const ALL: [VisualTheme; 3] = [
        VisualTheme::Nature,
        VisualTheme::Space,
        VisualTheme::CozyRoom,
    ];

    pub fn label(self) -> &'static str {
        match self {
            VisualTheme::Nature => "Nature (trees, water, sky)",
            VisualTheme::Space => "Space / Stars",
            VisualTheme::CozyRoom => "Cozy room vibes",
        }
    }

    pub fn asset(self) -> &'static str {
        match self {
            VisualTheme::Nature => "/visuals/nature.jpg",
            VisualTheme::Space => "/visuals/space.jpg",
            VisualTheme::CozyRoom => "/visuals/cozy.jpg",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.label() == label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activity {
    DrawingColoring,
    ReadingStory,
    GamesPuzzles,
    MeditationJournaling,
    /// Index-cycling affirmation list advanced by the user.
    RepeatAfterMe,
}

impl Activity {
    pub const ALL: [Activity; 5] = [
        Activity::DrawingColoring,
        Activity::ReadingStory,
        Activity::GamesPuzzles,
        Activity::MeditationJournaling,
        Activity::RepeatAfterMe,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Activity::DrawingColoring => "Drawing / Coloring",
            Activity::ReadingStory => "Reading / Story audio",
            Activity::GamesPuzzles => "Games / Puzzles",
            Activity::MeditationJournaling => "Meditation / Journaling",
            Activity::RepeatAfterMe => "Repeat after me",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Activity::DrawingColoring => "Grab some colors and draw something fun!",
            Activity::ReadingStory => "Relax with a story or audiobook.",
            Activity::GamesPuzzles => "Try a quick puzzle to relax your mind.",
            Activity::MeditationJournaling => "Time for a meditation or journaling break!",
            Activity::RepeatAfterMe => "Repeat after me:",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.label() == label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SupportTool {
    Breathing,
    Chatbot,
    Affirmations,
}

impl SupportTool {
    pub const ALL: [SupportTool; 3] = [
        SupportTool::Breathing,
        SupportTool::Chatbot,
        SupportTool::Affirmations,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SupportTool::Breathing => "Breathing exercise",
            SupportTool::Chatbot => "Comfort chatbot",
            SupportTool::Affirmations => "Affirmations / Quotes",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            SupportTool::Breathing => "Inhale deeply... exhale slowly... repeat 5 times.",
            SupportTool::Chatbot => "Talk to me anytime, I'm here to listen.",
            SupportTool::Affirmations => "Remember: You are stronger than you think!",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.label() == label)
    }
}

/// A declarative instruction for an external actuator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum EffectRequest {
    PlayAudio { asset: String, looped: bool },
    StopAudio,
    ApplyTheme { asset: String },
    ShowActivityPrompt { activity: Activity, message: String },
    ShowSupportPrompt { support: SupportTool, message: String },
    ShowAnchorReminder { text: String },
    ShowAffirmation { index: usize, text: String },
    ShowBreathingPhase { phase: PhaseName, seconds_remaining: u32 },
    SpawnBubble { bubble: Bubble },
    RemoveBubble { id: u64 },
    /// Tear down whatever the current override mode put on screen.
    ClearRelief,
}

/// Fire-and-forget consumer of effect requests.
pub trait EffectSink: Send + Sync {
    fn submit(&self, effect: EffectRequest);
}

/// Sink that forwards into a crossbeam channel (hosts read the receiver).
pub struct ChannelEffectSink {
    tx: crossbeam_channel::Sender<EffectRequest>,
}

impl ChannelEffectSink {
    pub fn new() -> (Self, crossbeam_channel::Receiver<EffectRequest>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl EffectSink for ChannelEffectSink {
    fn submit(&self, effect: EffectRequest) {
        if self.tx.send(effect).is_err() {
            debug!("effect receiver dropped, request discarded");
        }
    }
}

/// Sink that drops everything.
pub struct NullEffectSink;

impl EffectSink for NullEffectSink {
    fn submit(&self, _effect: EffectRequest) {}
}

/// Output of one dispatch: the effect requests, plus the affirmation rotator
/// when the Repeat-After-Me activity was chosen.
#[derive(Debug, Default)]
pub struct Dispatch {
    pub effects: Vec<EffectRequest>,
    pub rotator: Option<AffirmationRotator>,
}

/// Stateless translation of an activation edge into effect requests.
/// An `ActivationEdge` is only minted by `FusionTrigger::try_activate`, so
/// dispatch can only follow a real Idle → Activated transition.
pub struct Dispatcher;

impl Dispatcher {
    pub fn dispatch(config: &ComfortKitConfig, edge: ActivationEdge) -> Dispatch {
        let dispatch = build_effects(config);
        info!(
            reason = %edge.reason(),
            sequence = edge.sequence(),
            effects = dispatch.effects.len(),
            "intervention_dispatched"
        );
        dispatch
    }
}

/// Each field is evaluated independently; unknown labels skip their effect.
fn build_effects(config: &ComfortKitConfig) -> Dispatch {
    let mut out = Dispatch::default();

    if let Some(label) = config.music() {
        match MusicTrack::from_label(label) {
            Some(track) => out.effects.push(EffectRequest::PlayAudio {
                asset: track.asset().to_string(),
                looped: false,
            }),
            None => debug!(label, "unknown music label, skipped"),
        }
    }

    if let Some(label) = config.visual() {
        match VisualTheme::from_label(label) {
            Some(theme) => out.effects.push(EffectRequest::ApplyTheme {
                asset: theme.asset().to_string(),
            }),
            None => debug!(label, "unknown visual label, skipped"),
        }
    }

    if let Some(label) = config.activity() {
        match Activity::from_label(label) {
            Some(Activity::RepeatAfterMe) => {
                let rotator = AffirmationRotator::new();
                out.effects.push(EffectRequest::ShowActivityPrompt {
                    activity: Activity::RepeatAfterMe,
                    message: Activity::RepeatAfterMe.message().to_string(),
                });
                out.effects.push(rotator.current_effect());
                out.rotator = Some(rotator);
            }
            Some(activity) => out.effects.push(EffectRequest::ShowActivityPrompt {
                activity,
                message: activity.message().to_string(),
            }),
            None => debug!(label, "unknown activity label, skipped"),
        }
    }

    if let Some(label) = config.support() {
        match SupportTool::from_label(label) {
            Some(support) => out.effects.push(EffectRequest::ShowSupportPrompt {
                support,
                message: support.message().to_string(),
            }),
            None => debug!(label, "unknown support label, skipped"),
        }
    }

    if let Some(text) = config.anchor() {
        out.effects.push(EffectRequest::ShowAnchorReminder {
            text: format!("Anchor Reminder: {text}"),
        });
    }

    out
}
