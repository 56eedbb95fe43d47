//! Data shared across the speech stages.

use serde::{Deserialize, Serialize};

/// Structural position of a segment in a bit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SegmentRole {
    /// Setup: the first segment of a multi-segment script.
    Opening,
    /// Payoff: the last segment.
    Punchline,
    Outro,
    #[default]
    Generic,
}

impl SegmentRole {
    /// Parse a role marker value. Also accepts the setup/punch spellings.
    pub fn from_marker(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "opening" | "setup" => Some(SegmentRole::Opening),
            "punchline" | "punch" => Some(SegmentRole::Punchline),
            "outro" => Some(SegmentRole::Outro),
            "generic" | "" => Some(SegmentRole::Generic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PauseReason {
    Opening,
    Punchline,
    PostPunchline,
    Comma,
    Period,
    Custom,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Pause {
    pub duration_secs: f32,
    pub reason: PauseReason,
}

impl Pause {
    pub fn new(duration_secs: f32, reason: PauseReason) -> Self {
        Self {
            duration_secs,
            reason,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stress {
    pub token: String,
    /// 1.0 is neutral; above 1.0 is stronger emphasis.
    pub strength: f32,
}

/// A clause or sentence of the script plus its delivery metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub text: String,
    pub role: SegmentRole,
    pub pauses_before: Vec<Pause>,
    pub pauses_after: Vec<Pause>,
    pub stresses: Vec<Stress>,
    pub tone_hint: Option<String>,
    pub speed_scale: Option<f32>,
}

impl Segment {
    pub fn new(text: impl Into<String>, role: SegmentRole) -> Self {
        Self {
            text: text.into(),
            role,
            ..Self::default()
        }
    }

    pub fn pause_before_secs(&self) -> f32 {
        self.pauses_before.iter().map(|p| p.duration_secs).sum()
    }

    pub fn pause_after_secs(&self) -> f32 {
        self.pauses_after.iter().map(|p| p.duration_secs).sum()
    }
}

/// Named bundle of delivery parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmotionProfile {
    pub name: String,
    pub speed_scale: f32,
    pub pitch_shift_semitones: f32,
    pub energy_scale: f32,
    pub temperature: f32,
}

impl EmotionProfile {
    pub fn new(
        name: impl Into<String>,
        speed_scale: f32,
        pitch_shift_semitones: f32,
        energy_scale: f32,
        temperature: f32,
    ) -> Self {
        Self {
            name: name.into(),
            speed_scale,
            pitch_shift_semitones,
            energy_scale,
            temperature,
        }
    }

    /// Clamp every parameter into the range synthesis backends accept.
    pub fn clamped(mut self) -> Self {
        self.speed_scale = clamp_or(self.speed_scale, 0.5, 2.0, 1.0);
        self.pitch_shift_semitones = clamp_or(self.pitch_shift_semitones, -12.0, 12.0, 0.0);
        self.energy_scale = clamp_or(self.energy_scale, 0.1, 2.0, 1.0);
        self.temperature = clamp_or(self.temperature, 0.05, 1.0, 0.7);
        self
    }
}

/// Per-segment profile assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionPlan {
    pub default_profile: EmotionProfile,
    pub segment_profiles: Vec<EmotionProfile>,
}

/// Resolved delivery parameters for one segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProsodyInstruction {
    pub text: String,
    pub role: SegmentRole,
    pub speed_scale: f32,
    pub pitch_shift_semitones: f32,
    pub energy_scale: f32,
    pub temperature: f32,
    pub pauses_before: Vec<Pause>,
    pub pauses_after: Vec<Pause>,
    pub stresses: Vec<Stress>,
}

/// Coarse controls handed to the synthesis backend and the concatenator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SegmentControl {
    /// 1 (very slow) to 5 (very fast).
    pub speed_level: u8,
    /// 0 (none) to 2 (heavy).
    pub laugh_level: u8,
    /// 1 (continuous) to 5 (many pauses).
    pub pause_level: u8,
    /// Silence after the segment. `None` falls back to the default gap.
    pub end_pause_secs: Option<f32>,
}

impl Default for SegmentControl {
    fn default() -> Self {
        Self {
            speed_level: 4,
            laugh_level: 0,
            pause_level: 3,
            end_pause_secs: None,
        }
    }
}

/// Result of a step that prefers the language model but can fall back to
/// heuristics. Callers can see which path produced the value.
#[derive(Debug, Clone, PartialEq)]
pub enum Refined<T> {
    Model(T),
    Heuristic {
        value: T,
        /// Why the model path was not used; `None` when it was disabled.
        fallback_reason: Option<String>,
    },
}

impl<T> Refined<T> {
    pub fn heuristic(value: T) -> Self {
        Refined::Heuristic {
            value,
            fallback_reason: None,
        }
    }

    pub fn fallback(value: T, reason: impl Into<String>) -> Self {
        Refined::Heuristic {
            value,
            fallback_reason: Some(reason.into()),
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Refined::Model(value) | Refined::Heuristic { value, .. } => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Refined::Model(value) | Refined::Heuristic { value, .. } => value,
        }
    }

    pub fn is_model(&self) -> bool {
        matches!(self, Refined::Model(_))
    }

    /// Reason the model path failed, if it was attempted and failed.
    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            Refined::Heuristic {
                fallback_reason: Some(reason),
                ..
            } => Some(reason),
            _ => None,
        }
    }
}

pub(crate) fn clamp_or(value: f32, lo: f32, hi: f32, default: f32) -> f32 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        default
    }
}
