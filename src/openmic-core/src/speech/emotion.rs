//! Emotion profile assignment.

use tracing::debug;

use crate::speech::types::{EmotionPlan, EmotionProfile, Segment, SegmentRole};

pub const DEFAULT_PROFILE: &str = "flat";

/// Built-in profiles: name, speed, pitch shift, energy, temperature.
const PROFILE_TABLE: [(&str, f32, f32, f32, f32); 4] = [
    ("flat", 1.0, 0.0, 1.0, 0.6),
    ("roast", 0.95, -0.5, 0.9, 0.55),
    ("excited", 1.05, 1.0, 1.1, 0.75),
    ("deadpan", 0.9, -1.0, 0.85, 0.5),
];

/// Picks a profile per segment from a closed table.
#[derive(Debug, Clone)]
pub struct EmotionController {
    profiles: Vec<EmotionProfile>,
}

impl Default for EmotionController {
    fn default() -> Self {
        Self::new()
    }
}

impl EmotionController {
    pub fn new() -> Self {
        let profiles = PROFILE_TABLE
            .iter()
            .map(|&(name, speed, pitch, energy, temperature)| {
                EmotionProfile::new(name, speed, pitch, energy, temperature)
            })
            .collect();
        Self { profiles }
    }

    pub fn profile(&self, name: &str) -> Option<&EmotionProfile> {
        let name = name.trim();
        self.profiles
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn profile_names(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(|p| p.name.as_str())
    }

    /// Assign a profile to every segment.
    ///
    /// `preferred` selects the default profile; unknown names fall back to
    /// `flat`. A segment tone hint naming a known profile wins over the
    /// role-based adjustment.
    pub fn plan(&self, segments: &[Segment], preferred: Option<&str>) -> EmotionPlan {
        let default_profile = self.default_profile(preferred);

        let segment_profiles = segments
            .iter()
            .map(|segment| {
                let hinted = segment
                    .tone_hint
                    .as_deref()
                    .and_then(|hint| self.profile(hint));

                match hinted {
                    Some(profile) => profile.clone().clamped(),
                    None => adjust_for_role(&default_profile, segment.role).clamped(),
                }
            })
            .collect();

        EmotionPlan {
            default_profile,
            segment_profiles,
        }
    }

    fn default_profile(&self, preferred: Option<&str>) -> EmotionProfile {
        if let Some(name) = preferred {
            if let Some(profile) = self.profile(name) {
                return profile.clone();
            }
            debug!(profile = name, "unknown emotion profile, using {}", DEFAULT_PROFILE);
        }
        self.profile(DEFAULT_PROFILE)
            .cloned()
            .unwrap_or_else(|| EmotionProfile::new(DEFAULT_PROFILE, 1.0, 0.0, 1.0, 0.6))
    }
}

fn adjust_for_role(base: &EmotionProfile, role: SegmentRole) -> EmotionProfile {
    let mut profile = base.clone();
    match role {
        SegmentRole::Opening => {
            profile.speed_scale *= 0.95;
            profile.pitch_shift_semitones -= 0.2;
            profile.energy_scale *= 0.95;
        }
        SegmentRole::Punchline => {
            profile.speed_scale *= 1.02;
            profile.pitch_shift_semitones += 0.3;
            profile.energy_scale *= 1.05;
            profile.temperature += 0.05;
        }
        SegmentRole::Outro | SegmentRole::Generic => {}
    }
    profile
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    fn segments() -> Vec<Segment> {
        vec![
            Segment::new("Setup.", SegmentRole::Opening),
            Segment::new("Middle.", SegmentRole::Generic),
            Segment::new("Payoff!", SegmentRole::Punchline),
        ]
    }

    #[test]
    fn test_role_adjustments_on_default() {
        let plan = EmotionController::new().plan(&segments(), None);
        assert_eq!(plan.default_profile.name, "flat");

        let opening = &plan.segment_profiles[0];
        assert!(approx(opening.speed_scale, 0.95));
        assert!(approx(opening.pitch_shift_semitones, -0.2));
        assert!(approx(opening.energy_scale, 0.95));
        assert!(approx(opening.temperature, 0.6));

        assert_eq!(plan.segment_profiles[1], plan.default_profile);

        let punch = &plan.segment_profiles[2];
        assert!(approx(punch.speed_scale, 1.02));
        assert!(approx(punch.pitch_shift_semitones, 0.3));
        assert!(approx(punch.energy_scale, 1.05));
        assert!(approx(punch.temperature, 0.65));
    }

    #[test]
    fn test_preferred_profile_and_unknown_fallback() {
        let controller = EmotionController::new();
        let plan = controller.plan(&segments(), Some("Roast"));
        assert_eq!(plan.default_profile.name, "roast");
        assert!(approx(plan.segment_profiles[1].speed_scale, 0.95));

        let plan = controller.plan(&segments(), Some("melancholy"));
        assert_eq!(plan.default_profile.name, "flat");
    }

    #[test]
    fn test_tone_hint_overrides_role() {
        let mut segs = segments();
        segs[2].tone_hint = Some("deadpan".to_string());
        segs[0].tone_hint = Some("sarcastic".to_string());

        let plan = EmotionController::new().plan(&segs, Some("excited"));
        let punch = &plan.segment_profiles[2];
        assert_eq!(punch.name, "deadpan");
        assert!(approx(punch.speed_scale, 0.9));
        assert!(approx(punch.pitch_shift_semitones, -1.0));

        // Unknown hints fall through to the role adjustment.
        let opening = &plan.segment_profiles[0];
        assert_eq!(opening.name, "excited");
        assert!(approx(opening.speed_scale, 1.05 * 0.95));
    }

    #[test]
    fn test_one_profile_per_segment() {
        let plan = EmotionController::new().plan(&[], Some("flat"));
        assert!(plan.segment_profiles.is_empty());
        assert_eq!(
            EmotionController::new().profile_names().collect::<Vec<_>>(),
            vec!["flat", "roast", "excited", "deadpan"]
        );
    }
}
