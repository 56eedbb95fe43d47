//! Merges parsed segments with their emotion profiles.

use tracing::warn;

use crate::speech::types::{EmotionPlan, ProsodyInstruction, Segment, clamp_or};

#[derive(Debug, Clone, Copy, Default)]
pub struct ProsodyPlanner;

impl ProsodyPlanner {
    pub fn new() -> Self {
        Self
    }

    /// One instruction per segment. A segment's own speed override wins over
    /// its profile; segments without a profile use the plan default.
    pub fn build_plan(&self, segments: &[Segment], plan: &EmotionPlan) -> Vec<ProsodyInstruction> {
        if plan.segment_profiles.len() != segments.len() {
            warn!(
                segments = segments.len(),
                profiles = plan.segment_profiles.len(),
                "emotion plan does not cover every segment"
            );
        }

        segments
            .iter()
            .enumerate()
            .map(|(idx, segment)| {
                let profile = plan
                    .segment_profiles
                    .get(idx)
                    .unwrap_or(&plan.default_profile);

                let speed = segment
                    .speed_scale
                    .map(|s| clamp_or(s, 0.5, 2.0, profile.speed_scale))
                    .unwrap_or(profile.speed_scale);

                ProsodyInstruction {
                    text: segment.text.clone(),
                    role: segment.role,
                    speed_scale: speed,
                    pitch_shift_semitones: profile.pitch_shift_semitones,
                    energy_scale: profile.energy_scale,
                    temperature: profile.temperature,
                    pauses_before: segment.pauses_before.clone(),
                    pauses_after: segment.pauses_after.clone(),
                    stresses: segment.stresses.clone(),
                }
            })
            .collect()
    }
}
