//! Per-segment synthesis controls: speed, laugh and pause levels plus the
//! gap that follows each segment.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::llm::ModelHandle;
use crate::speech::types::{
    PauseReason, ProsodyInstruction, Refined, SegmentControl, SegmentRole, clamp_or,
};

const RHYTHM_PROMPT: &str = "You are a stand-up comedy rhythm coach. For every numbered line \
below, score how it should be delivered. Reply with a JSON array only, one object per line in \
the same order, each with: laugh_level (0 none, 1 light, 2 big laugh), speed_level (1 very \
slow to 5 very fast), pause_level (1 continuous to 5 many pauses), end_pause_sec (silence after \
the line, 0.5 to 2.0 seconds). Build-ups are calmer, punchlines are tighter and followed by \
longer pauses.";

/// Loose shape of one model-scored entry; missing fields keep the heuristic value.
#[derive(Debug, Deserialize)]
struct ScoredControl {
    laugh_level: Option<f64>,
    speed_level: Option<f64>,
    pause_level: Option<f64>,
    end_pause_sec: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RhythmController;

impl RhythmController {
    pub fn new() -> Self {
        Self
    }

    /// Controls for every instruction, scored by `model` when given.
    pub async fn controls(
        &self,
        plan: &[ProsodyInstruction],
        model: Option<&ModelHandle>,
    ) -> Refined<Vec<SegmentControl>> {
        let heuristic = self.heuristic(plan);
        let Some(model) = model else {
            return Refined::heuristic(heuristic);
        };
        if plan.is_empty() {
            return Refined::heuristic(heuristic);
        }

        match score_with_model(model, plan, &heuristic).await {
            Ok(controls) => Refined::Model(controls),
            Err(reason) => {
                warn!(%reason, "rhythm scoring failed, using prosody-derived controls");
                Refined::fallback(heuristic, reason)
            }
        }
    }

    /// Controls derived from the prosody plan alone.
    pub fn heuristic(&self, plan: &[ProsodyInstruction]) -> Vec<SegmentControl> {
        let lead_in = dropped_lead_in(plan);
        if lead_in > 0.0 {
            debug!(
                secs = lead_in,
                "no silence precedes the first segment, pause marker ignored"
            );
        }

        plan.iter()
            .enumerate()
            .map(|(idx, instruction)| {
                let after: f32 = instruction.pauses_after.iter().map(|p| p.duration_secs).sum();
                let before_next: f32 = plan
                    .get(idx + 1)
                    .map(|next| next.pauses_before.iter().map(|p| p.duration_secs).sum())
                    .unwrap_or(0.0);

                SegmentControl {
                    speed_level: speed_level(instruction.speed_scale),
                    laugh_level: laugh_level(instruction),
                    pause_level: pause_level(&instruction.text),
                    end_pause_secs: Some(after + before_next),
                }
            })
            .collect()
    }
}

/// Marker pause requested before the first segment. Gaps only follow
/// segments, so this is never rendered.
fn dropped_lead_in(plan: &[ProsodyInstruction]) -> f32 {
    plan.first()
        .map(|first| {
            first
                .pauses_before
                .iter()
                .filter(|p| p.reason == PauseReason::Custom)
                .map(|p| p.duration_secs)
                .sum()
        })
        .unwrap_or(0.0)
}

fn speed_level(scale: f32) -> u8 {
    match scale {
        s if s < 0.8 => 1,
        s if s < 0.9 => 2,
        s if s < 0.97 => 3,
        s if s < 1.08 => 4,
        _ => 5,
    }
}

fn laugh_level(instruction: &ProsodyInstruction) -> u8 {
    if !instruction.text.contains("[laugh]") {
        0
    } else if instruction.role == SegmentRole::Punchline {
        2
    } else {
        1
    }
}

fn pause_level(text: &str) -> u8 {
    let breaks = text.matches("[uv_break]").count() + text.matches("[lbreak]").count();
    (3 + breaks).min(5) as u8
}

fn level(value: Option<f64>, lo: u8, hi: u8, fallback: u8) -> u8 {
    match value {
        Some(v) if v.is_finite() => v.round().clamp(lo as f64, hi as f64) as u8,
        _ => fallback,
    }
}

/// Pull the JSON array out of a reply that may wrap it in prose or fences.
fn json_array(reply: &str) -> Option<&str> {
    let start = reply.find('[')?;
    let end = reply.rfind(']')?;
    (end > start).then(|| &reply[start..=end])
}

async fn score_with_model(
    model: &ModelHandle,
    plan: &[ProsodyInstruction],
    heuristic: &[SegmentControl],
) -> Result<Vec<SegmentControl>, String> {
    let numbered = plan
        .iter()
        .enumerate()
        .map(|(idx, instruction)| format!("{}. {}", idx + 1, instruction.text))
        .collect::<Vec<_>>()
        .join("\n");

    let reply = model
        .ask(RHYTHM_PROMPT, &numbered, Some(0.2))
        .await
        .map_err(|e| e.to_string())?;

    let array = json_array(&reply).ok_or_else(|| "reply contains no JSON array".to_string())?;
    let scored: Vec<ScoredControl> =
        serde_json::from_str(array).map_err(|e| format!("invalid rhythm JSON: {}", e))?;

    if scored.len() != plan.len() {
        return Err(format!(
            "rhythm scoring returned {} entries for {} segments",
            scored.len(),
            plan.len()
        ));
    }

    debug!(segments = scored.len(), "rhythm scored by model");
    Ok(scored
        .into_iter()
        .zip(heuristic)
        .map(|(entry, base)| SegmentControl {
            laugh_level: level(entry.laugh_level, 0, 2, base.laugh_level),
            speed_level: level(entry.speed_level, 1, 5, base.speed_level),
            pause_level: level(entry.pause_level, 1, 5, base.pause_level),
            end_pause_secs: entry
                .end_pause_sec
                .map(|secs| clamp_or(secs as f32, 0.5, 2.0, 0.8))
                .or(base.end_pause_secs),
        })
        .collect())
}
