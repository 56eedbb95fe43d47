//! Turn selection: decides which agent speaks next, or that the session is over.
//!
//! The selector is a pure function of the turn history. The only state it
//! derives is the revision counter, recomputed from earlier quality verdicts.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::stage::{Stage, Transition};

/// Who produced a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Speaker {
    /// The initial brief handed to the team.
    Task,
    /// One of the five workflow agents.
    Agent(Stage),
    /// A speaker name that does not belong to the team.
    Unknown(String),
}

impl Speaker {
    /// Resolve a raw speaker name, as recorded by an external chat driver.
    pub fn from_name(name: &str) -> Self {
        match name {
            "user" | "task" => Speaker::Task,
            other => Stage::from_agent_name(other)
                .map(Speaker::Agent)
                .unwrap_or_else(|| Speaker::Unknown(other.to_string())),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Speaker::Task => "task",
            Speaker::Agent(stage) => stage.agent_name(),
            Speaker::Unknown(name) => name,
        }
    }
}

/// One entry in the session history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub content: String,
    /// Zero-based position in the history.
    pub ordinal: usize,
}

impl Turn {
    pub fn new(speaker: Speaker, content: impl Into<String>, ordinal: usize) -> Self {
        Self {
            speaker,
            content: content.into(),
            ordinal,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self.speaker {
            Speaker::Agent(stage) => Some(stage),
            _ => None,
        }
    }
}

const PASS_MARKERS: [&str; 2] = ["[PASS]", "【通过】"];
const FAIL_MARKERS: [&str; 4] = ["[FAIL]", "NEEDS REVISION", "不通过", "需要修改"];
const FINAL_SCRIPT_MARKERS: [&str; 3] = ["[FINAL SCRIPT]", "【最终脚本】", "最终脚本"];

/// The quality controller's decision, read from its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass { final_script: bool },
    Fail,
    Undecided,
}

impl Verdict {
    /// Verdict markers are only read before the final-script marker, so the
    /// script body cannot overturn them. A pass together with a final script
    /// approves even when the review also asks for changes.
    pub fn parse(content: &str) -> Self {
        let upper = content.to_uppercase();
        let review = match final_script_offset(&upper) {
            Some(pos) => &upper[..pos],
            None => upper.as_str(),
        };
        let final_script = review.len() < upper.len();

        let failed = FAIL_MARKERS.iter().any(|m| review.contains(m));
        let passed = PASS_MARKERS.iter().any(|m| review.contains(m))
            || (review.contains("通过") && !review.contains("不通过"));

        match (passed, failed) {
            (true, _) if final_script => Verdict::Pass { final_script },
            (_, true) => Verdict::Fail,
            (true, false) => Verdict::Pass { final_script },
            (false, false) => Verdict::Undecided,
        }
    }
}

/// Byte offset of the earliest final-script marker in upper-cased text.
fn final_script_offset(upper: &str) -> Option<usize> {
    FINAL_SCRIPT_MARKERS
        .iter()
        .filter_map(|marker| upper.find(marker))
        .min()
}

/// Text following the final-script marker, if the message carries one.
pub fn extract_final_script(content: &str) -> Option<String> {
    let upper = content.to_uppercase();
    FINAL_SCRIPT_MARKERS.iter().find_map(|marker| {
        // Upper-casing can change byte lengths outside ASCII; only trust the
        // offset when it lands on the same marker in the original text.
        let pos = upper.find(marker)?;
        let end = pos + marker.len();
        let original = content.get(pos..end)?;
        if !original.eq_ignore_ascii_case(marker) {
            return None;
        }
        let script = content[end..].trim_start_matches([':', '：']).trim();
        (!script.is_empty()).then(|| script.to_string())
    })
}

/// Completed revision cycles, saturating at [`RevisionCounter::MAX`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RevisionCounter(u8);

impl RevisionCounter {
    pub const MAX: u8 = 3;

    pub fn new(count: u8) -> Self {
        Self(count.min(Self::MAX))
    }

    /// Count the failed reviews already in `history`.
    pub fn from_history(history: &[Turn]) -> Self {
        let failures = history
            .iter()
            .filter(|turn| turn.stage() == Some(Stage::QualityControl))
            .filter(|turn| Verdict::parse(&turn.content) == Verdict::Fail)
            .count();
        Self::new(u8::try_from(failures).unwrap_or(Self::MAX))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_exhausted(self) -> bool {
        self.0 >= Self::MAX
    }

    #[must_use]
    pub fn increment(self) -> Self {
        Self::new(self.0.saturating_add(1))
    }
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Outcome {
    /// Quality control passed the draft and emitted the final script.
    Approved,
    /// Review kept failing; the latest draft is used as a best effort.
    RevisionCapReached,
    /// Quality control spoke without a usable verdict.
    Unresolved,
    /// The session hit its turn limit.
    TurnLimitReached,
    /// An agent emitted the done sentinel.
    DoneSignalled,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        matches!(self, Outcome::Approved | Outcome::DoneSignalled)
    }

    pub fn description(self) -> &'static str {
        match self {
            Outcome::Approved => "approved by quality control",
            Outcome::RevisionCapReached => "revision limit reached, best-effort script",
            Outcome::Unresolved => "quality control gave no verdict",
            Outcome::TurnLimitReached => "turn limit reached",
            Outcome::DoneSignalled => "done signal received",
        }
    }
}

/// The selector's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Speak(Stage),
    Finish(Outcome),
}

/// Pick the next speaker from the full history.
pub fn select_next(history: &[Turn]) -> Selection {
    let Some(last_idx) = history
        .iter()
        .rposition(|turn| turn.speaker != Speaker::Task)
    else {
        return Selection::Speak(Stage::FIRST);
    };

    let last = &history[last_idx];
    match &last.speaker {
        Speaker::Agent(stage) => {
            let revisions = RevisionCounter::from_history(&history[..last_idx]);
            transition(*stage, &last.content, revisions)
        }
        Speaker::Unknown(name) => {
            warn!(speaker = %name, "unrecognised speaker in history, restarting workflow");
            Selection::Speak(Stage::FIRST)
        }
        Speaker::Task => Selection::Speak(Stage::FIRST),
    }
}

/// Decide what follows `stage` given its message and the revisions so far.
pub fn transition(stage: Stage, content: &str, revisions: RevisionCounter) -> Selection {
    match stage.transition() {
        Transition::Advance(next) => Selection::Speak(next),
        Transition::Review => match Verdict::parse(content) {
            Verdict::Pass { final_script: true } => {
                info!(revisions = revisions.get(), "quality review passed");
                Selection::Finish(Outcome::Approved)
            }
            Verdict::Fail if revisions.is_exhausted() => {
                warn!(
                    max = RevisionCounter::MAX,
                    "revision limit reached, finishing with latest draft"
                );
                Selection::Finish(Outcome::RevisionCapReached)
            }
            Verdict::Fail => {
                info!(
                    cycle = revisions.increment().get(),
                    "quality review failed, sending draft back"
                );
                Selection::Speak(Stage::REVISION_ENTRY)
            }
            Verdict::Pass { final_script: false } | Verdict::Undecided => {
                Selection::Finish(Outcome::Unresolved)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(entries: &[(Speaker, &str)]) -> Vec<Turn> {
        entries
            .iter()
            .enumerate()
            .map(|(i, (speaker, content))| Turn::new(speaker.clone(), *content, i))
            .collect()
    }

    fn first_pass() -> Vec<(Speaker, &'static str)> {
        vec![
            (Speaker::Task, "Write a set about airports."),
            (Speaker::Agent(Stage::Strategy), "Observational angle."),
            (Speaker::Agent(Stage::AudienceAnalysis), "Frequent flyers."),
            (Speaker::Agent(Stage::ContentCreation), "Draft one."),
            (Speaker::Agent(Stage::PerformanceDesign), "Marked draft one."),
        ]
    }

    #[test]
    fn test_empty_history_starts_with_strategy() {
        assert_eq!(select_next(&[]), Selection::Speak(Stage::Strategy));
        let only_task = history(&[(Speaker::Task, "topic")]);
        assert_eq!(select_next(&only_task), Selection::Speak(Stage::Strategy));
    }

    #[test]
    fn test_linear_advance() {
        let mut entries = first_pass();
        entries.truncate(3);
        assert_eq!(
            select_next(&history(&entries)),
            Selection::Speak(Stage::ContentCreation)
        );
    }

    #[test]
    fn test_fail_below_cap_returns_to_content_creation() {
        for prior_failures in 0..RevisionCounter::MAX {
            let mut entries = first_pass();
            for _ in 0..prior_failures {
                entries.push((Speaker::Agent(Stage::QualityControl), "[FAIL] weak tag"));
                entries.push((Speaker::Agent(Stage::ContentCreation), "Redraft."));
                entries.push((Speaker::Agent(Stage::PerformanceDesign), "Marked redraft."));
            }
            entries.push((Speaker::Agent(Stage::QualityControl), "[FAIL] still flat"));
            assert_eq!(
                select_next(&history(&entries)),
                Selection::Speak(Stage::ContentCreation),
                "prior failures: {prior_failures}"
            );
        }
    }

    #[test]
    fn test_fail_at_cap_terminates() {
        let mut entries = first_pass();
        for _ in 0..3 {
            entries.push((Speaker::Agent(Stage::QualityControl), "Needs revision."));
            entries.push((Speaker::Agent(Stage::ContentCreation), "Redraft."));
            entries.push((Speaker::Agent(Stage::PerformanceDesign), "Marked redraft."));
        }
        entries.push((Speaker::Agent(Stage::QualityControl), "[FAIL] give up"));
        let turns = history(&entries);
        assert!(RevisionCounter::from_history(&turns[..turns.len() - 1]).is_exhausted());
        assert_eq!(
            select_next(&turns),
            Selection::Finish(Outcome::RevisionCapReached)
        );
    }

    #[test]
    fn test_transition_with_explicit_counter() {
        assert_eq!(
            transition(Stage::QualityControl, "[FAIL]", RevisionCounter::new(2)),
            Selection::Speak(Stage::ContentCreation)
        );
        assert_eq!(
            transition(Stage::QualityControl, "[FAIL]", RevisionCounter::new(3)),
            Selection::Finish(Outcome::RevisionCapReached)
        );
    }

    #[test]
    fn test_pass_with_final_script_approves() {
        let mut entries = first_pass();
        entries.push((
            Speaker::Agent(Stage::QualityControl),
            "[PASS] Score 42/50.\n[FINAL SCRIPT]\nSo I was at the airport...",
        ));
        assert_eq!(
            select_next(&history(&entries)),
            Selection::Finish(Outcome::Approved)
        );
    }

    #[test]
    fn test_pass_without_final_script_is_unresolved() {
        let mut entries = first_pass();
        entries.push((Speaker::Agent(Stage::QualityControl), "[PASS] looks good"));
        assert_eq!(
            select_next(&history(&entries)),
            Selection::Finish(Outcome::Unresolved)
        );
    }

    #[test]
    fn test_unknown_speaker_restarts() {
        let mut entries = first_pass();
        entries.push((Speaker::from_name("Moderator"), "hello"));
        assert_eq!(
            select_next(&history(&entries)),
            Selection::Speak(Stage::Strategy)
        );
    }

    #[test]
    fn test_verdict_markers() {
        assert_eq!(
            Verdict::parse("【通过】\n【最终脚本】内容"),
            Verdict::Pass { final_script: true }
        );
        assert_eq!(Verdict::parse("不通过，需要修改"), Verdict::Fail);
        assert_eq!(Verdict::parse("[pass] [fail]"), Verdict::Fail);
        assert_eq!(Verdict::parse("Solid work overall."), Verdict::Undecided);
    }

    #[test]
    fn test_script_body_cannot_overturn_a_pass() {
        let approved = "[PASS] 44/50\n[FINAL SCRIPT]\nMy doctor says my whole diet needs revision.";
        assert_eq!(Verdict::parse(approved), Verdict::Pass { final_script: true });
        assert_eq!(
            Verdict::parse("【通过】\n【最终脚本】\n我妈说我的人生需要修改。"),
            Verdict::Pass { final_script: true }
        );
        assert_eq!(
            transition(Stage::QualityControl, approved, RevisionCounter::new(0)),
            Selection::Finish(Outcome::Approved)
        );
    }

    #[test]
    fn test_unbracketed_chinese_markers() {
        assert_eq!(
            Verdict::parse("评估通过。\n最终脚本：\n开场白。"),
            Verdict::Pass { final_script: true }
        );
        assert_eq!(
            extract_final_script("评估通过。\n最终脚本：\n开场白。").as_deref(),
            Some("开场白。")
        );
        assert_eq!(Verdict::parse("评估不通过"), Verdict::Fail);
        assert_eq!(Verdict::parse("[PASS] but this needs revision"), Verdict::Fail);
    }

    #[test]
    fn test_revision_counter_saturates() {
        let counter = RevisionCounter::new(2).increment().increment();
        assert_eq!(counter.get(), RevisionCounter::MAX);
        assert!(counter.is_exhausted());
        assert_eq!(RevisionCounter::new(9).get(), RevisionCounter::MAX);
    }

    #[test]
    fn test_extract_final_script() {
        let content = "[PASS] 44/50\n[Final Script]\nOpening line. Closing line.";
        assert_eq!(
            extract_final_script(content).as_deref(),
            Some("Opening line. Closing line.")
        );
        assert_eq!(extract_final_script("[PASS] no script"), None);
    }
}
