//! Writing-session orchestration.
//!
//! Drives the five-agent team turn by turn, asking the selector who speaks
//! next, and keeps the shared transcript plus each agent's chat history.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::OpenMicError;
use crate::llm::{ChatMessage, CompletionRequest, LanguageModel};
use crate::progress::Progress;
use crate::prompts;
use crate::selector::{
    self, Outcome, RevisionCounter, Selection, Speaker, Turn, extract_final_script,
};
use crate::stage::{ComedyAgent, Stage};
use crate::style::ComedyBrief;

/// Text an agent can emit to stop the session immediately.
pub const DONE_SENTINEL: &str = "OPENMIC_DONE";

/// Settings for one writing session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub brief: ComedyBrief,
    /// Maximum number of agent turns.
    pub max_turns: usize,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl SessionConfig {
    pub fn new(brief: ComedyBrief) -> Self {
        Self {
            brief,
            max_turns: 25,
            max_tokens: 4096,
            temperature: 0.8,
        }
    }

    pub fn from_config(brief: ComedyBrief, config: &Config) -> Self {
        Self {
            brief,
            max_turns: config.workflow.max_turns,
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
        }
    }
}

/// Callback for session events.
pub type ComedyCallback = Box<dyn Fn(ComedyEvent) + Send + Sync>;

/// Events emitted during a session.
#[derive(Debug, Clone)]
pub enum ComedyEvent {
    /// An agent is about to speak.
    StageStart { stage: Stage, agent: String },
    /// An agent has finished speaking.
    AgentMessage { agent: String, content: String },
    /// Quality control sent the draft back.
    RevisionRequested { cycle: u8 },
    /// The session has concluded.
    SessionEnd { outcome: Outcome },
}

/// Everything a finished session produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComedyResult {
    pub brief: ComedyBrief,
    pub outcome: Outcome,
    /// The script to perform, if any draft was produced.
    pub script: Option<String>,
    pub strategy: Option<String>,
    pub audience_analysis: Option<String>,
    pub performance_notes: Option<String>,
    pub quality_report: Option<String>,
    pub revisions: u8,
    pub total_turns: usize,
    pub transcript: Vec<Turn>,
}

impl ComedyResult {
    /// Pull the stage outputs out of a transcript.
    pub fn from_transcript(brief: ComedyBrief, outcome: Outcome, transcript: Vec<Turn>) -> Self {
        let latest = |stage: Stage| {
            transcript
                .iter()
                .rev()
                .find(|turn| turn.stage() == Some(stage))
                .map(|turn| turn.content.clone())
        };

        let quality_report = latest(Stage::QualityControl);
        let performance_notes = latest(Stage::PerformanceDesign);

        let script = transcript
            .iter()
            .rev()
            .filter(|turn| turn.stage() == Some(Stage::QualityControl))
            .find_map(|turn| extract_final_script(&turn.content))
            .or_else(|| performance_notes.clone())
            .or_else(|| latest(Stage::ContentCreation));

        let revisions = RevisionCounter::from_history(&transcript).get();
        let total_turns = transcript
            .iter()
            .filter(|turn| turn.speaker != Speaker::Task)
            .count();

        Self {
            strategy: latest(Stage::Strategy),
            audience_analysis: latest(Stage::AudienceAnalysis),
            performance_notes,
            quality_report,
            script,
            revisions,
            total_turns,
            outcome,
            brief,
            transcript,
        }
    }
}

/// Orchestrates the writing team.
pub struct ComedyOrchestrator {
    config: SessionConfig,
    agents: Vec<ComedyAgent>,
    model: Arc<dyn LanguageModel>,
    /// Message history per agent, indexed by `Stage::index()`.
    histories: Vec<Vec<ChatMessage>>,
    transcript: Vec<Turn>,
    callback: Option<ComedyCallback>,
    progress: Progress,
    reported: f32,
}

impl ComedyOrchestrator {
    /// Create a new orchestrator. `agents` must hold exactly one agent per stage.
    pub fn new(
        config: SessionConfig,
        agents: Vec<ComedyAgent>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self, OpenMicError> {
        let mut ordered: Vec<Option<ComedyAgent>> = vec![None; Stage::ALL.len()];
        for agent in agents {
            let slot = &mut ordered[agent.stage.index()];
            if slot.is_some() {
                return Err(OpenMicError::ConfigError(format!(
                    "More than one agent configured for stage '{}'",
                    agent.stage.display_name()
                )));
            }
            *slot = Some(agent);
        }

        let agents = ordered
            .into_iter()
            .zip(Stage::ALL)
            .map(|(agent, stage)| {
                agent.ok_or_else(|| {
                    OpenMicError::ConfigError(format!(
                        "No agent configured for stage '{}'",
                        stage.display_name()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let histories = agents
            .iter()
            .map(|agent| {
                let system_prompt = agent
                    .custom_system_prompt
                    .clone()
                    .unwrap_or_else(|| prompts::system_prompt(agent.stage).to_string());
                vec![ChatMessage::system(system_prompt)]
            })
            .collect();

        Ok(Self {
            config,
            agents,
            model,
            histories,
            transcript: Vec::new(),
            callback: None,
            progress: Progress::none(),
            reported: 0.0,
        })
    }

    /// Set a callback for session events.
    pub fn with_callback(mut self, callback: ComedyCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Set a progress observer.
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Run the full session.
    pub async fn run(&mut self) -> Result<ComedyResult, OpenMicError> {
        info!(
            topic = %self.config.brief.topic,
            style = self.config.brief.style.name(),
            "starting writing session"
        );

        let task = self.config.brief.task_prompt();
        for history in &mut self.histories {
            history.push(ChatMessage::user(task.clone()));
        }
        self.transcript.push(Turn::new(Speaker::Task, task, 0));

        let mut agent_turns = 0;
        let outcome = loop {
            let stage = match selector::select_next(&self.transcript) {
                Selection::Speak(stage) => stage,
                Selection::Finish(outcome) => break outcome,
            };

            if agent_turns >= self.config.max_turns {
                warn!(max_turns = self.config.max_turns, "turn limit reached");
                break Outcome::TurnLimitReached;
            }

            if stage == Stage::REVISION_ENTRY {
                let cycle = RevisionCounter::from_history(&self.transcript).get();
                if cycle > 0 {
                    self.emit_event(ComedyEvent::RevisionRequested { cycle });
                }
            }

            let content = self.take_turn(stage).await?;
            agent_turns += 1;

            if content.contains(DONE_SENTINEL) {
                info!(agent = stage.agent_name(), "done sentinel received");
                break Outcome::DoneSignalled;
            }
        };

        info!(outcome = outcome.description(), turns = agent_turns, "writing session finished");
        self.report_progress("Finished", 1.0);
        self.emit_event(ComedyEvent::SessionEnd { outcome });

        Ok(ComedyResult::from_transcript(
            self.config.brief.clone(),
            outcome,
            self.transcript.clone(),
        ))
    }

    /// Let the agent owning `stage` speak once. Returns the sanitized reply.
    async fn take_turn(&mut self, stage: Stage) -> Result<String, OpenMicError> {
        let idx = stage.index();
        let agent_name = self.agents[idx].name.clone();

        self.emit_event(ComedyEvent::StageStart {
            stage,
            agent: agent_name.clone(),
        });

        let revisions = RevisionCounter::from_history(&self.transcript);
        self.histories[idx].push(ChatMessage::user(prompts::stage_instruction(
            stage, revisions,
        )));

        let request = CompletionRequest::new(
            self.agents[idx].model.clone(),
            self.histories[idx].clone(),
            self.config.max_tokens,
        )
        .with_temperature(self.config.temperature);

        let response = self
            .model
            .complete(request)
            .await
            .map_err(|e| OpenMicError::in_stage(stage.display_name(), e))?;

        let content = sanitize_response(&response);
        if content.is_empty() {
            return Err(OpenMicError::in_stage(
                stage.display_name(),
                OpenMicError::EmptyResponse { agent: agent_name },
            ));
        }

        let ordinal = self.transcript.len();
        self.transcript
            .push(Turn::new(Speaker::Agent(stage), content.clone(), ordinal));

        self.emit_event(ComedyEvent::AgentMessage {
            agent: agent_name.clone(),
            content: content.clone(),
        });

        self.histories[idx].push(ChatMessage::assistant(content.clone()));

        for (i, history) in self.histories.iter_mut().enumerate() {
            if i != idx {
                history.push(ChatMessage::user(format!(
                    "[{} said]: {}",
                    agent_name, content
                )));
            }
        }

        let fraction = (idx + 1) as f32 / Stage::ALL.len() as f32 * 0.95;
        self.report_progress(stage.display_name(), fraction);

        Ok(content)
    }

    /// Progress never moves backwards, even when a revision loops back.
    fn report_progress(&mut self, label: &str, fraction: f32) {
        self.reported = self.reported.max(fraction);
        self.progress.report(label, self.reported);
    }

    /// Emit an event if a callback is registered.
    fn emit_event(&self, event: ComedyEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}

/// Sanitize an agent response by stripping reasoning tokens and markup.
///
/// Removes `<thinking>...</thinking>` style blocks, stray tags and markdown
/// bold markers. Single asterisks are kept: performance markers use them.
fn sanitize_response(response: &str) -> String {
    let tags_to_strip = [
        "thinking",
        "think",
        "reflection",
        "reflect",
        "internal",
        "reasoning",
        "thought",
        "scratch",
        "scratchpad",
        "plan",
        "analysis",
        "analyze",
        "consider",
        "pondering",
        "deliberation",
    ];

    let mut result = response.to_string();

    for tag in &tags_to_strip {
        let pattern = format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag);
        if let Ok(re) = regex::Regex::new(&pattern) {
            result = re.replace_all(&result, "").to_string();
        }
    }

    if let Ok(orphan_re) = regex::Regex::new(r"</?[A-Za-z][\w]*[^>]*>") {
        result = orphan_re.replace_all(&result, "").to_string();
    }

    result = result.replace("**", "");

    // Line structure matters for scripts: only collapse horizontal runs.
    if let Ok(ws_re) = regex::Regex::new(r"[ \t]+") {
        result = ws_re.replace_all(&result, " ").to_string();
    }
    if let Ok(nl_re) = regex::Regex::new(r"\n\s*\n\s*\n+") {
        result = nl_re.replace_all(&result, "\n\n").to_string();
    }

    result
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
