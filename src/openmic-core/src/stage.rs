//! Workflow stages and the agents that speak for them.
//!
//! The team always works through the same five stages. Each stage is owned
//! by exactly one agent, so the stage doubles as the speaker identity.

use serde::{Deserialize, Serialize};

/// A stage in the writing workflow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Overall angle, style and tone.
    Strategy,
    /// Audience fit and sensitivities.
    AudienceAnalysis,
    /// Setup/punchline writing and revisions.
    ContentCreation,
    /// Performance markers: pauses, stress, tone.
    PerformanceDesign,
    /// Review gate that approves or sends the draft back.
    QualityControl,
}

/// Where the workflow goes after a stage has spoken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Hand over to the next stage unconditionally.
    Advance(Stage),
    /// The stage is the quality gate; its verdict decides what happens.
    Review,
}

impl Stage {
    /// All stages in workflow order.
    pub const ALL: [Stage; 5] = [
        Stage::Strategy,
        Stage::AudienceAnalysis,
        Stage::ContentCreation,
        Stage::PerformanceDesign,
        Stage::QualityControl,
    ];

    pub const FIRST: Stage = Stage::Strategy;

    /// Stage a failed review loops back to.
    pub const REVISION_ENTRY: Stage = Stage::ContentCreation;

    pub fn transition(self) -> Transition {
        match self {
            Stage::Strategy => Transition::Advance(Stage::AudienceAnalysis),
            Stage::AudienceAnalysis => Transition::Advance(Stage::ContentCreation),
            Stage::ContentCreation => Transition::Advance(Stage::PerformanceDesign),
            Stage::PerformanceDesign => Transition::Advance(Stage::QualityControl),
            Stage::QualityControl => Transition::Review,
        }
    }

    /// Position in workflow order, used to index per-agent state.
    pub fn index(self) -> usize {
        match self {
            Stage::Strategy => 0,
            Stage::AudienceAnalysis => 1,
            Stage::ContentCreation => 2,
            Stage::PerformanceDesign => 3,
            Stage::QualityControl => 4,
        }
    }

    /// Name of the agent that owns this stage.
    pub fn agent_name(self) -> &'static str {
        match self {
            Stage::Strategy => "ComedyDirector",
            Stage::AudienceAnalysis => "AudienceAnalyzer",
            Stage::ContentCreation => "JokeWriter",
            Stage::PerformanceDesign => "PerformanceCoach",
            Stage::QualityControl => "QualityController",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Stage::Strategy => "Strategy",
            Stage::AudienceAnalysis => "Audience Analysis",
            Stage::ContentCreation => "Content Creation",
            Stage::PerformanceDesign => "Performance Design",
            Stage::QualityControl => "Quality Control",
        }
    }

    /// Resolve an agent name back to its stage.
    ///
    /// Accepts the canonical CamelCase names as well as kebab/snake case
    /// spellings (`joke-writer`, `joke_writer`).
    pub fn from_agent_name(name: &str) -> Option<Stage> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_' && !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();

        Stage::ALL
            .into_iter()
            .find(|stage| stage.agent_name().to_lowercase() == normalized)
    }
}

/// An LLM-backed member of the writing team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComedyAgent {
    /// The stage this agent is responsible for.
    pub stage: Stage,
    /// Display name used in the transcript.
    pub name: String,
    /// The LLM model to use (e.g., "deepseek-chat", "gpt-4o").
    pub model: String,
    /// Optional custom system prompt override.
    pub custom_system_prompt: Option<String>,
}

impl ComedyAgent {
    /// Create the agent for a stage using its canonical name.
    pub fn new(stage: Stage, model: impl Into<String>) -> Self {
        Self {
            stage,
            name: stage.agent_name().to_string(),
            model: model.into(),
            custom_system_prompt: None,
        }
    }

    /// Set a custom system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_system_prompt = Some(prompt.into());
        self
    }

    /// Get the full display name with stage.
    pub fn display_name_with_stage(&self) -> String {
        format!("{} ({})", self.name, self.stage.display_name())
    }
}

/// Build the full team, one agent per stage, in workflow order.
pub fn default_team(model_for: impl Fn(Stage) -> String) -> Vec<ComedyAgent> {
    Stage::ALL
        .into_iter()
        .map(|stage| ComedyAgent::new(stage, model_for(stage)))
        .collect()
}
