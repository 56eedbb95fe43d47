//! Configuration module for loading TOML config files.
//!
//! Every section has defaults, so an empty file (or no file at all) yields a
//! working configuration.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::OpenMicError;
use crate::stage::{ComedyAgent, Stage, default_team};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub agents: PerAgent,
    pub prompts: PerAgent,
    pub workflow: WorkflowConfig,
    pub speech: SpeechConfig,
}

/// Chat completion settings shared by every agent.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub api_base: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub accept_invalid_certs: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "deepseek-chat".to_string(),
            api_base: "https://api.deepseek.com/v1".to_string(),
            temperature: 0.8,
            max_tokens: 4096,
            timeout_secs: 120,
            accept_invalid_certs: false,
        }
    }
}

/// One optional value per agent, keyed by agent role.
///
/// Used for `[agents]` (model names, falling back to `llm.model`) and
/// `[prompts]` (system prompts, falling back to the built-in prompt).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PerAgent {
    pub comedy_director: Option<String>,
    pub audience_analyzer: Option<String>,
    pub joke_writer: Option<String>,
    pub performance_coach: Option<String>,
    pub quality_controller: Option<String>,
}

impl PerAgent {
    pub fn get(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::Strategy => self.comedy_director.as_deref(),
            Stage::AudienceAnalysis => self.audience_analyzer.as_deref(),
            Stage::ContentCreation => self.joke_writer.as_deref(),
            Stage::PerformanceDesign => self.performance_coach.as_deref(),
            Stage::QualityControl => self.quality_controller.as_deref(),
        }
    }
}

/// Limits on the writing session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Maximum number of agent turns before the session is cut off.
    pub max_turns: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self { max_turns: 25 }
    }
}

/// Speech pipeline settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub voice: String,
    /// Use the language model for refinement, filler polish and rhythm scoring.
    pub use_llm: bool,
    pub enable_fillers: bool,
    pub enable_post_process: bool,
    pub default_pause_secs: f32,
    pub target_dbfs: f32,
    pub cutoff_hz: f32,
    pub fade_ms: f32,
    pub markers: MarkerConfig,
    pub fillers: FillerConfig,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            voice: "af_sky".to_string(),
            use_llm: true,
            enable_fillers: true,
            enable_post_process: true,
            default_pause_secs: 0.8,
            target_dbfs: -18.0,
            cutoff_hz: 8000.0,
            fade_ms: 20.0,
            markers: MarkerConfig::default(),
            fillers: FillerConfig::default(),
        }
    }
}

/// Default pause lengths, in seconds, applied by the marker parser.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    pub opening_pause: f32,
    pub punchline_pause: f32,
    pub post_punchline_pause: f32,
    pub comma_pause: f32,
    pub period_pause: f32,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            opening_pause: 0.8,
            punchline_pause: 0.8,
            post_punchline_pause: 2.0,
            comma_pause: 0.35,
            period_pause: 0.6,
        }
    }
}

/// Filler insertion probabilities and seed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FillerConfig {
    pub prob_start: f64,
    pub prob_middle: f64,
    pub prob_end: f64,
    pub seed: u64,
}

impl Default for FillerConfig {
    fn default() -> Self {
        Self {
            prob_start: 0.05,
            prob_middle: 0.015,
            prob_end: 0.01,
            seed: 42,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, OpenMicError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| OpenMicError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, OpenMicError> {
        toml::from_str(content)
            .map_err(|e| OpenMicError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Model for the agent owning `stage`.
    pub fn model_for(&self, stage: Stage) -> String {
        self.agents.get(stage).unwrap_or(&self.llm.model).to_string()
    }

    /// The writing team with configured models and system prompts.
    pub fn team(&self) -> Vec<ComedyAgent> {
        default_team(|stage| self.model_for(stage))
            .into_iter()
            .map(|agent| match self.prompts.get(agent.stage) {
                Some(prompt) => agent.with_system_prompt(prompt),
                None => agent,
            })
            .collect()
    }
}
