//! OpenMic Core Library
//!
//! Runs a five-agent writers' room that turns a topic into a stand-up set,
//! and renders finished scripts to speech with comedic timing.

pub mod config;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod progress;
pub mod prompts;
pub mod selector;
pub mod speech;
pub mod stage;
pub mod style;

pub use config::Config;
pub use error::OpenMicError;
pub use llm::{ChatMessage, CompletionRequest, LanguageModel, ModelHandle, OpenAiModel};
pub use orchestrator::{ComedyEvent, ComedyOrchestrator, ComedyResult, SessionConfig};
pub use progress::Progress;
pub use selector::{Outcome, RevisionCounter, Selection, Speaker, Turn, select_next};
pub use stage::{ComedyAgent, Stage, default_team};
pub use style::{ComedyBrief, ComedyStyle};
