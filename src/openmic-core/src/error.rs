//! Error types for the comedy pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenMicError {
    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("TTS error: {0}")]
    TtsError(String),

    #[error("Audio processing error: {0}")]
    AudioError(String),

    #[error("Agent '{agent}' returned an empty response")]
    EmptyResponse { agent: String },

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("{stage} failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: Box<OpenMicError>,
    },
}

impl OpenMicError {
    /// Wrap an error with the human-readable stage it aborted.
    pub fn in_stage(stage: impl Into<String>, source: OpenMicError) -> Self {
        OpenMicError::StageFailed {
            stage: stage.into(),
            source: Box::new(source),
        }
    }
}
