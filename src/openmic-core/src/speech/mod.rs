//! Speech rendering: marker parsing, delivery planning, synthesis and
//! audio clean-up.

pub mod emotion;
pub mod filler;
pub mod markers;
pub mod pipeline;
pub mod post;
pub mod prosody;
pub mod refiner;
pub mod rhythm;
pub mod tts;
pub mod types;

pub use emotion::EmotionController;
pub use filler::{FillerInjector, normalize_control_tokens};
pub use markers::MarkerParser;
pub use pipeline::{Fallback, SpeechOutput, SpeechPipeline};
pub use post::{AudioPostProcessor, concat_with_pauses};
pub use prosody::ProsodyPlanner;
pub use refiner::TextRefiner;
pub use rhythm::RhythmController;
pub use tts::{KokoroBackend, SpeechBackend, SynthesisParams, write_wav};
pub use types::{
    EmotionPlan, EmotionProfile, Pause, PauseReason, ProsodyInstruction, Refined, Segment,
    SegmentControl, SegmentRole, Stress,
};
