//! End-to-end speech rendering of a finished script.

use serde::Serialize;
use tracing::info;

use crate::config::SpeechConfig;
use crate::error::OpenMicError;
use crate::llm::ModelHandle;
use crate::progress::Progress;
use crate::speech::emotion::EmotionController;
use crate::speech::filler::FillerInjector;
use crate::speech::markers::MarkerParser;
use crate::speech::post::{AudioPostProcessor, concat_with_pauses};
use crate::speech::prosody::ProsodyPlanner;
use crate::speech::refiner::TextRefiner;
use crate::speech::rhythm::RhythmController;
use crate::speech::tts::{SpeechBackend, SynthesisParams};
use crate::speech::types::{ProsodyInstruction, Refined, Segment, SegmentControl};

/// A step that wanted the model but ran on heuristics.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Fallback {
    pub step: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct SpeechOutput {
    pub audio: Vec<f32>,
    pub sample_rate: u32,
    pub segments: Vec<Segment>,
    pub plan: Vec<ProsodyInstruction>,
    pub controls: Vec<SegmentControl>,
    pub fallbacks: Vec<Fallback>,
}

impl SpeechOutput {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.audio.len() as f32 / self.sample_rate as f32
        }
    }
}

/// Refine, parse, decorate, synthesize and stitch a script.
pub struct SpeechPipeline<B: SpeechBackend> {
    config: SpeechConfig,
    backend: B,
    model: Option<ModelHandle>,
    progress: Progress,
}

impl<B: SpeechBackend> SpeechPipeline<B> {
    pub fn new(config: SpeechConfig, backend: B) -> Self {
        Self {
            config,
            backend,
            model: None,
            progress: Progress::none(),
        }
    }

    /// Model used by refinement, filler polish and rhythm scoring when
    /// `use_llm` is set.
    pub fn with_model(mut self, model: ModelHandle) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn model(&self) -> Option<&ModelHandle> {
        self.model.as_ref().filter(|_| self.config.use_llm)
    }

    pub async fn run(
        &mut self,
        script: &str,
        preferred_profile: Option<&str>,
    ) -> Result<SpeechOutput, OpenMicError> {
        let mut fallbacks = Vec::new();

        let refined = TextRefiner::new().refine(script, self.model()).await;
        let text = take(&mut fallbacks, "refine", refined);
        self.progress.report("Refine", 0.1);

        let mut segments = MarkerParser::new(self.config.markers.clone()).parse(&text);
        self.progress.report("Parse markers", 0.2);

        if self.config.enable_fillers {
            let injected = FillerInjector::new(self.config.fillers.clone())
                .inject(&segments, self.model())
                .await;
            segments = take(&mut fallbacks, "fillers", injected);
        }
        self.progress.report("Fillers", 0.3);

        let emotion = EmotionController::new().plan(&segments, preferred_profile);
        self.progress.report("Emotion", 0.4);

        let plan = ProsodyPlanner::new().build_plan(&segments, &emotion);
        self.progress.report("Prosody", 0.5);

        let controls = RhythmController::new().controls(&plan, self.model()).await;
        let controls = take(&mut fallbacks, "rhythm", controls);
        self.progress.report("Rhythm", 0.6);

        let mut clips = Vec::with_capacity(plan.len());
        for (idx, (instruction, control)) in plan.iter().zip(&controls).enumerate() {
            let clip = if instruction.text.trim().is_empty() {
                Vec::new()
            } else {
                let params = SynthesisParams::from_plan(instruction, control);
                self.backend
                    .synthesize(&instruction.text, &params)
                    .map_err(|e| OpenMicError::in_stage("Speech synthesis", e))?
            };
            clips.push(clip);
            self.progress
                .report("Synthesize", 0.6 + 0.3 * (idx + 1) as f32 / plan.len() as f32);
        }

        let sample_rate = self.backend.sample_rate();
        if self.config.enable_post_process {
            clips = AudioPostProcessor::from_config(sample_rate, &self.config)
                .process_segments(&clips)
                .map_err(|e| OpenMicError::in_stage("Audio post-processing", e))?;
        }
        self.progress.report("Post-process", 0.95);

        let audio = concat_with_pauses(
            &clips,
            &controls,
            self.config.default_pause_secs,
            sample_rate,
        );
        self.progress.report("Concatenate", 1.0);

        info!(
            segments = segments.len(),
            samples = audio.len(),
            fallbacks = fallbacks.len(),
            "speech rendered"
        );

        Ok(SpeechOutput {
            audio,
            sample_rate,
            segments,
            plan,
            controls,
            fallbacks,
        })
    }
}

fn take<T>(fallbacks: &mut Vec<Fallback>, step: &'static str, refined: Refined<T>) -> T {
    if let Some(reason) = refined.fallback_reason() {
        fallbacks.push(Fallback {
            step,
            reason: reason.to_string(),
        });
    }
    refined.into_inner()
}
