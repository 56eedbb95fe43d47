//! Speech synthesis backends and WAV output.

use std::path::Path;

use kokoro_tiny::TtsEngine;
use tracing::debug;

use crate::error::OpenMicError;
use crate::speech::types::{ProsodyInstruction, SegmentControl};

/// Kokoro renders at 24 kHz.
pub const KOKORO_SAMPLE_RATE: u32 = 24_000;

/// Kokoro has a ~200 character safe limit per call.
const MAX_CHUNK_CHARS: usize = 200;

/// Control parameters for one synthesized segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisParams {
    pub speed_scale: f32,
    pub pitch_shift_semitones: f32,
    pub energy_scale: f32,
    pub temperature: f32,
    pub speed_level: u8,
    pub pause_level: u8,
    pub laugh_level: u8,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        let control = SegmentControl::default();
        Self {
            speed_scale: 1.0,
            pitch_shift_semitones: 0.0,
            energy_scale: 1.0,
            temperature: 0.6,
            speed_level: control.speed_level,
            pause_level: control.pause_level,
            laugh_level: control.laugh_level,
        }
    }
}

impl SynthesisParams {
    pub fn from_plan(instruction: &ProsodyInstruction, control: &SegmentControl) -> Self {
        Self {
            speed_scale: instruction.speed_scale,
            pitch_shift_semitones: instruction.pitch_shift_semitones,
            energy_scale: instruction.energy_scale,
            temperature: instruction.temperature,
            speed_level: control.speed_level,
            pause_level: control.pause_level,
            laugh_level: control.laugh_level,
        }
    }

    /// Playback rate combining the profile speed and the coarse speed level
    /// (level 4 is neutral, each step is 5%).
    pub fn playback_rate(&self) -> f32 {
        let level_factor = 1.0 + 0.05 * (self.speed_level as f32 - 4.0);
        (self.speed_scale * level_factor).clamp(0.5, 2.0)
    }
}

/// Anything that turns a text segment into mono samples.
pub trait SpeechBackend {
    fn sample_rate(&self) -> u32;

    fn synthesize(&mut self, text: &str, params: &SynthesisParams)
    -> Result<Vec<f32>, OpenMicError>;
}

/// Local synthesis with kokoro-tiny.
pub struct KokoroBackend {
    engine: TtsEngine,
    voice: String,
    available_voices: Vec<String>,
}

impl KokoroBackend {
    /// Initialize the engine (downloads the model on first run) and check the voice.
    pub async fn new(voice: impl Into<String>) -> Result<Self, OpenMicError> {
        let engine = TtsEngine::new()
            .await
            .map_err(|e| OpenMicError::TtsError(format!("Failed to initialize TTS: {}", e)))?;

        let backend = Self {
            available_voices: engine.voices(),
            engine,
            voice: voice.into(),
        };
        backend.validate_voice(&backend.voice)?;
        Ok(backend)
    }

    pub fn available_voices(&self) -> &[String] {
        &self.available_voices
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    pub fn validate_voice(&self, voice_id: &str) -> Result<(), OpenMicError> {
        if voice_id.is_empty() {
            return Err(OpenMicError::TtsError(format!(
                "Voice ID cannot be empty. Available voices:\n{}",
                format_voices(&self.available_voices)
            )));
        }

        if !self.available_voices.iter().any(|v| v == voice_id) {
            return Err(OpenMicError::TtsError(format!(
                "Unknown voice '{}'. Available voices:\n{}",
                voice_id,
                format_voices(&self.available_voices)
            )));
        }

        Ok(())
    }
}

impl SpeechBackend for KokoroBackend {
    fn sample_rate(&self) -> u32 {
        KOKORO_SAMPLE_RATE
    }

    fn synthesize(
        &mut self,
        text: &str,
        params: &SynthesisParams,
    ) -> Result<Vec<f32>, OpenMicError> {
        let spoken = render_control_tokens(text);
        let chunk_gap = (KOKORO_SAMPLE_RATE as f32 * 0.3) as usize;

        let mut samples = Vec::new();
        for (idx, chunk) in split_into_chunks(&spoken, MAX_CHUNK_CHARS)
            .iter()
            .filter(|c| !c.trim().is_empty())
            .enumerate()
        {
            if idx > 0 {
                samples.resize(samples.len() + chunk_gap, 0.0);
            }
            let audio = self
                .engine
                .synthesize(chunk, Some(self.voice.as_str()))
                .map_err(|e| OpenMicError::TtsError(format!("Synthesis failed: {}", e)))?;
            samples.extend(audio);
        }

        if params.pitch_shift_semitones.abs() > f32::EPSILON {
            debug!(
                pitch = params.pitch_shift_semitones,
                "kokoro cannot shift pitch, ignoring"
            );
        }

        let mut samples = adjust_audio_speed(samples, params.playback_rate());
        if (params.energy_scale - 1.0).abs() > f32::EPSILON {
            samples.iter_mut().for_each(|s| *s *= params.energy_scale);
        }
        Ok(samples)
    }
}

fn format_voices(voices: &[String]) -> String {
    let mut english: Vec<&String> = voices
        .iter()
        .filter(|v| ["af_", "am_", "bf_", "bm_"].iter().any(|p| v.starts_with(p)))
        .collect();
    english.sort();

    english
        .iter()
        .map(|v| format!("  - {}", v))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Kokoro reads control tokens literally; turn pauses into punctuation and
/// drop laughs.
pub fn render_control_tokens(text: &str) -> String {
    let rendered = text
        .replace("[lbreak]", "... ")
        .replace("[uv_break]", ", ")
        .replace("[laugh]", " ");
    rendered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split text into chunks that are safe for synthesis.
fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in text.split_inclusive(&['.', '!', '?', ';', '。', '！', '？'][..]) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        if current.len() + sentence.len() > max_chars {
            if !current.is_empty() {
                chunks.push(current.trim().to_string());
                current.clear();
            }

            if sentence.len() > max_chars {
                for part in sentence.split_inclusive(&[',', '，'][..]) {
                    if current.len() + part.len() > max_chars && !current.is_empty() {
                        chunks.push(current.trim().to_string());
                        current.clear();
                    }
                    current.push_str(part);
                    current.push(' ');
                }
                continue;
            }
        }
        current.push_str(sentence);
        current.push(' ');
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    chunks
}

/// Change playback speed by linear interpolation. Rate < 1.0 is slower.
pub fn adjust_audio_speed(samples: Vec<f32>, rate: f32) -> Vec<f32> {
    if (rate - 1.0).abs() < 0.001 || rate <= 0.0 || !rate.is_finite() {
        return samples;
    }

    let new_len = (samples.len() as f32 / rate) as usize;
    let mut result = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_pos = i as f32 * rate;
        let src_idx = src_pos as usize;
        let frac = src_pos - src_idx as f32;

        if src_idx + 1 < samples.len() {
            result.push(samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac);
        } else if src_idx < samples.len() {
            result.push(samples[src_idx]);
        }
    }

    result
}

/// Write mono samples as 16-bit PCM.
pub fn write_wav<P: AsRef<Path>>(
    path: P,
    samples: &[f32],
    sample_rate: u32,
) -> Result<(), OpenMicError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path.as_ref(), spec)
        .map_err(|e| OpenMicError::AudioError(format!("Failed to create WAV: {}", e)))?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(value)
            .map_err(|e| OpenMicError::AudioError(format!("Failed to write WAV: {}", e)))?;
    }
    writer
        .finalize()
        .map_err(|e| OpenMicError::AudioError(format!("Failed to finalize WAV: {}", e)))
}

/// Output filename for a topic.
pub fn output_filename(topic: &str) -> String {
    let sanitized: String = topic
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(50)
        .collect();

    format!("OpenMic - {}.wav", sanitized.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_filename() {
        assert_eq!(
            output_filename("Why are gyms always closed?"),
            "OpenMic - Why are gyms always closed_.wav"
        );
        assert!(output_filename(&"健".repeat(100)).chars().count() < 70);
    }

    #[test]
    fn test_render_control_tokens() {
        assert_eq!(
            render_control_tokens("Wait [uv_break] for it [lbreak] boom! [laugh]"),
            "Wait , for it ... boom!"
        );
    }

    #[test]
    fn test_split_into_chunks() {
        let text = "Hello world. This is a test. Another sentence here.";
        let chunks = split_into_chunks(text, 30);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.len() <= 35);
        }
        assert_eq!(split_into_chunks("short one", 200), vec!["short one"]);
    }

    #[test]
    fn test_adjust_audio_speed() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32).collect();
        assert_eq!(adjust_audio_speed(samples.clone(), 2.0).len(), 50);
        assert_eq!(adjust_audio_speed(samples.clone(), 0.5).len(), 200);
        assert_eq!(adjust_audio_speed(samples.clone(), 1.0), samples);
    }

    #[test]
    fn test_playback_rate() {
        let mut params = SynthesisParams::default();
        assert_eq!(params.playback_rate(), 1.0);
        params.speed_level = 5;
        params.speed_scale = 0.95;
        assert!((params.playback_rate() - 0.9975).abs() < 1e-5);
        params.speed_scale = 5.0;
        assert_eq!(params.playback_rate(), 2.0);
    }

    #[test]
    fn test_write_wav_roundtrip_header() {
        let path = std::env::temp_dir().join(format!("openmic-test-{}.wav", std::process::id()));
        write_wav(&path, &[0.0, 0.5, -2.0], 16_000).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 16383, -i16::MAX]);
        std::fs::remove_file(path).ok();
    }
}
