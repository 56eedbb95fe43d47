//! Audio clean-up and concatenation.

use realfft::RealFftPlanner;
use realfft::num_complex::Complex;
use tracing::debug;

use crate::config::SpeechConfig;
use crate::error::OpenMicError;
use crate::speech::types::{SegmentControl, clamp_or};

/// Longest silence inserted between two segments.
pub const MAX_GAP_SECS: f32 = 5.0;

const RMS_EPSILON: f32 = 1e-6;

/// Per-segment low-pass, loudness normalisation and edge fades.
#[derive(Debug, Clone)]
pub struct AudioPostProcessor {
    pub sample_rate: u32,
    pub target_dbfs: f32,
    pub cutoff_hz: f32,
    pub fade_ms: f32,
}

impl AudioPostProcessor {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            target_dbfs: -18.0,
            cutoff_hz: 8000.0,
            fade_ms: 20.0,
        }
    }

    pub fn from_config(sample_rate: u32, config: &SpeechConfig) -> Self {
        Self {
            sample_rate,
            target_dbfs: config.target_dbfs,
            cutoff_hz: config.cutoff_hz,
            fade_ms: config.fade_ms,
        }
    }

    /// Process every segment independently. Empty segments stay empty.
    pub fn process_segments(&self, segments: &[Vec<f32>]) -> Result<Vec<Vec<f32>>, OpenMicError> {
        segments.iter().map(|samples| self.process(samples)).collect()
    }

    pub fn process(&self, samples: &[f32]) -> Result<Vec<f32>, OpenMicError> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = self.lowpass(samples)?;
        self.normalize_rms(&mut out);
        self.apply_fade(&mut out);
        Ok(out)
    }

    /// Zero every FFT bin above the cutoff frequency.
    pub fn lowpass(&self, samples: &[f32]) -> Result<Vec<f32>, OpenMicError> {
        let len = samples.len();
        let nyquist = self.sample_rate as f32 / 2.0;
        if len < 2 || self.cutoff_hz <= 0.0 || self.cutoff_hz >= nyquist {
            return Ok(samples.to_vec());
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(len);
        let ifft = planner.plan_fft_inverse(len);

        let mut input = fft.make_input_vec();
        input.copy_from_slice(samples);
        let mut spectrum = fft.make_output_vec();
        fft.process(&mut input, &mut spectrum)
            .map_err(|e| OpenMicError::AudioError(format!("Forward FFT failed: {}", e)))?;

        let bin_hz = self.sample_rate as f32 / len as f32;
        for (k, bin) in spectrum.iter_mut().enumerate() {
            if k as f32 * bin_hz > self.cutoff_hz {
                *bin = Complex::new(0.0, 0.0);
            }
        }
        // The inverse transform rejects imaginary parts on the DC and Nyquist bins.
        spectrum[0].im = 0.0;
        if len % 2 == 0 {
            if let Some(last) = spectrum.last_mut() {
                last.im = 0.0;
            }
        }

        let mut output = ifft.make_output_vec();
        ifft.process(&mut spectrum, &mut output)
            .map_err(|e| OpenMicError::AudioError(format!("Inverse FFT failed: {}", e)))?;

        let scale = 1.0 / len as f32;
        output.iter_mut().for_each(|s| *s *= scale);
        Ok(output)
    }

    /// Scale toward `target_dbfs` RMS, then clip to [-1, 1].
    pub fn normalize_rms(&self, samples: &mut [f32]) {
        if samples.is_empty() {
            return;
        }
        let mean_square =
            samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
        let rms = mean_square.sqrt();
        let target = 10f32.powf(self.target_dbfs / 20.0);
        let gain = target / (rms + RMS_EPSILON);
        debug!(rms, gain, "normalizing segment");

        for sample in samples.iter_mut() {
            *sample = (*sample * gain).clamp(-1.0, 1.0);
        }
    }

    /// Linear fade in and out over `fade_ms`, at most half the segment each.
    pub fn apply_fade(&self, samples: &mut [f32]) {
        let len = samples.len();
        if len == 0 {
            return;
        }
        let requested = (self.sample_rate as f32 * self.fade_ms / 1000.0) as usize;
        let fade_len = requested.min(len / 2).max(1);

        let ramp = |i: usize| {
            if fade_len > 1 {
                i as f32 / (fade_len - 1) as f32
            } else {
                0.0
            }
        };
        for i in 0..fade_len {
            samples[i] *= ramp(i);
            samples[len - 1 - i] *= ramp(i);
        }
    }
}

/// Join segments with a silence gap after every segment but the last.
///
/// The gap after segment `i` is `controls[i].end_pause_secs`, or
/// `default_pause_secs` when unset, clamped to `[0, MAX_GAP_SECS]`.
/// Samples are clipped to [-1, 1].
pub fn concat_with_pauses(
    segments: &[Vec<f32>],
    controls: &[SegmentControl],
    default_pause_secs: f32,
    sample_rate: u32,
) -> Vec<f32> {
    let default_pause = clamp_or(default_pause_secs, 0.0, MAX_GAP_SECS, 0.0);
    let gaps: Vec<usize> = (0..segments.len().saturating_sub(1))
        .map(|idx| {
            let secs = controls
                .get(idx)
                .and_then(|c| c.end_pause_secs)
                .map(|secs| clamp_or(secs, 0.0, MAX_GAP_SECS, default_pause))
                .unwrap_or(default_pause);
            (secs * sample_rate as f32).round() as usize
        })
        .collect();

    let total = segments.iter().map(Vec::len).sum::<usize>() + gaps.iter().sum::<usize>();
    let mut out = Vec::with_capacity(total);
    for (idx, segment) in segments.iter().enumerate() {
        out.extend(segment.iter().map(|s| s.clamp(-1.0, 1.0)));
        if let Some(&gap) = gaps.get(idx) {
            out.resize(out.len() + gap, 0.0);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control(secs: Option<f32>) -> SegmentControl {
        SegmentControl {
            end_pause_secs: secs,
            ..SegmentControl::default()
        }
    }

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_concat_length_and_range() {
        let segments = vec![vec![0.5; 100], vec![1.5; 150], vec![-3.0; 200]];
        let controls = vec![control(Some(0.5)), control(Some(0.5)), control(Some(4.0))];

        let out = concat_with_pauses(&segments, &controls, 0.8, 16_000);
        assert_eq!(out.len(), 450 + 16_000);
        assert!(out.iter().all(|s| (-1.0..=1.0).contains(s)));
        assert_eq!(out[100], 0.0);
        assert_eq!(out[100 + 8000], 1.0);
    }

    #[test]
    fn test_concat_gap_defaults_and_clamps() {
        let segments = vec![vec![0.1; 10], vec![0.1; 10], vec![0.1; 10]];
        let controls = vec![control(None), control(Some(60.0))];
        let out = concat_with_pauses(&segments, &controls, 0.8, 100);
        assert_eq!(out.len(), 30 + 80 + 500);

        let negative = vec![control(Some(-1.0)), control(Some(-1.0))];
        assert_eq!(concat_with_pauses(&segments, &negative, 0.8, 100).len(), 30);
    }

    #[test]
    fn test_concat_keeps_empty_segments_aligned() {
        let segments = vec![vec![0.1; 4], Vec::new(), vec![0.1; 4]];
        let controls = vec![control(Some(0.1)), control(Some(0.2))];
        let out = concat_with_pauses(&segments, &controls, 0.0, 100);
        assert_eq!(out.len(), 4 + 10 + 20 + 4);
        assert!(concat_with_pauses(&[], &[], 0.8, 100).is_empty());
    }

    #[test]
    fn test_lowpass_removes_high_frequencies() {
        let sr = 24_000;
        let low = sine(440.0, sr, 2400);
        let high = sine(10_000.0, sr, 2400);
        let mixed: Vec<f32> = low.iter().zip(&high).map(|(a, b)| 0.5 * (a + b)).collect();

        let post = AudioPostProcessor::new(sr);
        let filtered = post.lowpass(&mixed).unwrap();
        assert_eq!(filtered.len(), mixed.len());

        let residual: Vec<f32> = filtered
            .iter()
            .zip(&low)
            .map(|(f, l)| f - 0.5 * l)
            .collect();
        assert!(rms(&residual) < 1e-3);
    }

    #[test]
    fn test_lowpass_odd_length_and_tiny_inputs() {
        let post = AudioPostProcessor::new(16_000);
        assert_eq!(post.lowpass(&sine(100.0, 16_000, 1001)).unwrap().len(), 1001);
        assert_eq!(post.lowpass(&[0.3]).unwrap(), vec![0.3]);
    }

    #[test]
    fn test_normalize_hits_target_rms() {
        let post = AudioPostProcessor::new(24_000);
        let mut samples: Vec<f32> = sine(300.0, 24_000, 4800).iter().map(|s| s * 0.01).collect();
        post.normalize_rms(&mut samples);
        let target = 10f32.powf(-18.0 / 20.0);
        assert!((rms(&samples) - target).abs() < 1e-3);

        let mut silence = vec![0.0; 100];
        post.normalize_rms(&mut silence);
        assert!(silence.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_fade_edges() {
        let post = AudioPostProcessor::new(1000);
        let mut samples = vec![1.0; 100];
        post.apply_fade(&mut samples);
        // 20 ms at 1 kHz is 20 samples.
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[99], 0.0);
        assert_eq!(samples[19], 1.0);
        assert_eq!(samples[50], 1.0);
        assert!(samples[10] > 0.0 && samples[10] < 1.0);

        let mut short = vec![1.0; 3];
        post.apply_fade(&mut short);
        assert_eq!(short, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_process_stays_in_range() {
        let post = AudioPostProcessor::new(24_000);
        let loud: Vec<f32> = sine(200.0, 24_000, 2400).iter().map(|s| s * 40.0).collect();
        let processed = post.process_segments(&[loud, Vec::new()]).unwrap();
        assert!(processed[0].iter().all(|s| (-1.0..=1.0).contains(s)));
        assert!(processed[1].is_empty());
    }
}
