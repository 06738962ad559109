//! Spectrogram of the loudest segment

use crate::error::{AnalysisError, Result};
use crate::fft::Rfft;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

/// Magnitude matrix, one row per analysis frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spectrogram {
    pub frames: Vec<Vec<f32>>,
    pub frame_count: usize,
    /// Magnitudes per frame (window size / 2)
    pub bin_count: usize,
    pub nyquist_frequency: f64,
}

impl Spectrogram {
    /// Frequency in Hz at the lower edge of `bin`
    pub fn bin_frequency(&self, bin: usize) -> f64 {
        if self.bin_count == 0 {
            return 0.0;
        }
        bin as f64 * self.nyquist_frequency / self.bin_count as f64
    }
}

/// Frames a signal and runs each frame through an [`Rfft`]
#[derive(Debug, Clone)]
pub struct SpectrumGenerator {
    sample_rate: u32,
    hop: usize,
    windowed: bool,
    fft: Rfft,
    taper: Vec<f32>,
}

impl SpectrumGenerator {
    /// Create a generator
    ///
    /// The hop is `floor(sample_rate · delay_ms/1000 · (1 − overlap))` and
    /// must come out at one sample or more.
    pub fn new(
        sample_rate: u32,
        window_size: usize,
        delay_ms: f64,
        overlap: f64,
        windowed: bool,
    ) -> Result<Self> {
        if !(0.0..1.0).contains(&overlap) {
            return Err(AnalysisError::InvalidParameter(format!(
                "Spectrum overlap must be in [0, 1), got {}",
                overlap
            )));
        }

        let hop = (f64::from(sample_rate) * delay_ms / 1000.0 * (1.0 - overlap)).floor();
        if hop.is_nan() || hop < 1.0 {
            return Err(AnalysisError::InvalidParameter(format!(
                "Spectrum hop is below one sample (delay {} ms, overlap {})",
                delay_ms, overlap
            )));
        }

        let fft = Rfft::new(window_size)?;
        let taper = (0..window_size)
            .map(|i| {
                let c = (PI * i as f64 / window_size as f64).cos();
                (c * c) as f32
            })
            .collect();

        Ok(Self {
            sample_rate,
            hop: hop as usize,
            windowed,
            fft,
            taper,
        })
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    pub fn window_size(&self) -> usize {
        self.fft.size()
    }

    /// Number of frames produced for a signal of `len` samples
    pub fn frame_count(&self, len: usize) -> usize {
        let window = self.window_size();
        if len <= window {
            return 0;
        }
        (len - window).div_ceil(self.hop)
    }

    /// Build the magnitude matrix for a signal
    ///
    /// Frames start at `0, hop, 2·hop, …` while `offset + window < len`.
    /// With tapering on, each sample is scaled by `cos²(π·i/window)` first.
    /// Magnitudes are clamped to be non-negative.
    pub fn generate(&mut self, signal: &[f32]) -> Result<Spectrogram> {
        let window = self.window_size();
        let mut frames = Vec::with_capacity(self.frame_count(signal.len()));
        let mut frame = vec![0.0_f32; window];

        let mut offset = 0;
        while offset + window < signal.len() {
            let source = &signal[offset..offset + window];
            if self.windowed {
                for ((dst, &src), &gain) in frame.iter_mut().zip(source).zip(&self.taper) {
                    *dst = src * gain;
                }
            } else {
                frame.copy_from_slice(source);
            }

            let magnitudes = self.fft.forward(&frame)?;
            frames.push(magnitudes.iter().map(|m| m.max(0.0)).collect());
            offset += self.hop;
        }

        debug!(
            frames = frames.len(),
            window,
            hop = self.hop,
            "Generated spectrum"
        );

        Ok(Spectrogram {
            frame_count: frames.len(),
            bin_count: window / 2,
            nyquist_frequency: f64::from(self.sample_rate) / 2.0,
            frames,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency: f64, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * frequency * i as f64 / f64::from(sample_rate)).sin() as f32)
            .collect()
    }

    #[test]
    fn test_hop_from_delay_and_overlap() {
        let generator = SpectrumGenerator::new(44100, 1024, 20.0, 0.5, false).unwrap();
        assert_eq!(generator.hop(), 441);

        let generator = SpectrumGenerator::new(48000, 256, 10.0, 0.0, false).unwrap();
        assert_eq!(generator.hop(), 480);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(SpectrumGenerator::new(44100, 1000, 20.0, 0.5, false).is_err());
        assert!(SpectrumGenerator::new(44100, 1024, 20.0, 1.0, false).is_err());
        assert!(SpectrumGenerator::new(44100, 1024, 0.01, 0.5, false).is_err());
        assert!(SpectrumGenerator::new(44100, 1024, f64::NAN, 0.5, false).is_err());
    }

    #[test]
    fn test_frame_count_and_shape() {
        let mut generator = SpectrumGenerator::new(44100, 256, 5.0, 0.5, false).unwrap();
        // hop = floor(44100 · 0.005 · 0.5) = 110
        assert_eq!(generator.hop(), 110);

        let signal = sine(1000.0, 44100, 2000);
        let spectrogram = generator.generate(&signal).unwrap();

        // Offsets 0, 110, …, 1650 (1650 + 256 < 2000, 1760 + 256 >= 2000)
        assert_eq!(spectrogram.frame_count, 16);
        assert_eq!(spectrogram.frames.len(), 16);
        assert_eq!(generator.frame_count(signal.len()), 16);
        assert_eq!(spectrogram.bin_count, 128);
        assert!(spectrogram.frames.iter().all(|f| f.len() == 128));
        assert_eq!(spectrogram.nyquist_frequency, 22050.0);
    }

    #[test]
    fn test_signal_exactly_one_window() {
        let mut generator = SpectrumGenerator::new(44100, 256, 5.0, 0.5, false).unwrap();
        let spectrogram = generator.generate(&[0.1; 256]).unwrap();
        assert_eq!(spectrogram.frame_count, 0);
        assert!(spectrogram.frames.is_empty());
    }

    #[test]
    fn test_dominant_bin_follows_tone() {
        let mut generator = SpectrumGenerator::new(44100, 1024, 20.0, 0.5, false).unwrap();
        let signal = sine(3000.0, 44100, 8192);
        let spectrogram = generator.generate(&signal).unwrap();

        let resolution = 44100.0 / 1024.0;
        for frame in &spectrogram.frames {
            let (bin, _) = frame
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .unwrap();
            let frequency = spectrogram.bin_frequency(bin);
            assert!((frequency - 3000.0).abs() <= resolution, "{}", frequency);
        }
    }

    #[test]
    fn test_magnitudes_are_non_negative() {
        let mut generator = SpectrumGenerator::new(44100, 64, 1.0, 0.0, true).unwrap();
        // Negative DC would give a negative bin 0 before clamping
        let signal = vec![-0.5_f32; 1000];
        let spectrogram = generator.generate(&signal).unwrap();
        assert!(spectrogram
            .frames
            .iter()
            .flatten()
            .all(|&m| m >= 0.0));
        assert_eq!(spectrogram.frames[0][0], 0.0);
    }

    #[test]
    fn test_taper_scales_samples() {
        let mut plain = SpectrumGenerator::new(44100, 64, 1.0, 0.0, false).unwrap();
        let mut tapered = SpectrumGenerator::new(44100, 64, 1.0, 0.0, true).unwrap();
        let signal = vec![0.5_f32; 200];

        let plain_dc = plain.generate(&signal).unwrap().frames[0][0];
        let tapered_dc = tapered.generate(&signal).unwrap().frames[0][0];

        // Mean of cos² over a full period is 1/2
        assert!((plain_dc - 1.0).abs() < 1e-5);
        assert!((tapered_dc - 0.5).abs() < 1e-5);
    }
}
