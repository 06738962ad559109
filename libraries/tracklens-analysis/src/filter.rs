//! Second-order IIR (biquad) section for band splitting
//!
//! Coefficients come from the bilinear transform of a resonant
//! second-order low-pass or high-pass prototype. With a resonance of √2 the
//! response is Butterworth.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Default resonance (Butterworth)
pub const DEFAULT_RESONANCE: f64 = std::f64::consts::SQRT_2;

/// Outputs beyond this magnitude are treated as runaway feedback and zeroed
const INSTABILITY_LIMIT: f64 = 10.0;

/// Filter response type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Lowpass,
    Highpass,
}

/// Biquad filter with a two-output delay line
///
/// State carries over between [`Filter::process`] calls. Use a fresh filter
/// (or [`Filter::reset`]) when filtering an unrelated signal.
#[derive(Debug, Clone)]
pub struct Filter {
    cutoff_hz: f64,
    kind: FilterKind,
    sample_rate: u32,
    resonance: f64,

    a1: f64,
    a2: f64,
    a3: f64,
    b1: f64,
    b2: f64,

    // Previous two outputs
    out_prev: f64,
    out_prev_prev: f64,
}

impl Filter {
    /// Create a filter for the given cutoff, response and sample rate
    pub fn new(cutoff_hz: f64, kind: FilterKind, sample_rate: u32, resonance: f64) -> Self {
        let ratio = PI * cutoff_hz / f64::from(sample_rate);

        let (a1, a2, a3, b1, b2) = match kind {
            FilterKind::Lowpass => {
                let c = 1.0 / ratio.tan();
                let a1 = 1.0 / (1.0 + resonance * c + c * c);
                (
                    a1,
                    2.0 * a1,
                    a1,
                    2.0 * (1.0 - c * c) * a1,
                    (1.0 - resonance * c + c * c) * a1,
                )
            }
            FilterKind::Highpass => {
                let c = ratio.tan();
                let a1 = 1.0 / (1.0 + resonance * c + c * c);
                (
                    a1,
                    -2.0 * a1,
                    a1,
                    2.0 * (c * c - 1.0) * a1,
                    (1.0 - resonance * c + c * c) * a1,
                )
            }
        };

        Self {
            cutoff_hz,
            kind,
            sample_rate,
            resonance,
            a1,
            a2,
            a3,
            b1,
            b2,
            out_prev: 0.0,
            out_prev_prev: 0.0,
        }
    }

    /// Low-pass filter with the default resonance
    pub fn lowpass(cutoff_hz: f64, sample_rate: u32) -> Self {
        Self::new(cutoff_hz, FilterKind::Lowpass, sample_rate, DEFAULT_RESONANCE)
    }

    /// High-pass filter with the default resonance
    pub fn highpass(cutoff_hz: f64, sample_rate: u32) -> Self {
        Self::new(cutoff_hz, FilterKind::Highpass, sample_rate, DEFAULT_RESONANCE)
    }

    pub fn cutoff_hz(&self) -> f64 {
        self.cutoff_hz
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn resonance(&self) -> f64 {
        self.resonance
    }

    /// Coefficients as `(a1, a2, a3, b1, b2)`
    pub fn coefficients(&self) -> (f64, f64, f64, f64, f64) {
        (self.a1, self.a2, self.a3, self.b1, self.b2)
    }

    /// Clear the delay line
    pub fn reset(&mut self) {
        self.out_prev = 0.0;
        self.out_prev_prev = 0.0;
    }

    /// Filter a signal
    ///
    /// The first two input samples only seed the input history, so the
    /// output is two samples shorter than the input.
    pub fn process(&mut self, signal: &[f32]) -> Vec<f32> {
        let mut output = Vec::with_capacity(signal.len().saturating_sub(2));

        for window in signal.windows(3) {
            let (x2, x1, x0) = (
                f64::from(window[0]),
                f64::from(window[1]),
                f64::from(window[2]),
            );

            let mut out = self.a1 * x0 + self.a2 * x1 + self.a3 * x2
                - self.b1 * self.out_prev
                - self.b2 * self.out_prev_prev;

            if !(-INSTABILITY_LIMIT..=INSTABILITY_LIMIT).contains(&out) {
                out = 0.0;
            }

            self.out_prev_prev = self.out_prev;
            self.out_prev = out;
            output.push(out as f32);
        }

        output
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

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_output_length() {
        let mut filter = Filter::lowpass(1000.0, 44100);
        assert_eq!(filter.process(&[0.0; 10]).len(), 8);
        assert!(filter.process(&[0.5, 0.5]).is_empty());
        assert!(filter.process(&[]).is_empty());
    }

    #[test]
    fn test_lowpass_coefficients() {
        let filter = Filter::new(1000.0, FilterKind::Lowpass, 44100, DEFAULT_RESONANCE);
        let (a1, a2, a3, b1, b2) = filter.coefficients();

        let c = 1.0 / (PI * 1000.0 / 44100.0).tan();
        let expected_a1 = 1.0 / (1.0 + DEFAULT_RESONANCE * c + c * c);
        assert!((a1 - expected_a1).abs() < 1e-15);
        assert!((a2 - 2.0 * a1).abs() < 1e-15);
        assert_eq!(a3, a1);
        assert!((b1 - 2.0 * (1.0 - c * c) * a1).abs() < 1e-12);
        assert!((b2 - (1.0 - DEFAULT_RESONANCE * c + c * c) * a1).abs() < 1e-12);

        // Unity gain at DC
        assert!(((a1 + a2 + a3) / (1.0 + b1 + b2) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_highpass_coefficients() {
        let filter = Filter::new(2000.0, FilterKind::Highpass, 48000, DEFAULT_RESONANCE);
        let (a1, a2, a3, b1, b2) = filter.coefficients();

        let c = (PI * 2000.0 / 48000.0).tan();
        assert!((a1 - 1.0 / (1.0 + DEFAULT_RESONANCE * c + c * c)).abs() < 1e-15);
        assert!((a2 + 2.0 * a1).abs() < 1e-15);
        assert_eq!(a3, a1);
        assert!((b1 - 2.0 * (c * c - 1.0) * a1).abs() < 1e-12);
        assert!((b2 - (1.0 - DEFAULT_RESONANCE * c + c * c) * a1).abs() < 1e-12);

        // Zero gain at DC
        assert!((a1 + a2 + a3).abs() < 1e-12);
    }

    #[test]
    fn test_lowpass_step_response_settles() {
        let mut filter = Filter::lowpass(100.0, 44100);
        let step = vec![1.0_f32; 44100];
        let output = filter.process(&step);

        for (i, &sample) in output.iter().enumerate() {
            assert!(sample.is_finite(), "sample {} is not finite", i);
            assert!(sample.abs() < 10.0, "sample {} hit the clamp: {}", i, sample);
            // Butterworth overshoot stays around 4%
            assert!(sample < 1.1, "sample {} overshoots: {}", i, sample);
        }

        // Rises from zero
        assert!(output[0] < 0.01);
        // Settled well before the end
        for &sample in &output[output.len() - 1000..] {
            assert!((sample - 1.0).abs() < 1e-3, "not settled: {}", sample);
        }
    }

    #[test]
    fn test_lowpass_attenuates_above_cutoff() {
        let mut filter = Filter::lowpass(100.0, 44100);
        let output = filter.process(&sine(1000.0, 44100, 44100));
        // Skip the onset transient
        let steady = &output[4410..];
        // Second order: about 40 dB down one decade above the cutoff
        assert!(rms(steady) < 0.02, "rms {}", rms(steady));
    }

    #[test]
    fn test_highpass_passes_above_cutoff() {
        let mut filter = Filter::highpass(100.0, 44100);
        let output = filter.process(&sine(5000.0, 44100, 44100));
        let steady = &output[4410..];
        let expected = std::f32::consts::FRAC_1_SQRT_2;
        assert!((rms(steady) - expected).abs() < 0.01, "rms {}", rms(steady));
    }

    #[test]
    fn test_state_carries_between_calls() {
        let signal = sine(440.0, 44100, 512);

        let mut continued = Filter::lowpass(2000.0, 44100);
        continued.process(&signal);
        let second = continued.process(&signal);

        let mut fresh = Filter::lowpass(2000.0, 44100);
        let first = fresh.process(&signal);

        assert_ne!(first, second);

        continued.reset();
        assert_eq!(continued.process(&signal), first);
    }

    #[test]
    fn test_unstable_output_is_clamped() {
        // Negative resonance puts the poles outside the unit circle
        let mut filter = Filter::new(1000.0, FilterKind::Lowpass, 44100, -1.0);
        let output = filter.process(&vec![1.0_f32; 20000]);
        assert!(output.iter().all(|s| s.is_finite() && s.abs() <= 10.0));
    }
}
