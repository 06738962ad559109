//! Real-input FFT producing a half-length magnitude spectrum
//!
//! The N real samples are packed into N/2 complex points (even samples as
//! the real part, odd samples as the imaginary part), transformed with an
//! iterative decimation-in-time FFT, then split back into the spectrum of
//! the real signal using its conjugate symmetry.
//!
//! The complex transform runs on bit-reversed input: radix-4 butterflies
//! combine sub-transforms of size 1, 4, 16, … and a final radix-2 stage
//! finishes when N/2 is not a power of four. Twiddle factors are evaluated
//! directly with sin/cos per stage.
//!
//! The bit-reversal table is built over the N/2 packed points, not over the
//! N-sample window. After unpacking, the spectrum equals that of a full
//! N-point real transform.

use crate::error::{AnalysisError, Result};
use std::f64::consts::PI;

/// Real FFT of a fixed power-of-two size
#[derive(Debug, Clone)]
pub struct Rfft {
    size: usize,
    /// Bit-reversal table over the N/2 packed points
    reverse: Vec<usize>,
    re: Vec<f64>,
    im: Vec<f64>,
    spectrum: Vec<f32>,
    peak_bin: usize,
    peak: f32,
}

#[inline]
fn cmul(ar: f64, ai: f64, br: f64, bi: f64) -> (f64, f64) {
    (ar * br - ai * bi, ar * bi + ai * br)
}

fn bit_reversal_table(len: usize) -> Vec<usize> {
    let bits = len.trailing_zeros();
    if bits == 0 {
        return vec![0; len];
    }
    (0..len)
        .map(|i| i.reverse_bits() >> (usize::BITS - bits))
        .collect()
}

impl Rfft {
    /// Create a transform for frames of `size` samples
    ///
    /// `size` must be a power of two and at least 2.
    pub fn new(size: usize) -> Result<Self> {
        if size < 2 || !size.is_power_of_two() {
            return Err(AnalysisError::InvalidParameter(format!(
                "FFT size must be a power of two >= 2, got {}",
                size
            )));
        }

        let half = size / 2;
        Ok(Self {
            size,
            reverse: bit_reversal_table(half),
            re: vec![0.0; half],
            im: vec![0.0; half],
            spectrum: vec![0.0; half],
            peak_bin: 0,
            peak: 0.0,
        })
    }

    /// Frame length in samples
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of magnitude bins (size / 2)
    pub fn bin_count(&self) -> usize {
        self.size / 2
    }

    /// Bin with the largest magnitude in the last transform, excluding DC
    pub fn peak_bin(&self) -> usize {
        self.peak_bin
    }

    /// Largest magnitude in the last transform, excluding DC
    pub fn peak(&self) -> f32 {
        self.peak
    }

    /// Magnitudes from the last transform
    pub fn spectrum(&self) -> &[f32] {
        &self.spectrum
    }

    /// Transform one frame and return its magnitude spectrum
    ///
    /// Bin k ≥ 1 holds `(2/N)·|X[k]|`; bin 0 holds the signed DC term
    /// `(2/N)·X[0]`.
    pub fn forward(&mut self, frame: &[f32]) -> Result<&[f32]> {
        if frame.len() != self.size {
            return Err(AnalysisError::InvalidParameter(format!(
                "FFT frame has {} samples, expected {}",
                frame.len(),
                self.size
            )));
        }

        for (i, &j) in self.reverse.iter().enumerate() {
            self.re[i] = f64::from(frame[2 * j]);
            self.im[i] = f64::from(frame[2 * j + 1]);
        }

        self.transform();
        self.unpack();

        Ok(&self.spectrum)
    }

    /// In-place complex FFT of the bit-reversed scratch buffers
    fn transform(&mut self) {
        let n = self.re.len();
        let (re, im) = (&mut self.re, &mut self.im);

        let mut len = 1;
        while len * 4 <= n {
            let size = len * 4;
            let step = -2.0 * PI / size as f64;

            for k in 0..len {
                let angle = step * k as f64;
                let (w1r, w1i) = (angle.cos(), angle.sin());
                let (w2r, w2i) = ((2.0 * angle).cos(), (2.0 * angle).sin());
                let (w3r, w3i) = ((3.0 * angle).cos(), (3.0 * angle).sin());

                for base in (0..n).step_by(size) {
                    // Quarters hold the sub-transforms of indices 0, 2, 1, 3 mod 4
                    let p0 = base + k;
                    let p1 = p0 + len;
                    let p2 = p1 + len;
                    let p3 = p2 + len;

                    let (t0r, t0i) = (re[p0], im[p0]);
                    let (t1r, t1i) = cmul(re[p2], im[p2], w1r, w1i);
                    let (t2r, t2i) = cmul(re[p1], im[p1], w2r, w2i);
                    let (t3r, t3i) = cmul(re[p3], im[p3], w3r, w3i);

                    let (s02r, s02i) = (t0r + t2r, t0i + t2i);
                    let (d02r, d02i) = (t0r - t2r, t0i - t2i);
                    let (s13r, s13i) = (t1r + t3r, t1i + t3i);
                    let (d13r, d13i) = (t1r - t3r, t1i - t3i);

                    re[p0] = s02r + s13r;
                    im[p0] = s02i + s13i;
                    re[p1] = d02r + d13i;
                    im[p1] = d02i - d13r;
                    re[p2] = s02r - s13r;
                    im[p2] = s02i - s13i;
                    re[p3] = d02r - d13i;
                    im[p3] = d02i + d13r;
                }
            }

            len = size;
        }

        if len * 2 == n {
            let step = -2.0 * PI / n as f64;
            for k in 0..len {
                let angle = step * k as f64;
                let (tr, ti) = cmul(re[k + len], im[k + len], angle.cos(), angle.sin());
                let (ar, ai) = (re[k], im[k]);
                re[k] = ar + tr;
                im[k] = ai + ti;
                re[k + len] = ar - tr;
                im[k + len] = ai - ti;
            }
        }
    }

    /// Split the packed transform into the real signal's spectrum
    fn unpack(&mut self) {
        let half = self.re.len();
        let scale = 2.0 / self.size as f64;
        let step = -2.0 * PI / self.size as f64;

        self.peak_bin = 0;
        self.peak = 0.0;

        for k in 0..half {
            let (zr, zi) = (self.re[k], self.im[k]);
            let mirror = (half - k) % half;
            let (cr, ci) = (self.re[mirror], -self.im[mirror]);

            // Even-sample and odd-sample transforms
            let (er, ei) = ((zr + cr) / 2.0, (zi + ci) / 2.0);
            let (or, oi) = ((zi - ci) / 2.0, -(zr - cr) / 2.0);

            let angle = step * k as f64;
            let (tr, ti) = cmul(or, oi, angle.cos(), angle.sin());
            let (xr, xi) = (er + tr, ei + ti);

            if k == 0 {
                self.spectrum[0] = (scale * xr) as f32;
                continue;
            }

            let magnitude = (scale * xr.hypot(xi)) as f32;
            self.spectrum[k] = magnitude;
            if magnitude > self.peak {
                self.peak = magnitude;
                self.peak_bin = k;
            }
        }
    }
}
