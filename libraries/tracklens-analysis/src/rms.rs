//! Windowed RMS in decibels with percentile summary
//!
//! A window of fixed length steps through the signal by a hop. Each window
//! yields `20·log10(rms)` rounded to two decimals, with samples clamped to
//! [-1, 1] before squaring. The series is summarized by its 95th and 99th
//! percentile values, which skips both the silent tail and rare spikes.
//!
//! The async form processes a bounded batch of windows, reports progress,
//! then yields to the runtime before continuing.

use crate::band::Band;
use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Rank of the lower reported percentile
pub const PERCENTILE_LOW: f64 = 0.95;
/// Rank of the upper reported percentile
pub const PERCENTILE_HIGH: f64 = 0.99;

/// Windows processed between yields in the cooperative form
pub const DEFAULT_BATCH_SIZE: usize = 4096;

/// Decibel values in JSON
///
/// JSON has no infinity, so `-∞` dB is written as `null` and `null` is read
/// back as `-∞`.
mod decibels {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NEG_INFINITY))
    }

    pub mod series {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(values.iter().map(|v| v.is_finite().then_some(*v)))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<f64>, D::Error> {
            let values = Vec::<Option<f64>>::deserialize(deserializer)?;
            Ok(values
                .into_iter()
                .map(|v| v.unwrap_or(f64::NEG_INFINITY))
                .collect())
        }
    }
}

/// Percentile summary of an RMS series
///
/// The percentiles are not the series minimum and maximum. A window of
/// digital silence gives `-∞` dB, which is a valid value and survives a JSON
/// round trip as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RmsInterval {
    /// Value at rank floor(0.95·N) of the sorted series
    #[serde(with = "decibels")]
    pub percentile_low: f64,
    /// Value at rank floor(0.99·N) of the sorted series
    #[serde(with = "decibels")]
    pub percentile_high: f64,
    /// Per-window values in time order
    #[serde(with = "decibels::series")]
    pub raw_series: Vec<f64>,
}

impl RmsInterval {
    /// Summarize a series; `None` when it is empty
    pub fn from_series(raw_series: Vec<f64>) -> Option<Self> {
        if raw_series.is_empty() {
            return None;
        }

        let mut sorted = raw_series.clone();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len() as f64;
        let low = (PERCENTILE_LOW * n).floor() as usize;
        let high = (PERCENTILE_HIGH * n).floor() as usize;

        Some(Self {
            percentile_low: sorted[low.min(sorted.len() - 1)],
            percentile_high: sorted[high.min(sorted.len() - 1)],
            raw_series,
        })
    }
}

/// Progress of one band's RMS estimation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RmsProgress {
    pub band: Band,
    /// Fraction of windows processed, 0 to 1
    pub progress: f64,
}

/// Windowed RMS estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RmsEstimator {
    window: usize,
    hop: usize,
    batch_size: usize,
}

impl RmsEstimator {
    /// Create an estimator with window and hop in samples
    pub fn new(window: usize, hop: usize) -> Result<Self> {
        if window == 0 {
            return Err(AnalysisError::InvalidParameter(
                "RMS window must be at least one sample".to_string(),
            ));
        }
        if hop == 0 {
            return Err(AnalysisError::InvalidParameter(
                "RMS hop must be at least one sample".to_string(),
            ));
        }
        Ok(Self {
            window,
            hop,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Estimator evaluating every window start (hop of one sample)
    pub fn accurate(window: usize) -> Result<Self> {
        Self::new(window, 1)
    }

    /// Window from a duration, hop as a fraction of the window
    ///
    /// The window is rounded up to whole samples and the hop rounded down,
    /// but never below one sample.
    pub fn from_duration(sample_rate: u32, window_ms: f64, hop_fraction: f64) -> Result<Self> {
        Self::from_rate(f64::from(sample_rate), window_ms, hop_fraction)
    }

    /// Like [`RmsEstimator::from_duration`] with an arbitrary units-per-second rate
    ///
    /// Passing the preview block rate (`byte_rate / (block_align · decimation)`)
    /// sizes the window in preview blocks, which yields a window about
    /// `decimation` times shorter when applied to full-resolution samples.
    pub fn from_rate(rate: f64, window_ms: f64, hop_fraction: f64) -> Result<Self> {
        let window = (rate * window_ms / 1000.0).ceil() as usize;
        let hop = ((hop_fraction * window as f64).floor() as usize).max(1);
        Self::new(window, hop)
    }

    /// Set the number of windows processed between yields
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of windows produced for a signal of `len` samples
    ///
    /// Window starts run `0, hop, 2·hop, …` while below `len - window`.
    pub fn window_count(&self, len: usize) -> usize {
        if len <= self.window {
            return 0;
        }
        (len - self.window).div_ceil(self.hop)
    }

    fn window_db(&self, signal: &[f32], start: usize) -> f64 {
        let scale = self.window as f64;
        let mean_square: f64 = signal[start..start + self.window]
            .iter()
            .map(|&s| {
                let s = f64::from(s.clamp(-1.0, 1.0));
                s * s / scale
            })
            .sum();

        let db = 20.0 * mean_square.sqrt().log10();
        (db * 100.0).round() / 100.0
    }

    fn too_short(&self, len: usize) -> AnalysisError {
        AnalysisError::SignalTooShort {
            len,
            window: self.window,
        }
    }

    /// Compute the full series and its percentile interval in one pass
    pub fn estimate(&self, signal: &[f32]) -> Result<RmsInterval> {
        let count = self.window_count(signal.len());
        let series: Vec<f64> = (0..count)
            .map(|n| self.window_db(signal, n * self.hop))
            .collect();

        RmsInterval::from_series(series).ok_or_else(|| self.too_short(signal.len()))
    }

    /// Cooperative form of [`RmsEstimator::estimate`]
    ///
    /// Processes `batch_size` windows at a time, sends a progress update
    /// after each batch, then yields to the runtime. The token is checked
    /// before every batch. Progress updates are dropped if the receiver is
    /// gone; they never affect the result.
    pub async fn estimate_cooperative(
        &self,
        signal: &[f32],
        band: Band,
        progress: Option<&mpsc::Sender<RmsProgress>>,
        cancel: &CancellationToken,
    ) -> Result<RmsInterval> {
        let total = self.window_count(signal.len());
        if total == 0 {
            return Err(self.too_short(signal.len()));
        }

        let mut series = Vec::with_capacity(total);
        while series.len() < total {
            if cancel.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }

            let batch_end = (series.len() + self.batch_size).min(total);
            for n in series.len()..batch_end {
                series.push(self.window_db(signal, n * self.hop));
            }

            if let Some(tx) = progress {
                let _ = tx
                    .send(RmsProgress {
                        band,
                        progress: series.len() as f64 / total as f64,
                    })
                    .await;
            }

            tokio::task::yield_now().await;
        }

        RmsInterval::from_series(series).ok_or_else(|| self.too_short(signal.len()))
    }
}
