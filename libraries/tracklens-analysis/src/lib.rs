//! Loudest-segment, band RMS and spectrum analysis for Tracklens
//!
//! This crate provides:
//! - Validation and decoding of canonical 16-bit stereo WAV buffers
//! - A coarse search for the loudest fixed-length segment of a track
//! - Biquad band splitting (bass, low-mid, high-mid, high) of that segment
//! - Windowed RMS in dB per band, summarized by its 95th/99th percentiles
//! - A magnitude spectrogram of the segment from a real-input FFT
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌───────────────┐
//! │  WAV bytes  │ ──► │ Parser       │ ──► │ Decimated     │
//! └─────────────┘     └──────────────┘     │ preview       │
//!                                          └───────────────┘
//!                                                  │
//!                                                  ▼
//! ┌─────────────┐     ┌──────────────┐     ┌───────────────┐
//! │ Full-res    │ ◄── │ Extraction   │ ◄── │ Segment       │
//! │ segment     │     └──────────────┘     │ locator       │
//! └─────────────┘                          └───────────────┘
//!        │
//!        ├──► Band filters ──► RMS estimator (five concurrent tasks)
//!        │
//!        └──► Spectrum generator ──► RFFT per frame
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tracklens_analysis::{analyze, AnalysisConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let bytes = std::fs::read("track.wav")?;
//! let report = analyze(&bytes, AnalysisConfig::default(), None, &CancellationToken::new()).await?;
//!
//! println!(
//!     "Loudest segment: {:.1}s - {:.1}s",
//!     report.the_loudest_segment.start, report.the_loudest_segment.end
//! );
//! println!("Low-mid p99: {:.2} dB", report.rms.low_mid.interval.percentile_high);
//! ```

#![deny(unsafe_code)]

mod analyzer;
mod band;
mod config;
mod error;
mod fft;
mod filter;
mod rms;
mod segment;
mod spectrum;
mod wav;

pub use analyzer::{analyze, AnalysisReport, BandRms, BandRmsResult, TrackAnalyzer};
pub use band::{apply_band, Band, BandDefinition, FrequencyRange};
pub use config::{AnalysisConfig, ChannelSelection, RmsSettings, SpectrumSettings};
pub use error::{AnalysisError, FormatError, Result};
pub use fft::Rfft;
pub use filter::{Filter, FilterKind, DEFAULT_RESONANCE};
pub use rms::{
    RmsEstimator, RmsInterval, RmsProgress, DEFAULT_BATCH_SIZE, PERCENTILE_HIGH, PERCENTILE_LOW,
};
pub use segment::{locate, loudest_window_start, window_blocks, AudioSegment, AudioSegmentSeconds};
pub use spectrum::{SpectrumGenerator, Spectrogram};
pub use wav::{
    decode_channels, parse, ChannelPair, SampleRate, WavHeader, HEADER_LEN, I16_NORMALIZATION,
};

pub use tokio_util::sync::CancellationToken;
