/// Analysis configuration
use crate::error::{AnalysisError, Result};
use crate::filter::DEFAULT_RESONANCE;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Channel fed into the band RMS estimation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelSelection {
    #[default]
    Left,
    Right,
    /// Average of left and right
    Mid,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AnalysisConfig {
    /// Length of the loudest segment
    #[serde(default = "default_segment_seconds")]
    pub segment_seconds: f64,

    /// Keep every Nth block for the coarse segment search
    #[serde(default = "default_decimation")]
    pub decimation: usize,

    /// Biquad resonance shared by all band filters
    #[serde(default = "default_resonance")]
    pub resonance: f64,

    #[serde(default = "default_rms")]
    pub rms: RmsSettings,

    #[serde(default = "default_spectrum")]
    pub spectrum: SpectrumSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RmsSettings {
    #[serde(default = "default_rms_window_ms")]
    pub window_ms: f64,

    /// Hop as a fraction of the window
    #[serde(default = "default_rms_hop_fraction")]
    pub hop_fraction: f64,

    /// Evaluate every window start instead of hopping
    #[serde(default)]
    pub accurate: bool,

    /// Size the window in decimated preview blocks instead of samples
    ///
    /// The window is still applied to full-resolution samples, so it covers
    /// `window_ms / decimation` of audio.
    #[serde(default)]
    pub window_in_preview_blocks: bool,

    /// Windows computed between yields to the runtime
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub channel: ChannelSelection,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SpectrumSettings {
    #[serde(default)]
    pub enabled: bool,

    /// FFT size, power of two
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(default = "default_delay_ms")]
    pub delay_ms: f64,

    /// Fraction of the delay shared by consecutive frames
    #[serde(default = "default_overlap")]
    pub overlap: f64,

    /// Apply the cos² taper before transforming
    #[serde(default)]
    pub windowed: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            segment_seconds: default_segment_seconds(),
            decimation: default_decimation(),
            resonance: default_resonance(),
            rms: default_rms(),
            spectrum: default_spectrum(),
        }
    }
}

impl Default for RmsSettings {
    fn default() -> Self {
        default_rms()
    }
}

impl Default for SpectrumSettings {
    fn default() -> Self {
        default_spectrum()
    }
}

impl AnalysisConfig {
    /// Load configuration from an optional TOML file and the environment
    ///
    /// Environment variables use the `TRACKLENS` prefix with `__` between
    /// levels, e.g. `TRACKLENS_RMS__WINDOW_MS=400`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        if let Some(path) = path {
            settings = settings.add_source(config::File::from(path));
        }

        settings = settings.add_source(
            config::Environment::with_prefix("TRACKLENS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.segment_seconds > 0.0 && self.segment_seconds.is_finite()) {
            return Err(AnalysisError::Config(format!(
                "segment_seconds must be positive, got {}",
                self.segment_seconds
            )));
        }

        if self.decimation == 0 {
            return Err(AnalysisError::Config(
                "decimation must be at least 1".to_string(),
            ));
        }

        if !(self.resonance > 0.0 && self.resonance.is_finite()) {
            return Err(AnalysisError::Config(format!(
                "resonance must be positive, got {}",
                self.resonance
            )));
        }

        if !(self.rms.window_ms > 0.0 && self.rms.window_ms.is_finite()) {
            return Err(AnalysisError::Config(format!(
                "rms.window_ms must be positive, got {}",
                self.rms.window_ms
            )));
        }

        if !(self.rms.hop_fraction > 0.0 && self.rms.hop_fraction <= 1.0) {
            return Err(AnalysisError::Config(format!(
                "rms.hop_fraction must be in (0, 1], got {}",
                self.rms.hop_fraction
            )));
        }

        if self.rms.batch_size == 0 {
            return Err(AnalysisError::Config(
                "rms.batch_size must be at least 1".to_string(),
            ));
        }

        if self.spectrum.window_size < 2 || !self.spectrum.window_size.is_power_of_two() {
            return Err(AnalysisError::Config(format!(
                "spectrum.window_size must be a power of two >= 2, got {}",
                self.spectrum.window_size
            )));
        }

        if !(0.0..1.0).contains(&self.spectrum.overlap) {
            return Err(AnalysisError::Config(format!(
                "spectrum.overlap must be in [0, 1), got {}",
                self.spectrum.overlap
            )));
        }

        Ok(())
    }
}

// Default values
fn default_segment_seconds() -> f64 {
    10.0
}

fn default_decimation() -> usize {
    32
}

fn default_resonance() -> f64 {
    DEFAULT_RESONANCE
}

fn default_rms() -> RmsSettings {
    RmsSettings {
        window_ms: default_rms_window_ms(),
        hop_fraction: default_rms_hop_fraction(),
        accurate: false,
        window_in_preview_blocks: false,
        batch_size: default_batch_size(),
        channel: ChannelSelection::default(),
    }
}

fn default_rms_window_ms() -> f64 {
    300.0
}

fn default_rms_hop_fraction() -> f64 {
    0.1
}

fn default_batch_size() -> usize {
    crate::rms::DEFAULT_BATCH_SIZE
}

fn default_spectrum() -> SpectrumSettings {
    SpectrumSettings {
        enabled: false,
        window_size: default_window_size(),
        delay_ms: default_delay_ms(),
        overlap: default_overlap(),
        windowed: false,
    }
}

fn default_window_size() -> usize {
    1024
}

fn default_delay_ms() -> f64 {
    20.0
}

fn default_overlap() -> f64 {
    0.5
}
