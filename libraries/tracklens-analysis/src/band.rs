//! Frequency bands built from cascaded biquads
//!
//! Band definitions are plain configuration values. Filters are instantiated
//! per [`apply_band`] call for an explicit sample rate and dropped afterwards,
//! so no filter state leaks between bands or between analyses.
//!
//! | Band      | Low-pass  | High-pass |
//! |-----------|-----------|-----------|
//! | all       | -         | -         |
//! | bass      | 100 Hz    | -         |
//! | low-mid   | 2000 Hz   | 100 Hz    |
//! | high-mid  | 10000 Hz  | 2000 Hz   |
//! | high      | -         | 10000 Hz  |

use crate::filter::{Filter, FilterKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named analysis band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Band {
    /// Unfiltered signal
    All,
    Bass,
    LowMid,
    HighMid,
    High,
}

impl Band {
    /// Every band, unfiltered first
    pub const ALL: [Band; 5] = [
        Band::All,
        Band::Bass,
        Band::LowMid,
        Band::HighMid,
        Band::High,
    ];

    /// Filter cutoffs for this band
    pub fn definition(self) -> BandDefinition {
        match self {
            Self::All => BandDefinition {
                lowpass_hz: None,
                highpass_hz: None,
            },
            Self::Bass => BandDefinition {
                lowpass_hz: Some(100.0),
                highpass_hz: None,
            },
            Self::LowMid => BandDefinition {
                lowpass_hz: Some(2000.0),
                highpass_hz: Some(100.0),
            },
            Self::HighMid => BandDefinition {
                lowpass_hz: Some(10000.0),
                highpass_hz: Some(2000.0),
            },
            Self::High => BandDefinition {
                lowpass_hz: None,
                highpass_hz: Some(10000.0),
            },
        }
    }

    /// Human-readable frequency range
    pub fn range(self) -> FrequencyRange {
        self.definition().range()
    }

    /// Stable identifier used in progress messages and logs
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Bass => "bass",
            Self::LowMid => "low-mid",
            Self::HighMid => "high-mid",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cutoff configuration of a band, independent of any sample rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandDefinition {
    pub lowpass_hz: Option<f64>,
    pub highpass_hz: Option<f64>,
}

impl BandDefinition {
    /// Label derived from the cutoffs; missing edges become "0" and "max"
    pub fn range(&self) -> FrequencyRange {
        FrequencyRange {
            from: self
                .highpass_hz
                .map_or_else(|| "0".to_string(), |hz| format!("{hz}")),
            to: self
                .lowpass_hz
                .map_or_else(|| "max".to_string(), |hz| format!("{hz}")),
        }
    }
}

/// Frequency range label of a band, in Hz
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyRange {
    pub from: String,
    pub to: String,
}

impl fmt::Display for FrequencyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} Hz", self.from, self.to)
    }
}

/// Filter a signal into a band
///
/// With both filters the signal runs low-pass, high-pass, low-pass,
/// high-pass. A single filter is applied twice. The unfiltered band returns
/// a copy of the input. Each biquad pass drops two samples.
pub fn apply_band(signal: &[f32], band: Band, sample_rate: u32, resonance: f64) -> Vec<f32> {
    let definition = band.definition();
    let mut lowpass = definition
        .lowpass_hz
        .map(|hz| Filter::new(hz, FilterKind::Lowpass, sample_rate, resonance));
    let mut highpass = definition
        .highpass_hz
        .map(|hz| Filter::new(hz, FilterKind::Highpass, sample_rate, resonance));

    match (lowpass.as_mut(), highpass.as_mut()) {
        (Some(lp), Some(hp)) => {
            let first = hp.process(&lp.process(signal));
            hp.process(&lp.process(&first))
        }
        (Some(filter), None) | (None, Some(filter)) => {
            let first = filter.process(signal);
            filter.process(&first)
        }
        (None, None) => signal.to_vec(),
    }
}
