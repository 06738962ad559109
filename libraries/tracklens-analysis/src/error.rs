//! Error types for track analysis

use thiserror::Error;

/// Result type for analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors raised while validating the WAV container
///
/// The accepted layout is deliberately narrow: canonical 44-byte header,
/// 2 channels, 16-bit samples, 44.1 or 48 kHz.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The buffer does not start with the `RIFF` tag
    #[error("Not a WAV file: missing RIFF tag")]
    NotRiff,

    /// The buffer ends before the canonical header does
    #[error("Truncated WAV header: {0} bytes (need 44)")]
    TruncatedHeader(usize),

    /// Anything other than stereo
    #[error("Unsupported channel count: {0} (must be 2)")]
    UnsupportedChannelCount(u16),

    /// Sample rate outside 44100/48000
    #[error("Unsupported sample rate: {0} Hz (must be 44100 or 48000)")]
    UnsupportedSampleRate(u32),

    /// Block alignment other than 4 bytes
    #[error("Unsupported block align: {0} (must be 4)")]
    UnsupportedBlockAlign(u16),

    /// Bit depth other than 16
    #[error("Unsupported bit depth: {0} (must be 16)")]
    UnsupportedBitDepth(u16),
}

/// Errors that can occur during analysis
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Container validation failed
    #[error(transparent)]
    Format(#[from] FormatError),

    /// A stage was invoked before the stage it depends on
    #[error("Invalid analyzer state: {0}")]
    State(&'static str),

    /// A numeric parameter is out of range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The signal is not longer than a single RMS window
    #[error("Signal too short: {len} samples for a {window}-sample window")]
    SignalTooShort { len: usize, window: usize },

    /// The run was cancelled through its token
    #[error("Analysis cancelled")]
    Cancelled,

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// A spawned band task failed to complete
    #[error("Band task failed: {0}")]
    Task(String),
}

impl From<config::ConfigError> for AnalysisError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AnalysisError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}
