//! Canonical WAV container parsing
//!
//! Only one layout is accepted: a 44-byte RIFF header followed directly by
//! interleaved 16-bit stereo PCM. There is no chunk walking; files with extra
//! chunks before `data` are rejected through the misread header fields.
//!
//! ```text
//! offset  size  field
//!      0     4  "RIFF"
//!     22     2  channel count
//!     24     4  sample rate
//!     28     4  byte rate
//!     32     2  block align
//!     34     2  bits per sample
//!     44     -  sample data
//! ```

use crate::error::FormatError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Size of the canonical header; sample data starts here
pub const HEADER_LEN: usize = 44;

/// Divisor mapping a signed 16-bit sample onto [-1, 1)
pub const I16_NORMALIZATION: f32 = 32768.0;

const EXPECTED_CHANNELS: u16 = 2;
const EXPECTED_BLOCK_ALIGN: u16 = 4;
const EXPECTED_BITS_PER_SAMPLE: u16 = 16;

/// Supported sample rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleRate {
    /// 44.1 kHz
    Hz44100,
    /// 48 kHz
    Hz48000,
}

impl SampleRate {
    /// Map a raw header value onto a supported rate
    pub fn from_hz(hz: u32) -> Option<Self> {
        match hz {
            44100 => Some(Self::Hz44100),
            48000 => Some(Self::Hz48000),
            _ => None,
        }
    }

    /// Rate in Hz
    pub fn hz(self) -> u32 {
        match self {
            Self::Hz44100 => 44100,
            Self::Hz48000 => 48000,
        }
    }
}

impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.hz())
    }
}

/// Validated header fields of a canonical stereo 16-bit WAV file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    /// Always 2
    pub channel_count: u16,
    pub sample_rate: SampleRate,
    /// Bytes per second as written in the file
    pub byte_rate: u32,
    /// Always 4
    pub block_align: u16,
    /// Always 16
    pub bits_per_sample: u16,
}

impl WavHeader {
    /// Number of complete sample blocks in a data region of `len` bytes
    pub fn block_count(&self, len: usize) -> usize {
        len / self.block_align as usize
    }
}

/// Left/right samples normalized to [-1, 1]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelPair {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl ChannelPair {
    /// Number of blocks (samples per channel)
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Average of both channels, sample by sample
    pub fn mid(&self) -> Vec<f32> {
        self.left
            .iter()
            .zip(&self.right)
            .map(|(l, r)| (l + r) / 2.0)
            .collect()
    }
}

fn read_u16(buffer: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buffer[offset], buffer[offset + 1]])
}

fn read_u32(buffer: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buffer[offset],
        buffer[offset + 1],
        buffer[offset + 2],
        buffer[offset + 3],
    ])
}

/// Validate the header and return it with the sample data region
///
/// Checks run in a fixed order so the first violated constraint decides the
/// error: RIFF tag, header length, channel count, sample rate, block align,
/// bit depth.
pub fn parse(buffer: &[u8]) -> Result<(WavHeader, &[u8]), FormatError> {
    if buffer.len() < 4 || &buffer[0..4] != b"RIFF" {
        return Err(FormatError::NotRiff);
    }
    if buffer.len() < HEADER_LEN {
        return Err(FormatError::TruncatedHeader(buffer.len()));
    }

    let channel_count = read_u16(buffer, 22);
    if channel_count != EXPECTED_CHANNELS {
        return Err(FormatError::UnsupportedChannelCount(channel_count));
    }

    let raw_rate = read_u32(buffer, 24);
    let sample_rate =
        SampleRate::from_hz(raw_rate).ok_or(FormatError::UnsupportedSampleRate(raw_rate))?;

    let byte_rate = read_u32(buffer, 28);

    let block_align = read_u16(buffer, 32);
    if block_align != EXPECTED_BLOCK_ALIGN {
        return Err(FormatError::UnsupportedBlockAlign(block_align));
    }

    let bits_per_sample = read_u16(buffer, 34);
    if bits_per_sample != EXPECTED_BITS_PER_SAMPLE {
        return Err(FormatError::UnsupportedBitDepth(bits_per_sample));
    }

    let expected_byte_rate = sample_rate.hz() * u32::from(block_align);
    if byte_rate != expected_byte_rate {
        warn!(
            byte_rate,
            expected_byte_rate, "WAV byte rate disagrees with sample rate and block align"
        );
    }

    let header = WavHeader {
        channel_count,
        sample_rate,
        byte_rate,
        block_align,
        bits_per_sample,
    };
    let data = &buffer[HEADER_LEN..];

    debug!(
        sample_rate = %header.sample_rate,
        blocks = header.block_count(data.len()),
        "Parsed WAV header"
    );

    Ok((header, data))
}

/// Decode interleaved 16-bit stereo blocks into normalized channels
///
/// Steps through `region` by `block_align * stride` bytes, reading left at
/// block offset 0 and right at offset 2. `stride == 1` decodes every block;
/// larger strides produce a decimated preview. `byte_start`/`byte_end` restrict
/// decoding to a sub-range and are clamped to the region. Only complete blocks
/// are decoded. A block align below 4 cannot hold a stereo 16-bit block and
/// yields an empty pair.
pub fn decode_channels(
    region: &[u8],
    block_align: u16,
    stride: usize,
    byte_start: Option<usize>,
    byte_end: Option<usize>,
) -> ChannelPair {
    let block_align = block_align as usize;
    if block_align < usize::from(EXPECTED_BLOCK_ALIGN) {
        warn!(block_align, "Block align too small for 16-bit stereo, nothing decoded");
        return ChannelPair::default();
    }

    let step = block_align.saturating_mul(stride.max(1));
    let end = byte_end.unwrap_or(region.len()).min(region.len());
    let mut offset = byte_start.unwrap_or(0);

    let capacity = end.saturating_sub(offset) / step + 1;
    let mut pair = ChannelPair {
        left: Vec::with_capacity(capacity),
        right: Vec::with_capacity(capacity),
    };

    while offset.checked_add(block_align).is_some_and(|block_end| block_end <= end) {
        let left = i16::from_le_bytes([region[offset], region[offset + 1]]);
        let right = i16::from_le_bytes([region[offset + 2], region[offset + 3]]);
        pair.left.push(f32::from(left) / I16_NORMALIZATION);
        pair.right.push(f32::from(right) / I16_NORMALIZATION);

        match offset.checked_add(step) {
            Some(next) => offset = next,
            None => break,
        }
    }

    pair
}
