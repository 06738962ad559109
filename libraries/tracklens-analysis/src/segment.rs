//! Loudest-segment search over a decimated preview
//!
//! A fixed-length window slides one block at a time across the preview while
//! a running mean-square loudness is updated incrementally. The earliest
//! window with the highest value wins.

use crate::wav::ChannelPair;
use serde::{Deserialize, Serialize};

/// Segment borders in full-resolution samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSegment {
    pub start_sample: usize,
    pub end_sample: usize,
}

/// Segment borders in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioSegmentSeconds {
    pub start: f64,
    pub end: f64,
}

impl AudioSegment {
    pub fn len(&self) -> usize {
        self.end_sample - self.start_sample
    }

    pub fn is_empty(&self) -> bool {
        self.end_sample == self.start_sample
    }

    pub fn to_seconds(&self, sample_rate: u32) -> AudioSegmentSeconds {
        let rate = f64::from(sample_rate);
        AudioSegmentSeconds {
            start: self.start_sample as f64 / rate,
            end: self.end_sample as f64 / rate,
        }
    }

    /// Byte range of the segment inside the sample data region
    pub fn byte_range(&self, block_align: u16) -> (usize, usize) {
        let block_align = block_align as usize;
        (self.start_sample * block_align, self.end_sample * block_align)
    }
}

/// Window length in decimated blocks covering `seconds` of audio
pub fn window_blocks(byte_rate: u32, block_align: u16, stride: usize, seconds: f64) -> usize {
    let blocks_per_second =
        f64::from(byte_rate) / (f64::from(block_align) * stride.max(1) as f64);
    (blocks_per_second * seconds).ceil() as usize
}

fn block_loudness(pair: &ChannelPair, index: usize) -> f64 {
    let mid = (f64::from(pair.left[index]) + f64::from(pair.right[index])) / 2.0;
    mid * mid
}

/// Decimated index of the loudest window
///
/// Returns 0 when the preview is not longer than the window; the whole
/// preview is then the only candidate.
pub fn loudest_window_start(decimated: &ChannelPair, window: usize) -> usize {
    let len = decimated.len();
    let window = window.min(len);
    if window == 0 {
        return 0;
    }

    let scale = window as f64;
    let mut running: f64 = (0..window)
        .map(|i| block_loudness(decimated, i) / scale)
        .sum();

    let mut best_value = running;
    let mut best_start = 0;

    for start in 1..=len - window {
        running -= block_loudness(decimated, start - 1) / scale;
        running += block_loudness(decimated, start + window - 1) / scale;

        if running > best_value {
            best_value = running;
            best_start = start;
        }
    }

    best_start
}

/// Locate the loudest segment
///
/// `window` is the search window in decimated blocks and `stride` the
/// decimation factor. The segment always spans `segment_samples` from the
/// chosen start.
pub fn locate(
    decimated: &ChannelPair,
    window: usize,
    stride: usize,
    segment_samples: usize,
) -> AudioSegment {
    let start_sample = loudest_window_start(decimated, window) * stride.max(1);
    AudioSegment {
        start_sample,
        end_sample: start_sample + segment_samples,
    }
}
