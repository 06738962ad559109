//! Staged track analysis
//!
//! Stages run in a fixed order and each one requires the previous:
//!
//! 1. [`TrackAnalyzer::parse`] validates the header and decodes the decimated preview
//! 2. [`TrackAnalyzer::locate_segment`] finds the loudest segment in the preview
//! 3. [`TrackAnalyzer::extract_segment`] decodes that segment at full resolution
//! 4. [`TrackAnalyzer::rms_for_band`] and [`TrackAnalyzer::spectrum`] measure it
//!
//! [`TrackAnalyzer::analyze`] runs the whole pipeline, estimating the five bands
//! as concurrent tasks.

use crate::band::{apply_band, Band, FrequencyRange};
use crate::config::{AnalysisConfig, ChannelSelection};
use crate::error::{AnalysisError, Result};
use crate::rms::{RmsEstimator, RmsInterval, RmsProgress};
use crate::segment::{self, AudioSegment, AudioSegmentSeconds};
use crate::spectrum::{SpectrumGenerator, Spectrogram};
use crate::wav::{self, ChannelPair, WavHeader};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// RMS result of one band together with its frequency label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandRmsResult {
    pub range: FrequencyRange,
    pub interval: RmsInterval,
}

impl BandRmsResult {
    fn new(band: Band, interval: RmsInterval) -> Self {
        Self {
            range: band.range(),
            interval,
        }
    }
}

/// RMS results for every band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandRms {
    pub all: BandRmsResult,
    pub bass: BandRmsResult,
    pub low_mid: BandRmsResult,
    pub high_mid: BandRmsResult,
    pub high: BandRmsResult,
}

impl BandRms {
    /// Result for a single band
    pub fn get(&self, band: Band) -> &BandRmsResult {
        match band {
            Band::All => &self.all,
            Band::Bass => &self.bass,
            Band::LowMid => &self.low_mid,
            Band::HighMid => &self.high_mid,
            Band::High => &self.high,
        }
    }
}

/// Combined result of a full analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub the_loudest_segment: AudioSegmentSeconds,
    /// Track length estimated from the decimated preview
    pub duration_seconds: f64,
    pub rms: BandRms,
    /// Present when spectrum generation is enabled
    pub spectrum: Option<Spectrogram>,
    pub time_to_process_ms: u64,
}

/// Pipeline over one WAV buffer
///
/// Calling a stage before its prerequisite returns [`AnalysisError::State`].
/// Parsing a new buffer discards every later stage.
#[derive(Debug)]
pub struct TrackAnalyzer {
    config: AnalysisConfig,
    header: Option<WavHeader>,
    data: Vec<u8>,
    preview: Option<ChannelPair>,
    segment: Option<AudioSegment>,
    channels: Option<ChannelPair>,
}

impl TrackAnalyzer {
    /// Create an analyzer; the configuration is validated first
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            header: None,
            data: Vec::new(),
            preview: None,
            segment: None,
            channels: None,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn header(&self) -> Option<&WavHeader> {
        self.header.as_ref()
    }

    /// Decimated preview produced by [`TrackAnalyzer::parse`]
    pub fn preview(&self) -> Option<&ChannelPair> {
        self.preview.as_ref()
    }

    /// Segment found by [`TrackAnalyzer::locate_segment`]
    pub fn segment(&self) -> Option<AudioSegment> {
        self.segment
    }

    /// Full-resolution channels from [`TrackAnalyzer::extract_segment`]
    pub fn channels(&self) -> Option<&ChannelPair> {
        self.channels.as_ref()
    }

    /// Validate the container and decode the decimated preview
    pub fn parse(&mut self, buffer: &[u8]) -> Result<WavHeader> {
        self.header = None;
        self.preview = None;
        self.segment = None;
        self.channels = None;

        let (header, data) = wav::parse(buffer)?;
        let preview = wav::decode_channels(
            data,
            header.block_align,
            self.config.decimation,
            None,
            None,
        );

        debug!(
            preview_blocks = preview.len(),
            decimation = self.config.decimation,
            "Decoded preview"
        );

        self.data = data.to_vec();
        self.header = Some(header);
        self.preview = Some(preview);
        Ok(header)
    }

    /// Track length in seconds: preview length × decimation / sample rate
    pub fn duration_seconds(&self) -> Result<f64> {
        let (header, preview) = match (&self.header, &self.preview) {
            (Some(header), Some(preview)) => (header, preview),
            _ => return Err(AnalysisError::State("parse must run before duration")),
        };
        Ok(
            (preview.len() * self.config.decimation) as f64
                / f64::from(header.sample_rate.hz()),
        )
    }

    /// Find the loudest segment in the preview
    ///
    /// The end is clamped to the track length, so a track shorter than the
    /// configured segment yields a shorter segment.
    pub fn locate_segment(&mut self) -> Result<AudioSegment> {
        let (header, preview) = match (&self.header, &self.preview) {
            (Some(header), Some(preview)) => (header, preview),
            _ => return Err(AnalysisError::State("parse must run before locate_segment")),
        };

        let stride = self.config.decimation;
        let window = segment::window_blocks(
            header.byte_rate,
            header.block_align,
            stride,
            self.config.segment_seconds,
        );
        let segment_samples =
            (self.config.segment_seconds * f64::from(header.sample_rate.hz())).round() as usize;

        let mut located = segment::locate(preview, window, stride, segment_samples);

        let total = header.block_count(self.data.len());
        if located.end_sample > total {
            warn!(
                end_sample = located.end_sample,
                total_samples = total,
                "Loudest segment extends past the end of the track, clamping"
            );
            located.end_sample = total;
            located.start_sample = located.start_sample.min(total);
        }

        let seconds = located.to_seconds(header.sample_rate.hz());
        info!(
            start = seconds.start,
            end = seconds.end,
            window_blocks = window,
            "Located loudest segment"
        );

        self.segment = Some(located);
        self.channels = None;
        Ok(located)
    }

    /// Decode the located segment at full resolution
    pub fn extract_segment(&mut self) -> Result<&ChannelPair> {
        let (header, located) = match (&self.header, self.segment) {
            (Some(header), Some(located)) => (header, located),
            _ => {
                return Err(AnalysisError::State(
                    "locate_segment must run before extract_segment",
                ))
            }
        };

        let (start, end) = located.byte_range(header.block_align);
        let channels =
            wav::decode_channels(&self.data, header.block_align, 1, Some(start), Some(end));
        debug!(samples = channels.len(), "Extracted segment");

        Ok(self.channels.insert(channels))
    }

    /// Segment samples of the configured channel
    pub fn analysed_signal(&self) -> Result<Vec<f32>> {
        let channels = self.channels.as_ref().ok_or(AnalysisError::State(
            "extract_segment must run before analysis",
        ))?;

        Ok(match self.config.rms.channel {
            ChannelSelection::Left => channels.left.clone(),
            ChannelSelection::Right => channels.right.clone(),
            ChannelSelection::Mid => channels.mid(),
        })
    }

    /// RMS estimator for the parsed sample rate and configured window
    pub fn rms_estimator(&self) -> Result<RmsEstimator> {
        let header = self
            .header
            .as_ref()
            .ok_or(AnalysisError::State("parse must run before rms_estimator"))?;
        let rms = &self.config.rms;

        let rate = if rms.window_in_preview_blocks {
            f64::from(header.byte_rate)
                / (f64::from(header.block_align) * self.config.decimation as f64)
        } else {
            f64::from(header.sample_rate.hz())
        };

        let estimator = RmsEstimator::from_rate(rate, rms.window_ms, rms.hop_fraction)?;
        let estimator = if rms.accurate {
            RmsEstimator::accurate(estimator.window())?
        } else {
            estimator
        };

        Ok(estimator.with_batch_size(rms.batch_size))
    }

    /// Filter the segment into `band` and estimate its RMS in one blocking pass
    pub fn rms_for_band(&self, band: Band) -> Result<BandRmsResult> {
        let signal = self.analysed_signal()?;
        let estimator = self.rms_estimator()?;
        let sample_rate = self.sample_rate()?;

        let filtered = apply_band(&signal, band, sample_rate, self.config.resonance);
        let interval = estimator.estimate(&filtered)?;
        Ok(BandRmsResult::new(band, interval))
    }

    /// Spectrogram of the segment using the spectrum settings
    pub fn spectrum(&self) -> Result<Spectrogram> {
        let signal = self.analysed_signal()?;
        let settings = &self.config.spectrum;

        let mut generator = SpectrumGenerator::new(
            self.sample_rate()?,
            settings.window_size,
            settings.delay_ms,
            settings.overlap,
            settings.windowed,
        )?;
        generator.generate(&signal)
    }

    fn sample_rate(&self) -> Result<u32> {
        self.header
            .as_ref()
            .map(|header| header.sample_rate.hz())
            .ok_or(AnalysisError::State("parse must run first"))
    }

    /// Estimate all five bands as concurrent tasks
    ///
    /// Each task filters its own copy of the shared segment and runs the
    /// cooperative estimator. The first failure cancels the remaining tasks,
    /// and so does dropping the returned future before it completes.
    pub async fn rms_all_bands(
        &self,
        progress: Option<mpsc::Sender<RmsProgress>>,
        cancel: &CancellationToken,
    ) -> Result<BandRms> {
        let signal: Arc<[f32]> = self.analysed_signal()?.into();
        let estimator = self.rms_estimator()?;
        let sample_rate = self.sample_rate()?;
        let resonance = self.config.resonance;
        let run = cancel.child_token();

        let handles: Vec<_> = Band::ALL
            .into_iter()
            .map(|band| {
                let signal = Arc::clone(&signal);
                let progress = progress.clone();
                let cancel = run.clone();
                tokio::spawn(async move {
                    let filtered = apply_band(&signal, band, sample_rate, resonance);
                    let interval = estimator
                        .estimate_cooperative(&filtered, band, progress.as_ref(), &cancel)
                        .await?;
                    debug!(
                        band = %band,
                        p95 = interval.percentile_low,
                        p99 = interval.percentile_high,
                        "Band RMS finished"
                    );
                    Ok::<_, AnalysisError>(BandRmsResult::new(band, interval))
                })
            })
            .collect();
        drop(progress);

        // Cancels the tasks on every exit path, including a dropped future
        let _guard = run.clone().drop_guard();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(err)) => {
                    run.cancel();
                    return Err(err);
                }
                Err(err) => {
                    run.cancel();
                    return Err(err.into());
                }
            }
        }

        let [all, bass, low_mid, high_mid, high]: [BandRmsResult; 5] = results
            .try_into()
            .map_err(|_| AnalysisError::Task("missing band result".to_string()))?;

        Ok(BandRms {
            all,
            bass,
            low_mid,
            high_mid,
            high,
        })
    }

    /// Run every stage on `buffer` and assemble the report
    pub async fn analyze(
        &mut self,
        buffer: &[u8],
        progress: Option<mpsc::Sender<RmsProgress>>,
        cancel: &CancellationToken,
    ) -> Result<AnalysisReport> {
        let started = Instant::now();

        let header = self.parse(buffer)?;
        let duration_seconds = self.duration_seconds()?;
        let located = self.locate_segment()?;
        self.extract_segment()?;

        let rms = self.rms_all_bands(progress, cancel).await?;

        let spectrum = if self.config.spectrum.enabled {
            if cancel.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }
            Some(self.spectrum()?)
        } else {
            None
        };

        let time_to_process_ms = started.elapsed().as_millis() as u64;
        info!(
            duration_seconds,
            time_to_process_ms,
            all_p99 = rms.all.interval.percentile_high,
            "Track analysis complete"
        );

        Ok(AnalysisReport {
            the_loudest_segment: located.to_seconds(header.sample_rate.hz()),
            duration_seconds,
            rms,
            spectrum,
            time_to_process_ms,
        })
    }
}

/// Analyze a WAV buffer in one call
pub async fn analyze(
    buffer: &[u8],
    config: AnalysisConfig,
    progress: Option<mpsc::Sender<RmsProgress>>,
    cancel: &CancellationToken,
) -> Result<AnalysisReport> {
    TrackAnalyzer::new(config)?
        .analyze(buffer, progress, cancel)
        .await
}
